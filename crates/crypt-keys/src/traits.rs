use crypt_objects::{KeySlotContentProps, TrustedContainer};
use crypt_types::{CryptoObjectType, CryptoObjectUid, SecurityResult, SlotNumber};

use crate::slot::{SlotInfo, SlotSpec};

/// Key storage provider: numbered slots holding persistent containers.
///
/// All implementations must satisfy these invariants:
/// - A slot exists only after `provision_slot`; opening an unknown slot fails
///   with `UnknownIdentifier`.
/// - Opening a slot never copies content: every handle to a slot shares one
///   container cell, so the container's ownership/usage rules apply across
///   all handles.
/// - Writes reach the KSP through the container, which calls
///   `update_key_slot`. The KSP may veto a write (restrictions, duplicates)
///   and the container content is then unchanged.
pub trait KeyStorageProvider: Send + Sync {
    /// Create a new, empty slot. Fails with `BusyResource` if it exists.
    fn provision_slot(&self, slot: SlotNumber, spec: SlotSpec) -> SecurityResult<()>;

    /// Container of a non-empty slot for reading.
    ///
    /// Fails with `EmptyContainer` when the slot holds nothing.
    fn open_as_user(&self, slot: SlotNumber) -> SecurityResult<TrustedContainer>;

    /// Container of a slot for writing. Empty slots are allowed.
    fn open_as_owner(&self, slot: SlotNumber) -> SecurityResult<TrustedContainer>;

    /// Record new content for `slot`, or clear it when `props` is `None`.
    ///
    /// Normally invoked by the slot's container, not by callers directly.
    fn update_key_slot(
        &self,
        slot: SlotNumber,
        props: Option<&KeySlotContentProps>,
        payload: &[u8],
    ) -> SecurityResult<()>;

    /// Empty a slot. Fails with `AccessViolation` while the slot is in use.
    fn clear_slot(&self, slot: SlotNumber) -> SecurityResult<()>;

    /// Slot holding the object with this type and COUID, if any.
    fn find_object(
        &self,
        object_type: CryptoObjectType,
        uid: &CryptoObjectUid,
    ) -> SecurityResult<Option<SlotNumber>>;

    /// Directory entry of one slot.
    fn slot_info(&self, slot: SlotNumber) -> SecurityResult<SlotInfo>;

    /// All provisioned slot numbers, ascending.
    fn slots(&self) -> Vec<SlotNumber>;

    /// Directory entries of all slots, ascending.
    ///
    /// Default implementation calls `slot_info()` for each slot.
    fn directory(&self) -> SecurityResult<Vec<SlotInfo>> {
        self.slots().into_iter().map(|s| self.slot_info(s)).collect()
    }
}
