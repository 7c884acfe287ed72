//! Trusted containers: the unit of exchange between a crypto provider and
//! key storage.
//!
//! A container is a reference-counted cell holding at most one serialized
//! object. Clones share the cell. Access is either *ownership* (one exclusive
//! writer) or *usage* (any number of readers); the two never overlap.

use std::sync::{Arc, Weak};

use crypt_types::{
    AlgId, AllowedUsage, CryptoObjectType, CryptoObjectUid, SecurityError, SecurityResult,
    SlotNumber,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::record::ObjectRecord;

/// Metadata describing a container's content without decoding it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySlotContentProps {
    pub object_uid: CryptoObjectUid,
    pub dependency_uid: Option<CryptoObjectUid>,
    pub alg_id: AlgId,
    pub object_size: usize,
    pub allowed_usage: AllowedUsage,
    pub object_type: CryptoObjectType,
    pub is_exportable: bool,
    pub is_session: bool,
    /// Live handles to the container at the time the props were read.
    pub reference_count: usize,
    pub slot_number: Option<SlotNumber>,
}

impl KeySlotContentProps {
    fn from_record(record: &ObjectRecord, object_size: usize) -> Self {
        let header = &record.header;
        Self {
            object_uid: header.uid,
            dependency_uid: header.dependency.map(|d| d.uid),
            alg_id: header.alg_id,
            object_size,
            allowed_usage: header.allowed_usage,
            object_type: header.object_type,
            is_exportable: header.is_exportable,
            is_session: header.is_session,
            reference_count: 0,
            slot_number: None,
        }
    }
}

/// Persistence sink behind a persistent container.
pub trait ContainerBacking: Send + Sync {
    /// Record new content for `slot`; `None` clears it.
    fn update_key_slot(
        &self,
        slot: SlotNumber,
        props: Option<&KeySlotContentProps>,
        payload: &[u8],
    ) -> SecurityResult<()>;
}

enum ContainerKind {
    Volatile,
    Persistent {
        slot: SlotNumber,
        backing: Weak<dyn ContainerBacking>,
    },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Access {
    #[default]
    Idle,
    Owned,
    Used(usize),
}

struct Content {
    props: KeySlotContentProps,
    payload: Zeroizing<Vec<u8>>,
}

#[derive(Default)]
struct CellState {
    content: Option<Content>,
    access: Access,
}

struct ContainerCell {
    capacity: usize,
    type_restriction: Option<CryptoObjectType>,
    kind: ContainerKind,
    state: Mutex<CellState>,
}

/// Shared handle to one container cell.
#[derive(Clone)]
pub struct TrustedContainer {
    cell: Arc<ContainerCell>,
}

impl TrustedContainer {
    /// In-memory container that may also hold session objects.
    pub fn volatile(capacity: usize) -> Self {
        Self::with_kind(capacity, None, ContainerKind::Volatile)
    }

    /// Container bound to a key slot; writes are forwarded to `backing`.
    pub fn persistent(
        slot: SlotNumber,
        capacity: usize,
        type_restriction: Option<CryptoObjectType>,
        backing: Weak<dyn ContainerBacking>,
    ) -> Self {
        Self::with_kind(
            capacity,
            type_restriction,
            ContainerKind::Persistent { slot, backing },
        )
    }

    fn with_kind(
        capacity: usize,
        type_restriction: Option<CryptoObjectType>,
        kind: ContainerKind,
    ) -> Self {
        Self {
            cell: Arc::new(ContainerCell {
                capacity,
                type_restriction,
                kind,
                state: Mutex::new(CellState::default()),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.cell.capacity
    }

    pub fn is_volatile(&self) -> bool {
        matches!(self.cell.kind, ContainerKind::Volatile)
    }

    pub fn slot_number(&self) -> Option<SlotNumber> {
        match self.cell.kind {
            ContainerKind::Volatile => None,
            ContainerKind::Persistent { slot, .. } => Some(slot),
        }
    }

    pub fn type_restriction(&self) -> Option<CryptoObjectType> {
        self.cell.type_restriction
    }

    pub fn is_empty(&self) -> bool {
        self.cell.state.lock().content.is_none()
    }

    /// Number of live handles to this cell.
    pub fn reference_count(&self) -> usize {
        Arc::strong_count(&self.cell)
    }

    /// Returns `true` if both handles point at the same cell.
    pub fn same_cell(&self, other: &TrustedContainer) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }

    /// Metadata of the current content, `None` when empty.
    pub fn props(&self) -> Option<KeySlotContentProps> {
        let state = self.cell.state.lock();
        state.content.as_ref().map(|c| self.live_props(&c.props))
    }

    /// Exclusive read-write access.
    ///
    /// Fails with `AccessViolation` while any other access is held.
    pub fn acquire_ownership(&self) -> SecurityResult<ContainerOwner<'_>> {
        let mut state = self.cell.state.lock();
        if state.access != Access::Idle {
            debug!(access = ?state.access, "ownership refused");
            return Err(SecurityError::AccessViolation);
        }
        state.access = Access::Owned;
        Ok(ContainerOwner { container: self })
    }

    /// Shared read-only access.
    ///
    /// Fails with `AccessViolation` while the container is owned.
    pub fn acquire_usage(&self) -> SecurityResult<ContainerUser<'_>> {
        let mut state = self.cell.state.lock();
        state.access = match state.access {
            Access::Idle => Access::Used(1),
            Access::Used(n) => Access::Used(n + 1),
            Access::Owned => return Err(SecurityError::AccessViolation),
        };
        Ok(ContainerUser { container: self })
    }

    fn live_props(&self, props: &KeySlotContentProps) -> KeySlotContentProps {
        KeySlotContentProps {
            reference_count: self.reference_count(),
            slot_number: self.slot_number(),
            ..*props
        }
    }

    fn load_record(&self) -> SecurityResult<ObjectRecord> {
        let state = self.cell.state.lock();
        let content = state.content.as_ref().ok_or(SecurityError::EmptyContainer)?;
        ObjectRecord::decode(&content.payload)
    }

    fn backing(&self) -> SecurityResult<Option<(SlotNumber, Arc<dyn ContainerBacking>)>> {
        match &self.cell.kind {
            ContainerKind::Volatile => Ok(None),
            ContainerKind::Persistent { slot, backing } => backing
                .upgrade()
                .map(|b| Some((*slot, b)))
                .ok_or(SecurityError::ResourceFault),
        }
    }
}

impl std::fmt::Debug for TrustedContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.cell.state.lock();
        f.debug_struct("TrustedContainer")
            .field("slot", &self.slot_number())
            .field("capacity", &self.cell.capacity)
            .field("access", &state.access)
            .field(
                "content",
                &state.content.as_ref().map(|c| (c.props.object_type, c.props.object_uid)),
            )
            .finish()
    }
}

/// Exclusive access guard. Released on drop.
#[derive(Debug)]
pub struct ContainerOwner<'a> {
    container: &'a TrustedContainer,
}

impl ContainerOwner<'_> {
    pub fn container(&self) -> &TrustedContainer {
        self.container
    }

    /// Replace the content with `record`.
    ///
    /// The record must carry a COUID. Session objects only fit volatile
    /// containers, and a type restriction on the container is honoured. On
    /// any failure the previous content is left untouched.
    pub fn store_record(&mut self, record: &ObjectRecord) -> SecurityResult<()> {
        let header = &record.header;
        if header.uid.is_nil() {
            return Err(SecurityError::IncompleteArgState);
        }
        if header.is_session && !self.container.is_volatile() {
            warn!(uid = %header.uid.short_id(), "session object refused by persistent container");
            return Err(SecurityError::ContentRestrictions);
        }
        if let Some(restriction) = self.container.type_restriction() {
            if restriction != header.object_type {
                return Err(SecurityError::ContentRestrictions);
            }
        }
        let payload = Zeroizing::new(record.encode()?);
        if payload.len() > self.container.capacity() {
            return Err(SecurityError::InsufficientCapacity {
                required: payload.len(),
            });
        }
        let props = KeySlotContentProps::from_record(record, payload.len());
        if let Some((slot, backing)) = self.container.backing()? {
            backing.update_key_slot(slot, Some(&self.container.live_props(&props)), &payload)?;
        }
        debug!(
            object_type = %header.object_type,
            uid = %header.uid.short_id(),
            size = payload.len(),
            slot = ?self.container.slot_number(),
            "container content stored"
        );
        self.container.cell.state.lock().content = Some(Content { props, payload });
        Ok(())
    }

    /// Drop the content.
    pub fn clear(&mut self) -> SecurityResult<()> {
        if let Some((slot, backing)) = self.container.backing()? {
            backing.update_key_slot(slot, None, &[])?;
        }
        self.container.cell.state.lock().content = None;
        Ok(())
    }

    pub fn load_record(&self) -> SecurityResult<ObjectRecord> {
        self.container.load_record()
    }

    pub fn props(&self) -> Option<KeySlotContentProps> {
        self.container.props()
    }
}

impl Drop for ContainerOwner<'_> {
    fn drop(&mut self) {
        self.container.cell.state.lock().access = Access::Idle;
    }
}

/// Shared read access guard. Released on drop.
#[derive(Debug)]
pub struct ContainerUser<'a> {
    container: &'a TrustedContainer,
}

impl ContainerUser<'_> {
    pub fn container(&self) -> &TrustedContainer {
        self.container
    }

    /// Decode the content. Fails with `EmptyContainer` when there is none.
    pub fn load_record(&self) -> SecurityResult<ObjectRecord> {
        self.container.load_record()
    }

    pub fn props(&self) -> Option<KeySlotContentProps> {
        self.container.props()
    }
}

impl Drop for ContainerUser<'_> {
    fn drop(&mut self) {
        let mut state = self.container.cell.state.lock();
        state.access = match state.access {
            Access::Used(n) if n > 1 => Access::Used(n - 1),
            _ => Access::Idle,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::SymmetricKey;
    use crate::object::CryptoObject;
    use crate::record::ObjectHeader;

    fn key(session: bool) -> SymmetricKey {
        let header = ObjectHeader::new(CryptoObjectType::SymmetricKey, AlgId::Aes128Gcm)
            .with_uid(CryptoObjectUid::from_name("container-key"))
            .session(session)
            .with_usage(AllowedUsage::ALLOW_DATA_ENCRYPTION);
        SymmetricKey::new(header, Zeroizing::new(vec![4; 16])).unwrap()
    }

    #[derive(Default)]
    struct RecordingBacking {
        updates: Mutex<Vec<(SlotNumber, Option<CryptoObjectUid>)>>,
    }

    impl ContainerBacking for RecordingBacking {
        fn update_key_slot(
            &self,
            slot: SlotNumber,
            props: Option<&KeySlotContentProps>,
            _payload: &[u8],
        ) -> SecurityResult<()> {
            self.updates.lock().push((slot, props.map(|p| p.object_uid)));
            Ok(())
        }
    }

    // ---- Access modes ----

    #[test]
    fn ownership_is_exclusive() {
        let container = TrustedContainer::volatile(256);
        let owner = container.acquire_ownership().unwrap();
        assert_eq!(
            container.acquire_ownership().unwrap_err(),
            SecurityError::AccessViolation
        );
        assert_eq!(
            container.acquire_usage().unwrap_err(),
            SecurityError::AccessViolation
        );
        drop(owner);
        assert!(container.acquire_ownership().is_ok());
    }

    #[test]
    fn usage_is_shared_but_blocks_ownership() {
        let container = TrustedContainer::volatile(256);
        let a = container.acquire_usage().unwrap();
        let b = container.acquire_usage().unwrap();
        assert!(container.acquire_ownership().is_err());
        drop(a);
        assert!(container.acquire_ownership().is_err());
        drop(b);
        assert!(container.acquire_ownership().is_ok());
    }

    #[test]
    fn clones_share_the_cell() {
        let container = TrustedContainer::volatile(256);
        let other = container.clone();
        assert_eq!(container.reference_count(), 2);
        let _owner = container.acquire_ownership().unwrap();
        assert!(other.acquire_usage().is_err());
    }

    // ---- Content ----

    #[test]
    fn save_and_load() {
        let container = TrustedContainer::volatile(256);
        let k = key(false);
        k.save(&mut container.acquire_ownership().unwrap()).unwrap();

        let props = container.props().unwrap();
        assert_eq!(props.object_type, CryptoObjectType::SymmetricKey);
        assert_eq!(props.object_size, k.storage_size());
        assert_eq!(props.reference_count, 1);

        let user = container.acquire_usage().unwrap();
        assert_eq!(user.load_record().unwrap(), k.to_record());
    }

    #[test]
    fn empty_container_load_fails() {
        let container = TrustedContainer::volatile(64);
        let user = container.acquire_usage().unwrap();
        assert_eq!(
            user.load_record().unwrap_err(),
            SecurityError::EmptyContainer
        );
    }

    #[test]
    fn capacity_is_enforced() {
        let container = TrustedContainer::volatile(8);
        let k = key(false);
        let err = k.save(&mut container.acquire_ownership().unwrap()).unwrap_err();
        assert_eq!(
            err,
            SecurityError::InsufficientCapacity {
                required: k.storage_size()
            }
        );
        assert!(container.is_empty());
    }

    #[test]
    fn anonymous_objects_cannot_be_saved() {
        let container = TrustedContainer::volatile(256);
        let header = ObjectHeader::new(CryptoObjectType::SymmetricKey, AlgId::Aes128Gcm);
        let k = SymmetricKey::new(header, Zeroizing::new(vec![0; 16])).unwrap();
        assert_eq!(
            k.save(&mut container.acquire_ownership().unwrap())
                .unwrap_err(),
            SecurityError::IncompleteArgState
        );
    }

    // ---- Persistent ----

    #[test]
    fn persistent_container_forwards_to_backing() {
        let backing = Arc::new(RecordingBacking::default());
        let weak = Arc::downgrade(&backing) as Weak<dyn ContainerBacking>;
        let container = TrustedContainer::persistent(7, 256, None, weak);
        let k = key(false);
        {
            let mut owner = container.acquire_ownership().unwrap();
            k.save(&mut owner).unwrap();
            owner.clear().unwrap();
        }
        let updates = backing.updates.lock().clone();
        assert_eq!(updates, vec![(7, k.object_id()), (7, None)]);
    }

    #[test]
    fn persistent_container_refuses_session_objects() {
        let backing = Arc::new(RecordingBacking::default());
        let weak = Arc::downgrade(&backing) as Weak<dyn ContainerBacking>;
        let container = TrustedContainer::persistent(1, 256, None, weak);
        assert_eq!(
            key(true)
                .save(&mut container.acquire_ownership().unwrap())
                .unwrap_err(),
            SecurityError::ContentRestrictions
        );
        assert!(backing.updates.lock().is_empty());
    }

    #[test]
    fn type_restriction_is_honoured() {
        let backing = Arc::new(RecordingBacking::default());
        let weak = Arc::downgrade(&backing) as Weak<dyn ContainerBacking>;
        let container =
            TrustedContainer::persistent(2, 256, Some(CryptoObjectType::PrivateKey), weak);
        assert_eq!(
            key(false)
                .save(&mut container.acquire_ownership().unwrap())
                .unwrap_err(),
            SecurityError::ContentRestrictions
        );
    }

    #[test]
    fn dropped_backing_is_a_resource_fault() {
        let backing = Arc::new(RecordingBacking::default());
        let weak = Arc::downgrade(&backing) as Weak<dyn ContainerBacking>;
        let container = TrustedContainer::persistent(3, 256, None, weak);
        drop(backing);
        assert_eq!(
            key(false)
                .save(&mut container.acquire_ownership().unwrap())
                .unwrap_err(),
            SecurityError::ResourceFault
        );
    }
}
