use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crypt_objects::{ContainerBacking, KeySlotContentProps, TrustedContainer};
use crypt_types::{CryptoObjectType, CryptoObjectUid, SecurityError, SecurityResult, SlotNumber};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::slot::{SlotInfo, SlotSpec};
use crate::traits::KeyStorageProvider;

struct SlotEntry {
    spec: SlotSpec,
    container: TrustedContainer,
    content: Option<KeySlotContentProps>,
    revision: u64,
}

/// In-memory, HashMap-based key storage.
///
/// Intended for tests and embedding. Slots live behind a `RwLock`; each slot
/// owns one persistent container whose writes are routed back here. Always
/// handled through an `Arc` so containers can reach their backing.
pub struct InMemoryKeyStorage {
    slots: RwLock<HashMap<SlotNumber, SlotEntry>>,
    self_ref: Weak<InMemoryKeyStorage>,
}

impl InMemoryKeyStorage {
    /// Create a new storage with no slots.
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            slots: RwLock::new(HashMap::new()),
            self_ref: self_ref.clone(),
        })
    }

    /// Number of provisioned slots.
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Returns `true` if no slot is provisioned.
    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Total payload bytes across all occupied slots.
    pub fn total_bytes(&self) -> usize {
        self.slots
            .read()
            .values()
            .filter_map(|e| e.content.map(|c| c.object_size))
            .sum()
    }

    fn container_of(&self, slot: SlotNumber) -> SecurityResult<(TrustedContainer, bool)> {
        let slots = self.slots.read();
        let entry = slots.get(&slot).ok_or(SecurityError::UnknownIdentifier)?;
        Ok((entry.container.clone(), entry.content.is_some()))
    }
}

impl KeyStorageProvider for InMemoryKeyStorage {
    fn provision_slot(&self, slot: SlotNumber, spec: SlotSpec) -> SecurityResult<()> {
        let mut slots = self.slots.write();
        if slots.contains_key(&slot) {
            return Err(SecurityError::BusyResource);
        }
        let backing: Weak<dyn ContainerBacking> = self.self_ref.clone();
        let container =
            TrustedContainer::persistent(slot, spec.capacity, spec.object_type, backing);
        info!(slot, capacity = spec.capacity, owner = %spec.owner, "key slot provisioned");
        slots.insert(
            slot,
            SlotEntry {
                spec,
                container,
                content: None,
                revision: 0,
            },
        );
        Ok(())
    }

    fn open_as_user(&self, slot: SlotNumber) -> SecurityResult<TrustedContainer> {
        let (container, occupied) = self.container_of(slot)?;
        if !occupied {
            return Err(SecurityError::EmptyContainer);
        }
        Ok(container)
    }

    fn open_as_owner(&self, slot: SlotNumber) -> SecurityResult<TrustedContainer> {
        Ok(self.container_of(slot)?.0)
    }

    fn update_key_slot(
        &self,
        slot: SlotNumber,
        props: Option<&KeySlotContentProps>,
        payload: &[u8],
    ) -> SecurityResult<()> {
        let mut slots = self.slots.write();
        let Some(props) = props else {
            let entry = slots.get_mut(&slot).ok_or(SecurityError::UnknownIdentifier)?;
            entry.content = None;
            entry.revision += 1;
            debug!(slot, "key slot cleared");
            return Ok(());
        };

        let duplicate = slots.iter().any(|(n, e)| {
            *n != slot
                && e.content.is_some_and(|c| {
                    c.object_type == props.object_type && c.object_uid == props.object_uid
                })
        });
        let entry = slots.get_mut(&slot).ok_or(SecurityError::UnknownIdentifier)?;
        if props.is_session
            || entry.spec.object_type.is_some_and(|t| t != props.object_type)
            || entry.spec.alg_id.is_some_and(|a| a != props.alg_id)
        {
            warn!(slot, alg = ?props.alg_id, "key slot restrictions violated");
            return Err(SecurityError::ContentRestrictions);
        }
        if payload.len() > entry.spec.capacity {
            return Err(SecurityError::InsufficientCapacity {
                required: payload.len(),
            });
        }
        if duplicate {
            warn!(
                slot,
                uid = %props.object_uid.short_id(),
                "object already stored in another slot"
            );
            return Err(SecurityError::ContentDuplication);
        }
        entry.content = Some(*props);
        entry.revision += 1;
        info!(
            slot,
            object_type = %props.object_type,
            uid = %props.object_uid.short_id(),
            revision = entry.revision,
            "key slot updated"
        );
        Ok(())
    }

    fn clear_slot(&self, slot: SlotNumber) -> SecurityResult<()> {
        let (container, _) = self.container_of(slot)?;
        let mut owner = container.acquire_ownership()?;
        owner.clear()
    }

    fn find_object(
        &self,
        object_type: CryptoObjectType,
        uid: &CryptoObjectUid,
    ) -> SecurityResult<Option<SlotNumber>> {
        let slots = self.slots.read();
        Ok(slots
            .iter()
            .find(|(_, e)| {
                e.content
                    .is_some_and(|c| c.object_type == object_type && c.object_uid == *uid)
            })
            .map(|(n, _)| *n))
    }

    fn slot_info(&self, slot: SlotNumber) -> SecurityResult<SlotInfo> {
        let slots = self.slots.read();
        let entry = slots.get(&slot).ok_or(SecurityError::UnknownIdentifier)?;
        Ok(SlotInfo {
            slot,
            spec: entry.spec.clone(),
            content: entry.content,
            revision: entry.revision,
        })
    }

    fn slots(&self) -> Vec<SlotNumber> {
        let mut numbers: Vec<SlotNumber> = self.slots.read().keys().copied().collect();
        numbers.sort_unstable();
        numbers
    }
}

impl ContainerBacking for InMemoryKeyStorage {
    fn update_key_slot(
        &self,
        slot: SlotNumber,
        props: Option<&KeySlotContentProps>,
        payload: &[u8],
    ) -> SecurityResult<()> {
        KeyStorageProvider::update_key_slot(self, slot, props, payload)
    }
}

impl std::fmt::Debug for InMemoryKeyStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryKeyStorage")
            .field("slot_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypt_objects::{CryptoObject, ObjectHeader, SymmetricKey};
    use crypt_types::{AlgId, AllowedUsage};
    use zeroize::Zeroizing;

    fn key(name: &str, alg: AlgId) -> SymmetricKey {
        let header = ObjectHeader::new(CryptoObjectType::SymmetricKey, alg)
            .with_uid(CryptoObjectUid::from_name(name))
            .with_usage(AllowedUsage::ALLOW_DATA_ENCRYPTION);
        SymmetricKey::new(header, Zeroizing::new(vec![1; alg.key_size()])).unwrap()
    }

    fn store_into(
        ksp: &InMemoryKeyStorage,
        slot: SlotNumber,
        k: &SymmetricKey,
    ) -> SecurityResult<()> {
        let container = ksp.open_as_owner(slot)?;
        let mut owner = container.acquire_ownership()?;
        k.save(&mut owner)
    }

    // -----------------------------------------------------------------------
    // Provisioning
    // -----------------------------------------------------------------------

    #[test]
    fn provision_and_list() {
        let ksp = InMemoryKeyStorage::new();
        ksp.provision_slot(3, SlotSpec::new(256)).unwrap();
        ksp.provision_slot(1, SlotSpec::new(256)).unwrap();
        assert_eq!(ksp.slots(), vec![1, 3]);
        assert_eq!(ksp.len(), 2);
    }

    #[test]
    fn provision_twice_is_busy() {
        let ksp = InMemoryKeyStorage::new();
        ksp.provision_slot(1, SlotSpec::new(64)).unwrap();
        assert_eq!(
            ksp.provision_slot(1, SlotSpec::new(64)).unwrap_err(),
            SecurityError::BusyResource
        );
    }

    #[test]
    fn unknown_slot_is_unknown_identifier() {
        let ksp = InMemoryKeyStorage::new();
        assert_eq!(
            ksp.open_as_owner(9).unwrap_err(),
            SecurityError::UnknownIdentifier
        );
    }

    // -----------------------------------------------------------------------
    // Content
    // -----------------------------------------------------------------------

    #[test]
    fn saved_object_updates_directory() {
        let ksp = InMemoryKeyStorage::new();
        ksp.provision_slot(1, SlotSpec::new(256)).unwrap();
        let k = key("a", AlgId::Aes128Gcm);
        store_into(&ksp, 1, &k).unwrap();

        let info = ksp.slot_info(1).unwrap();
        assert_eq!(info.revision, 1);
        let content = info.content.unwrap();
        assert_eq!(content.object_uid, k.object_id().unwrap());
        assert_eq!(content.slot_number, Some(1));
        assert_eq!(
            ksp.find_object(CryptoObjectType::SymmetricKey, &content.object_uid)
                .unwrap(),
            Some(1)
        );
        assert_eq!(ksp.total_bytes(), k.storage_size());
    }

    #[test]
    fn open_as_user_requires_content() {
        let ksp = InMemoryKeyStorage::new();
        ksp.provision_slot(1, SlotSpec::new(256)).unwrap();
        assert_eq!(
            ksp.open_as_user(1).unwrap_err(),
            SecurityError::EmptyContainer
        );
        store_into(&ksp, 1, &key("a", AlgId::Aes128Gcm)).unwrap();
        let container = ksp.open_as_user(1).unwrap();
        let user = container.acquire_usage().unwrap();
        assert_eq!(
            user.load_record().unwrap().header.object_type,
            CryptoObjectType::SymmetricKey
        );
    }

    #[test]
    fn same_object_cannot_live_in_two_slots() {
        let ksp = InMemoryKeyStorage::new();
        ksp.provision_slot(1, SlotSpec::new(256)).unwrap();
        ksp.provision_slot(2, SlotSpec::new(256)).unwrap();
        let k = key("dup", AlgId::Aes128Gcm);
        store_into(&ksp, 1, &k).unwrap();
        assert_eq!(
            store_into(&ksp, 2, &k).unwrap_err(),
            SecurityError::ContentDuplication
        );
        assert!(ksp.open_as_owner(2).unwrap().is_empty());
    }

    #[test]
    fn alg_restriction_is_enforced() {
        let ksp = InMemoryKeyStorage::new();
        ksp.provision_slot(1, SlotSpec::new(256).for_alg(AlgId::Aes256Gcm))
            .unwrap();
        assert_eq!(
            store_into(&ksp, 1, &key("a", AlgId::Aes128Gcm)).unwrap_err(),
            SecurityError::ContentRestrictions
        );
        store_into(&ksp, 1, &key("b", AlgId::Aes256Gcm)).unwrap();
    }

    #[test]
    fn clear_slot_empties_and_respects_usage() {
        let ksp = InMemoryKeyStorage::new();
        ksp.provision_slot(1, SlotSpec::new(256)).unwrap();
        store_into(&ksp, 1, &key("a", AlgId::Aes128Gcm)).unwrap();

        let container = ksp.open_as_user(1).unwrap();
        let user = container.acquire_usage().unwrap();
        assert_eq!(
            ksp.clear_slot(1).unwrap_err(),
            SecurityError::AccessViolation
        );
        drop(user);

        ksp.clear_slot(1).unwrap();
        assert!(ksp.slot_info(1).unwrap().content.is_none());
        assert!(container.is_empty());
    }

    #[test]
    fn handles_share_one_container() {
        let ksp = InMemoryKeyStorage::new();
        ksp.provision_slot(1, SlotSpec::new(256)).unwrap();
        let a = ksp.open_as_owner(1).unwrap();
        let b = ksp.open_as_owner(1).unwrap();
        assert!(a.same_cell(&b));
        let _owner = a.acquire_ownership().unwrap();
        assert_eq!(
            b.acquire_ownership().unwrap_err(),
            SecurityError::AccessViolation
        );
    }

    // -----------------------------------------------------------------------
    // Concurrent access
    // -----------------------------------------------------------------------

    #[test]
    fn concurrent_readers_are_safe() {
        use std::thread;

        let ksp = InMemoryKeyStorage::new();
        ksp.provision_slot(1, SlotSpec::new(256)).unwrap();
        store_into(&ksp, 1, &key("shared", AlgId::Aes128Gcm)).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ksp = Arc::clone(&ksp);
                thread::spawn(move || {
                    let container = ksp.open_as_user(1).unwrap();
                    let user = container.acquire_usage().unwrap();
                    assert!(user.load_record().is_ok());
                })
            })
            .collect();

        for h in handles {
            h.join().expect("thread should not panic");
        }
    }
}
