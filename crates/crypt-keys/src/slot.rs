use crypt_objects::KeySlotContentProps;
use crypt_types::{AlgId, CryptoObjectType, SlotNumber};
use serde::{Deserialize, Serialize};

/// Restrictions fixed when a slot is provisioned.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSpec {
    /// Largest payload the slot accepts, in bytes.
    pub capacity: usize,
    /// Only objects of this type may be stored, if set.
    pub object_type: Option<CryptoObjectType>,
    /// Only objects of this algorithm may be stored, if set.
    pub alg_id: Option<AlgId>,
    /// Free-form owner label.
    pub owner: String,
}

impl SlotSpec {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            object_type: None,
            alg_id: None,
            owner: String::new(),
        }
    }

    pub fn for_type(mut self, object_type: CryptoObjectType) -> Self {
        self.object_type = Some(object_type);
        self
    }

    pub fn for_alg(mut self, alg_id: AlgId) -> Self {
        self.alg_id = Some(alg_id);
        self
    }

    pub fn owned_by(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }
}

/// Directory view of one slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotInfo {
    pub slot: SlotNumber,
    pub spec: SlotSpec,
    /// Metadata of the current content, `None` when empty.
    pub content: Option<KeySlotContentProps>,
    /// Number of content updates since provisioning.
    pub revision: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_restrictions() {
        let spec = SlotSpec::new(128)
            .for_type(CryptoObjectType::SymmetricKey)
            .for_alg(AlgId::Aes256Gcm)
            .owned_by("backup");
        assert_eq!(spec.capacity, 128);
        assert_eq!(spec.object_type, Some(CryptoObjectType::SymmetricKey));
        assert_eq!(spec.alg_id, Some(AlgId::Aes256Gcm));
        assert_eq!(spec.owner, "backup");
    }

    #[test]
    fn spec_serde_roundtrip() {
        let spec = SlotSpec::new(64).for_alg(AlgId::Ed25519);
        let json = serde_json::to_string(&spec).unwrap();
        let parsed: SlotSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(spec, parsed);
    }
}
