use crypt_types::{AlgId, CryptoObjectType, SecurityResult};

use crate::object::{expect_type, CryptoObject};
use crate::record::{ObjectBody, ObjectHeader, ObjectRecord};

/// Digest, MAC tag or digital signature value.
///
/// For a plain hash `hash_alg_id` names the hash itself and the dependency
/// points at the domain parameters; for a MAC `hash_alg_id` is
/// [`AlgId::None`] and the dependency points at the key.
#[derive(Clone)]
pub struct Signature {
    header: ObjectHeader,
    value: Vec<u8>,
    hash_alg_id: AlgId,
}

impl Signature {
    pub fn new(header: ObjectHeader, value: Vec<u8>, hash_alg_id: AlgId) -> SecurityResult<Self> {
        expect_type(&header, CryptoObjectType::Signature)?;
        Ok(Self {
            header,
            value,
            hash_alg_id,
        })
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn hash_alg_id(&self) -> AlgId {
        self.hash_alg_id
    }

    /// Digest length the signing algorithm expects from its hash.
    pub fn required_hash_size(&self) -> usize {
        self.hash_alg_id.digest_size()
    }
}

impl CryptoObject for Signature {
    fn header(&self) -> ObjectHeader {
        self.header
    }

    fn to_record(&self) -> ObjectRecord {
        ObjectRecord::new(
            self.header,
            ObjectBody::Signature {
                value: self.value.clone(),
                hash_alg_id: self.hash_alg_id,
            },
        )
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let preview = &self.value[..self.value.len().min(8)];
        write!(
            f,
            "Signature({:?}, hash={:?}, {}...)",
            self.header.alg_id,
            self.hash_alg_id,
            hex::encode(preview)
        )
    }
}
