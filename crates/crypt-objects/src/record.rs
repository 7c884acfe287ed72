use crypt_types::{
    AlgFamily, AlgId, AllowedUsage, CryptoObjectType, CryptoObjectUid, KeyFamily, SecurityError,
    SecurityResult,
};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::domain::parameter_schema;

/// Longest set name accounted for when sizing domain-parameter slots.
pub const MAX_PARAMETER_SET_NAME: usize = 32;

/// Longest salt accounted for when sizing password-hash slots.
pub const MAX_PASSWORD_SALT: usize = 64;

/// Reference from one object to another it depends on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectDependency {
    pub uid: CryptoObjectUid,
    pub object_type: CryptoObjectType,
}

impl ObjectDependency {
    pub fn new(uid: CryptoObjectUid, object_type: CryptoObjectType) -> Self {
        Self { uid, object_type }
    }
}

/// Attributes shared by every crypto object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectHeader {
    pub object_type: CryptoObjectType,
    pub alg_id: AlgId,
    /// Nil until the object is completed.
    pub uid: CryptoObjectUid,
    pub dependency: Option<ObjectDependency>,
    pub is_session: bool,
    pub is_exportable: bool,
    pub allowed_usage: AllowedUsage,
}

impl ObjectHeader {
    /// A persistent, non-exportable header with no identity and no usage.
    pub fn new(object_type: CryptoObjectType, alg_id: AlgId) -> Self {
        Self {
            object_type,
            alg_id,
            uid: CryptoObjectUid::nil(),
            dependency: None,
            is_session: false,
            is_exportable: false,
            allowed_usage: AllowedUsage::PROTOTYPED_ONLY,
        }
    }

    pub fn with_uid(mut self, uid: CryptoObjectUid) -> Self {
        self.uid = uid;
        self
    }

    pub fn with_dependency(mut self, dependency: Option<ObjectDependency>) -> Self {
        self.dependency = dependency;
        self
    }

    pub fn with_usage(mut self, usage: AllowedUsage) -> Self {
        self.allowed_usage = usage;
        self
    }

    pub fn session(mut self, is_session: bool) -> Self {
        self.is_session = is_session;
        self
    }

    pub fn exportable(mut self, is_exportable: bool) -> Self {
        self.is_exportable = is_exportable;
        self
    }

    /// Dependency entry other objects use to point at this one.
    pub fn as_dependency(&self) -> Option<ObjectDependency> {
        self.uid
            .non_nil()
            .map(|uid| ObjectDependency::new(uid, self.object_type))
    }
}

/// Type-specific content of an object.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectBody {
    SymmetricKey { material: Vec<u8> },
    PrivateKey { secret: Vec<u8>, public: Vec<u8> },
    PublicKey { material: Vec<u8> },
    SecretSeed { material: Vec<u8> },
    Signature { value: Vec<u8>, hash_alg_id: AlgId },
    DomainParameters { name: Option<String>, values: Vec<Vec<u8>> },
    PasswordHash { salt: Vec<u8>, iterations: u32, hash: Vec<u8> },
}

impl ObjectBody {
    pub fn object_type(&self) -> CryptoObjectType {
        match self {
            Self::SymmetricKey { .. } => CryptoObjectType::SymmetricKey,
            Self::PrivateKey { .. } => CryptoObjectType::PrivateKey,
            Self::PublicKey { .. } => CryptoObjectType::PublicKey,
            Self::SecretSeed { .. } => CryptoObjectType::SecretSeed,
            Self::Signature { .. } => CryptoObjectType::Signature,
            Self::DomainParameters { .. } => CryptoObjectType::DomainParameters,
            Self::PasswordHash { .. } => CryptoObjectType::PasswordHash,
        }
    }
}

impl Drop for ObjectBody {
    fn drop(&mut self) {
        match self {
            Self::SymmetricKey { material } | Self::SecretSeed { material } => material.zeroize(),
            Self::PrivateKey { secret, .. } => secret.zeroize(),
            Self::PasswordHash { hash, .. } => hash.zeroize(),
            _ => {}
        }
    }
}

impl std::fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PublicKey { material } => write!(f, "PublicKey({})", hex::encode(material)),
            Self::Signature { value, hash_alg_id } => {
                write!(f, "Signature({} bytes, hash={hash_alg_id:?})", value.len())
            }
            Self::DomainParameters { name, values } => f
                .debug_struct("DomainParameters")
                .field("name", name)
                .field("values", &values.len())
                .finish(),
            other => write!(f, "{}(<redacted>)", other.object_type()),
        }
    }
}

/// Serialized form of one object: the unit stored in a trusted container.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub header: ObjectHeader,
    pub body: ObjectBody,
}

impl ObjectRecord {
    pub fn new(header: ObjectHeader, body: ObjectBody) -> Self {
        Self { header, body }
    }

    /// Encoded size in bytes.
    pub fn storage_size(&self) -> usize {
        bincode::serialized_size(self).map_or(usize::MAX, |n| n as usize)
    }

    pub fn encode(&self) -> SecurityResult<Vec<u8>> {
        bincode::serialize(self).map_err(|_| SecurityError::RuntimeFault)
    }

    /// Decode and check that header and body agree on the object type.
    pub fn decode(bytes: &[u8]) -> SecurityResult<Self> {
        let record: Self =
            bincode::deserialize(bytes).map_err(|_| SecurityError::UnexpectedValue)?;
        if record.header.object_type != record.body.object_type() {
            return Err(SecurityError::UnexpectedValue);
        }
        Ok(record)
    }
}

// ---------------------------------------------------------------------------
// Prototypes
// ---------------------------------------------------------------------------

/// Largest record an object of `object_type` for `alg` can encode to.
///
/// Fails with `UnknownIdentifier` for combinations no object can have.
pub fn max_storage_size(alg: AlgId, object_type: CryptoObjectType) -> SecurityResult<usize> {
    Ok(prototype(alg, object_type)?.storage_size())
}

/// Largest record of any supported combination.
pub fn max_storage_size_any() -> usize {
    AlgId::all()
        .flat_map(|alg| ALL_TYPES.iter().map(move |ty| (alg, *ty)))
        .filter_map(|(alg, ty)| max_storage_size(alg, ty).ok())
        .max()
        .unwrap_or(0)
}

/// Every object type, in code order.
pub const ALL_TYPES: [CryptoObjectType; 7] = [
    CryptoObjectType::DomainParameters,
    CryptoObjectType::SymmetricKey,
    CryptoObjectType::PrivateKey,
    CryptoObjectType::PublicKey,
    CryptoObjectType::Signature,
    CryptoObjectType::SecretSeed,
    CryptoObjectType::PasswordHash,
];

/// Material length of a seed generated or derived for `alg`.
pub fn seed_size(alg: AlgId) -> SecurityResult<usize> {
    let seedable = matches!(
        alg.family(),
        Some(
            AlgFamily::Kdf
                | AlgFamily::Rng
                | AlgFamily::KeyAgreement
                | AlgFamily::Kem
                | AlgFamily::Mac
                | AlgFamily::StreamCipher
                | AlgFamily::AuthnStreamCipher
                | AlgFamily::KeyWrap
        )
    );
    let size = alg.key_size().max(alg.digest_size());
    if !seedable || size == 0 {
        return Err(SecurityError::UnknownIdentifier);
    }
    Ok(size)
}

/// Returns `true` if `alg` takes symmetric key material.
pub fn is_symmetric_alg(alg: AlgId) -> bool {
    matches!(
        alg.key_family(),
        Some(KeyFamily::Aes | KeyFamily::Hmac | KeyFamily::ChaCha)
    )
}

/// Returns `true` if `alg` takes an asymmetric key pair.
pub fn is_asymmetric_alg(alg: AlgId) -> bool {
    matches!(
        alg.key_family(),
        Some(KeyFamily::Edwards25519 | KeyFamily::Montgomery25519)
    )
}

fn prototype(alg: AlgId, object_type: CryptoObjectType) -> SecurityResult<ObjectRecord> {
    if alg.is_sentinel() {
        return Err(SecurityError::UnknownIdentifier);
    }
    let body = match object_type {
        CryptoObjectType::SymmetricKey if is_symmetric_alg(alg) => ObjectBody::SymmetricKey {
            material: vec![0; alg.key_size()],
        },
        CryptoObjectType::PrivateKey if is_asymmetric_alg(alg) => ObjectBody::PrivateKey {
            secret: vec![0; alg.key_size()],
            public: vec![0; alg.key_size()],
        },
        CryptoObjectType::PublicKey if is_asymmetric_alg(alg) => ObjectBody::PublicKey {
            material: vec![0; alg.key_size()],
        },
        CryptoObjectType::SecretSeed => ObjectBody::SecretSeed {
            material: vec![0; seed_size(alg)?],
        },
        CryptoObjectType::Signature
            if matches!(
                alg.family(),
                Some(
                    AlgFamily::Hash
                        | AlgFamily::Mac
                        | AlgFamily::AuthnStreamCipher
                        | AlgFamily::Signature
                )
            ) =>
        {
            ObjectBody::Signature {
                value: vec![0; alg.digest_size()],
                hash_alg_id: alg,
            }
        }
        CryptoObjectType::DomainParameters => ObjectBody::DomainParameters {
            name: Some("x".repeat(MAX_PARAMETER_SET_NAME)),
            values: parameter_schema(alg)?
                .iter()
                .map(|spec| vec![0; spec.size])
                .collect(),
        },
        CryptoObjectType::PasswordHash if alg == AlgId::Pbkdf2Sha256 => ObjectBody::PasswordHash {
            salt: vec![0; MAX_PASSWORD_SALT],
            iterations: u32::MAX,
            hash: vec![0; alg.digest_size()],
        },
        _ => return Err(SecurityError::UnknownIdentifier),
    };
    let header = ObjectHeader::new(object_type, alg)
        .with_uid(CryptoObjectUid::from_name("prototype"))
        .with_dependency(Some(ObjectDependency::new(
            CryptoObjectUid::from_name("prototype"),
            CryptoObjectType::DomainParameters,
        )));
    Ok(ObjectRecord::new(header, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> ObjectRecord {
        let header = ObjectHeader::new(CryptoObjectType::PublicKey, AlgId::X25519)
            .with_uid(CryptoObjectUid::from_name("pk"))
            .exportable(true);
        ObjectRecord::new(header, ObjectBody::PublicKey { material: vec![9; 32] })
    }

    #[test]
    fn encode_decode_preserves_record() {
        let record = sample_record();
        let bytes = record.encode().unwrap();
        assert_eq!(bytes.len(), record.storage_size());
        assert_eq!(ObjectRecord::decode(&bytes).unwrap(), record);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert_eq!(
            ObjectRecord::decode(&[1, 2, 3]).unwrap_err(),
            SecurityError::UnexpectedValue
        );
    }

    #[test]
    fn decode_rejects_mismatched_type() {
        let mut record = sample_record();
        record.header.object_type = CryptoObjectType::PrivateKey;
        let bytes = record.encode().unwrap();
        assert_eq!(
            ObjectRecord::decode(&bytes).unwrap_err(),
            SecurityError::UnexpectedValue
        );
    }

    #[test]
    fn debug_redacts_secret_bodies() {
        let body = ObjectBody::SymmetricKey { material: vec![0xAB; 16] };
        let debug = format!("{body:?}");
        assert!(debug.contains("redacted"));
        assert!(!debug.contains("ab"));
    }

    #[test]
    fn prototype_bounds_real_objects() {
        let real = sample_record().storage_size();
        let bound = max_storage_size(AlgId::X25519, CryptoObjectType::PublicKey).unwrap();
        assert!(bound >= real);
    }

    #[test]
    fn unknown_combination_is_rejected() {
        assert_eq!(
            max_storage_size(AlgId::Sha256, CryptoObjectType::SymmetricKey).unwrap_err(),
            SecurityError::UnknownIdentifier
        );
        assert_eq!(
            max_storage_size(AlgId::Any, CryptoObjectType::SymmetricKey).unwrap_err(),
            SecurityError::UnknownIdentifier
        );
    }

    #[test]
    fn global_maximum_covers_every_combination() {
        let any = max_storage_size_any();
        let aes = max_storage_size(AlgId::Aes256Gcm, CryptoObjectType::SymmetricKey).unwrap();
        let sig = max_storage_size(AlgId::Sha512, CryptoObjectType::Signature).unwrap();
        assert!(any >= aes && any >= sig);
    }

    #[test]
    fn seed_sizes_follow_algorithm() {
        assert_eq!(seed_size(AlgId::HkdfSha256).unwrap(), 32);
        assert_eq!(seed_size(AlgId::Aes128Gcm).unwrap(), 16);
        assert!(seed_size(AlgId::Sha256).is_err());
    }
}
