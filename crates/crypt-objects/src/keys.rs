use crypt_primitives::{SigningKey, VerifyingKey, X25519Secret};
use crypt_types::{
    AllowedUsage, CryptoObjectType, KeyFamily, KeyType, SecurityError, SecurityResult,
};
use zeroize::Zeroizing;

use crate::object::{expect_type, CryptoObject, Key};
use crate::record::{is_asymmetric_alg, is_symmetric_alg, ObjectBody, ObjectHeader, ObjectRecord};

// ---------------------------------------------------------------------------
// SymmetricKey
// ---------------------------------------------------------------------------

/// Secret key for symmetric algorithms (ciphers, MACs, key wrap).
pub struct SymmetricKey {
    header: ObjectHeader,
    material: Zeroizing<Vec<u8>>,
}

impl SymmetricKey {
    pub fn new(header: ObjectHeader, material: Zeroizing<Vec<u8>>) -> SecurityResult<Self> {
        expect_type(&header, CryptoObjectType::SymmetricKey)?;
        if !is_symmetric_alg(header.alg_id) {
            return Err(SecurityError::InvalidArgument);
        }
        if material.len() != header.alg_id.key_size() {
            return Err(SecurityError::InvalidInputSize);
        }
        Ok(Self { header, material })
    }

    /// Raw key bytes.
    pub fn material(&self) -> &[u8] {
        &self.material
    }

    pub fn key_len(&self) -> usize {
        self.material.len()
    }
}

impl CryptoObject for SymmetricKey {
    fn header(&self) -> ObjectHeader {
        self.header
    }

    fn to_record(&self) -> ObjectRecord {
        ObjectRecord::new(
            self.header,
            ObjectBody::SymmetricKey {
                material: self.material.to_vec(),
            },
        )
    }
}

impl Key for SymmetricKey {
    fn key_type(&self) -> KeyType {
        KeyType::Symmetric
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("alg", &self.header.alg_id)
            .field("uid", &self.header.uid)
            .field("material", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// PrivateKey
// ---------------------------------------------------------------------------

/// Private half of an asymmetric key pair. Keeps its public half alongside.
pub struct PrivateKey {
    header: ObjectHeader,
    secret: Zeroizing<Vec<u8>>,
    public: Vec<u8>,
}

impl PrivateKey {
    /// Wrap a raw secret; the public half is recomputed from it.
    pub fn new(header: ObjectHeader, secret: Zeroizing<Vec<u8>>) -> SecurityResult<Self> {
        expect_type(&header, CryptoObjectType::PrivateKey)?;
        let public = derive_public(&header, &secret)?;
        Ok(Self {
            header,
            secret,
            public,
        })
    }

    /// Raw secret bytes.
    pub fn secret(&self) -> &[u8] {
        &self.secret
    }

    /// Raw public bytes.
    pub fn public_material(&self) -> &[u8] {
        &self.public
    }

    /// The matching public key.
    ///
    /// It shares the private key's COUID and dependency, is always
    /// exportable, and carries the public counterparts of the private usage.
    pub fn public_key(&self) -> PublicKey {
        let header = ObjectHeader {
            object_type: CryptoObjectType::PublicKey,
            is_exportable: true,
            allowed_usage: public_usage(self.header.allowed_usage),
            ..self.header
        };
        PublicKey {
            header,
            material: self.public.clone(),
        }
    }
}

fn derive_public(header: &ObjectHeader, secret: &[u8]) -> SecurityResult<Vec<u8>> {
    if !is_asymmetric_alg(header.alg_id) {
        return Err(SecurityError::InvalidArgument);
    }
    if secret.len() != header.alg_id.key_size() {
        return Err(SecurityError::InvalidInputSize);
    }
    match header.alg_id.key_family() {
        Some(KeyFamily::Edwards25519) => {
            Ok(SigningKey::from_slice(secret)?.verifying_key().to_bytes().to_vec())
        }
        Some(KeyFamily::Montgomery25519) => {
            Ok(X25519Secret::from_slice(secret)?.public_key().to_vec())
        }
        _ => Err(SecurityError::InvalidArgument),
    }
}

fn public_usage(private: AllowedUsage) -> AllowedUsage {
    let mut usage = AllowedUsage::empty();
    if private.contains(AllowedUsage::ALLOW_SIGNATURE) {
        usage |= AllowedUsage::ALLOW_VERIFICATION;
    }
    if private.contains(AllowedUsage::ALLOW_DATA_DECRYPTION) {
        usage |= AllowedUsage::ALLOW_DATA_ENCRYPTION;
    }
    usage | (private & (AllowedUsage::ALLOW_KEY_AGREEMENT | AllowedUsage::ALLOW_EXACT_MODE_ONLY))
}

impl CryptoObject for PrivateKey {
    fn header(&self) -> ObjectHeader {
        self.header
    }

    fn to_record(&self) -> ObjectRecord {
        ObjectRecord::new(
            self.header,
            ObjectBody::PrivateKey {
                secret: self.secret.to_vec(),
                public: self.public.clone(),
            },
        )
    }
}

impl Key for PrivateKey {
    fn key_type(&self) -> KeyType {
        KeyType::Private
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("alg", &self.header.alg_id)
            .field("uid", &self.header.uid)
            .field("public", &hex::encode(&self.public))
            .field("secret", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// PublicKey
// ---------------------------------------------------------------------------

/// Public half of an asymmetric key pair.
#[derive(Clone)]
pub struct PublicKey {
    header: ObjectHeader,
    material: Vec<u8>,
}

impl PublicKey {
    pub fn new(header: ObjectHeader, material: Vec<u8>) -> SecurityResult<Self> {
        expect_type(&header, CryptoObjectType::PublicKey)?;
        if !is_asymmetric_alg(header.alg_id) {
            return Err(SecurityError::InvalidArgument);
        }
        if material.len() != header.alg_id.key_size() {
            return Err(SecurityError::InvalidInputSize);
        }
        if header.alg_id.key_family() == Some(KeyFamily::Edwards25519) {
            VerifyingKey::from_slice(&material)?;
        }
        Ok(Self { header, material })
    }

    /// Raw public bytes.
    pub fn material(&self) -> &[u8] {
        &self.material
    }
}

impl CryptoObject for PublicKey {
    fn header(&self) -> ObjectHeader {
        self.header
    }

    fn to_record(&self) -> ObjectRecord {
        ObjectRecord::new(
            self.header,
            ObjectBody::PublicKey {
                material: self.material.clone(),
            },
        )
    }
}

impl Key for PublicKey {
    fn key_type(&self) -> KeyType {
        KeyType::Public
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "PublicKey({:?}, {})",
            self.header.alg_id,
            hex::encode(&self.material)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypt_types::{AlgId, CryptoObjectUid};

    fn header(ty: CryptoObjectType, alg: AlgId) -> ObjectHeader {
        ObjectHeader::new(ty, alg).with_uid(CryptoObjectUid::from_name("k"))
    }

    #[test]
    fn symmetric_key_checks_length() {
        let h = header(CryptoObjectType::SymmetricKey, AlgId::Aes128Gcm);
        assert!(SymmetricKey::new(h, Zeroizing::new(vec![0; 16])).is_ok());
        assert_eq!(
            SymmetricKey::new(h, Zeroizing::new(vec![0; 32])).unwrap_err(),
            SecurityError::InvalidInputSize
        );
    }

    #[test]
    fn symmetric_key_rejects_wrong_header_type() {
        let h = header(CryptoObjectType::SecretSeed, AlgId::Aes128Gcm);
        assert_eq!(
            SymmetricKey::new(h, Zeroizing::new(vec![0; 16])).unwrap_err(),
            SecurityError::bad_object_type(
                CryptoObjectType::SecretSeed,
                CryptoObjectType::SymmetricKey
            )
        );
    }

    #[test]
    fn private_key_derives_matching_public() {
        let sk = SigningKey::generate();
        let h = header(CryptoObjectType::PrivateKey, AlgId::Ed25519)
            .with_usage(AllowedUsage::ALLOW_SIGNATURE);
        let key = PrivateKey::new(h, sk.to_secret_bytes()).unwrap();
        let public = key.public_key();
        assert_eq!(public.material(), sk.verifying_key().to_bytes());
        assert_eq!(public.object_type(), CryptoObjectType::PublicKey);
        assert_eq!(public.object_id(), key.object_id());
        assert!(public.is_exportable());
        assert_eq!(public.allowed_usage(), AllowedUsage::ALLOW_VERIFICATION);
    }

    #[test]
    fn x25519_private_key_keeps_agreement_usage() {
        let secret = X25519Secret::generate();
        let h = header(CryptoObjectType::PrivateKey, AlgId::X25519)
            .with_usage(AllowedUsage::ALLOW_KEY_AGREEMENT);
        let key = PrivateKey::new(h, secret.to_secret_bytes()).unwrap();
        assert_eq!(key.public_material(), secret.public_key());
        assert_eq!(
            key.public_key().allowed_usage(),
            AllowedUsage::ALLOW_KEY_AGREEMENT
        );
    }

    #[test]
    fn debug_never_prints_secret() {
        let h = header(CryptoObjectType::SymmetricKey, AlgId::HmacSha256);
        let key = SymmetricKey::new(h, Zeroizing::new(vec![0x5A; 32])).unwrap();
        let debug = format!("{key:?}");
        assert!(debug.contains("redacted"));
        assert!(!debug.contains("5a5a"));
    }

    #[test]
    fn storage_size_matches_record() {
        let h = header(CryptoObjectType::SymmetricKey, AlgId::Aes256Ctr);
        let key = SymmetricKey::new(h, Zeroizing::new(vec![1; 32])).unwrap();
        assert_eq!(key.storage_size(), key.to_record().encode().unwrap().len());
    }
}
