use crypt_primitives::pbkdf2_sha256;
use crypt_types::{AlgId, CryptoObjectType, SecurityError, SecurityResult};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::object::{expect_type, CryptoObject};
use crate::record::{ObjectBody, ObjectHeader, ObjectRecord, MAX_PASSWORD_SALT};

/// Salted PBKDF2 hash of a password.
pub struct PasswordHash {
    header: ObjectHeader,
    salt: Vec<u8>,
    iterations: u32,
    hash: Zeroizing<Vec<u8>>,
}

impl PasswordHash {
    /// Hash `password` with the given salt and work factor.
    pub fn derive(
        header: ObjectHeader,
        password: &[u8],
        salt: &[u8],
        iterations: u32,
    ) -> SecurityResult<Self> {
        expect_type(&header, CryptoObjectType::PasswordHash)?;
        if header.alg_id != AlgId::Pbkdf2Sha256 {
            return Err(SecurityError::InvalidArgument);
        }
        if salt.is_empty() || salt.len() > MAX_PASSWORD_SALT {
            return Err(SecurityError::InvalidInputSize);
        }
        let hash = pbkdf2_sha256(password, salt, iterations, header.alg_id.digest_size())?;
        Ok(Self {
            header,
            salt: salt.to_vec(),
            iterations,
            hash,
        })
    }

    pub(crate) fn from_parts(
        header: ObjectHeader,
        salt: Vec<u8>,
        iterations: u32,
        hash: Vec<u8>,
    ) -> SecurityResult<Self> {
        expect_type(&header, CryptoObjectType::PasswordHash)?;
        if hash.len() != header.alg_id.digest_size() || iterations == 0 {
            return Err(SecurityError::UnexpectedValue);
        }
        Ok(Self {
            header,
            salt,
            iterations,
            hash: Zeroizing::new(hash),
        })
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Constant-time check of a candidate password.
    pub fn verify(&self, password: &[u8]) -> bool {
        match pbkdf2_sha256(password, &self.salt, self.iterations, self.hash.len()) {
            Ok(candidate) => candidate.ct_eq(&self.hash).into(),
            Err(_) => false,
        }
    }
}

impl CryptoObject for PasswordHash {
    fn header(&self) -> ObjectHeader {
        self.header
    }

    fn to_record(&self) -> ObjectRecord {
        ObjectRecord::new(
            self.header,
            ObjectBody::PasswordHash {
                salt: self.salt.clone(),
                iterations: self.iterations,
                hash: self.hash.to_vec(),
            },
        )
    }
}

impl std::fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHash")
            .field("iterations", &self.iterations)
            .field("hash", &"<redacted>")
            .finish()
    }
}
