use crypt_types::AlgId;
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::error::{PrimitiveError, PrimitiveResult};

/// Incremental hash state for one of the supported hash functions.
#[derive(Clone)]
pub enum DigestEngine {
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
    Blake3(Box<blake3::Hasher>),
}

impl DigestEngine {
    /// Fresh state for `alg`.
    pub fn new(alg: AlgId) -> PrimitiveResult<Self> {
        match alg {
            AlgId::Sha256 => Ok(Self::Sha256(Sha256::new())),
            AlgId::Sha384 => Ok(Self::Sha384(Sha384::new())),
            AlgId::Sha512 => Ok(Self::Sha512(Sha512::new())),
            AlgId::Blake3 => Ok(Self::Blake3(Box::new(blake3::Hasher::new()))),
            _ => Err(PrimitiveError::UnsupportedAlgorithm),
        }
    }

    /// Absorb more input.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(data),
            Self::Sha384(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
            Self::Blake3(h) => {
                h.update(data);
            }
        }
    }

    /// Consume the state and produce the digest.
    pub fn finalize(self) -> Vec<u8> {
        match self {
            Self::Sha256(h) => h.finalize().to_vec(),
            Self::Sha384(h) => h.finalize().to_vec(),
            Self::Sha512(h) => h.finalize().to_vec(),
            Self::Blake3(h) => h.finalize().as_bytes().to_vec(),
        }
    }

    /// One-shot digest of `data`.
    pub fn digest(alg: AlgId, data: &[u8]) -> PrimitiveResult<Vec<u8>> {
        let mut engine = Self::new(alg)?;
        engine.update(data);
        Ok(engine.finalize())
    }
}

impl std::fmt::Debug for DigestEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Sha256(_) => "SHA-256",
            Self::Sha384(_) => "SHA-384",
            Self::Sha512(_) => "SHA-512",
            Self::Blake3(_) => "BLAKE3",
        };
        write!(f, "DigestEngine({name})")
    }
}
