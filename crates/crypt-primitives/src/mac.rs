use crypt_types::AlgId;
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};

use crate::error::{PrimitiveError, PrimitiveResult};

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// Incremental HMAC state.
#[derive(Clone)]
pub enum MacEngine {
    HmacSha256(HmacSha256),
    HmacSha512(HmacSha512),
}

impl MacEngine {
    /// Fresh state for `alg` keyed with `key`.
    pub fn new(alg: AlgId, key: &[u8]) -> PrimitiveResult<Self> {
        match alg {
            AlgId::HmacSha256 => <HmacSha256 as Mac>::new_from_slice(key)
                .map(Self::HmacSha256)
                .map_err(|_| PrimitiveError::InvalidKeyLength),
            AlgId::HmacSha512 => <HmacSha512 as Mac>::new_from_slice(key)
                .map(Self::HmacSha512)
                .map_err(|_| PrimitiveError::InvalidKeyLength),
            _ => Err(PrimitiveError::UnsupportedAlgorithm),
        }
    }

    /// Absorb more input.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::HmacSha256(m) => m.update(data),
            Self::HmacSha512(m) => m.update(data),
        }
    }

    /// Consume the state and produce the tag.
    pub fn finalize(self) -> Vec<u8> {
        match self {
            Self::HmacSha256(m) => m.finalize().into_bytes().to_vec(),
            Self::HmacSha512(m) => m.finalize().into_bytes().to_vec(),
        }
    }
}

impl std::fmt::Debug for MacEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MacEngine(<keyed>)")
    }
}
