use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use chacha20poly1305::ChaCha20Poly1305;
use crypt_types::AlgId;

use crate::error::{PrimitiveError, PrimitiveResult};

/// Nonce length shared by every supported AEAD.
pub const AEAD_NONCE_SIZE: usize = 12;

/// Tag length shared by every supported AEAD.
pub const AEAD_TAG_SIZE: usize = 16;

/// Keyed authenticated cipher.
pub enum AeadEngine {
    Aes128Gcm(Box<Aes128Gcm>),
    Aes256Gcm(Box<Aes256Gcm>),
    ChaCha20Poly1305(Box<ChaCha20Poly1305>),
}

impl AeadEngine {
    pub fn new(alg: AlgId, key: &[u8]) -> PrimitiveResult<Self> {
        let bad_key = |_| PrimitiveError::InvalidKeyLength;
        match alg {
            AlgId::Aes128Gcm => Aes128Gcm::new_from_slice(key)
                .map(|c| Self::Aes128Gcm(Box::new(c)))
                .map_err(bad_key),
            AlgId::Aes256Gcm => Aes256Gcm::new_from_slice(key)
                .map(|c| Self::Aes256Gcm(Box::new(c)))
                .map_err(bad_key),
            AlgId::ChaCha20Poly1305 => ChaCha20Poly1305::new_from_slice(key)
                .map(|c| Self::ChaCha20Poly1305(Box::new(c)))
                .map_err(bad_key),
            _ => Err(PrimitiveError::UnsupportedAlgorithm),
        }
    }

    /// Encrypt `buffer` in place and return the detached tag.
    pub fn seal(
        &self,
        nonce: &[u8],
        aad: &[u8],
        buffer: &mut [u8],
    ) -> PrimitiveResult<[u8; AEAD_TAG_SIZE]> {
        if nonce.len() != AEAD_NONCE_SIZE {
            return Err(PrimitiveError::InvalidInputLength);
        }
        let nonce = GenericArray::from_slice(nonce);
        let tag = match self {
            Self::Aes128Gcm(c) => c.encrypt_in_place_detached(nonce, aad, buffer),
            Self::Aes256Gcm(c) => c.encrypt_in_place_detached(nonce, aad, buffer),
            Self::ChaCha20Poly1305(c) => c.encrypt_in_place_detached(nonce, aad, buffer),
        }
        .map_err(|_| PrimitiveError::InvalidInputLength)?;
        let mut out = [0u8; AEAD_TAG_SIZE];
        out.copy_from_slice(tag.as_slice());
        Ok(out)
    }

    /// Decrypt `buffer` in place after checking `tag`.
    ///
    /// On a tag mismatch the buffer content is unspecified.
    pub fn open(
        &self,
        nonce: &[u8],
        aad: &[u8],
        buffer: &mut [u8],
        tag: &[u8],
    ) -> PrimitiveResult<()> {
        if nonce.len() != AEAD_NONCE_SIZE {
            return Err(PrimitiveError::InvalidInputLength);
        }
        if tag.len() != AEAD_TAG_SIZE {
            return Err(PrimitiveError::IntegrityCheckFailed);
        }
        let nonce = GenericArray::from_slice(nonce);
        let tag = GenericArray::from_slice(tag);
        match self {
            Self::Aes128Gcm(c) => c.decrypt_in_place_detached(nonce, aad, buffer, tag),
            Self::Aes256Gcm(c) => c.decrypt_in_place_detached(nonce, aad, buffer, tag),
            Self::ChaCha20Poly1305(c) => c.decrypt_in_place_detached(nonce, aad, buffer, tag),
        }
        .map_err(|_| PrimitiveError::IntegrityCheckFailed)
    }
}

impl std::fmt::Debug for AeadEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Aes128Gcm(_) => "AES-128/GCM",
            Self::Aes256Gcm(_) => "AES-256/GCM",
            Self::ChaCha20Poly1305(_) => "CHACHA20-POLY1305",
        };
        write!(f, "AeadEngine({name}, <keyed>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // GCM spec test case 2 (zero key, zero nonce, one zero block).
    #[test]
    fn aes128_gcm_known_answer() {
        let engine = AeadEngine::new(AlgId::Aes128Gcm, &[0u8; 16]).unwrap();
        let mut buffer = [0u8; 16];
        let tag = engine.seal(&[0u8; 12], b"", &mut buffer).unwrap();
        assert_eq!(hex::encode(buffer), "0388dace60b6a392f328c2b971b2fe78");
        assert_eq!(hex::encode(tag), "ab6e47d42cec13bdf53a67b21257bddf");
    }

    #[test]
    fn seal_then_open_for_each_algorithm() {
        for (alg, key_len) in [
            (AlgId::Aes128Gcm, 16),
            (AlgId::Aes256Gcm, 32),
            (AlgId::ChaCha20Poly1305, 32),
        ] {
            let engine = AeadEngine::new(alg, &vec![5u8; key_len]).unwrap();
            let nonce = [1u8; 12];
            let mut buffer = b"attack at dawn".to_vec();
            let tag = engine.seal(&nonce, b"hdr", &mut buffer).unwrap();
            assert_ne!(buffer, b"attack at dawn");
            engine.open(&nonce, b"hdr", &mut buffer, &tag).unwrap();
            assert_eq!(buffer, b"attack at dawn");
        }
    }

    #[test]
    fn tampered_aad_fails() {
        let engine = AeadEngine::new(AlgId::Aes256Gcm, &[2u8; 32]).unwrap();
        let nonce = [0u8; 12];
        let mut buffer = b"secret".to_vec();
        let tag = engine.seal(&nonce, b"aad", &mut buffer).unwrap();
        assert_eq!(
            engine.open(&nonce, b"bad", &mut buffer, &tag),
            Err(PrimitiveError::IntegrityCheckFailed)
        );
    }

    #[test]
    fn wrong_nonce_size_is_rejected() {
        let engine = AeadEngine::new(AlgId::ChaCha20Poly1305, &[0u8; 32]).unwrap();
        assert_eq!(
            engine.seal(&[0u8; 8], b"", &mut []).unwrap_err(),
            PrimitiveError::InvalidInputLength
        );
    }

    #[test]
    fn wrong_key_size_is_rejected() {
        assert!(AeadEngine::new(AlgId::Aes128Gcm, &[0u8; 32]).is_err());
    }
}
