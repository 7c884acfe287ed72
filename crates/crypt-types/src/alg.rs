use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{SecurityError, SecurityResult};

/// Identifier of every algorithm the provider knows.
///
/// `None` and `Any` are sentinels: `None` marks "no algorithm" fields (for
/// example the hash-algorithm field of a MAC signature), `Any` is the wildcard
/// used in reservation maps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlgId {
    None,
    Any,
    Sha256,
    Sha384,
    Sha512,
    Blake3,
    HmacSha256,
    HmacSha512,
    Aes128Ctr,
    Aes256Ctr,
    Aes128Cbc,
    Aes256Cbc,
    Aes128Gcm,
    Aes256Gcm,
    ChaCha20Poly1305,
    Aes128Kw,
    Aes256Kw,
    Aes128Kwp,
    Aes256Kwp,
    HkdfSha256,
    Pbkdf2Sha256,
    Ed25519,
    X25519,
    X25519Kem,
    ChaChaRng,
}

/// The transformation family an algorithm belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlgFamily {
    Hash,
    Mac,
    StreamCipher,
    AuthnStreamCipher,
    KeyWrap,
    Kdf,
    PasswordHash,
    Signature,
    KeyAgreement,
    Kem,
    Rng,
}

/// Shape of key material an algorithm consumes. Keys interoperate across
/// algorithms of the same family and length.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyFamily {
    Aes,
    Hmac,
    ChaCha,
    Edwards25519,
    Montgomery25519,
}

struct AlgInfo {
    id: AlgId,
    code: u64,
    name: &'static str,
    family: AlgFamily,
    key_family: Option<KeyFamily>,
    key_size: usize,
    block_size: usize,
    iv_size: usize,
    digest_size: usize,
}

const fn info(
    id: AlgId,
    code: u64,
    name: &'static str,
    family: AlgFamily,
    key_family: Option<KeyFamily>,
    key_size: usize,
    block_size: usize,
    iv_size: usize,
    digest_size: usize,
) -> AlgInfo {
    AlgInfo {
        id,
        code,
        name,
        family,
        key_family,
        key_size,
        block_size,
        iv_size,
        digest_size,
    }
}

use AlgFamily as F;
use KeyFamily as K;

#[rustfmt::skip]
const REGISTRY: &[AlgInfo] = &[
    info(AlgId::Sha256, 0x0101, "SHA-256", F::Hash, None, 0, 64, 0, 32),
    info(AlgId::Sha384, 0x0102, "SHA-384", F::Hash, None, 0, 128, 0, 48),
    info(AlgId::Sha512, 0x0103, "SHA-512", F::Hash, None, 0, 128, 0, 64),
    info(AlgId::Blake3, 0x0104, "BLAKE3", F::Hash, None, 0, 64, 0, 32),
    info(AlgId::HmacSha256, 0x0201, "HMAC-SHA-256", F::Mac, Some(K::Hmac), 32, 64, 0, 32),
    info(AlgId::HmacSha512, 0x0202, "HMAC-SHA-512", F::Mac, Some(K::Hmac), 64, 128, 0, 64),
    info(AlgId::Aes128Ctr, 0x0301, "AES-128/CTR", F::StreamCipher, Some(K::Aes), 16, 16, 16, 0),
    info(AlgId::Aes256Ctr, 0x0302, "AES-256/CTR", F::StreamCipher, Some(K::Aes), 32, 16, 16, 0),
    info(
        AlgId::Aes128Cbc, 0x0303, "AES-128/CBC/PKCS7",
        F::StreamCipher, Some(K::Aes), 16, 16, 16, 0,
    ),
    info(
        AlgId::Aes256Cbc, 0x0304, "AES-256/CBC/PKCS7",
        F::StreamCipher, Some(K::Aes), 32, 16, 16, 0,
    ),
    info(
        AlgId::Aes128Gcm, 0x0401, "AES-128/GCM",
        F::AuthnStreamCipher, Some(K::Aes), 16, 1, 12, 16,
    ),
    info(
        AlgId::Aes256Gcm, 0x0402, "AES-256/GCM",
        F::AuthnStreamCipher, Some(K::Aes), 32, 1, 12, 16,
    ),
    info(
        AlgId::ChaCha20Poly1305, 0x0403, "CHACHA20-POLY1305",
        F::AuthnStreamCipher, Some(K::ChaCha), 32, 1, 12, 16,
    ),
    info(AlgId::Aes128Kw, 0x0501, "AES-128/KW", F::KeyWrap, Some(K::Aes), 16, 8, 0, 0),
    info(AlgId::Aes256Kw, 0x0502, "AES-256/KW", F::KeyWrap, Some(K::Aes), 32, 8, 0, 0),
    info(AlgId::Aes128Kwp, 0x0503, "AES-128/KWP", F::KeyWrap, Some(K::Aes), 16, 1, 0, 0),
    info(AlgId::Aes256Kwp, 0x0504, "AES-256/KWP", F::KeyWrap, Some(K::Aes), 32, 1, 0, 0),
    info(AlgId::HkdfSha256, 0x0601, "HKDF-SHA-256", F::Kdf, None, 0, 0, 0, 32),
    info(AlgId::Pbkdf2Sha256, 0x0602, "PBKDF2-HMAC-SHA-256", F::PasswordHash, None, 0, 0, 0, 32),
    info(AlgId::Ed25519, 0x0701, "ED25519", F::Signature, Some(K::Edwards25519), 32, 0, 0, 64),
    info(AlgId::X25519, 0x0801, "X25519", F::KeyAgreement, Some(K::Montgomery25519), 32, 0, 0, 32),
    info(AlgId::X25519Kem, 0x0802, "X25519-KEM", F::Kem, Some(K::Montgomery25519), 32, 0, 0, 32),
    info(AlgId::ChaChaRng, 0x0901, "CHACHA-RNG", F::Rng, None, 32, 0, 0, 0),
];

impl AlgId {
    const NONE_CODE: u64 = 0;
    const ANY_CODE: u64 = u64::MAX;

    fn info(&self) -> Option<&'static AlgInfo> {
        REGISTRY.iter().find(|i| i.id == *self)
    }

    /// Every concrete (non-sentinel) algorithm, in registry order.
    pub fn all() -> impl Iterator<Item = AlgId> {
        REGISTRY.iter().map(|i| i.id)
    }

    /// Returns `true` for the `None` and `Any` sentinels.
    pub fn is_sentinel(&self) -> bool {
        matches!(self, Self::None | Self::Any)
    }

    /// Stable numeric code.
    pub fn code(&self) -> u64 {
        match self {
            Self::None => Self::NONE_CODE,
            Self::Any => Self::ANY_CODE,
            other => other.info().map(|i| i.code).unwrap_or(Self::NONE_CODE),
        }
    }

    /// Parse from a numeric code.
    pub fn from_code(code: u64) -> SecurityResult<Self> {
        match code {
            Self::NONE_CODE => Ok(Self::None),
            Self::ANY_CODE => Ok(Self::Any),
            _ => REGISTRY
                .iter()
                .find(|i| i.code == code)
                .map(|i| i.id)
                .ok_or(SecurityError::UnknownIdentifier),
        }
    }

    /// Canonical name, e.g. `"AES-256/GCM"`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Any => "ANY",
            other => other.info().map(|i| i.name).unwrap_or("NONE"),
        }
    }

    /// Parse a canonical name, case-insensitively.
    pub fn from_name(name: &str) -> SecurityResult<Self> {
        let trimmed = name.trim();
        if trimmed.eq_ignore_ascii_case("NONE") {
            return Ok(Self::None);
        }
        if trimmed.eq_ignore_ascii_case("ANY") {
            return Ok(Self::Any);
        }
        REGISTRY
            .iter()
            .find(|i| i.name.eq_ignore_ascii_case(trimmed))
            .map(|i| i.id)
            .ok_or(SecurityError::UnknownIdentifier)
    }

    /// Transformation family, `None` for sentinels.
    pub fn family(&self) -> Option<AlgFamily> {
        self.info().map(|i| i.family)
    }

    /// Key material shape, `None` for unkeyed algorithms.
    pub fn key_family(&self) -> Option<KeyFamily> {
        self.info().and_then(|i| i.key_family)
    }

    /// Key (or RNG seed) length in bytes, `0` when not applicable.
    pub fn key_size(&self) -> usize {
        self.info().map(|i| i.key_size).unwrap_or(0)
    }

    /// Processing granularity in bytes, `0` when not applicable.
    pub fn block_size(&self) -> usize {
        self.info().map(|i| i.block_size).unwrap_or(0)
    }

    /// Required IV length in bytes, `0` when the algorithm has no IV.
    pub fn iv_size(&self) -> usize {
        self.info().map(|i| i.iv_size).unwrap_or(0)
    }

    /// Digest, tag or signature length in bytes, `0` when not applicable.
    pub fn digest_size(&self) -> usize {
        self.info().map(|i| i.digest_size).unwrap_or(0)
    }

    /// Returns `true` if the algorithm belongs to `family`.
    pub fn is_family(&self, family: AlgFamily) -> bool {
        self.family() == Some(family)
    }

    /// Returns `true` if key material generated for `key_alg` may be loaded
    /// into a context running `self`.
    pub fn accepts_key_of(&self, key_alg: AlgId) -> bool {
        match (self.key_family(), key_alg.key_family()) {
            (Some(a), Some(b)) => a == b && self.key_size() == key_alg.key_size(),
            _ => false,
        }
    }
}

impl fmt::Display for AlgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_roundtrip_for_every_algorithm() {
        for alg in AlgId::all() {
            assert_eq!(AlgId::from_name(alg.name()).unwrap(), alg);
        }
    }

    #[test]
    fn code_roundtrip_for_every_algorithm() {
        for alg in AlgId::all() {
            assert_eq!(AlgId::from_code(alg.code()).unwrap(), alg);
        }
        assert_eq!(AlgId::from_code(0).unwrap(), AlgId::None);
        assert_eq!(AlgId::from_code(u64::MAX).unwrap(), AlgId::Any);
    }

    #[test]
    fn codes_are_unique() {
        let mut codes: Vec<u64> = AlgId::all().map(|a| a.code()).collect();
        let len = codes.len();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), len);
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert_eq!(
            AlgId::from_name("ROT-13"),
            Err(SecurityError::UnknownIdentifier)
        );
        assert_eq!(AlgId::from_code(0xdead), Err(SecurityError::UnknownIdentifier));
    }

    #[test]
    fn names_are_case_insensitive() {
        assert_eq!(AlgId::from_name("aes-256/gcm").unwrap(), AlgId::Aes256Gcm);
    }

    #[test]
    fn sentinels_have_no_family() {
        assert!(AlgId::None.family().is_none());
        assert!(AlgId::Any.family().is_none());
        assert!(AlgId::Any.is_sentinel());
    }

    #[test]
    fn key_compatibility_follows_family_and_length() {
        assert!(AlgId::Aes256Gcm.accepts_key_of(AlgId::Aes256Kw));
        assert!(AlgId::Aes128Ctr.accepts_key_of(AlgId::Aes128Cbc));
        assert!(!AlgId::Aes128Ctr.accepts_key_of(AlgId::Aes256Ctr));
        assert!(!AlgId::HmacSha256.accepts_key_of(AlgId::Aes256Ctr));
        assert!(!AlgId::Sha256.accepts_key_of(AlgId::Sha256));
    }

    #[test]
    fn geometry() {
        assert_eq!(AlgId::Aes128Kw.block_size(), 8);
        assert_eq!(AlgId::Aes128Kwp.block_size(), 1);
        assert_eq!(AlgId::Aes256Gcm.iv_size(), 12);
        assert_eq!(AlgId::Sha384.digest_size(), 48);
        assert_eq!(AlgId::Sha256.iv_size(), 0);
    }
}
