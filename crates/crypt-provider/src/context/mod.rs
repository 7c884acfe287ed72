//! Transformation contexts.
//!
//! Every context is one concrete type per algorithm family. Shared behaviour
//! is expressed as capability traits rather than a type hierarchy:
//!
//! - [`CryptoContext`] -- algorithm identity and readiness
//! - [`StreamStarter`] -- `start(iv)` opens a processing session
//! - [`BufferedDigest`] -- `update`/`finish` producing a digest or tag
//! - [`StreamCipher`] -- block-wise and byte-wise en/decryption
//!
//! A streaming context owns exactly one `StreamState` that every trait
//! reads and updates.

pub mod aead;
pub mod agreement;
pub mod cipher;
pub mod hash;
pub mod kdf;
pub mod kem;
pub mod keywrap;
pub mod mac;
pub mod rng;
pub mod sign;

use std::ops::Range;

use crypt_objects::{
    CryptoObject, ObjectDependency, ObjectHeader, SecretSeed, Signature, SymmetricKey,
};
use crypt_primitives::hkdf_sha256;
use crypt_objects::record::is_symmetric_alg;
use crypt_types::{
    AlgId, AllowedUsage, CouidGenerator, CryptoObjectType, ReservedIndex, ReservedObjectIndex,
    SecurityError, SecurityResult,
};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::allocator::{ObjectFactory, Placed, SlotLease};

pub use aead::AuthnStreamCipherCtx;
pub use agreement::KeyAgreementPrivateCtx;
pub use cipher::StreamCipherCtx;
pub use hash::HashFunctionCtx;
pub use kdf::KeyDerivationFunctionCtx;
pub use kem::{KeyDecapsulatorPrivateCtx, KeyEncapsulatorPublicCtx};
pub use keywrap::SymmetricKeyWrapperCtx;
pub use mac::MessageAuthnCodeCtx;
pub use rng::RandomGeneratorCtx;
pub use sign::{SignerPrivateCtx, VerifierPublicCtx};

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

/// Direction a keyed context is loaded for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CryptoTransform {
    Encrypt,
    Decrypt,
    MacGenerate,
    MacVerify,
    Wrap,
    Unwrap,
    SigGenerate,
    SigVerify,
}

/// Identity and readiness of a context.
pub trait CryptoContext: Send + std::fmt::Debug {
    fn alg_id(&self) -> AlgId;

    /// Returns `true` once every key or parameter the context needs is set.
    fn is_initialized(&self) -> bool;
}

/// Opens a processing session.
pub trait StreamStarter: CryptoContext {
    /// Required IV length, `0` for algorithms without an IV.
    fn iv_size(&self) -> usize {
        self.alg_id().iv_size()
    }

    fn is_valid_iv_size(&self, size: usize) -> bool {
        size == self.iv_size()
    }

    /// Processing granularity in bytes.
    fn block_size(&self) -> usize {
        self.alg_id().block_size()
    }

    /// Begin a new session, discarding any previous one.
    ///
    /// Keyed contexts fail with `UninitializedContext` before a key is set.
    /// A non-empty `iv` for an algorithm without IV fails with `Unsupported`.
    fn start(&mut self, iv: &[u8]) -> SecurityResult<()>;

    /// Begin a session using seed material as the IV.
    fn start_with_seed(&mut self, iv: &SecretSeed) -> SecurityResult<()> {
        self.start(iv.material())
    }

    fn is_started(&self) -> bool;
}

/// Incrementally fed digest (hash, MAC or authentication tag).
pub trait BufferedDigest: StreamStarter {
    fn digest_size(&self) -> usize {
        self.alg_id().digest_size()
    }

    fn update(&mut self, data: &[u8]) -> SecurityResult<()>;

    fn update_byte(&mut self, byte: u8) -> SecurityResult<()> {
        self.update(&[byte])
    }

    /// Compute the final value and, if `signature` names a placement,
    /// package it as a [`Signature`] object there.
    ///
    /// The placement is claimed before the session closes; a refused claim
    /// leaves the session open.
    fn finish_into(
        &mut self,
        signature: Option<ReservedObjectIndex>,
    ) -> SecurityResult<Option<Placed<Signature>>>;

    /// Compute the final value, optionally packaged as a heap [`Signature`].
    fn finish(&mut self, make_signature: bool) -> SecurityResult<Option<Placed<Signature>>> {
        self.finish_into(make_signature.then_some(ReservedIndex::Heap))
    }

    /// Copy digest bytes starting at `offset` into `out`.
    ///
    /// Returns the number of bytes copied; an `offset` at or past the end of
    /// the digest copies nothing.
    fn get_digest(&self, out: &mut [u8], offset: usize) -> SecurityResult<usize>;

    /// Constant-time comparison of `expected` with the digest at `offset`.
    fn compare(&self, expected: &[u8], offset: usize) -> SecurityResult<bool>;

    /// Compare the whole digest with a signature object.
    fn check(&self, expected: &Signature) -> SecurityResult<bool>;
}

/// Symmetric en/decryption in a streaming session.
pub trait StreamCipher: StreamStarter {
    /// Returns `true` if the mode accepts input of any length without
    /// caching.
    fn is_bytewise_mode(&self) -> bool;

    /// Returns `true` when loaded for encryption.
    fn is_direct_transform(&self) -> SecurityResult<bool>;

    /// Bytes held back for the next call.
    fn count_bytes_in_cache(&self) -> usize;

    /// Output room a call with `input_size` bytes needs.
    fn estimate_required_capacity(&self, input_size: usize, is_final: bool) -> usize;

    /// Largest input a non-final call may pass for `output_capacity` bytes of
    /// output room.
    fn estimate_max_input_size(&self, output_capacity: usize) -> usize;

    /// Process whole blocks without caching.
    ///
    /// Fails with `InvalidUsageOrder` once unaligned data was processed in
    /// the current session.
    fn process_blocks(&mut self, input: &[u8], output: &mut [u8]) -> SecurityResult<usize>;

    /// Process a non-final chunk of any length.
    fn process_bytes(&mut self, input: &[u8], output: &mut [u8]) -> SecurityResult<usize>;

    /// Process the final chunk and close the session.
    fn finish_bytes(&mut self, input: &[u8], output: &mut [u8]) -> SecurityResult<usize>;

    /// Process `buffer[input]` into `buffer` at `output_offset`.
    ///
    /// Output starting exactly at `input.start` is processed in place; any
    /// other overlap fails with `InOutBuffersIntersect`.
    fn process_bytes_within(
        &mut self,
        buffer: &mut [u8],
        input: Range<usize>,
        output_offset: usize,
    ) -> SecurityResult<usize> {
        if input.start > input.end || input.end > buffer.len() {
            return Err(SecurityError::InvalidArgument);
        }
        let required = self.estimate_required_capacity(input.len(), false);
        let output_end = output_offset
            .checked_add(required)
            .ok_or(SecurityError::InvalidArgument)?;
        if output_end > buffer.len() {
            return Err(SecurityError::InsufficientCapacity { required });
        }
        let overlaps = output_offset < input.end && input.start < output_end;
        if overlaps && output_offset != input.start {
            return Err(SecurityError::InOutBuffersIntersect);
        }

        let source = Zeroizing::new(buffer[input].to_vec());
        let mut sink = Zeroizing::new(vec![0u8; required]);
        let written = self.process_bytes(&source, &mut sink)?;
        buffer[output_offset..output_offset + written].copy_from_slice(&sink[..written]);
        Ok(written)
    }
}

/// Secret objects whose raw bytes may feed a wrap or a KDF.
pub trait SecretMaterial: CryptoObject {
    fn raw_material(&self) -> &[u8];
}

impl SecretMaterial for SymmetricKey {
    fn raw_material(&self) -> &[u8] {
        self.material()
    }
}

impl SecretMaterial for SecretSeed {
    fn raw_material(&self) -> &[u8] {
        self.material()
    }
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum Phase {
    #[default]
    Idle,
    Started,
    Finished,
}

/// Session state shared by all capability traits of one context.
#[derive(Default)]
pub(crate) struct StreamState {
    pub(crate) phase: Phase,
    pub(crate) iv: Vec<u8>,
    pub(crate) cache: Zeroizing<Vec<u8>>,
    pub(crate) unaligned: bool,
}

impl StreamState {
    pub(crate) fn begin(&mut self, iv: &[u8]) {
        self.phase = Phase::Started;
        self.iv = iv.to_vec();
        self.cache.clear();
        self.unaligned = false;
    }

    pub(crate) fn finish(&mut self) {
        self.phase = Phase::Finished;
        self.cache.clear();
    }

    /// Back to idle after a key change.
    pub(crate) fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.iv.clear();
        self.cache.clear();
        self.unaligned = false;
    }

    pub(crate) fn is_started(&self) -> bool {
        self.phase == Phase::Started
    }

    pub(crate) fn require_started(&self) -> SecurityResult<()> {
        match self.phase {
            Phase::Started => Ok(()),
            _ => Err(SecurityError::ProcessingNotStarted),
        }
    }

    pub(crate) fn require_finished(&self) -> SecurityResult<()> {
        match self.phase {
            Phase::Finished => Ok(()),
            _ => Err(SecurityError::ProcessingNotFinished),
        }
    }
}

impl std::fmt::Debug for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamState")
            .field("phase", &self.phase)
            .field("iv_len", &self.iv.len())
            .field("cached", &self.cache.len())
            .field("unaligned", &self.unaligned)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Shared checks
// ---------------------------------------------------------------------------

pub(crate) fn validate_iv(alg: AlgId, iv: &[u8]) -> SecurityResult<()> {
    match (alg.iv_size(), iv.len()) {
        (0, 0) => Ok(()),
        (0, _) => Err(SecurityError::Unsupported),
        (_, 0) => Err(SecurityError::MissingArgument),
        (expected, got) if expected == got => Ok(()),
        _ => Err(SecurityError::InvalidInputSize),
    }
}

pub(crate) fn require_family(alg: AlgId, family: crypt_types::AlgFamily) -> SecurityResult<()> {
    if alg.is_family(family) {
        Ok(())
    } else {
        Err(SecurityError::InvalidArgument)
    }
}

pub(crate) fn require_key_alg(context_alg: AlgId, key_alg: AlgId) -> SecurityResult<()> {
    if context_alg.accepts_key_of(key_alg) {
        Ok(())
    } else {
        Err(SecurityError::IncompatibleObject)
    }
}

pub(crate) fn require_usage(granted: AllowedUsage, needed: AllowedUsage) -> SecurityResult<()> {
    if granted.contains(needed) {
        Ok(())
    } else {
        Err(SecurityError::UsageViolation)
    }
}

/// Output bytes a block mode produces for `total` pending input bytes.
///
/// Decryption holds back the last whole block of a non-final call so that
/// padding can be removed on finish.
pub(crate) fn block_output_size(
    block_size: usize,
    total: usize,
    is_final: bool,
    bytewise: bool,
    encrypt: bool,
) -> usize {
    assert!(block_size != 0, "block size must not be zero");
    if bytewise {
        return total;
    }
    let whole = total / block_size * block_size;
    match (encrypt, is_final) {
        (true, false) => whole,
        (true, true) => whole + block_size,
        (false, false) if total > 0 && total % block_size == 0 => total - block_size,
        (false, false) => whole,
        (false, true) => total,
    }
}

pub(crate) fn copy_digest(digest: &[u8], out: &mut [u8], offset: usize) -> usize {
    if offset >= digest.len() {
        return 0;
    }
    let n = out.len().min(digest.len() - offset);
    out[..n].copy_from_slice(&digest[offset..offset + n]);
    n
}

pub(crate) fn compare_digest(
    digest: &[u8],
    expected: &[u8],
    offset: usize,
) -> SecurityResult<bool> {
    if expected.is_empty() || offset > digest.len() || expected.len() > digest.len() - offset {
        return Err(SecurityError::InvalidInputSize);
    }
    Ok(digest[offset..offset + expected.len()].ct_eq(expected).into())
}

/// A new signature object with a fresh COUID.
pub(crate) fn issue_signature(
    couids: &CouidGenerator,
    alg: AlgId,
    value: Vec<u8>,
    hash_alg_id: AlgId,
    dependency: Option<ObjectDependency>,
) -> SecurityResult<Signature> {
    let header = ObjectHeader::new(CryptoObjectType::Signature, alg)
        .with_uid(couids.issue())
        .with_dependency(dependency)
        .exportable(true);
    Signature::new(header, value, hash_alg_id)
}

/// Claim room for a signature if one was asked for. The outer `None` means
/// no signature is wanted.
pub(crate) fn claim_signature(
    objects: &ObjectFactory,
    alg: AlgId,
    index: Option<ReservedObjectIndex>,
) -> SecurityResult<Option<Option<SlotLease>>> {
    index
        .map(|index| objects.claim(alg, CryptoObjectType::Signature, index))
        .transpose()
}

/// Claim room for a symmetric key derived for `target`.
pub(crate) fn claim_derived_key(
    objects: &ObjectFactory,
    target: AlgId,
    index: ReservedObjectIndex,
) -> SecurityResult<Option<SlotLease>> {
    if !is_symmetric_alg(target) {
        return Err(SecurityError::InvalidArgument);
    }
    objects.claim(target, CryptoObjectType::SymmetricKey, index)
}

/// Expand shared secret material into a symmetric key for `target`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn derive_symmetric_key(
    couids: &CouidGenerator,
    secret: &[u8],
    salt: &[u8],
    label: &[u8],
    target: AlgId,
    usage: AllowedUsage,
    is_session: bool,
    is_exportable: bool,
) -> SecurityResult<SymmetricKey> {
    if !is_symmetric_alg(target) {
        return Err(SecurityError::InvalidArgument);
    }
    let info = target_info(target, label);
    let material = hkdf_sha256(secret, salt, &info, target.key_size())?;
    let header = ObjectHeader::new(CryptoObjectType::SymmetricKey, target)
        .with_uid(couids.issue())
        .with_usage(usage)
        .session(is_session)
        .exportable(is_exportable);
    SymmetricKey::new(header, material)
}

/// HKDF info binding derived material to its target algorithm.
pub(crate) fn target_info(target: AlgId, label: &[u8]) -> Vec<u8> {
    let mut info = Vec::with_capacity(8 + label.len());
    info.extend_from_slice(&target.code().to_be_bytes());
    info.extend_from_slice(label);
    info
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iv_rules() {
        assert!(validate_iv(AlgId::Sha256, &[]).is_ok());
        assert_eq!(
            validate_iv(AlgId::Sha256, &[0; 16]).unwrap_err(),
            SecurityError::Unsupported
        );
        assert_eq!(
            validate_iv(AlgId::Aes128Ctr, &[]).unwrap_err(),
            SecurityError::MissingArgument
        );
        assert_eq!(
            validate_iv(AlgId::Aes128Ctr, &[0; 12]).unwrap_err(),
            SecurityError::InvalidInputSize
        );
        assert!(validate_iv(AlgId::Aes128Ctr, &[0; 16]).is_ok());
    }

    #[test]
    fn block_output_sizes() {
        // encrypt: whole blocks now, one padding block on finish
        assert_eq!(block_output_size(16, 20, false, false, true), 16);
        assert_eq!(block_output_size(16, 20, true, false, true), 32);
        assert_eq!(block_output_size(16, 32, true, false, true), 48);
        // decrypt: last whole block is held back
        assert_eq!(block_output_size(16, 32, false, false, false), 16);
        assert_eq!(block_output_size(16, 20, false, false, false), 16);
        assert_eq!(block_output_size(16, 0, false, false, false), 0);
        assert_eq!(block_output_size(16, 32, true, false, false), 32);
        // byte-wise modes never cache
        assert_eq!(block_output_size(16, 7, false, true, true), 7);
    }

    #[test]
    #[should_panic(expected = "block size must not be zero")]
    fn zero_block_size_is_a_contract_violation() {
        block_output_size(0, 16, false, false, true);
    }

    #[test]
    fn digest_copy_past_end_is_empty() {
        let digest = [1u8, 2, 3, 4];
        let mut out = [0u8; 4];
        assert_eq!(copy_digest(&digest, &mut out, 4), 0);
        assert_eq!(copy_digest(&digest, &mut out, 9), 0);
        assert_eq!(copy_digest(&digest, &mut out, 2), 2);
        assert_eq!(&out[..2], &[3, 4]);
    }

    #[test]
    fn digest_compare_bounds() {
        let digest = [1u8, 2, 3, 4];
        assert!(compare_digest(&digest, &[2, 3], 1).unwrap());
        assert!(!compare_digest(&digest, &[2, 4], 1).unwrap());
        assert_eq!(
            compare_digest(&digest, &[1, 2, 3, 4, 5], 0).unwrap_err(),
            SecurityError::InvalidInputSize
        );
        assert_eq!(
            compare_digest(&digest, &[], 0).unwrap_err(),
            SecurityError::InvalidInputSize
        );
    }
}
