use crypt_objects::{CryptoObject, KeyObject, ObjectDependency, PrivateKey, PublicKey, Signature};
use crypt_primitives::{SigningKey, VerifyingKey, SIGNATURE_SIZE};
use crypt_types::{
    AlgFamily, AlgId, AllowedUsage, CryptoObjectType, ReservedObjectIndex, SecurityError,
    SecurityResult,
};
use tracing::debug;

use super::hash::HashFunctionCtx;
use super::{issue_signature, require_family, require_key_alg, require_usage, CryptoContext};
use crate::allocator::{ObjectFactory, Placed};

// ---------------------------------------------------------------------------
// SignerPrivateCtx
// ---------------------------------------------------------------------------

struct LoadedSigner {
    key: SigningKey,
    dependency: Option<ObjectDependency>,
}

/// Ed25519 signing with a private key.
///
/// Produced signatures depend on the public half, which shares the private
/// key's COUID.
pub struct SignerPrivateCtx {
    alg: AlgId,
    objects: ObjectFactory,
    signer: Option<LoadedSigner>,
}

impl SignerPrivateCtx {
    pub(crate) fn new(alg: AlgId, objects: ObjectFactory) -> SecurityResult<Self> {
        require_family(alg, AlgFamily::Signature)?;
        Ok(Self {
            alg,
            objects,
            signer: None,
        })
    }

    pub fn set_key(&mut self, key: &PrivateKey) -> SecurityResult<()> {
        require_key_alg(self.alg, key.alg_id())?;
        require_usage(key.allowed_usage(), AllowedUsage::ALLOW_SIGNATURE)?;
        self.signer = Some(LoadedSigner {
            key: SigningKey::from_slice(key.secret())?,
            dependency: key
                .object_id()
                .map(|uid| ObjectDependency::new(uid, CryptoObjectType::PublicKey)),
        });
        Ok(())
    }

    pub fn signature_size(&self) -> usize {
        SIGNATURE_SIZE
    }

    /// Sign `message` into a signature object placed at `index`.
    pub fn sign(
        &self,
        message: &[u8],
        index: ReservedObjectIndex,
    ) -> SecurityResult<Placed<Signature>> {
        self.sign_as(message, AlgId::None, index)
    }

    /// Sign `message` into `out`, returning the bytes written.
    pub fn sign_to(&self, message: &[u8], out: &mut [u8]) -> SecurityResult<usize> {
        let signer = self.signer()?;
        if out.len() < SIGNATURE_SIZE {
            return Err(SecurityError::InsufficientCapacity {
                required: SIGNATURE_SIZE,
            });
        }
        out[..SIGNATURE_SIZE].copy_from_slice(&signer.key.sign(message));
        Ok(SIGNATURE_SIZE)
    }

    /// Sign the digest of a finished hash context.
    ///
    /// The signature records the hash algorithm so verifiers can insist on
    /// the same one.
    pub fn sign_digest(
        &self,
        hash: &HashFunctionCtx,
        index: ReservedObjectIndex,
    ) -> SecurityResult<Placed<Signature>> {
        let digest = hash.finished_digest()?;
        self.sign_as(digest, hash.alg_id(), index)
    }

    fn sign_as(
        &self,
        message: &[u8],
        hash_alg: AlgId,
        index: ReservedObjectIndex,
    ) -> SecurityResult<Placed<Signature>> {
        let signer = self.signer()?;
        let lease = self
            .objects
            .claim(self.alg, CryptoObjectType::Signature, index)?;
        let value = signer.key.sign(message).to_vec();
        debug!(alg = %self.alg, hash = %hash_alg, index = %index, "message signed");
        let signature = issue_signature(
            self.objects.couids(),
            self.alg,
            value,
            hash_alg,
            signer.dependency,
        )?;
        Ok(Placed::new(signature, lease))
    }

    fn signer(&self) -> SecurityResult<&LoadedSigner> {
        self.signer
            .as_ref()
            .ok_or(SecurityError::UninitializedContext)
    }
}

impl CryptoContext for SignerPrivateCtx {
    fn alg_id(&self) -> AlgId {
        self.alg
    }

    fn is_initialized(&self) -> bool {
        self.signer.is_some()
    }
}

impl std::fmt::Debug for SignerPrivateCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerPrivateCtx")
            .field("alg", &self.alg)
            .field("keyed", &self.signer.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// VerifierPublicCtx
// ---------------------------------------------------------------------------

/// Ed25519 verification with a public key.
pub struct VerifierPublicCtx {
    alg: AlgId,
    key: Option<VerifyingKey>,
}

impl VerifierPublicCtx {
    pub(crate) fn new(alg: AlgId) -> SecurityResult<Self> {
        require_family(alg, AlgFamily::Signature)?;
        Ok(Self { alg, key: None })
    }

    pub fn set_key(&mut self, key: &PublicKey) -> SecurityResult<()> {
        require_key_alg(self.alg, key.alg_id())?;
        require_usage(key.allowed_usage(), AllowedUsage::ALLOW_VERIFICATION)?;
        self.key = Some(VerifyingKey::from_slice(key.material())?);
        Ok(())
    }

    /// Verify a signature object over `message`.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> SecurityResult<bool> {
        self.check_signature_object(signature, AlgId::None)?;
        self.verify_raw(message, signature.value())
    }

    /// Verify raw signature bytes over `message`.
    pub fn verify_raw(&self, message: &[u8], signature: &[u8]) -> SecurityResult<bool> {
        let key = self.key.as_ref().ok_or(SecurityError::UninitializedContext)?;
        if signature.len() != SIGNATURE_SIZE {
            return Err(SecurityError::InvalidInputSize);
        }
        Ok(key.verify(message, signature).is_ok())
    }

    /// Verify a signature over the digest of a finished hash context.
    pub fn verify_digest(
        &self,
        hash: &HashFunctionCtx,
        signature: &Signature,
    ) -> SecurityResult<bool> {
        self.check_signature_object(signature, hash.alg_id())?;
        self.verify_raw(hash.finished_digest()?, signature.value())
    }

    fn check_signature_object(&self, signature: &Signature, hash_alg: AlgId) -> SecurityResult<()> {
        if signature.alg_id() != self.alg || signature.hash_alg_id() != hash_alg {
            return Err(SecurityError::IncompatibleObject);
        }
        Ok(())
    }
}

impl CryptoContext for VerifierPublicCtx {
    fn alg_id(&self) -> AlgId {
        self.alg
    }

    fn is_initialized(&self) -> bool {
        self.key.is_some()
    }
}

impl std::fmt::Debug for VerifierPublicCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifierPublicCtx")
            .field("alg", &self.alg)
            .field("key", &self.key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::Pool;
    use crate::context::{BufferedDigest, StreamStarter};
    use crypt_objects::ObjectHeader;
    use crypt_types::{CryptoObjectUid, ReservedIndex};
    use zeroize::Zeroizing;

    const HEAP: ReservedIndex = ReservedIndex::Heap;

    fn signer_ctx() -> SignerPrivateCtx {
        SignerPrivateCtx::new(AlgId::Ed25519, ObjectFactory::detached()).unwrap()
    }

    fn private_key(usage: AllowedUsage) -> PrivateKey {
        let header = ObjectHeader::new(CryptoObjectType::PrivateKey, AlgId::Ed25519)
            .with_uid(CryptoObjectUid::from_name("signing-key"))
            .with_usage(usage);
        PrivateKey::new(header, Zeroizing::new(vec![9u8; 32])).unwrap()
    }

    fn pair() -> (SignerPrivateCtx, VerifierPublicCtx) {
        let key = private_key(AllowedUsage::ALLOW_SIGNATURE);
        let mut signer = signer_ctx();
        signer.set_key(&key).unwrap();
        let mut verifier = VerifierPublicCtx::new(AlgId::Ed25519).unwrap();
        verifier.set_key(&key.public_key()).unwrap();
        (signer, verifier)
    }

    fn finished_hash(message: &[u8]) -> HashFunctionCtx {
        let mut hash = HashFunctionCtx::new(AlgId::Sha512, ObjectFactory::detached()).unwrap();
        hash.start(&[]).unwrap();
        hash.update(message).unwrap();
        hash.finish(false).unwrap();
        hash
    }

    #[test]
    fn sign_and_verify() {
        let (signer, verifier) = pair();
        let sig = signer.sign(b"release v1", HEAP).unwrap();
        assert_eq!(sig.value().len(), SIGNATURE_SIZE);
        assert_eq!(sig.hash_alg_id(), AlgId::None);
        let dep = sig.dependency().unwrap();
        assert_eq!(dep.uid, CryptoObjectUid::from_name("signing-key"));
        assert_eq!(dep.object_type, CryptoObjectType::PublicKey);

        assert!(verifier.verify(b"release v1", &sig).unwrap());
        assert!(!verifier.verify(b"release v2", &sig).unwrap());
    }

    #[test]
    fn private_key_needs_signature_usage() {
        let mut signer = signer_ctx();
        assert_eq!(
            signer
                .set_key(&private_key(AllowedUsage::ALLOW_KEY_AGREEMENT))
                .unwrap_err(),
            SecurityError::UsageViolation
        );
        assert_eq!(signer.sign(b"m", HEAP).unwrap_err(), SecurityError::UninitializedContext);
    }

    #[test]
    fn sign_to_small_buffer() {
        let (signer, verifier) = pair();
        let mut out = [0u8; 63];
        assert_eq!(
            signer.sign_to(b"m", &mut out).unwrap_err(),
            SecurityError::InsufficientCapacity { required: 64 }
        );
        let mut out = [0u8; 64];
        assert_eq!(signer.sign_to(b"m", &mut out).unwrap(), 64);
        assert!(verifier.verify_raw(b"m", &out).unwrap());
        assert_eq!(
            verifier.verify_raw(b"m", &out[..32]).unwrap_err(),
            SecurityError::InvalidInputSize
        );
    }

    #[test]
    fn digest_signatures_bind_the_hash() {
        let (signer, verifier) = pair();
        let hash = finished_hash(b"large document");
        let sig = signer.sign_digest(&hash, HEAP).unwrap();
        assert_eq!(sig.hash_alg_id(), AlgId::Sha512);
        assert!(verifier.verify_digest(&hash, &sig).unwrap());

        // a digest signature is not a plain message signature
        assert_eq!(
            verifier.verify(b"large document", &sig).unwrap_err(),
            SecurityError::IncompatibleObject
        );
    }

    #[test]
    fn digest_of_unfinished_hash_is_refused() {
        let (signer, _) = pair();
        let hash = HashFunctionCtx::new(AlgId::Sha256, ObjectFactory::detached()).unwrap();
        assert_eq!(
            signer.sign_digest(&hash, HEAP).unwrap_err(),
            SecurityError::ProcessingNotFinished
        );
    }

    #[test]
    fn agreement_key_is_incompatible() {
        let header = ObjectHeader::new(CryptoObjectType::PrivateKey, AlgId::X25519)
            .with_usage(AllowedUsage::ALLOW_SIGNATURE);
        let key = PrivateKey::new(header, Zeroizing::new(vec![1u8; 32])).unwrap();
        let mut signer = signer_ctx();
        assert_eq!(signer.set_key(&key).unwrap_err(), SecurityError::IncompatibleObject);
    }

    #[test]
    fn real_time_signing_needs_a_reserved_slot() {
        let (signer, verifier) = pair();
        let allocator = signer.objects.allocator();
        allocator.reserve(Pool::Objects, vec![4096]).unwrap();
        allocator.enter_real_time();

        assert_eq!(
            signer.sign(b"telemetry", HEAP).unwrap_err(),
            SecurityError::BadAlloc
        );
        let slot = ReservedIndex::Slot(0);
        let sig = signer.sign(b"telemetry", slot).unwrap();
        assert_eq!(sig.index(), slot);
        assert!(verifier.verify(b"telemetry", &sig).unwrap());

        // raw signing into a caller buffer places no object
        let mut out = [0u8; 64];
        assert_eq!(signer.sign_to(b"telemetry", &mut out).unwrap(), 64);
        allocator.leave_real_time();
    }
}
