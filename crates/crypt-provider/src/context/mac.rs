use crypt_objects::{CryptoObject, KeyObject, ObjectDependency, Signature, SymmetricKey};
use crypt_primitives::MacEngine;
use crypt_types::{
    AlgFamily, AlgId, AllowedUsage, CryptoObjectType, ReservedObjectIndex, SecurityError,
    SecurityResult,
};
use subtle::ConstantTimeEq;
use tracing::debug;
use zeroize::Zeroizing;

use super::{
    claim_signature, compare_digest, copy_digest, issue_signature, require_family,
    require_key_alg, require_usage, validate_iv, BufferedDigest, CryptoContext, StreamStarter,
    StreamState,
};
use crate::allocator::{ObjectFactory, Placed};

struct MacKey {
    material: Zeroizing<Vec<u8>>,
    usage: AllowedUsage,
    dependency: Option<ObjectDependency>,
}

/// Keyed message authentication code.
///
/// The key must allow signature or verification. Extracting the tag or
/// packaging it as a signature requires `ALLOW_SIGNATURE`; comparisons
/// shorter than the configured minimum require `ALLOW_VERIFICATION`.
pub struct MessageAuthnCodeCtx {
    alg: AlgId,
    objects: ObjectFactory,
    min_compare: usize,
    key: Option<MacKey>,
    engine: Option<MacEngine>,
    state: StreamState,
    digest: Option<Zeroizing<Vec<u8>>>,
}

impl MessageAuthnCodeCtx {
    pub(crate) fn new(
        alg: AlgId,
        objects: ObjectFactory,
        min_compare: usize,
    ) -> SecurityResult<Self> {
        require_family(alg, AlgFamily::Mac)?;
        Ok(Self {
            alg,
            objects,
            min_compare,
            key: None,
            engine: None,
            state: StreamState::default(),
            digest: None,
        })
    }

    pub fn set_key(&mut self, key: &SymmetricKey) -> SecurityResult<()> {
        require_key_alg(self.alg, key.alg_id())?;
        let usage = key.allowed_usage();
        if !usage.intersects(AllowedUsage::ALLOW_SIGNATURE | AllowedUsage::ALLOW_VERIFICATION) {
            return Err(SecurityError::UsageViolation);
        }
        self.key = Some(MacKey {
            material: Zeroizing::new(key.material().to_vec()),
            usage,
            dependency: key
                .object_id()
                .map(|uid| ObjectDependency::new(uid, CryptoObjectType::SymmetricKey)),
        });
        self.engine = None;
        self.digest = None;
        self.state.reset();
        Ok(())
    }

    fn key(&self) -> SecurityResult<&MacKey> {
        self.key.as_ref().ok_or(SecurityError::UninitializedContext)
    }

    fn finished_tag(&self) -> SecurityResult<&[u8]> {
        self.state.require_finished()?;
        self.digest
            .as_deref()
            .map(|d| d.as_slice())
            .ok_or(SecurityError::ProcessingNotFinished)
    }
}

impl CryptoContext for MessageAuthnCodeCtx {
    fn alg_id(&self) -> AlgId {
        self.alg
    }

    fn is_initialized(&self) -> bool {
        self.key.is_some()
    }
}

impl StreamStarter for MessageAuthnCodeCtx {
    fn start(&mut self, iv: &[u8]) -> SecurityResult<()> {
        let key = self.key()?;
        validate_iv(self.alg, iv)?;
        let engine = MacEngine::new(self.alg, &key.material)?;
        self.engine = Some(engine);
        self.digest = None;
        self.state.begin(iv);
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.state.is_started()
    }
}

impl BufferedDigest for MessageAuthnCodeCtx {
    fn update(&mut self, data: &[u8]) -> SecurityResult<()> {
        self.state.require_started()?;
        let engine = self
            .engine
            .as_mut()
            .ok_or(SecurityError::ProcessingNotStarted)?;
        engine.update(data);
        Ok(())
    }

    fn finish_into(
        &mut self,
        signature: Option<ReservedObjectIndex>,
    ) -> SecurityResult<Option<Placed<Signature>>> {
        self.state.require_started()?;
        let (usage, dependency) = {
            let key = self.key()?;
            (key.usage, key.dependency)
        };
        if signature.is_some() {
            require_usage(usage, AllowedUsage::ALLOW_SIGNATURE)?;
        }
        if self.engine.is_none() {
            return Err(SecurityError::ProcessingNotStarted);
        }
        let claimed = claim_signature(&self.objects, self.alg, signature)?;
        let tag = Zeroizing::new(
            self.engine
                .take()
                .ok_or(SecurityError::ProcessingNotStarted)?
                .finalize(),
        );
        self.state.finish();

        let signature = claimed
            .map(|lease| {
                let couids = self.objects.couids();
                issue_signature(couids, self.alg, tag.to_vec(), AlgId::None, dependency)
                    .map(|sig| Placed::new(sig, lease))
            })
            .transpose()?;
        debug!(alg = %self.alg, signature = signature.is_some(), "mac finished");
        self.digest = Some(tag);
        Ok(signature)
    }

    fn get_digest(&self, out: &mut [u8], offset: usize) -> SecurityResult<usize> {
        let tag = self.finished_tag()?;
        require_usage(self.key()?.usage, AllowedUsage::ALLOW_SIGNATURE)?;
        Ok(copy_digest(tag, out, offset))
    }

    fn compare(&self, expected: &[u8], offset: usize) -> SecurityResult<bool> {
        let tag = self.finished_tag()?;
        let usage = self.key()?.usage;
        if !usage.contains(AllowedUsage::ALLOW_VERIFICATION) && expected.len() < self.min_compare {
            return Err(SecurityError::BruteForceRisk);
        }
        compare_digest(tag, expected, offset)
    }

    fn check(&self, expected: &Signature) -> SecurityResult<bool> {
        let tag = self.finished_tag()?;
        let key = self.key()?;
        if expected.alg_id() != self.alg || expected.hash_alg_id() != AlgId::None {
            return Err(SecurityError::IncompatibleObject);
        }
        if expected.dependency().map(|d| d.uid) != key.dependency.map(|d| d.uid) {
            return Err(SecurityError::BadObjectReference);
        }
        Ok(tag.ct_eq(expected.value()).into())
    }
}

impl std::fmt::Debug for MessageAuthnCodeCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageAuthnCodeCtx")
            .field("alg", &self.alg)
            .field("keyed", &self.key.is_some())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::Pool;
    use crypt_objects::ObjectHeader;
    use crypt_types::{CryptoObjectUid, ReservedIndex};

    fn mac_ctx(alg: AlgId) -> MessageAuthnCodeCtx {
        MessageAuthnCodeCtx::new(alg, ObjectFactory::detached(), 8).unwrap()
    }

    fn key(usage: AllowedUsage) -> SymmetricKey {
        let header = ObjectHeader::new(CryptoObjectType::SymmetricKey, AlgId::HmacSha256)
            .with_uid(CryptoObjectUid::from_name("mac-key"))
            .with_usage(usage);
        SymmetricKey::new(header, Zeroizing::new(vec![0x0b; 32])).unwrap()
    }

    fn keyed(usage: AllowedUsage) -> MessageAuthnCodeCtx {
        let mut ctx = mac_ctx(AlgId::HmacSha256);
        ctx.set_key(&key(usage)).unwrap();
        ctx
    }

    fn finished(usage: AllowedUsage) -> MessageAuthnCodeCtx {
        let mut ctx = keyed(usage);
        ctx.start(&[]).unwrap();
        ctx.update(b"payload").unwrap();
        ctx.finish(false).unwrap();
        ctx
    }

    #[test]
    fn start_without_key_is_uninitialized() {
        let mut ctx = mac_ctx(AlgId::HmacSha256);
        assert_eq!(ctx.start(&[]).unwrap_err(), SecurityError::UninitializedContext);
    }

    #[test]
    fn key_without_mac_usage_is_refused() {
        let mut ctx = mac_ctx(AlgId::HmacSha256);
        assert_eq!(
            ctx.set_key(&key(AllowedUsage::ALLOW_DATA_ENCRYPTION))
                .unwrap_err(),
            SecurityError::UsageViolation
        );
    }

    #[test]
    fn key_of_other_size_is_incompatible() {
        let mut ctx = mac_ctx(AlgId::HmacSha512);
        assert_eq!(
            ctx.set_key(&key(AllowedUsage::ALLOW_SIGNATURE)).unwrap_err(),
            SecurityError::IncompatibleObject
        );
    }

    #[test]
    fn signature_object_requires_signature_usage() {
        let mut ctx = keyed(AllowedUsage::ALLOW_VERIFICATION);
        ctx.start(&[]).unwrap();
        ctx.update(b"payload").unwrap();
        assert_eq!(ctx.finish(true).unwrap_err(), SecurityError::UsageViolation);
        // the session is still open
        assert!(ctx.is_started());
        assert!(ctx.finish(false).unwrap().is_none());
    }

    #[test]
    fn signature_depends_on_key() {
        let mut ctx = keyed(AllowedUsage::ALLOW_SIGNATURE | AllowedUsage::ALLOW_VERIFICATION);
        ctx.start(&[]).unwrap();
        ctx.update(b"payload").unwrap();
        let sig = ctx.finish(true).unwrap().unwrap();

        assert_eq!(sig.hash_alg_id(), AlgId::None);
        let dep = sig.dependency().unwrap();
        assert_eq!(dep.uid, CryptoObjectUid::from_name("mac-key"));
        assert_eq!(dep.object_type, CryptoObjectType::SymmetricKey);
        assert!(ctx.check(&sig).unwrap());
    }

    #[test]
    fn real_time_signature_needs_a_reserved_slot() {
        let mut ctx = keyed(AllowedUsage::ALLOW_SIGNATURE);
        let allocator = ctx.objects.allocator();
        allocator.reserve(Pool::Objects, vec![4096]).unwrap();
        allocator.enter_real_time();

        ctx.start(&[]).unwrap();
        ctx.update(b"payload").unwrap();
        assert_eq!(ctx.finish(true).unwrap_err(), SecurityError::BadAlloc);
        let sig = ctx
            .finish_into(Some(ReservedIndex::Slot(0)))
            .unwrap()
            .unwrap();
        assert_eq!(sig.index(), ReservedIndex::Slot(0));
        ctx.objects.allocator().leave_real_time();
    }

    #[test]
    fn tag_extraction_requires_signature_usage() {
        let ctx = finished(AllowedUsage::ALLOW_VERIFICATION);
        let mut out = [0u8; 32];
        assert_eq!(
            ctx.get_digest(&mut out, 0).unwrap_err(),
            SecurityError::UsageViolation
        );
    }

    #[test]
    fn short_compare_without_verification_is_brute_force_risk() {
        let signer = finished(AllowedUsage::ALLOW_SIGNATURE);
        let mut tag = [0u8; 32];
        signer.get_digest(&mut tag, 0).unwrap();

        assert_eq!(
            signer.compare(&tag[..7], 0).unwrap_err(),
            SecurityError::BruteForceRisk
        );
        assert!(signer.compare(&tag[..8], 0).unwrap());

        let verifier = finished(AllowedUsage::ALLOW_VERIFICATION);
        assert!(verifier.compare(&tag[..4], 0).unwrap());
        assert!(!verifier.compare(&[0u8; 4], 0).unwrap());
    }

    #[test]
    fn tag_matches_backend() {
        let ctx = {
            let mut ctx = keyed(AllowedUsage::ALLOW_SIGNATURE);
            ctx.start(&[]).unwrap();
            ctx.update(b"Hi There").unwrap();
            ctx.finish(false).unwrap();
            ctx
        };
        let mut out = [0u8; 32];
        ctx.get_digest(&mut out, 0).unwrap();
        let mut reference = MacEngine::new(AlgId::HmacSha256, &[0x0b; 32]).unwrap();
        reference.update(b"Hi There");
        assert_eq!(out.to_vec(), reference.finalize());
    }
}
