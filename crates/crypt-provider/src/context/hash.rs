use std::sync::Arc;

use crypt_objects::{CryptoObject, DomainParameters, Signature};
use crypt_primitives::DigestEngine;
use crypt_types::{AlgFamily, AlgId, ReservedObjectIndex, SecurityError, SecurityResult};
use subtle::ConstantTimeEq;
use tracing::debug;

use super::{
    claim_signature, compare_digest, copy_digest, issue_signature, require_family, validate_iv,
    BufferedDigest, CryptoContext, StreamStarter, StreamState,
};
use crate::allocator::{ObjectFactory, Placed};

/// Unkeyed message digest.
///
/// Optional domain parameters only contribute the dependency of the
/// signature objects produced by [`finish`](BufferedDigest::finish).
pub struct HashFunctionCtx {
    alg: AlgId,
    objects: ObjectFactory,
    params: Option<Arc<DomainParameters>>,
    engine: Option<DigestEngine>,
    state: StreamState,
    digest: Option<Vec<u8>>,
}

impl HashFunctionCtx {
    pub(crate) fn new(alg: AlgId, objects: ObjectFactory) -> SecurityResult<Self> {
        require_family(alg, AlgFamily::Hash)?;
        Ok(Self {
            alg,
            objects,
            params: None,
            engine: None,
            state: StreamState::default(),
            digest: None,
        })
    }

    /// Attach completed domain parameters. Resets any session in progress.
    pub fn set_domain_parameters(&mut self, params: Arc<DomainParameters>) -> SecurityResult<()> {
        if !params.is_completed() {
            return Err(SecurityError::IncompleteArgState);
        }
        self.params = Some(params);
        self.engine = None;
        self.digest = None;
        self.state.reset();
        Ok(())
    }

    /// The digest of the last finished session.
    pub(crate) fn finished_digest(&self) -> SecurityResult<&[u8]> {
        self.state.require_finished()?;
        self.digest
            .as_deref()
            .ok_or(SecurityError::ProcessingNotFinished)
    }
}

impl CryptoContext for HashFunctionCtx {
    fn alg_id(&self) -> AlgId {
        self.alg
    }

    fn is_initialized(&self) -> bool {
        true
    }
}

impl StreamStarter for HashFunctionCtx {
    fn start(&mut self, iv: &[u8]) -> SecurityResult<()> {
        validate_iv(self.alg, iv)?;
        self.engine = Some(DigestEngine::new(self.alg)?);
        self.digest = None;
        self.state.begin(iv);
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.state.is_started()
    }
}

impl BufferedDigest for HashFunctionCtx {
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
        if self.engine.is_none() {
            return Err(SecurityError::ProcessingNotStarted);
        }
        let claimed = claim_signature(&self.objects, self.alg, signature)?;
        let digest = self
            .engine
            .take()
            .ok_or(SecurityError::ProcessingNotStarted)?
            .finalize();
        self.state.finish();

        let dependency = self
            .params
            .as_ref()
            .and_then(|p| p.header().as_dependency());
        let signature = claimed
            .map(|lease| {
                let couids = self.objects.couids();
                issue_signature(couids, self.alg, digest.clone(), self.alg, dependency)
                    .map(|sig| Placed::new(sig, lease))
            })
            .transpose()?;
        debug!(alg = %self.alg, signature = signature.is_some(), "hash finished");
        self.digest = Some(digest);
        Ok(signature)
    }

    fn get_digest(&self, out: &mut [u8], offset: usize) -> SecurityResult<usize> {
        Ok(copy_digest(self.finished_digest()?, out, offset))
    }

    fn compare(&self, expected: &[u8], offset: usize) -> SecurityResult<bool> {
        compare_digest(self.finished_digest()?, expected, offset)
    }

    fn check(&self, expected: &Signature) -> SecurityResult<bool> {
        let digest = self.finished_digest()?;
        if expected.alg_id() != self.alg || expected.hash_alg_id() != self.alg {
            return Err(SecurityError::IncompatibleObject);
        }
        Ok(digest.ct_eq(expected.value()).into())
    }
}

impl std::fmt::Debug for HashFunctionCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashFunctionCtx")
            .field("alg", &self.alg)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
