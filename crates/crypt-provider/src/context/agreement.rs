use crypt_objects::{
    CryptoObject, KeyObject, ObjectHeader, PrivateKey, PublicKey, SecretSeed, SymmetricKey,
};
use crypt_primitives::X25519Secret;
use crypt_types::{
    AlgFamily, AlgId, AllowedUsage, CryptoObjectType, ReservedObjectIndex, SecurityError,
    SecurityResult,
};
use tracing::debug;
use zeroize::Zeroizing;

use super::{
    claim_derived_key, derive_symmetric_key, require_family, require_key_alg, require_usage,
    CryptoContext,
};
use crate::allocator::{ObjectFactory, Placed};

/// X25519 key agreement.
///
/// Agreed seeds and keys are session objects and never exportable.
pub struct KeyAgreementPrivateCtx {
    alg: AlgId,
    objects: ObjectFactory,
    secret: Option<X25519Secret>,
}

impl KeyAgreementPrivateCtx {
    pub(crate) fn new(alg: AlgId, objects: ObjectFactory) -> SecurityResult<Self> {
        require_family(alg, AlgFamily::KeyAgreement)?;
        Ok(Self {
            alg,
            objects,
            secret: None,
        })
    }

    pub fn set_key(&mut self, key: &PrivateKey) -> SecurityResult<()> {
        require_key_alg(self.alg, key.alg_id())?;
        require_usage(key.allowed_usage(), AllowedUsage::ALLOW_KEY_AGREEMENT)?;
        self.secret = Some(X25519Secret::from_slice(key.secret())?);
        Ok(())
    }

    /// Agree on a raw shared seed with `other`.
    pub fn agree_seed(
        &self,
        other: &PublicKey,
        usage: AllowedUsage,
        index: ReservedObjectIndex,
    ) -> SecurityResult<Placed<SecretSeed>> {
        let secret = self.peer_checked(other)?;
        let lease = self
            .objects
            .claim(self.alg, CryptoObjectType::SecretSeed, index)?;
        let shared = self.agree(secret, other)?;
        let header = ObjectHeader::new(CryptoObjectType::SecretSeed, self.alg)
            .with_uid(self.objects.couids().issue())
            .with_usage(usage)
            .session(true)
            .exportable(false);
        Ok(Placed::new(SecretSeed::new(header, shared)?, lease))
    }

    /// Agree on a symmetric key for `target`, run through HKDF with `salt`
    /// and `info`.
    pub fn agree_key(
        &self,
        other: &PublicKey,
        target: AlgId,
        usage: AllowedUsage,
        salt: &[u8],
        info: &[u8],
        index: ReservedObjectIndex,
    ) -> SecurityResult<Placed<SymmetricKey>> {
        let secret = self.peer_checked(other)?;
        let lease = claim_derived_key(&self.objects, target, index)?;
        let shared = self.agree(secret, other)?;
        let key = derive_symmetric_key(
            self.objects.couids(),
            &shared,
            salt,
            info,
            target,
            usage,
            true,
            false,
        )?;
        Ok(Placed::new(key, lease))
    }

    fn peer_checked(&self, other: &PublicKey) -> SecurityResult<&X25519Secret> {
        let secret = self
            .secret
            .as_ref()
            .ok_or(SecurityError::UninitializedContext)?;
        require_key_alg(self.alg, other.alg_id())?;
        Ok(secret)
    }

    fn agree(
        &self,
        secret: &X25519Secret,
        other: &PublicKey,
    ) -> SecurityResult<Zeroizing<Vec<u8>>> {
        let shared = secret.agree(other.material())?;
        debug!(alg = %self.alg, peer = ?other.object_id(), "key agreement completed");
        Ok(shared)
    }
}

impl CryptoContext for KeyAgreementPrivateCtx {
    fn alg_id(&self) -> AlgId {
        self.alg
    }

    fn is_initialized(&self) -> bool {
        self.secret.is_some()
    }
}

impl std::fmt::Debug for KeyAgreementPrivateCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyAgreementPrivateCtx")
            .field("alg", &self.alg)
            .field("keyed", &self.secret.is_some())
            .finish()
    }
}
