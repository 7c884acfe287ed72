//! X25519 ephemeral-static key encapsulation.

use crypt_objects::{
    CryptoObject, KeyObject, ObjectHeader, PrivateKey, PublicKey, SecretSeed, SymmetricKey,
};
use crypt_primitives::{kem_decapsulate, kem_encapsulate, X25519Secret, X25519_SIZE};
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
use crate::allocator::{ObjectFactory, Placed, SlotLease};

fn shared_seed(
    objects: &ObjectFactory,
    alg: AlgId,
    material: Zeroizing<Vec<u8>>,
    usage: AllowedUsage,
    lease: Option<SlotLease>,
) -> SecurityResult<Placed<SecretSeed>> {
    let header = ObjectHeader::new(CryptoObjectType::SecretSeed, alg)
        .with_uid(objects.couids().issue())
        .with_usage(usage)
        .session(true)
        .exportable(false);
    Ok(Placed::new(SecretSeed::new(header, material)?, lease))
}

fn shared_key(
    objects: &ObjectFactory,
    material: &[u8],
    target: AlgId,
    usage: AllowedUsage,
    info: &[u8],
    lease: Option<SlotLease>,
) -> SecurityResult<Placed<SymmetricKey>> {
    let key = derive_symmetric_key(
        objects.couids(),
        material,
        &[],
        info,
        target,
        usage,
        true,
        false,
    )?;
    Ok(Placed::new(key, lease))
}

// ---------------------------------------------------------------------------
// KeyEncapsulatorPublicCtx
// ---------------------------------------------------------------------------

pub struct KeyEncapsulatorPublicCtx {
    alg: AlgId,
    objects: ObjectFactory,
    recipient: Option<Vec<u8>>,
}

impl KeyEncapsulatorPublicCtx {
    pub(crate) fn new(alg: AlgId, objects: ObjectFactory) -> SecurityResult<Self> {
        require_family(alg, AlgFamily::Kem)?;
        Ok(Self {
            alg,
            objects,
            recipient: None,
        })
    }

    /// Load the recipient's public key.
    pub fn set_key(&mut self, key: &PublicKey) -> SecurityResult<()> {
        require_key_alg(self.alg, key.alg_id())?;
        self.recipient = Some(key.material().to_vec());
        Ok(())
    }

    /// Bytes written by each encapsulation.
    pub fn encapsulated_size(&self) -> usize {
        X25519_SIZE
    }

    /// Encapsulate a fresh shared seed, writing the encapsulated value to
    /// `out`. Nothing is generated or written when `out` is too small or the
    /// seed cannot be placed at `index`.
    pub fn encapsulate_seed(
        &self,
        out: &mut [u8],
        usage: AllowedUsage,
        index: ReservedObjectIndex,
    ) -> SecurityResult<Placed<SecretSeed>> {
        let recipient = self.ready(out)?;
        let lease = self
            .objects
            .claim(self.alg, CryptoObjectType::SecretSeed, index)?;
        let material = self.encapsulate(recipient, out)?;
        shared_seed(&self.objects, self.alg, material, usage, lease)
    }

    /// Encapsulate a fresh symmetric key for `target`.
    pub fn encapsulate_key(
        &self,
        out: &mut [u8],
        target: AlgId,
        usage: AllowedUsage,
        info: &[u8],
        index: ReservedObjectIndex,
    ) -> SecurityResult<Placed<SymmetricKey>> {
        let recipient = self.ready(out)?;
        let lease = claim_derived_key(&self.objects, target, index)?;
        let material = self.encapsulate(recipient, out)?;
        shared_key(&self.objects, &material, target, usage, info, lease)
    }

    fn ready(&self, out: &[u8]) -> SecurityResult<&[u8]> {
        let recipient = self
            .recipient
            .as_deref()
            .ok_or(SecurityError::UninitializedContext)?;
        if out.len() < X25519_SIZE {
            return Err(SecurityError::InsufficientCapacity {
                required: X25519_SIZE,
            });
        }
        Ok(recipient)
    }

    fn encapsulate(&self, recipient: &[u8], out: &mut [u8]) -> SecurityResult<Zeroizing<Vec<u8>>> {
        let encapsulation = kem_encapsulate(recipient)?;
        out[..X25519_SIZE].copy_from_slice(&encapsulation.encapsulated);
        debug!(alg = %self.alg, "seed encapsulated");
        Ok(encapsulation.shared_seed)
    }
}

impl CryptoContext for KeyEncapsulatorPublicCtx {
    fn alg_id(&self) -> AlgId {
        self.alg
    }

    fn is_initialized(&self) -> bool {
        self.recipient.is_some()
    }
}

impl std::fmt::Debug for KeyEncapsulatorPublicCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyEncapsulatorPublicCtx")
            .field("alg", &self.alg)
            .field("recipient", &self.recipient.as_ref().map(hex::encode))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// KeyDecapsulatorPrivateCtx
// ---------------------------------------------------------------------------

pub struct KeyDecapsulatorPrivateCtx {
    alg: AlgId,
    objects: ObjectFactory,
    secret: Option<X25519Secret>,
}

impl KeyDecapsulatorPrivateCtx {
    pub(crate) fn new(alg: AlgId, objects: ObjectFactory) -> SecurityResult<Self> {
        require_family(alg, AlgFamily::Kem)?;
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

    pub fn encapsulated_size(&self) -> usize {
        X25519_SIZE
    }

    pub fn decapsulate_seed(
        &self,
        input: &[u8],
        usage: AllowedUsage,
        index: ReservedObjectIndex,
    ) -> SecurityResult<Placed<SecretSeed>> {
        let secret = self.ready(input)?;
        let lease = self
            .objects
            .claim(self.alg, CryptoObjectType::SecretSeed, index)?;
        let material = kem_decapsulate(secret, input)?;
        shared_seed(&self.objects, self.alg, material, usage, lease)
    }

    pub fn decapsulate_key(
        &self,
        input: &[u8],
        target: AlgId,
        usage: AllowedUsage,
        info: &[u8],
        index: ReservedObjectIndex,
    ) -> SecurityResult<Placed<SymmetricKey>> {
        let secret = self.ready(input)?;
        let lease = claim_derived_key(&self.objects, target, index)?;
        let material = kem_decapsulate(secret, input)?;
        shared_key(&self.objects, &material, target, usage, info, lease)
    }

    fn ready(&self, input: &[u8]) -> SecurityResult<&X25519Secret> {
        let secret = self
            .secret
            .as_ref()
            .ok_or(SecurityError::UninitializedContext)?;
        if input.len() != X25519_SIZE {
            return Err(SecurityError::InvalidInputSize);
        }
        Ok(secret)
    }
}

impl CryptoContext for KeyDecapsulatorPrivateCtx {
    fn alg_id(&self) -> AlgId {
        self.alg
    }

    fn is_initialized(&self) -> bool {
        self.secret.is_some()
    }
}

impl std::fmt::Debug for KeyDecapsulatorPrivateCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyDecapsulatorPrivateCtx")
            .field("alg", &self.alg)
            .field("keyed", &self.secret.is_some())
            .finish()
    }
}
