use crypt_objects::{
    seed_size, CryptoObject, KeyObject, ObjectHeader, SecretSeed, SymmetricKey,
};
use crypt_primitives::{unwrap_key, wrap_key, wrapped_size, AesBlock, PrimitiveError};
use crypt_types::{
    AlgFamily, AlgId, AllowedUsage, CryptoObjectType, CryptoObjectUid, ReservedObjectIndex,
    SecurityError, SecurityResult,
};
use tracing::debug;
use zeroize::Zeroizing;

use super::{
    claim_derived_key, require_family, require_key_alg, require_usage, CryptoContext,
    CryptoTransform, SecretMaterial,
};
use crate::allocator::{ObjectFactory, Placed};

struct Kek {
    block: AesBlock,
    wrap: bool,
}

/// AES key wrap (RFC 3394) and key wrap with padding (RFC 5649).
///
/// Loaded for [`CryptoTransform::Wrap`] the key must allow exporting, for
/// [`CryptoTransform::Unwrap`] it must allow importing. Unwrapped objects
/// carry no metadata: they are session objects, non-exportable and without
/// identity. An unwrapped seed may not exceed the seed size of its
/// algorithm.
pub struct SymmetricKeyWrapperCtx {
    alg: AlgId,
    objects: ObjectFactory,
    kek: Option<Kek>,
}

impl SymmetricKeyWrapperCtx {
    pub(crate) fn new(alg: AlgId, objects: ObjectFactory) -> SecurityResult<Self> {
        require_family(alg, AlgFamily::KeyWrap)?;
        Ok(Self {
            alg,
            objects,
            kek: None,
        })
    }

    pub fn set_key(
        &mut self,
        key: &SymmetricKey,
        transform: CryptoTransform,
    ) -> SecurityResult<()> {
        require_key_alg(self.alg, key.alg_id())?;
        let (needed, wrap) = match transform {
            CryptoTransform::Wrap => (AllowedUsage::ALLOW_KEY_EXPORTING, true),
            CryptoTransform::Unwrap => (AllowedUsage::ALLOW_KEY_IMPORTING, false),
            _ => return Err(SecurityError::InvalidArgument),
        };
        require_usage(key.allowed_usage(), needed)?;
        self.kek = Some(Kek {
            block: AesBlock::new(key.material())?,
            wrap,
        });
        Ok(())
    }

    /// Length multiple accepted for wrapped material: 8 for KW, 1 for KWP.
    pub fn target_key_granularity(&self) -> usize {
        self.alg.block_size()
    }

    /// Output size for `key_length` bytes of material.
    pub fn calculate_wrapped_key_size(&self, key_length: usize) -> usize {
        wrapped_size(self.padded(), key_length)
    }

    /// Wrap the material of a key or seed.
    ///
    /// An empty `out` is a size query and returns the required length
    /// without touching anything else.
    pub fn wrap_key_material(
        &self,
        material: &dyn SecretMaterial,
        out: &mut [u8],
    ) -> SecurityResult<usize> {
        if !material.is_exportable() {
            return Err(SecurityError::IncompatibleObject);
        }
        let raw = material.raw_material();
        self.check_wrap_input(raw.len())?;
        let required = self.calculate_wrapped_key_size(raw.len());
        if out.is_empty() {
            return Ok(required);
        }
        if out.len() < required {
            return Err(SecurityError::InsufficientCapacity { required });
        }
        let wrapped = self.wrap_bytes(raw)?;
        out[..wrapped.len()].copy_from_slice(&wrapped);
        debug!(alg = %self.alg, object = %material.object_type(), "key material wrapped");
        Ok(wrapped.len())
    }

    /// Unwrap a symmetric key for `alg`, placed at `index`.
    pub fn unwrap_key(
        &self,
        wrapped: &[u8],
        alg: AlgId,
        usage: AllowedUsage,
        index: ReservedObjectIndex,
    ) -> SecurityResult<Placed<SymmetricKey>> {
        self.kek_for(false)?;
        let lease = claim_derived_key(&self.objects, alg, index)?;
        let material = self.unwrap_bytes(wrapped)?;
        let header = unwrapped_header(CryptoObjectType::SymmetricKey, alg, usage);
        Ok(Placed::new(SymmetricKey::new(header, material)?, lease))
    }

    /// Unwrap a secret seed tagged with `alg`, placed at `index`.
    pub fn unwrap_seed(
        &self,
        wrapped: &[u8],
        alg: AlgId,
        usage: AllowedUsage,
        index: ReservedObjectIndex,
    ) -> SecurityResult<Placed<SecretSeed>> {
        self.kek_for(false)?;
        let limit = seed_size(alg)?;
        let lease = self
            .objects
            .claim(alg, CryptoObjectType::SecretSeed, index)?;
        let material = self.unwrap_bytes(wrapped)?;
        if material.len() > limit {
            return Err(SecurityError::InvalidInputSize);
        }
        let header = unwrapped_header(CryptoObjectType::SecretSeed, alg, usage);
        Ok(Placed::new(SecretSeed::new(header, material)?, lease))
    }

    pub(crate) fn wrap_bytes(&self, data: &[u8]) -> SecurityResult<Vec<u8>> {
        let kek = self.kek_for(true)?;
        self.check_wrap_input(data.len())?;
        Ok(wrap_key(&kek.block, self.padded(), data)?)
    }

    pub(crate) fn unwrap_bytes(&self, wrapped: &[u8]) -> SecurityResult<Zeroizing<Vec<u8>>> {
        let kek = self.kek_for(false)?;
        unwrap_key(&kek.block, self.padded(), wrapped).map_err(|err| match err {
            PrimitiveError::IntegrityCheckFailed => SecurityError::UnexpectedValue,
            other => other.into(),
        })
    }

    pub(crate) fn can_wrap(&self) -> bool {
        self.kek.as_ref().is_some_and(|k| k.wrap)
    }

    pub(crate) fn can_unwrap(&self) -> bool {
        self.kek.as_ref().is_some_and(|k| !k.wrap)
    }

    fn padded(&self) -> bool {
        matches!(self.alg, AlgId::Aes128Kwp | AlgId::Aes256Kwp)
    }

    fn kek_for(&self, wrap: bool) -> SecurityResult<&Kek> {
        let kek = self.kek.as_ref().ok_or(SecurityError::UninitializedContext)?;
        if kek.wrap != wrap {
            return Err(SecurityError::UsageViolation);
        }
        Ok(kek)
    }

    fn check_wrap_input(&self, len: usize) -> SecurityResult<()> {
        let ok = if self.padded() {
            len > 0
        } else {
            len >= 16 && len % self.target_key_granularity() == 0
        };
        if ok {
            Ok(())
        } else {
            Err(SecurityError::InvalidInputSize)
        }
    }
}

fn unwrapped_header(
    object_type: CryptoObjectType,
    alg: AlgId,
    usage: AllowedUsage,
) -> ObjectHeader {
    ObjectHeader::new(object_type, alg)
        .with_uid(CryptoObjectUid::nil())
        .with_usage(usage)
        .session(true)
        .exportable(false)
}

impl CryptoContext for SymmetricKeyWrapperCtx {
    fn alg_id(&self) -> AlgId {
        self.alg
    }

    fn is_initialized(&self) -> bool {
        self.kek.is_some()
    }
}

impl std::fmt::Debug for SymmetricKeyWrapperCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKeyWrapperCtx")
            .field("alg", &self.alg)
            .field("keyed", &self.kek.is_some())
            .field("wrap", &self.can_wrap())
            .finish()
    }
}
