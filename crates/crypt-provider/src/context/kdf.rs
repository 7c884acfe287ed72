use crypt_objects::{seed_size, CryptoObject, ObjectHeader, SecretSeed, SymmetricKey};
use crypt_primitives::hkdf_sha256;
use crypt_types::{
    AlgFamily, AlgId, AllowedUsage, CryptoObjectType, ReservedObjectIndex, SecurityError,
    SecurityResult,
};
use tracing::debug;
use zeroize::Zeroizing;

use super::{
    claim_derived_key, derive_symmetric_key, require_family, require_usage, target_info,
    CryptoContext, SecretMaterial,
};
use crate::allocator::{ObjectFactory, Placed};

/// HKDF-SHA-256 key derivation.
///
/// Source material must allow `ALLOW_KDF_MATERIAL`, and every derived
/// object may only carry usages the source grants through its
/// `ALLOW_DERIVED_*` flags.
pub struct KeyDerivationFunctionCtx {
    alg: AlgId,
    objects: ObjectFactory,
    source: Option<Zeroizing<Vec<u8>>>,
    source_usage: AllowedUsage,
    salt: Vec<u8>,
}

impl KeyDerivationFunctionCtx {
    pub(crate) fn new(alg: AlgId, objects: ObjectFactory) -> SecurityResult<Self> {
        require_family(alg, AlgFamily::Kdf)?;
        Ok(Self {
            alg,
            objects,
            source: None,
            source_usage: AllowedUsage::empty(),
            salt: Vec::new(),
        })
    }

    /// Load the input keying material. Clears any salt added before.
    pub fn set_source_key_material(&mut self, material: &dyn SecretMaterial) -> SecurityResult<()> {
        let usage = material.header().allowed_usage;
        require_usage(usage, AllowedUsage::ALLOW_KDF_MATERIAL)?;
        self.source = Some(Zeroizing::new(material.raw_material().to_vec()));
        self.source_usage = usage;
        self.salt.clear();
        Ok(())
    }

    /// Append to the salt. Salt accumulates until new source material is set.
    pub fn add_salt(&mut self, salt: &[u8]) {
        self.salt.extend_from_slice(salt);
    }

    /// Derive a symmetric key for `target`, placed at `index`.
    pub fn derive_key(
        &self,
        target: AlgId,
        usage: AllowedUsage,
        info: &[u8],
        is_session: bool,
        is_exportable: bool,
        index: ReservedObjectIndex,
    ) -> SecurityResult<Placed<SymmetricKey>> {
        let source = self.checked_source(usage)?;
        let lease = claim_derived_key(&self.objects, target, index)?;
        let key = derive_symmetric_key(
            self.objects.couids(),
            source,
            &self.salt,
            info,
            target,
            usage,
            is_session,
            is_exportable,
        )?;
        debug!(kdf = %self.alg, target = %target, index = %index, "symmetric key derived");
        Ok(Placed::new(key, lease))
    }

    /// Derive a seed sized for `target`.
    pub fn derive_seed(
        &self,
        target: AlgId,
        usage: AllowedUsage,
        info: &[u8],
        is_session: bool,
        is_exportable: bool,
        index: ReservedObjectIndex,
    ) -> SecurityResult<Placed<SecretSeed>> {
        let source = self.checked_source(usage)?;
        let size = seed_size(target)?;
        let lease = self
            .objects
            .claim(target, CryptoObjectType::SecretSeed, index)?;
        let material = hkdf_sha256(source, &self.salt, &target_info(target, info), size)?;
        let header = ObjectHeader::new(CryptoObjectType::SecretSeed, target)
            .with_uid(self.objects.couids().issue())
            .with_usage(usage)
            .session(is_session)
            .exportable(is_exportable);
        debug!(kdf = %self.alg, target = %target, index = %index, "seed derived");
        Ok(Placed::new(SecretSeed::new(header, material)?, lease))
    }

    fn checked_source(&self, requested: AllowedUsage) -> SecurityResult<&[u8]> {
        let source = self
            .source
            .as_deref()
            .ok_or(SecurityError::UninitializedContext)?;
        if !self.source_usage.permits_derived(requested) {
            return Err(SecurityError::UsageViolation);
        }
        Ok(source)
    }
}

impl CryptoContext for KeyDerivationFunctionCtx {
    fn alg_id(&self) -> AlgId {
        self.alg
    }

    fn is_initialized(&self) -> bool {
        self.source.is_some()
    }
}

impl std::fmt::Debug for KeyDerivationFunctionCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyDerivationFunctionCtx")
            .field("alg", &self.alg)
            .field("keyed", &self.source.is_some())
            .field("salt_len", &self.salt.len())
            .finish()
    }
}
