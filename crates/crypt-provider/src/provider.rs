use std::mem::size_of;
use std::sync::Arc;

use crypt_objects::{
    max_storage_size, max_storage_size_any, seed_size, AnyObject, CryptoObject, DomainParameters,
    ObjectDependency, ObjectHeader, PasswordHash, PrivateKey, PublicKey, SecretSeed, Signature,
    SymmetricKey, TrustedContainer,
};
use crypt_primitives::{wrapped_size, DrbgEngine, SigningKey, X25519Secret, KEY_WRAP_SEMIBLOCK};
use crypt_types::{
    AlgFamily, AlgId, AllowedUsage, CouidGenerator, CryptoObjectType, FormatId, KeyFamily,
    ReservedContextIndex, ReservedObjectIndex, SecurityError, SecurityResult,
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::allocator::{Allocator, ObjectFactory, Placed, Pool, SlotLease};
use crate::config::ProviderConfig;
use crate::context::{
    issue_signature, AuthnStreamCipherCtx, CryptoContext, HashFunctionCtx,
    KeyAgreementPrivateCtx, KeyDecapsulatorPrivateCtx, KeyDerivationFunctionCtx,
    KeyEncapsulatorPublicCtx, MessageAuthnCodeCtx, RandomGeneratorCtx, SignerPrivateCtx,
    StreamCipherCtx, SymmetricKeyWrapperCtx, VerifierPublicCtx,
};

/// Salt length used by [`CryptoProvider::create_password_hash`] when the
/// caller supplies none.
pub const DEFAULT_PASSWORD_SALT: usize = 16;

/// Bytes a public envelope adds in front of the record.
pub(crate) const PUBLIC_ENVELOPE_OVERHEAD: usize = 12;

/// Bytes a secured envelope adds beyond the wrapped plaintext.
pub(crate) const SECURED_MAGIC_SIZE: usize = 4;

/// Secured plaintext size for a record of `record_len` bytes: length
/// prefix plus record, padded to whole semiblocks.
pub(crate) fn secured_plain_size(record_len: usize) -> usize {
    (8 + record_len).div_ceil(KEY_WRAP_SEMIBLOCK) * KEY_WRAP_SEMIBLOCK
}

/// The trusted environment that creates every context and object.
///
/// A provider owns the reserved-slot tables, the per-thread real-time
/// switch and the COUID generator. Contexts that produce objects share the
/// generator and the object table through an [`ObjectFactory`], so both
/// outlive every primitive the provider handed out.
pub struct CryptoProvider {
    config: ProviderConfig,
    allocator: Arc<Allocator>,
    couids: Arc<CouidGenerator>,
    rng: Mutex<DrbgEngine>,
}

impl CryptoProvider {
    /// Validate `config`, then reserve its initial context and object slots.
    pub fn new(config: ProviderConfig) -> SecurityResult<Self> {
        if let Err(err) = config.validate() {
            warn!(error = %err, "rejected provider configuration");
            return Err(SecurityError::InvalidArgument);
        }
        let provider = Self::build(config);
        if provider.config.initial_context_slots > 0 {
            provider.reserve_contexts(provider.config.initial_context_slots)?;
        }
        if provider.config.initial_object_slots > 0 {
            provider.reserve_objects(provider.config.initial_object_slots)?;
        }
        info!(
            couid_source = %provider.couids.source(),
            contexts = provider.config.initial_context_slots,
            objects = provider.config.initial_object_slots,
            "crypto provider ready"
        );
        Ok(provider)
    }

    /// A provider with the default configuration and no reservations.
    pub fn with_defaults() -> Self {
        Self::build(ProviderConfig::default())
    }

    fn build(config: ProviderConfig) -> Self {
        Self {
            allocator: Arc::new(Allocator::new(
                config.reservation_budget_bytes,
                config.max_reserved_slots,
            )),
            config,
            couids: Arc::new(CouidGenerator::fresh()),
            rng: Mutex::new(DrbgEngine::from_entropy()),
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Generator stamping every COUID this provider issues.
    pub fn couid_generator(&self) -> &CouidGenerator {
        &self.couids
    }

    // ---- Algorithm naming ----

    pub fn convert_to_alg_id(&self, name: &str) -> SecurityResult<AlgId> {
        AlgId::from_name(name)
    }

    pub fn convert_to_alg_name(&self, alg: AlgId) -> &'static str {
        alg.name()
    }

    // ---- Reservations ----

    /// Reserve `quantity` context slots, each large enough for any context.
    pub fn reserve_contexts(&self, quantity: usize) -> SecurityResult<()> {
        let capacity = max_context_footprint();
        self.allocator
            .reserve(Pool::Contexts, vec![capacity; quantity])
    }

    /// Reserve one context slot per entry of `candidates`, each sized for
    /// the largest algorithm in its list.
    ///
    /// An empty candidate list is `InvalidArgument`; `AlgId::Any` sizes the
    /// slot for every context.
    pub fn reserve_contexts_for(&self, candidates: &[Vec<AlgId>]) -> SecurityResult<()> {
        let capacities = candidates
            .iter()
            .map(|algs| {
                if algs.is_empty() {
                    return Err(SecurityError::InvalidArgument);
                }
                algs.iter().try_fold(0usize, |max, alg| -> SecurityResult<usize> {
                    let size = match alg {
                        AlgId::Any => max_context_footprint(),
                        other => context_footprint(*other)?,
                    };
                    Ok(max.max(size))
                })
            })
            .collect::<SecurityResult<Vec<_>>>()?;
        self.allocator.reserve(Pool::Contexts, capacities)
    }

    /// Reserve `quantity` object slots, each large enough for any object.
    pub fn reserve_objects(&self, quantity: usize) -> SecurityResult<()> {
        self.allocator
            .reserve(Pool::Objects, vec![max_storage_size_any(); quantity])
    }

    /// Reserve one object slot per entry of `candidates`, each sized for the
    /// largest `(algorithm, type)` pair in its list.
    pub fn reserve_objects_for(
        &self,
        candidates: &[Vec<(AlgId, CryptoObjectType)>],
    ) -> SecurityResult<()> {
        let capacities = candidates
            .iter()
            .map(|pairs| {
                if pairs.is_empty() {
                    return Err(SecurityError::InvalidArgument);
                }
                pairs.iter().try_fold(0usize, |max, (alg, ty)| -> SecurityResult<usize> {
                    let size = match alg {
                        AlgId::Any => max_storage_size_any(),
                        other => max_storage_size(*other, *ty)?,
                    };
                    Ok(max.max(size))
                })
            })
            .collect::<SecurityResult<Vec<_>>>()?;
        self.allocator.reserve(Pool::Objects, capacities)
    }

    pub fn reserved_context_slots(&self) -> usize {
        self.allocator.reserved_slots(Pool::Contexts)
    }

    pub fn reserved_object_slots(&self) -> usize {
        self.allocator.reserved_slots(Pool::Objects)
    }

    /// Context slots currently holding a live context.
    pub fn occupied_context_slots(&self) -> usize {
        self.allocator.occupied_slots(Pool::Contexts)
    }

    pub fn occupied_object_slots(&self) -> usize {
        self.allocator.occupied_slots(Pool::Objects)
    }

    // ---- Real-time mode ----

    /// Forbid heap placement on the calling thread.
    ///
    /// Returns `true` if the thread was not in real-time mode before.
    pub fn enter_real_time_mode(&self) -> bool {
        self.allocator.enter_real_time()
    }

    /// Returns `true` if the thread was in real-time mode before.
    pub fn leave_real_time_mode(&self) -> bool {
        self.allocator.leave_real_time()
    }

    pub fn is_real_time_mode(&self) -> bool {
        self.allocator.is_real_time()
    }

    // ---- Sizes ----

    /// Largest container payload of an object of `object_type` for `alg`.
    pub fn payload_storage_size(
        &self,
        alg: AlgId,
        object_type: CryptoObjectType,
    ) -> SecurityResult<usize> {
        max_storage_size(alg, object_type)
    }

    /// Largest exported blob for an object of `object_type` and `alg`.
    ///
    /// Secret types are measured in the secured envelope, the others in the
    /// public envelope. `FormatId::Raw` applies to public keys only.
    pub fn serialized_size(
        &self,
        object_type: CryptoObjectType,
        alg: AlgId,
        format: FormatId,
    ) -> SecurityResult<usize> {
        let payload = max_storage_size(alg, object_type)?;
        match format {
            FormatId::Raw if object_type == CryptoObjectType::PublicKey => Ok(alg.key_size()),
            FormatId::Raw => Err(SecurityError::UnsupportedFormat),
            FormatId::Default if object_type.is_secret() => Ok(SECURED_MAGIC_SIZE
                + wrapped_size(false, secured_plain_size(payload))),
            FormatId::Default => Ok(PUBLIC_ENVELOPE_OVERHEAD + payload),
        }
    }

    /// Bytes a context for `alg` occupies in a reserved slot.
    pub fn context_footprint(&self, alg: AlgId) -> SecurityResult<usize> {
        match alg {
            AlgId::Any => Ok(max_context_footprint()),
            other => context_footprint(other),
        }
    }

    // ---- Containers ----

    /// A container living in memory only. Refused in real-time mode.
    ///
    /// A `capacity` of zero sizes the container for any object.
    pub fn alloc_volatile_container(&self, capacity: usize) -> SecurityResult<TrustedContainer> {
        if self.allocator.is_real_time() {
            return Err(SecurityError::BadAlloc);
        }
        let capacity = match capacity {
            0 => max_storage_size_any(),
            n => n,
        };
        debug!(capacity, "volatile container allocated");
        Ok(TrustedContainer::volatile(capacity))
    }

    /// A volatile container sized for the largest of `candidates`.
    pub fn alloc_volatile_container_for(
        &self,
        candidates: &[(AlgId, CryptoObjectType)],
    ) -> SecurityResult<TrustedContainer> {
        if candidates.is_empty() {
            return Err(SecurityError::InvalidArgument);
        }
        let capacity = candidates.iter().try_fold(0usize, |max, (alg, ty)| {
            Ok::<_, SecurityError>(max.max(max_storage_size(*alg, *ty)?))
        })?;
        self.alloc_volatile_container(capacity)
    }

    // ---- Object generation ----

    pub fn generate_symmetric_key(
        &self,
        alg: AlgId,
        usage: AllowedUsage,
        is_session: bool,
        is_exportable: bool,
        index: ReservedObjectIndex,
    ) -> SecurityResult<Placed<SymmetricKey>> {
        let lease = self.place_object(alg, CryptoObjectType::SymmetricKey, index)?;
        let mut material = Zeroizing::new(vec![0u8; alg.key_size()]);
        self.rng.lock().fill(&mut material);
        let header = self
            .new_header(CryptoObjectType::SymmetricKey, alg, usage)
            .session(is_session)
            .exportable(is_exportable);
        let key = SymmetricKey::new(header, material)?;
        debug!(alg = %alg, uid = %header.uid.short_id(), "symmetric key generated");
        Ok(Placed::new(key, lease))
    }

    /// Generate a key pair; the public half is available through
    /// [`PrivateKey::public_key`].
    ///
    /// `params`, if given, must be completed and belong to the same key
    /// family; the key then depends on them.
    pub fn generate_private_key(
        &self,
        alg: AlgId,
        usage: AllowedUsage,
        is_session: bool,
        is_exportable: bool,
        params: Option<&DomainParameters>,
        index: ReservedObjectIndex,
    ) -> SecurityResult<Placed<PrivateKey>> {
        let dependency = params.map(|p| parameters_dependency(p, alg)).transpose()?;
        let lease = self.place_object(alg, CryptoObjectType::PrivateKey, index)?;
        let secret = match alg.key_family() {
            Some(KeyFamily::Edwards25519) => SigningKey::generate().to_secret_bytes(),
            Some(KeyFamily::Montgomery25519) => X25519Secret::generate().to_secret_bytes(),
            _ => return Err(SecurityError::InvalidArgument),
        };
        let header = self
            .new_header(CryptoObjectType::PrivateKey, alg, usage)
            .with_dependency(dependency)
            .session(is_session)
            .exportable(is_exportable);
        let key = PrivateKey::new(header, secret)?;
        debug!(alg = %alg, uid = %header.uid.short_id(), "key pair generated");
        Ok(Placed::new(key, lease))
    }

    /// Generate a random seed sized for `alg`.
    pub fn generate_seed(
        &self,
        alg: AlgId,
        usage: AllowedUsage,
        is_session: bool,
        is_exportable: bool,
        index: ReservedObjectIndex,
    ) -> SecurityResult<Placed<SecretSeed>> {
        let size = seed_size(alg)?;
        let lease = self.place_object(alg, CryptoObjectType::SecretSeed, index)?;
        let mut material = Zeroizing::new(vec![0u8; size]);
        self.rng.lock().fill(&mut material);
        let header = self
            .new_header(CryptoObjectType::SecretSeed, alg, usage)
            .session(is_session)
            .exportable(is_exportable);
        Ok(Placed::new(SecretSeed::new(header, material)?, lease))
    }

    /// Hash `password` with PBKDF2. A random salt is drawn when `salt` is
    /// `None`.
    pub fn create_password_hash(
        &self,
        alg: AlgId,
        password: &[u8],
        salt: Option<&[u8]>,
        iterations: u32,
        index: ReservedObjectIndex,
    ) -> SecurityResult<Placed<PasswordHash>> {
        if iterations == 0 {
            return Err(SecurityError::InvalidArgument);
        }
        let lease = self.place_object(alg, CryptoObjectType::PasswordHash, index)?;
        let salt = match salt {
            Some(salt) => salt.to_vec(),
            None => {
                let mut salt = vec![0u8; DEFAULT_PASSWORD_SALT];
                self.rng.lock().fill(&mut salt);
                salt
            }
        };
        let header = self
            .new_header(CryptoObjectType::PasswordHash, alg, AllowedUsage::empty())
            .exportable(true);
        let hash = PasswordHash::derive(header, password, &salt, iterations)?;
        Ok(Placed::new(hash, lease))
    }

    /// An empty, incomplete parameter set for `alg`.
    pub fn create_domain_parameters(
        &self,
        alg: AlgId,
        is_session: bool,
        is_exportable: bool,
        index: ReservedObjectIndex,
    ) -> SecurityResult<Placed<Arc<DomainParameters>>> {
        let lease = self.place_object(alg, CryptoObjectType::DomainParameters, index)?;
        let params = DomainParameters::new(alg, self.couids.issue(), is_session, is_exportable)?;
        Ok(Placed::new(Arc::new(params), lease))
    }

    /// A well-known parameter set, born completed.
    pub fn known_domain_parameters(
        &self,
        name: &str,
        index: ReservedObjectIndex,
    ) -> SecurityResult<Placed<Arc<DomainParameters>>> {
        let params = DomainParameters::named(name)?;
        let lease = self.place_object(params.alg_id(), CryptoObjectType::DomainParameters, index)?;
        Ok(Placed::new(Arc::new(params), lease))
    }

    /// Wrap an externally computed value as a signature object.
    ///
    /// `value` must have the digest size of `alg`. `key` names the object a
    /// verifier needs, if any.
    pub fn create_signature(
        &self,
        alg: AlgId,
        value: &[u8],
        hash_alg: AlgId,
        key: Option<ObjectDependency>,
        index: ReservedObjectIndex,
    ) -> SecurityResult<Placed<Signature>> {
        let lease = self.place_object(alg, CryptoObjectType::Signature, index)?;
        if value.len() != alg.digest_size() {
            return Err(SecurityError::InvalidInputSize);
        }
        let signature = issue_signature(&self.couids, alg, value.to_vec(), hash_alg, key)?;
        Ok(Placed::new(signature, lease))
    }

    // ---- Loading ----

    /// Load whatever object `container` holds.
    pub fn load_object(
        &self,
        container: &TrustedContainer,
        index: ReservedObjectIndex,
    ) -> SecurityResult<Placed<AnyObject>> {
        let user = container.acquire_usage()?;
        let props = user.props().ok_or(SecurityError::EmptyContainer)?;
        let lease = self.allocator.place(Pool::Objects, index, props.object_size)?;
        let record = user.load_record()?;
        let object = AnyObject::from_record(&record)?;
        debug!(
            object_type = %props.object_type,
            alg = %props.alg_id,
            index = %index,
            "object loaded"
        );
        Ok(Placed::new(object, lease))
    }

    pub fn load_symmetric_key(
        &self,
        container: &TrustedContainer,
        index: ReservedObjectIndex,
    ) -> SecurityResult<Placed<SymmetricKey>> {
        self.load_as(container, CryptoObjectType::SymmetricKey, index)
    }

    pub fn load_private_key(
        &self,
        container: &TrustedContainer,
        index: ReservedObjectIndex,
    ) -> SecurityResult<Placed<PrivateKey>> {
        self.load_as(container, CryptoObjectType::PrivateKey, index)
    }

    pub fn load_public_key(
        &self,
        container: &TrustedContainer,
        index: ReservedObjectIndex,
    ) -> SecurityResult<Placed<PublicKey>> {
        self.load_as(container, CryptoObjectType::PublicKey, index)
    }

    pub fn load_secret_seed(
        &self,
        container: &TrustedContainer,
        index: ReservedObjectIndex,
    ) -> SecurityResult<Placed<SecretSeed>> {
        self.load_as(container, CryptoObjectType::SecretSeed, index)
    }

    pub fn load_signature(
        &self,
        container: &TrustedContainer,
        index: ReservedObjectIndex,
    ) -> SecurityResult<Placed<Signature>> {
        self.load_as(container, CryptoObjectType::Signature, index)
    }

    pub fn load_domain_parameters(
        &self,
        container: &TrustedContainer,
        index: ReservedObjectIndex,
    ) -> SecurityResult<Placed<Arc<DomainParameters>>> {
        self.load_as(container, CryptoObjectType::DomainParameters, index)
    }

    pub fn load_password_hash(
        &self,
        container: &TrustedContainer,
        index: ReservedObjectIndex,
    ) -> SecurityResult<Placed<PasswordHash>> {
        self.load_as(container, CryptoObjectType::PasswordHash, index)
    }

    /// Check the container's type before decoding, then convert.
    fn load_as<T>(
        &self,
        container: &TrustedContainer,
        expected: CryptoObjectType,
        index: ReservedObjectIndex,
    ) -> SecurityResult<Placed<T>>
    where
        T: TryFrom<AnyObject, Error = SecurityError>,
    {
        let props = container.props().ok_or(SecurityError::EmptyContainer)?;
        if props.object_type != expected {
            return Err(SecurityError::bad_object_type(props.object_type, expected));
        }
        let placed = self.load_object(container, index)?;
        let index = placed.index();
        let (object, lease) = placed.into_parts();
        let value = T::try_from(object)?;
        debug!(index = %index, "typed object loaded");
        Ok(Placed::new(value, lease))
    }

    // ---- Context factories ----

    pub fn create_hash_function_ctx(
        &self,
        alg: AlgId,
        index: ReservedContextIndex,
    ) -> SecurityResult<Placed<HashFunctionCtx>> {
        self.place_context(index, || HashFunctionCtx::new(alg, self.objects()))
    }

    /// MAC context; comparisons shorter than the configured minimum are
    /// refused for keys without verification usage.
    pub fn create_message_authn_code_ctx(
        &self,
        alg: AlgId,
        index: ReservedContextIndex,
    ) -> SecurityResult<Placed<MessageAuthnCodeCtx>> {
        self.place_context(index, || {
            MessageAuthnCodeCtx::new(alg, self.objects(), self.config.mac_min_compare_size)
        })
    }

    pub fn create_stream_cipher_ctx(
        &self,
        alg: AlgId,
        index: ReservedContextIndex,
    ) -> SecurityResult<Placed<StreamCipherCtx>> {
        self.place_context(index, || StreamCipherCtx::new(alg))
    }

    /// Authenticated-encryption context. Payload buffering is capped by the
    /// configured `aead_buffer_limit`; short tag comparisons follow the same
    /// minimum as MAC contexts.
    pub fn create_authn_stream_cipher_ctx(
        &self,
        alg: AlgId,
        index: ReservedContextIndex,
    ) -> SecurityResult<Placed<AuthnStreamCipherCtx>> {
        self.place_context(index, || {
            AuthnStreamCipherCtx::new(
                alg,
                self.objects(),
                self.config.mac_min_compare_size,
                self.config.aead_buffer_limit,
            )
        })
    }

    pub fn create_symmetric_key_wrapper_ctx(
        &self,
        alg: AlgId,
        index: ReservedContextIndex,
    ) -> SecurityResult<Placed<SymmetricKeyWrapperCtx>> {
        self.place_context(index, || SymmetricKeyWrapperCtx::new(alg, self.objects()))
    }

    pub fn create_key_derivation_function_ctx(
        &self,
        alg: AlgId,
        index: ReservedContextIndex,
    ) -> SecurityResult<Placed<KeyDerivationFunctionCtx>> {
        self.place_context(index, || KeyDerivationFunctionCtx::new(alg, self.objects()))
    }

    pub fn create_signer_private_ctx(
        &self,
        alg: AlgId,
        index: ReservedContextIndex,
    ) -> SecurityResult<Placed<SignerPrivateCtx>> {
        self.place_context(index, || SignerPrivateCtx::new(alg, self.objects()))
    }

    pub fn create_verifier_public_ctx(
        &self,
        alg: AlgId,
        index: ReservedContextIndex,
    ) -> SecurityResult<Placed<VerifierPublicCtx>> {
        self.place_context(index, || VerifierPublicCtx::new(alg))
    }

    pub fn create_key_agreement_private_ctx(
        &self,
        alg: AlgId,
        index: ReservedContextIndex,
    ) -> SecurityResult<Placed<KeyAgreementPrivateCtx>> {
        self.place_context(index, || KeyAgreementPrivateCtx::new(alg, self.objects()))
    }

    pub fn create_key_encapsulator_public_ctx(
        &self,
        alg: AlgId,
        index: ReservedContextIndex,
    ) -> SecurityResult<Placed<KeyEncapsulatorPublicCtx>> {
        self.place_context(index, || KeyEncapsulatorPublicCtx::new(alg, self.objects()))
    }

    pub fn create_key_decapsulator_private_ctx(
        &self,
        alg: AlgId,
        index: ReservedContextIndex,
    ) -> SecurityResult<Placed<KeyDecapsulatorPrivateCtx>> {
        self.place_context(index, || KeyDecapsulatorPrivateCtx::new(alg, self.objects()))
    }

    pub fn create_random_generator_ctx(
        &self,
        alg: AlgId,
        index: ReservedContextIndex,
    ) -> SecurityResult<Placed<RandomGeneratorCtx>> {
        self.place_context(index, || RandomGeneratorCtx::new(alg))
    }

    // ---- Internal ----

    /// Claim placement for a context, then build it. A failed build
    /// releases the slot again.
    fn place_context<C: CryptoContext>(
        &self,
        index: ReservedContextIndex,
        make: impl FnOnce() -> SecurityResult<C>,
    ) -> SecurityResult<Placed<C>> {
        let lease = self
            .allocator
            .place(Pool::Contexts, index, size_of::<C>())?;
        let ctx = make()?;
        debug!(alg = %ctx.alg_id(), index = %index, "context created");
        Ok(Placed::new(ctx, lease))
    }

    fn place_object(
        &self,
        alg: AlgId,
        object_type: CryptoObjectType,
        index: ReservedObjectIndex,
    ) -> SecurityResult<Option<SlotLease>> {
        self.objects().claim(alg, object_type, index)
    }

    /// Object placement handed to the contexts this provider creates.
    fn objects(&self) -> ObjectFactory {
        ObjectFactory::new(Arc::clone(&self.couids), Arc::clone(&self.allocator))
    }

    pub(crate) fn new_header(
        &self,
        object_type: CryptoObjectType,
        alg: AlgId,
        usage: AllowedUsage,
    ) -> ObjectHeader {
        ObjectHeader::new(object_type, alg)
            .with_uid(self.couids.issue())
            .with_usage(usage)
    }
}

impl std::fmt::Debug for CryptoProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoProvider")
            .field("couid_source", self.couids.source())
            .field("context_slots", &self.reserved_context_slots())
            .field("object_slots", &self.reserved_object_slots())
            .field("real_time", &self.is_real_time_mode())
            .finish()
    }
}

/// Dependency on a completed parameter set of the key's family.
pub(crate) fn parameters_dependency(
    params: &DomainParameters,
    alg: AlgId,
) -> SecurityResult<ObjectDependency> {
    if !params.is_completed() {
        return Err(SecurityError::IncompleteArgState);
    }
    if params.alg_id().key_family() != alg.key_family() {
        return Err(SecurityError::IncompatibleObject);
    }
    params
        .header()
        .as_dependency()
        .ok_or(SecurityError::IncompleteArgState)
}

/// Bytes a context for `alg` occupies.
fn context_footprint(alg: AlgId) -> SecurityResult<usize> {
    let size = match alg.family().ok_or(SecurityError::UnknownIdentifier)? {
        AlgFamily::Hash => size_of::<HashFunctionCtx>(),
        AlgFamily::Mac => size_of::<MessageAuthnCodeCtx>(),
        AlgFamily::StreamCipher => size_of::<StreamCipherCtx>(),
        AlgFamily::AuthnStreamCipher => size_of::<AuthnStreamCipherCtx>(),
        AlgFamily::KeyWrap => size_of::<SymmetricKeyWrapperCtx>(),
        AlgFamily::Kdf => size_of::<KeyDerivationFunctionCtx>(),
        AlgFamily::Signature => size_of::<SignerPrivateCtx>().max(size_of::<VerifierPublicCtx>()),
        AlgFamily::KeyAgreement => size_of::<KeyAgreementPrivateCtx>(),
        AlgFamily::Kem => {
            size_of::<KeyEncapsulatorPublicCtx>().max(size_of::<KeyDecapsulatorPrivateCtx>())
        }
        AlgFamily::Rng => size_of::<RandomGeneratorCtx>(),
        AlgFamily::PasswordHash => return Err(SecurityError::UnknownIdentifier),
    };
    Ok(size)
}

fn max_context_footprint() -> usize {
    AlgId::all()
        .filter_map(|alg| context_footprint(alg).ok())
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{BufferedDigest, StreamStarter};
    use crypt_objects::KeyObject;
    use crypt_types::ReservedIndex;

    fn provider() -> CryptoProvider {
        CryptoProvider::with_defaults()
    }

    #[test]
    fn names_resolve_both_ways() {
        let p = provider();
        let alg = p.convert_to_alg_id("SHA-256").unwrap();
        assert_eq!(alg, AlgId::Sha256);
        assert_eq!(p.convert_to_alg_id(p.convert_to_alg_name(alg)).unwrap(), alg);
        assert_eq!(
            p.convert_to_alg_id("rot13").unwrap_err(),
            SecurityError::UnknownIdentifier
        );
    }

    #[test]
    fn initial_reservations_come_from_config() {
        let p = CryptoProvider::new(ProviderConfig::real_time(3, 2)).unwrap();
        assert_eq!(p.reserved_context_slots(), 3);
        assert_eq!(p.reserved_object_slots(), 2);
    }

    #[test]
    fn inconsistent_config_is_rejected() {
        let config = ProviderConfig {
            mac_min_compare_size: 0,
            ..Default::default()
        };
        assert_eq!(
            CryptoProvider::new(config).unwrap_err(),
            SecurityError::InvalidArgument
        );
    }

    #[test]
    fn context_slot_is_busy_while_context_lives() {
        let p = provider();
        p.reserve_contexts(1).unwrap();
        let slot = ReservedIndex::Slot(0);
        let hash = p.create_hash_function_ctx(AlgId::Sha256, slot).unwrap();
        assert_eq!(hash.index(), slot);
        assert_eq!(p.occupied_context_slots(), 1);
        assert_eq!(
            p.create_hash_function_ctx(AlgId::Sha256, slot).unwrap_err(),
            SecurityError::BusyResource
        );
        drop(hash);
        assert_eq!(p.occupied_context_slots(), 0);
        p.create_hash_function_ctx(AlgId::Blake3, slot).unwrap();
    }

    #[test]
    fn failed_construction_frees_the_slot() {
        let p = provider();
        p.reserve_contexts(1).unwrap();
        assert_eq!(
            p.create_hash_function_ctx(AlgId::Aes128Ctr, ReservedIndex::Slot(0))
                .unwrap_err(),
            SecurityError::InvalidArgument
        );
        assert_eq!(p.occupied_context_slots(), 0);
    }

    #[test]
    fn candidate_lists_size_context_slots() {
        let p = provider();
        p.reserve_contexts_for(&[vec![AlgId::Sha256]]).unwrap();
        assert!(p
            .create_hash_function_ctx(AlgId::Sha512, ReservedIndex::Slot(0))
            .is_ok());

        assert_eq!(
            p.reserve_contexts_for(&[vec![]]).unwrap_err(),
            SecurityError::InvalidArgument
        );
        assert_eq!(
            p.reserve_contexts_for(&[vec![AlgId::None]]).unwrap_err(),
            SecurityError::UnknownIdentifier
        );
        p.reserve_contexts_for(&[vec![AlgId::Any], vec![AlgId::Sha256, AlgId::Ed25519]])
            .unwrap();
        assert_eq!(p.reserved_context_slots(), 2);
    }

    #[test]
    fn object_slot_too_small_for_larger_object() {
        let p = provider();
        p.reserve_objects_for(&[vec![(AlgId::Aes128Gcm, CryptoObjectType::SymmetricKey)]])
            .unwrap();
        let slot = ReservedIndex::Slot(0);
        assert!(p
            .generate_symmetric_key(AlgId::Aes128Gcm, AllowedUsage::empty(), true, false, slot)
            .is_ok());
        assert_eq!(
            p.generate_private_key(
                AlgId::Ed25519,
                AllowedUsage::ALLOW_SIGNATURE,
                true,
                false,
                None,
                slot,
            )
            .unwrap_err(),
            SecurityError::InsufficientResource
        );
        assert_eq!(
            p.reserve_objects_for(&[vec![(AlgId::Sha256, CryptoObjectType::PrivateKey)]])
                .unwrap_err(),
            SecurityError::UnknownIdentifier
        );
    }

    #[test]
    fn real_time_mode_forbids_heap() {
        let p = provider();
        p.reserve_contexts(1).unwrap();
        assert!(p.enter_real_time_mode());
        assert!(p.is_real_time_mode());

        assert_eq!(
            p.create_hash_function_ctx(AlgId::Sha256, ReservedIndex::Heap)
                .unwrap_err(),
            SecurityError::BadAlloc
        );
        assert_eq!(
            p.alloc_volatile_container(0).unwrap_err(),
            SecurityError::BadAlloc
        );
        assert!(p
            .create_hash_function_ctx(AlgId::Sha256, ReservedIndex::Slot(0))
            .is_ok());

        assert!(p.leave_real_time_mode());
        assert!(!p.leave_real_time_mode());
        assert!(p
            .create_hash_function_ctx(AlgId::Sha256, ReservedIndex::Heap)
            .is_ok());
    }

    #[test]
    fn generated_keys_have_identity_and_attributes() {
        let p = provider();
        let key = p
            .generate_symmetric_key(
                AlgId::Aes256Gcm,
                AllowedUsage::ALLOW_DATA_ENCRYPTION,
                false,
                true,
                ReservedIndex::Heap,
            )
            .unwrap();
        assert_eq!(key.key_len(), 32);
        assert!(key.object_id().is_some());
        assert!(key.is_exportable());
        assert!(!key.is_session());

        let other = p
            .generate_symmetric_key(
                AlgId::Aes256Gcm,
                AllowedUsage::empty(),
                true,
                false,
                ReservedIndex::Heap,
            )
            .unwrap();
        assert_ne!(key.material(), other.material());
        let (a, b) = (key.object_id().unwrap(), other.object_id().unwrap());
        assert!(b.has_same_source_as(&a));
        assert!(b.has_later_version_than(&a));
    }

    #[test]
    fn private_keys_pick_up_parameter_dependency() {
        let p = provider();
        let params = p
            .known_domain_parameters("edwards25519", ReservedIndex::Heap)
            .unwrap();
        let key = p
            .generate_private_key(
                AlgId::Ed25519,
                AllowedUsage::ALLOW_SIGNATURE,
                false,
                false,
                Some(&params),
                ReservedIndex::Heap,
            )
            .unwrap();
        let dep = key.dependency().unwrap();
        assert_eq!(dep.object_type, CryptoObjectType::DomainParameters);
        assert_eq!(Some(dep.uid), params.object_id());
        assert_eq!(key.public_key().allowed_usage(), AllowedUsage::ALLOW_VERIFICATION);

        let curve = p
            .known_domain_parameters("curve25519", ReservedIndex::Heap)
            .unwrap();
        assert_eq!(
            p.generate_private_key(
                AlgId::Ed25519,
                AllowedUsage::empty(),
                false,
                false,
                Some(&curve),
                ReservedIndex::Heap,
            )
            .unwrap_err(),
            SecurityError::IncompatibleObject
        );
    }

    #[test]
    fn incomplete_parameters_cannot_back_a_key() {
        let p = provider();
        let params = p
            .create_domain_parameters(AlgId::X25519, false, true, ReservedIndex::Heap)
            .unwrap();
        assert!(params.object_id().is_none());
        assert_eq!(
            p.generate_private_key(
                AlgId::X25519,
                AllowedUsage::empty(),
                false,
                false,
                Some(&params),
                ReservedIndex::Heap,
            )
            .unwrap_err(),
            SecurityError::IncompleteArgState
        );
    }

    #[test]
    fn seeds_and_password_hashes() {
        let p = provider();
        let seed = p
            .generate_seed(
                AlgId::HkdfSha256,
                AllowedUsage::ALLOW_KDF_MATERIAL,
                true,
                false,
                ReservedIndex::Heap,
            )
            .unwrap();
        assert_eq!(seed.len(), 32);

        let hash = p
            .create_password_hash(AlgId::Pbkdf2Sha256, b"hunter2", None, 1000, ReservedIndex::Heap)
            .unwrap();
        assert_eq!(hash.salt().len(), DEFAULT_PASSWORD_SALT);
        assert!(hash.verify(b"hunter2"));
        assert!(!hash.verify(b"hunter3"));
    }

    #[test]
    fn external_signature_value_must_fit() {
        let p = provider();
        let sig = p
            .create_signature(AlgId::Sha256, &[7u8; 32], AlgId::Sha256, None, ReservedIndex::Heap)
            .unwrap();
        assert_eq!(sig.value(), &[7u8; 32]);
        assert_eq!(
            p.create_signature(AlgId::Sha256, &[7u8; 31], AlgId::Sha256, None, ReservedIndex::Heap)
                .unwrap_err(),
            SecurityError::InvalidInputSize
        );
    }

    #[test]
    fn save_and_load_through_volatile_container() {
        let p = provider();
        let key = p
            .generate_symmetric_key(
                AlgId::HmacSha256,
                AllowedUsage::ALLOW_SIGNATURE,
                true,
                false,
                ReservedIndex::Heap,
            )
            .unwrap();
        let container = p.alloc_volatile_container(0).unwrap();
        key.save(&mut container.acquire_ownership().unwrap()).unwrap();

        let loaded = p.load_symmetric_key(&container, ReservedIndex::Heap).unwrap();
        assert_eq!(loaded.material(), key.material());
        assert_eq!(loaded.object_id(), key.object_id());

        assert_eq!(
            p.load_private_key(&container, ReservedIndex::Heap).unwrap_err(),
            SecurityError::bad_object_type(
                CryptoObjectType::SymmetricKey,
                CryptoObjectType::PrivateKey,
            )
        );
        match p.load_object(&container, ReservedIndex::Heap).unwrap().into_inner() {
            AnyObject::SymmetricKey(k) => assert_eq!(k.material(), key.material()),
            other => panic!("unexpected object {other:?}"),
        }
    }

    #[test]
    fn loading_empty_container_fails() {
        let p = provider();
        let container = p.alloc_volatile_container(64).unwrap();
        assert_eq!(
            p.load_object(&container, ReservedIndex::Heap).unwrap_err(),
            SecurityError::EmptyContainer
        );
        assert_eq!(
            p.load_secret_seed(&container, ReservedIndex::Heap).unwrap_err(),
            SecurityError::EmptyContainer
        );
    }

    #[test]
    fn sizes_are_reported() {
        let p = provider();
        let payload = p
            .payload_storage_size(AlgId::Ed25519, CryptoObjectType::PublicKey)
            .unwrap();
        assert_eq!(
            p.serialized_size(CryptoObjectType::PublicKey, AlgId::Ed25519, FormatId::Default)
                .unwrap(),
            payload + PUBLIC_ENVELOPE_OVERHEAD
        );
        assert_eq!(
            p.serialized_size(CryptoObjectType::PublicKey, AlgId::Ed25519, FormatId::Raw)
                .unwrap(),
            32
        );
        assert_eq!(
            p.serialized_size(CryptoObjectType::SymmetricKey, AlgId::Aes128Gcm, FormatId::Raw)
                .unwrap_err(),
            SecurityError::UnsupportedFormat
        );
        let secured = p
            .serialized_size(CryptoObjectType::SymmetricKey, AlgId::Aes128Gcm, FormatId::Default)
            .unwrap();
        assert_eq!(secured % 8, 4);

        let hash = p.context_footprint(AlgId::Sha256).unwrap();
        assert!(hash > 0);
        assert!(p.context_footprint(AlgId::Any).unwrap() >= hash);
        assert_eq!(
            p.context_footprint(AlgId::Pbkdf2Sha256).unwrap_err(),
            SecurityError::UnknownIdentifier
        );
    }

    #[test]
    fn mac_context_uses_configured_minimum() {
        let config = ProviderConfig {
            mac_min_compare_size: 16,
            ..Default::default()
        };
        let p = CryptoProvider::new(config).unwrap();
        let key = p
            .generate_symmetric_key(
                AlgId::HmacSha256,
                AllowedUsage::ALLOW_SIGNATURE,
                true,
                false,
                ReservedIndex::Heap,
            )
            .unwrap();
        let mut mac = p
            .create_message_authn_code_ctx(AlgId::HmacSha256, ReservedIndex::Heap)
            .unwrap();
        mac.set_key(&key).unwrap();
        mac.start(&[]).unwrap();
        mac.update(b"payload").unwrap();
        mac.finish(false).unwrap();
        let mut tag = [0u8; 32];
        mac.get_digest(&mut tag, 0).unwrap();
        assert_eq!(
            mac.compare(&tag[..12], 0).unwrap_err(),
            SecurityError::BruteForceRisk
        );
        assert!(mac.compare(&tag[..16], 0).unwrap());
    }
}
