use crypt_objects::{CryptoObject, KeyObject, ObjectDependency, Signature, SymmetricKey};
use crypt_primitives::{AeadEngine, AEAD_TAG_SIZE};
use crypt_types::{
    AlgFamily, AlgId, AllowedUsage, CryptoObjectType, ReservedObjectIndex, SecurityError,
    SecurityResult,
};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::{
    claim_signature, compare_digest, copy_digest, issue_signature, require_family,
    require_key_alg, require_usage, validate_iv, BufferedDigest, CryptoContext, CryptoTransform,
    StreamCipher, StreamStarter, StreamState,
};
use crate::allocator::{ObjectFactory, Placed};

struct AeadKey {
    engine: AeadEngine,
    encrypt: bool,
    usage: AllowedUsage,
    dependency: Option<ObjectDependency>,
}

/// Authenticated encryption (AES-GCM, ChaCha20-Poly1305).
///
/// Associated data goes through [`BufferedDigest::update`] and must precede
/// the payload. Payload is buffered and released by
/// [`finish_bytes`](StreamCipher::finish_bytes): encryption emits
/// `ciphertext || tag`, decryption expects the same layout and releases
/// plaintext only after the tag verified.
///
/// The payload buffer holds at most the configured limit. In real-time mode
/// it never grows; size it beforehand with
/// [`reserve_payload`](Self::reserve_payload).
///
/// Packaging an associated-data tag as a signature requires
/// `ALLOW_SIGNATURE`; comparisons shorter than the configured minimum
/// require `ALLOW_VERIFICATION`.
pub struct AuthnStreamCipherCtx {
    alg: AlgId,
    objects: ObjectFactory,
    min_compare: usize,
    buffer_limit: usize,
    key: Option<AeadKey>,
    state: StreamState,
    aad: Vec<u8>,
    payload: Zeroizing<Vec<u8>>,
    tag: Option<[u8; AEAD_TAG_SIZE]>,
}

impl AuthnStreamCipherCtx {
    pub(crate) fn new(
        alg: AlgId,
        objects: ObjectFactory,
        min_compare: usize,
        buffer_limit: usize,
    ) -> SecurityResult<Self> {
        require_family(alg, AlgFamily::AuthnStreamCipher)?;
        Ok(Self {
            alg,
            objects,
            min_compare,
            buffer_limit,
            key: None,
            state: StreamState::default(),
            aad: Vec::new(),
            payload: Zeroizing::new(Vec::new()),
            tag: None,
        })
    }

    /// Load a key for `Encrypt` or `Decrypt`.
    pub fn set_key(
        &mut self,
        key: &SymmetricKey,
        transform: CryptoTransform,
    ) -> SecurityResult<()> {
        require_key_alg(self.alg, key.alg_id())?;
        let (needed, encrypt) = match transform {
            CryptoTransform::Encrypt => (AllowedUsage::ALLOW_DATA_ENCRYPTION, true),
            CryptoTransform::Decrypt => (AllowedUsage::ALLOW_DATA_DECRYPTION, false),
            _ => return Err(SecurityError::InvalidArgument),
        };
        let usage = key.allowed_usage();
        require_usage(usage, needed)?;
        self.key = Some(AeadKey {
            engine: AeadEngine::new(self.alg, key.material())?,
            encrypt,
            usage,
            dependency: key
                .object_id()
                .map(|uid| ObjectDependency::new(uid, CryptoObjectType::SymmetricKey)),
        });
        self.clear_session();
        self.state.reset();
        Ok(())
    }

    /// Feed associated data. Refused once payload was supplied.
    pub fn update_associated_data(&mut self, data: &[u8]) -> SecurityResult<()> {
        self.state.require_started()?;
        if !self.payload.is_empty() {
            return Err(SecurityError::InvalidUsageOrder);
        }
        self.aad.extend_from_slice(data);
        Ok(())
    }

    /// Size the payload buffer for `total` bytes so that later sessions
    /// buffer without allocating. The buffer keeps its size across sessions.
    ///
    /// Fails with `InsufficientResource` above the configured limit and with
    /// `BadAlloc` when growth is needed in real-time mode.
    pub fn reserve_payload(&mut self, total: usize) -> SecurityResult<()> {
        if total > self.buffer_limit {
            return Err(SecurityError::InsufficientResource);
        }
        if total > self.payload.capacity() {
            if self.objects.is_real_time() {
                return Err(SecurityError::BadAlloc);
            }
            self.grow_payload(total);
        }
        Ok(())
    }

    /// Largest payload one session may buffer.
    pub fn payload_limit(&self) -> usize {
        self.buffer_limit
    }

    fn key(&self) -> SecurityResult<&AeadKey> {
        self.key.as_ref().ok_or(SecurityError::UninitializedContext)
    }

    fn encrypting(&self) -> bool {
        self.key.as_ref().map(|k| k.encrypt).unwrap_or(true)
    }

    fn clear_session(&mut self) {
        self.aad.clear();
        self.payload.clear();
        self.tag = None;
    }

    /// Append to the buffered payload within the configured limit.
    fn buffer_payload(&mut self, input: &[u8]) -> SecurityResult<()> {
        let needed = self.payload.len().saturating_add(input.len());
        if needed > self.buffer_limit {
            warn!(
                alg = %self.alg,
                needed,
                limit = self.buffer_limit,
                "authenticated payload exceeds buffer limit"
            );
            return Err(SecurityError::InsufficientResource);
        }
        if needed > self.payload.capacity() {
            if self.objects.is_real_time() {
                debug!(alg = %self.alg, needed, "payload growth refused in real-time mode");
                return Err(SecurityError::BadAlloc);
            }
            self.grow_payload(needed);
        }
        self.payload.extend_from_slice(input);
        Ok(())
    }

    /// Move the payload into a larger buffer; the old one is wiped on drop.
    fn grow_payload(&mut self, needed: usize) {
        let capacity = needed
            .max(self.payload.capacity().saturating_mul(2))
            .min(self.buffer_limit);
        let mut grown = Zeroizing::new(Vec::with_capacity(capacity));
        grown.extend_from_slice(&self.payload);
        self.payload = grown;
    }

    fn finished_tag(&self) -> SecurityResult<&[u8]> {
        self.state.require_finished()?;
        self.tag
            .as_ref()
            .map(|t| t.as_slice())
            .ok_or(SecurityError::ProcessingNotFinished)
    }
}

impl CryptoContext for AuthnStreamCipherCtx {
    fn alg_id(&self) -> AlgId {
        self.alg
    }

    fn is_initialized(&self) -> bool {
        self.key.is_some()
    }
}

impl StreamStarter for AuthnStreamCipherCtx {
    fn start(&mut self, iv: &[u8]) -> SecurityResult<()> {
        self.key()?;
        validate_iv(self.alg, iv)?;
        self.clear_session();
        self.state.begin(iv);
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.state.is_started()
    }
}

impl StreamCipher for AuthnStreamCipherCtx {
    fn is_bytewise_mode(&self) -> bool {
        true
    }

    fn is_direct_transform(&self) -> SecurityResult<bool> {
        Ok(self.key()?.encrypt)
    }

    /// Buffered payload, never more than [`payload_limit`](Self::payload_limit).
    fn count_bytes_in_cache(&self) -> usize {
        self.payload.len()
    }

    fn estimate_required_capacity(&self, input_size: usize, is_final: bool) -> usize {
        if !is_final {
            return 0;
        }
        let total = self.payload.len() + input_size;
        if self.encrypting() {
            total + AEAD_TAG_SIZE
        } else {
            total.saturating_sub(AEAD_TAG_SIZE)
        }
    }

    /// Sized for the final call, where the output materialises, and capped
    /// by the room left in the payload buffer.
    fn estimate_max_input_size(&self, output_capacity: usize) -> usize {
        let pending = self.payload.len();
        let by_output = if self.encrypting() {
            output_capacity.saturating_sub(AEAD_TAG_SIZE + pending)
        } else {
            (output_capacity + AEAD_TAG_SIZE).saturating_sub(pending)
        };
        by_output.min(self.buffer_limit.saturating_sub(pending))
    }

    fn process_blocks(&mut self, input: &[u8], output: &mut [u8]) -> SecurityResult<usize> {
        self.process_bytes(input, output)
    }

    /// Buffer payload; nothing is released before the final call.
    ///
    /// Fails with `InsufficientResource` past the payload limit and, in
    /// real-time mode, with `BadAlloc` past the reserved buffer.
    fn process_bytes(&mut self, input: &[u8], _output: &mut [u8]) -> SecurityResult<usize> {
        self.state.require_started()?;
        self.buffer_payload(input)?;
        Ok(0)
    }

    /// Seal or open the buffered payload plus `input` in place.
    ///
    /// A rejected tag ends the session.
    fn finish_bytes(&mut self, input: &[u8], output: &mut [u8]) -> SecurityResult<usize> {
        self.state.require_started()?;
        let encrypt = self.key()?.encrypt;
        let total = self.payload.len().saturating_add(input.len());
        let required = if encrypt {
            total + AEAD_TAG_SIZE
        } else if total < AEAD_TAG_SIZE {
            return Err(SecurityError::InvalidInputSize);
        } else {
            total - AEAD_TAG_SIZE
        };
        if output.len() < required {
            return Err(SecurityError::InsufficientCapacity { required });
        }
        self.buffer_payload(input)?;

        let key = self.key.as_ref().ok_or(SecurityError::UninitializedContext)?;
        let nonce = self.state.iv.as_slice();
        let sealed = if encrypt {
            key.engine
                .seal(nonce, &self.aad, &mut self.payload)
                .map(|tag| {
                    output[..total].copy_from_slice(&self.payload);
                    output[total..required].copy_from_slice(&tag);
                    tag
                })
                .map_err(SecurityError::from)
        } else {
            let mut tag = [0u8; AEAD_TAG_SIZE];
            tag.copy_from_slice(&self.payload[required..]);
            match key
                .engine
                .open(nonce, &self.aad, &mut self.payload[..required], &tag)
            {
                Ok(()) => {
                    output[..required].copy_from_slice(&self.payload[..required]);
                    Ok(tag)
                }
                Err(err) => {
                    warn!(alg = %self.alg, "authentication tag rejected");
                    Err(err.into())
                }
            }
        };

        let tag = match sealed {
            Ok(tag) => tag,
            Err(err) => {
                self.clear_session();
                self.state.reset();
                return Err(err);
            }
        };
        self.payload.clear();
        self.tag = Some(tag);
        self.state.finish();
        debug!(alg = %self.alg, output = required, "authenticated stream finished");
        Ok(required)
    }
}

impl BufferedDigest for AuthnStreamCipherCtx {
    fn update(&mut self, data: &[u8]) -> SecurityResult<()> {
        self.update_associated_data(data)
    }

    /// Authenticate associated data only.
    ///
    /// Fails with `InvalidUsageOrder` once payload was supplied; such
    /// sessions end with [`finish_bytes`](StreamCipher::finish_bytes).
    fn finish_into(
        &mut self,
        signature: Option<ReservedObjectIndex>,
    ) -> SecurityResult<Option<Placed<Signature>>> {
        self.state.require_started()?;
        if !self.payload.is_empty() {
            return Err(SecurityError::InvalidUsageOrder);
        }
        let key = self.key()?;
        if signature.is_some() {
            require_usage(key.usage, AllowedUsage::ALLOW_SIGNATURE)?;
        }
        let claimed = claim_signature(&self.objects, self.alg, signature)?;
        let dependency = key.dependency;
        let tag = key.engine.seal(&self.state.iv, &self.aad, &mut [])?;
        self.tag = Some(tag);
        self.state.finish();

        claimed
            .map(|lease| {
                let couids = self.objects.couids();
                issue_signature(couids, self.alg, tag.to_vec(), AlgId::None, dependency)
                    .map(|sig| Placed::new(sig, lease))
            })
            .transpose()
    }

    fn get_digest(&self, out: &mut [u8], offset: usize) -> SecurityResult<usize> {
        Ok(copy_digest(self.finished_tag()?, out, offset))
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
        if expected.alg_id() != self.alg {
            return Err(SecurityError::IncompatibleObject);
        }
        Ok(tag.ct_eq(expected.value()).into())
    }
}

impl std::fmt::Debug for AuthnStreamCipherCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthnStreamCipherCtx")
            .field("alg", &self.alg)
            .field("keyed", &self.key.is_some())
            .field("state", &self.state)
            .field("aad_len", &self.aad.len())
            .finish_non_exhaustive()
    }
}
