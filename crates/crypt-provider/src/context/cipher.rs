use crypt_objects::{CryptoObject, KeyObject, SymmetricKey};
use crypt_primitives::{pkcs7_pad, pkcs7_unpad, AesBlock, CbcChain, CtrKeystream, AES_BLOCK_SIZE};
use crypt_types::{AlgFamily, AlgId, AllowedUsage, SecurityError, SecurityResult};
use tracing::trace;
use zeroize::Zeroizing;

use super::{
    block_output_size, require_family, require_key_alg, require_usage, validate_iv,
    CryptoContext, CryptoTransform, StreamCipher, StreamStarter, StreamState,
};

#[derive(Clone)]
enum Mode {
    Ctr(CtrKeystream),
    Cbc(CbcChain),
}

struct CipherKey {
    block: AesBlock,
    encrypt: bool,
}

/// AES in CTR (byte-wise) or CBC with PKCS#7 padding (block-wise).
///
/// CBC caches a partial trailing block between calls. When decrypting it
/// also holds back the last whole block, so that padding can be stripped by
/// [`finish_bytes`](StreamCipher::finish_bytes).
pub struct StreamCipherCtx {
    alg: AlgId,
    key: Option<CipherKey>,
    mode: Option<Mode>,
    state: StreamState,
}

impl StreamCipherCtx {
    pub(crate) fn new(alg: AlgId) -> SecurityResult<Self> {
        require_family(alg, AlgFamily::StreamCipher)?;
        Ok(Self {
            alg,
            key: None,
            mode: None,
            state: StreamState::default(),
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
        require_usage(key.allowed_usage(), needed)?;
        self.key = Some(CipherKey {
            block: AesBlock::new(key.material())?,
            encrypt,
        });
        self.mode = None;
        self.state.reset();
        Ok(())
    }

    fn is_cbc(&self) -> bool {
        matches!(self.alg, AlgId::Aes128Cbc | AlgId::Aes256Cbc)
    }

    fn encrypting(&self) -> bool {
        self.key.as_ref().map(|k| k.encrypt).unwrap_or(true)
    }

    fn working_mode(&self) -> SecurityResult<Mode> {
        self.state.require_started()?;
        self.mode.clone().ok_or(SecurityError::ProcessingNotStarted)
    }

    /// Cached bytes followed by `input`.
    fn pending(&self, input: &[u8]) -> Zeroizing<Vec<u8>> {
        let mut data = Zeroizing::new(Vec::with_capacity(self.state.cache.len() + input.len()));
        data.extend_from_slice(&self.state.cache);
        data.extend_from_slice(input);
        data
    }
}

fn apply_blocks(mode: &mut Mode, encrypt: bool, data: &mut [u8]) -> SecurityResult<()> {
    match mode {
        Mode::Ctr(keystream) => keystream.apply(data),
        Mode::Cbc(chain) if encrypt => chain.encrypt_blocks(data)?,
        Mode::Cbc(chain) => chain.decrypt_blocks(data)?,
    }
    Ok(())
}

impl CryptoContext for StreamCipherCtx {
    fn alg_id(&self) -> AlgId {
        self.alg
    }

    fn is_initialized(&self) -> bool {
        self.key.is_some()
    }
}

impl StreamStarter for StreamCipherCtx {
    fn start(&mut self, iv: &[u8]) -> SecurityResult<()> {
        let key = self.key.as_ref().ok_or(SecurityError::UninitializedContext)?;
        validate_iv(self.alg, iv)?;
        let mode = if self.is_cbc() {
            Mode::Cbc(CbcChain::new(key.block.clone(), iv)?)
        } else {
            Mode::Ctr(CtrKeystream::new(key.block.clone(), iv)?)
        };
        self.mode = Some(mode);
        self.state.begin(iv);
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.state.is_started()
    }
}

impl StreamCipher for StreamCipherCtx {
    fn is_bytewise_mode(&self) -> bool {
        !self.is_cbc()
    }

    fn is_direct_transform(&self) -> SecurityResult<bool> {
        self.key
            .as_ref()
            .map(|k| k.encrypt)
            .ok_or(SecurityError::UninitializedContext)
    }

    fn count_bytes_in_cache(&self) -> usize {
        self.state.cache.len()
    }

    fn estimate_required_capacity(&self, input_size: usize, is_final: bool) -> usize {
        block_output_size(
            self.block_size(),
            self.state.cache.len() + input_size,
            is_final,
            self.is_bytewise_mode(),
            self.encrypting(),
        )
    }

    fn estimate_max_input_size(&self, output_capacity: usize) -> usize {
        let block = self.block_size();
        assert!(block != 0, "block size must not be zero");
        if self.is_bytewise_mode() {
            return output_capacity;
        }
        let whole = output_capacity / block * block;
        let headroom = if self.encrypting() { block - 1 } else { block };
        (whole + headroom).saturating_sub(self.state.cache.len())
    }

    fn process_blocks(&mut self, input: &[u8], output: &mut [u8]) -> SecurityResult<usize> {
        let mut mode = self.working_mode()?;
        if self.state.unaligned || !self.state.cache.is_empty() {
            return Err(SecurityError::InvalidUsageOrder);
        }
        if input.len() % self.block_size() != 0 {
            return Err(SecurityError::InvalidInputSize);
        }
        if output.len() < input.len() {
            return Err(SecurityError::InsufficientCapacity {
                required: input.len(),
            });
        }
        let out = &mut output[..input.len()];
        out.copy_from_slice(input);
        apply_blocks(&mut mode, self.encrypting(), out)?;
        self.mode = Some(mode);
        Ok(input.len())
    }

    fn process_bytes(&mut self, input: &[u8], output: &mut [u8]) -> SecurityResult<usize> {
        let mut mode = self.working_mode()?;
        let required = self.estimate_required_capacity(input.len(), false);
        if output.len() < required {
            return Err(SecurityError::InsufficientCapacity { required });
        }
        let data = self.pending(input);
        let out = &mut output[..required];
        out.copy_from_slice(&data[..required]);
        apply_blocks(&mut mode, self.encrypting(), out)?;

        self.mode = Some(mode);
        self.state.cache.clear();
        self.state.cache.extend_from_slice(&data[required..]);
        if input.len() % self.block_size() != 0 {
            self.state.unaligned = true;
        }
        trace!(
            alg = %self.alg,
            input = input.len(),
            output = required,
            cached = self.state.cache.len(),
            "processed bytes"
        );
        Ok(required)
    }

    fn finish_bytes(&mut self, input: &[u8], output: &mut [u8]) -> SecurityResult<usize> {
        let mut mode = self.working_mode()?;
        let encrypt = self.encrypting();
        let mut data = self.pending(input);

        let cbc = matches!(mode, Mode::Cbc(_));
        let produced = match (cbc, encrypt) {
            (false, _) => {
                apply_blocks(&mut mode, encrypt, &mut data)?;
                data.len()
            }
            (true, true) => {
                let whole = data.len() / AES_BLOCK_SIZE * AES_BLOCK_SIZE;
                let pad = pkcs7_pad(&data[whole..])?;
                data.truncate(whole);
                data.extend_from_slice(&pad);
                apply_blocks(&mut mode, encrypt, &mut data)?;
                data.len()
            }
            (true, false) => {
                if data.is_empty() || data.len() % AES_BLOCK_SIZE != 0 {
                    return Err(SecurityError::InvalidInputSize);
                }
                apply_blocks(&mut mode, encrypt, &mut data)?;
                let last_start = data.len() - AES_BLOCK_SIZE;
                let mut last = [0u8; AES_BLOCK_SIZE];
                last.copy_from_slice(&data[last_start..]);
                let kept = pkcs7_unpad(&last).map_err(|_| SecurityError::UnexpectedValue)?;
                last.fill(0);
                last_start + kept
            }
        };

        if output.len() < produced {
            return Err(SecurityError::InsufficientCapacity { required: produced });
        }
        output[..produced].copy_from_slice(&data[..produced]);
        self.mode = Some(mode);
        self.state.finish();
        trace!(alg = %self.alg, output = produced, "finished stream");
        Ok(produced)
    }
}

impl std::fmt::Debug for StreamCipherCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCipherCtx")
            .field("alg", &self.alg)
            .field("keyed", &self.key.is_some())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
