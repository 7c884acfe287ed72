//! AES block cipher and the two streaming modes built on it.

use aes::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes256};

use crate::error::{PrimitiveError, PrimitiveResult};

/// AES block size in bytes.
pub const AES_BLOCK_SIZE: usize = 16;

/// Keyed AES block permutation.
#[derive(Clone)]
pub enum AesBlock {
    Aes128(Aes128),
    Aes256(Aes256),
}

impl AesBlock {
    /// Key schedule for a 16- or 32-byte key.
    pub fn new(key: &[u8]) -> PrimitiveResult<Self> {
        match key.len() {
            16 => Aes128::new_from_slice(key)
                .map(Self::Aes128)
                .map_err(|_| PrimitiveError::InvalidKeyLength),
            32 => Aes256::new_from_slice(key)
                .map(Self::Aes256)
                .map_err(|_| PrimitiveError::InvalidKeyLength),
            _ => Err(PrimitiveError::InvalidKeyLength),
        }
    }

    pub fn encrypt_block(&self, block: &mut [u8; AES_BLOCK_SIZE]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            Self::Aes128(c) => c.encrypt_block(block),
            Self::Aes256(c) => c.encrypt_block(block),
        }
    }

    pub fn decrypt_block(&self, block: &mut [u8; AES_BLOCK_SIZE]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            Self::Aes128(c) => c.decrypt_block(block),
            Self::Aes256(c) => c.decrypt_block(block),
        }
    }
}

impl std::fmt::Debug for AesBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Aes128(_) => write!(f, "AesBlock(128, <keyed>)"),
            Self::Aes256(_) => write!(f, "AesBlock(256, <keyed>)"),
        }
    }
}

/// CTR keystream with a 128-bit big-endian counter block.
///
/// Bytes may be fed in any split; the keystream position carries across calls.
#[derive(Debug, Clone)]
pub struct CtrKeystream {
    cipher: AesBlock,
    counter: [u8; AES_BLOCK_SIZE],
    pad: [u8; AES_BLOCK_SIZE],
    used: usize,
}

impl CtrKeystream {
    pub fn new(cipher: AesBlock, iv: &[u8]) -> PrimitiveResult<Self> {
        let counter: [u8; AES_BLOCK_SIZE] =
            iv.try_into().map_err(|_| PrimitiveError::InvalidInputLength)?;
        Ok(Self {
            cipher,
            counter,
            pad: [0u8; AES_BLOCK_SIZE],
            used: AES_BLOCK_SIZE,
        })
    }

    /// XOR the keystream into `data` in place.
    pub fn apply(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            if self.used == AES_BLOCK_SIZE {
                self.refill();
            }
            *byte ^= self.pad[self.used];
            self.used += 1;
        }
    }

    fn refill(&mut self) {
        self.pad = self.counter;
        self.cipher.encrypt_block(&mut self.pad);
        let next = u128::from_be_bytes(self.counter).wrapping_add(1);
        self.counter = next.to_be_bytes();
        self.used = 0;
    }
}

/// CBC chaining over whole blocks.
#[derive(Debug, Clone)]
pub struct CbcChain {
    cipher: AesBlock,
    chain: [u8; AES_BLOCK_SIZE],
}

impl CbcChain {
    pub fn new(cipher: AesBlock, iv: &[u8]) -> PrimitiveResult<Self> {
        let chain: [u8; AES_BLOCK_SIZE] =
            iv.try_into().map_err(|_| PrimitiveError::InvalidInputLength)?;
        Ok(Self { cipher, chain })
    }

    /// Encrypt whole blocks in place. `data.len()` must be a block multiple.
    pub fn encrypt_blocks(&mut self, data: &mut [u8]) -> PrimitiveResult<()> {
        if data.len() % AES_BLOCK_SIZE != 0 {
            return Err(PrimitiveError::InvalidInputLength);
        }
        for chunk in data.chunks_exact_mut(AES_BLOCK_SIZE) {
            let mut block = [0u8; AES_BLOCK_SIZE];
            for (i, b) in block.iter_mut().enumerate() {
                *b = chunk[i] ^ self.chain[i];
            }
            self.cipher.encrypt_block(&mut block);
            chunk.copy_from_slice(&block);
            self.chain = block;
        }
        Ok(())
    }

    /// Decrypt whole blocks in place. `data.len()` must be a block multiple.
    pub fn decrypt_blocks(&mut self, data: &mut [u8]) -> PrimitiveResult<()> {
        if data.len() % AES_BLOCK_SIZE != 0 {
            return Err(PrimitiveError::InvalidInputLength);
        }
        for chunk in data.chunks_exact_mut(AES_BLOCK_SIZE) {
            let mut block = [0u8; AES_BLOCK_SIZE];
            block.copy_from_slice(chunk);
            let saved = block;
            self.cipher.decrypt_block(&mut block);
            for (i, b) in block.iter().enumerate() {
                chunk[i] = b ^ self.chain[i];
            }
            self.chain = saved;
        }
        Ok(())
    }
}

/// PKCS#7 pad a trailing partial block (0..16 bytes) into one full block.
pub fn pkcs7_pad(tail: &[u8]) -> PrimitiveResult<[u8; AES_BLOCK_SIZE]> {
    if tail.len() >= AES_BLOCK_SIZE {
        return Err(PrimitiveError::InvalidInputLength);
    }
    let pad = (AES_BLOCK_SIZE - tail.len()) as u8;
    let mut block = [pad; AES_BLOCK_SIZE];
    block[..tail.len()].copy_from_slice(tail);
    Ok(block)
}

/// Length of the plaintext in a decrypted final block after removing PKCS#7 padding.
pub fn pkcs7_unpad(block: &[u8; AES_BLOCK_SIZE]) -> PrimitiveResult<usize> {
    let pad = block[AES_BLOCK_SIZE - 1] as usize;
    if pad == 0 || pad > AES_BLOCK_SIZE {
        return Err(PrimitiveError::IntegrityCheckFailed);
    }
    if block[AES_BLOCK_SIZE - pad..].iter().any(|&b| b as usize != pad) {
        return Err(PrimitiveError::IntegrityCheckFailed);
    }
    Ok(AES_BLOCK_SIZE - pad)
}
