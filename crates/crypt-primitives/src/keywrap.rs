//! AES key wrap (RFC 3394) and key wrap with padding (RFC 5649).

use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::block::{AesBlock, AES_BLOCK_SIZE};
use crate::error::{PrimitiveError, PrimitiveResult};

/// Key-wrap semiblock size; KW input must be a multiple of this.
pub const KEY_WRAP_SEMIBLOCK: usize = 8;

const KW_IV: [u8; 8] = [0xA6; 8];
const KWP_IV_PREFIX: [u8; 4] = [0xA6, 0x59, 0x59, 0xA6];

/// Size of the wrapped output for `len` bytes of key material.
pub fn wrapped_size(padded: bool, len: usize) -> usize {
    if padded {
        len.div_ceil(KEY_WRAP_SEMIBLOCK) * KEY_WRAP_SEMIBLOCK + KEY_WRAP_SEMIBLOCK
    } else {
        len + KEY_WRAP_SEMIBLOCK
    }
}

/// Wrap `data` under `kek`.
///
/// Without padding the input must be at least two semiblocks and aligned to
/// the semiblock size. With padding any non-empty input is accepted.
pub fn wrap_key(kek: &AesBlock, padded: bool, data: &[u8]) -> PrimitiveResult<Vec<u8>> {
    if !padded {
        if data.len() < 2 * KEY_WRAP_SEMIBLOCK || data.len() % KEY_WRAP_SEMIBLOCK != 0 {
            return Err(PrimitiveError::InvalidInputLength);
        }
        return Ok(wrap_semiblocks(kek, KW_IV, data));
    }

    if data.is_empty() || data.len() > u32::MAX as usize {
        return Err(PrimitiveError::InvalidInputLength);
    }
    let mut aiv = [0u8; 8];
    aiv[..4].copy_from_slice(&KWP_IV_PREFIX);
    aiv[4..].copy_from_slice(&(data.len() as u32).to_be_bytes());

    let mut padded_data = Zeroizing::new(vec![0u8; data.len().div_ceil(8) * 8]);
    padded_data[..data.len()].copy_from_slice(data);

    if padded_data.len() == KEY_WRAP_SEMIBLOCK {
        let mut block = [0u8; AES_BLOCK_SIZE];
        block[..8].copy_from_slice(&aiv);
        block[8..].copy_from_slice(&padded_data);
        kek.encrypt_block(&mut block);
        return Ok(block.to_vec());
    }
    Ok(wrap_semiblocks(kek, aiv, &padded_data))
}

/// Unwrap `wrapped` under `kek`, verifying the integrity value.
pub fn unwrap_key(
    kek: &AesBlock,
    padded: bool,
    wrapped: &[u8],
) -> PrimitiveResult<Zeroizing<Vec<u8>>> {
    if wrapped.len() % KEY_WRAP_SEMIBLOCK != 0 {
        return Err(PrimitiveError::InvalidInputLength);
    }

    if !padded {
        if wrapped.len() < 3 * KEY_WRAP_SEMIBLOCK {
            return Err(PrimitiveError::InvalidInputLength);
        }
        let (a, plain) = unwrap_semiblocks(kek, wrapped);
        if !bool::from(a.ct_eq(&KW_IV)) {
            return Err(PrimitiveError::IntegrityCheckFailed);
        }
        return Ok(plain);
    }

    if wrapped.len() < 2 * KEY_WRAP_SEMIBLOCK {
        return Err(PrimitiveError::InvalidInputLength);
    }
    let (a, mut plain) = if wrapped.len() == AES_BLOCK_SIZE {
        let mut block = [0u8; AES_BLOCK_SIZE];
        block.copy_from_slice(wrapped);
        kek.decrypt_block(&mut block);
        let mut a = [0u8; 8];
        a.copy_from_slice(&block[..8]);
        let plain = Zeroizing::new(block[8..].to_vec());
        block.fill(0);
        (a, plain)
    } else {
        unwrap_semiblocks(kek, wrapped)
    };

    let prefix_ok: bool = a[..4].ct_eq(&KWP_IV_PREFIX).into();
    let mli = u32::from_be_bytes([a[4], a[5], a[6], a[7]]) as usize;
    let n = plain.len();
    if !prefix_ok || mli == 0 || mli + KEY_WRAP_SEMIBLOCK <= n || mli > n {
        return Err(PrimitiveError::IntegrityCheckFailed);
    }
    let pad_acc = plain[mli..].iter().fold(0u8, |acc, b| acc | b);
    if pad_acc != 0 {
        return Err(PrimitiveError::IntegrityCheckFailed);
    }
    plain.truncate(mli);
    Ok(plain)
}

fn wrap_semiblocks(kek: &AesBlock, iv: [u8; 8], data: &[u8]) -> Vec<u8> {
    let n = data.len() / KEY_WRAP_SEMIBLOCK;
    let mut out = vec![0u8; data.len() + KEY_WRAP_SEMIBLOCK];
    out[KEY_WRAP_SEMIBLOCK..].copy_from_slice(data);
    let mut a = iv;
    let mut block = [0u8; AES_BLOCK_SIZE];

    for j in 0..6 {
        for i in 1..=n {
            let r = &mut out[i * 8..(i + 1) * 8];
            block[..8].copy_from_slice(&a);
            block[8..].copy_from_slice(r);
            kek.encrypt_block(&mut block);
            let t = ((n * j) + i) as u64;
            for (k, b) in t.to_be_bytes().iter().enumerate() {
                a[k] = block[k] ^ b;
            }
            r.copy_from_slice(&block[8..]);
        }
    }
    block.fill(0);
    out[..8].copy_from_slice(&a);
    out
}

fn unwrap_semiblocks(kek: &AesBlock, wrapped: &[u8]) -> ([u8; 8], Zeroizing<Vec<u8>>) {
    let n = wrapped.len() / KEY_WRAP_SEMIBLOCK - 1;
    let mut a = [0u8; 8];
    a.copy_from_slice(&wrapped[..8]);
    let mut plain = Zeroizing::new(wrapped[8..].to_vec());
    let mut block = [0u8; AES_BLOCK_SIZE];

    for j in (0..6).rev() {
        for i in (1..=n).rev() {
            let t = ((n * j) + i) as u64;
            for (k, b) in t.to_be_bytes().iter().enumerate() {
                block[k] = a[k] ^ b;
            }
            let r = &mut plain[(i - 1) * 8..i * 8];
            block[8..].copy_from_slice(r);
            kek.decrypt_block(&mut block);
            a.copy_from_slice(&block[..8]);
            r.copy_from_slice(&block[8..]);
        }
    }
    block.fill(0);
    (a, plain)
}
