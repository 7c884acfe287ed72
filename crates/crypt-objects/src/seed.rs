use crypt_types::{CryptoObjectType, CryptoObjectUid, SecurityError, SecurityResult};
use zeroize::Zeroizing;

use crate::object::{expect_type, CryptoObject};
use crate::record::{ObjectBody, ObjectHeader, ObjectRecord};

/// Algorithm-opaque secret bit sequence.
///
/// The material doubles as a big-endian counter: `next` and `jump` move it
/// forward or backward modulo `2^(8 * len)`. Seeds of different lengths only
/// interact through their common leading bytes.
pub struct SecretSeed {
    header: ObjectHeader,
    material: Zeroizing<Vec<u8>>,
}

impl SecretSeed {
    pub fn new(header: ObjectHeader, material: Zeroizing<Vec<u8>>) -> SecurityResult<Self> {
        expect_type(&header, CryptoObjectType::SecretSeed)?;
        if material.is_empty() {
            return Err(SecurityError::InvalidInputSize);
        }
        Ok(Self { header, material })
    }

    /// Raw seed bytes.
    pub fn material(&self) -> &[u8] {
        &self.material
    }

    pub fn len(&self) -> usize {
        self.material.len()
    }

    pub fn is_empty(&self) -> bool {
        self.material.is_empty()
    }

    /// Advance the counter by one.
    pub fn next(&mut self) {
        self.jump(1);
    }

    /// Move the counter by `steps`, wrapping at either end.
    pub fn jump(&mut self, steps: i64) {
        if steps >= 0 {
            add_be(&mut self.material, steps.unsigned_abs());
        } else {
            sub_be(&mut self.material, steps.unsigned_abs());
        }
    }

    /// Set this seed to `from` moved by `steps`.
    ///
    /// Only the common leading bytes are copied from `from`; trailing bytes of
    /// a longer `self` keep their value before the jump is applied.
    pub fn jump_from(&mut self, from: &SecretSeed, steps: i64) {
        let n = self.len().min(from.len());
        self.material[..n].copy_from_slice(&from.material[..n]);
        self.jump(steps);
    }

    /// XOR `other` into the common leading bytes.
    pub fn xor(&mut self, other: &SecretSeed) {
        self.xor_bytes(&other.material);
    }

    /// XOR raw bytes into the common leading bytes.
    pub fn xor_bytes(&mut self, other: &[u8]) {
        for (dst, src) in self.material.iter_mut().zip(other) {
            *dst ^= src;
        }
    }

    /// Session, non-exportable copy, optionally XORed with `xor_delta`.
    ///
    /// The copy has no identity of its own.
    pub fn clone_seed(&self, xor_delta: Option<&SecretSeed>) -> SecretSeed {
        let header = self
            .header
            .with_uid(CryptoObjectUid::nil())
            .session(true)
            .exportable(false);
        let mut copy = SecretSeed {
            header,
            material: self.material.clone(),
        };
        if let Some(delta) = xor_delta {
            copy.xor(delta);
        }
        copy
    }
}

fn add_be(counter: &mut [u8], mut value: u64) {
    let mut carry = 0u16;
    for byte in counter.iter_mut().rev() {
        if value == 0 && carry == 0 {
            break;
        }
        let sum = *byte as u16 + (value & 0xFF) as u16 + carry;
        *byte = sum as u8;
        carry = sum >> 8;
        value >>= 8;
    }
}

fn sub_be(counter: &mut [u8], mut value: u64) {
    let mut borrow = 0i16;
    for byte in counter.iter_mut().rev() {
        if value == 0 && borrow == 0 {
            break;
        }
        let mut diff = *byte as i16 - (value & 0xFF) as i16 - borrow;
        borrow = 0;
        if diff < 0 {
            diff += 256;
            borrow = 1;
        }
        *byte = diff as u8;
        value >>= 8;
    }
}

impl CryptoObject for SecretSeed {
    fn header(&self) -> ObjectHeader {
        self.header
    }

    fn to_record(&self) -> ObjectRecord {
        ObjectRecord::new(
            self.header,
            ObjectBody::SecretSeed {
                material: self.material.to_vec(),
            },
        )
    }
}

impl std::fmt::Debug for SecretSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretSeed")
            .field("alg", &self.header.alg_id)
            .field("len", &self.material.len())
            .field("material", &"<redacted>")
            .finish()
    }
}
