use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{PrimitiveError, PrimitiveResult};

/// HKDF-SHA-256 extract-and-expand.
pub fn hkdf_sha256(
    ikm: &[u8],
    salt: &[u8],
    info: &[u8],
    out_len: usize,
) -> PrimitiveResult<Zeroizing<Vec<u8>>> {
    let salt = if salt.is_empty() { None } else { Some(salt) };
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    let mut okm = Zeroizing::new(vec![0u8; out_len]);
    hk.expand(info, &mut okm)
        .map_err(|_| PrimitiveError::OutputTooLong)?;
    Ok(okm)
}

/// PBKDF2-HMAC-SHA-256.
pub fn pbkdf2_sha256(
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    out_len: usize,
) -> PrimitiveResult<Zeroizing<Vec<u8>>> {
    if iterations == 0 {
        return Err(PrimitiveError::InvalidInputLength);
    }
    let mut out = Zeroizing::new(vec![0u8; out_len]);
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 5869 test case 1.
    #[test]
    fn hkdf_known_answer() {
        let ikm = [0x0bu8; 22];
        let salt = hex::decode("000102030405060708090a0b0c").unwrap();
        let info = hex::decode("f0f1f2f3f4f5f6f7f8f9").unwrap();
        let okm = hkdf_sha256(&ikm, &salt, &info, 42).unwrap();
        assert_eq!(
            hex::encode(&*okm),
            "3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf34007208d5b887185865"
        );
    }

    #[test]
    fn hkdf_rejects_oversized_output() {
        assert_eq!(
            hkdf_sha256(b"ikm", b"", b"", 255 * 32 + 1).unwrap_err(),
            PrimitiveError::OutputTooLong
        );
    }

    #[test]
    fn pbkdf2_is_deterministic_and_salted() {
        let a = pbkdf2_sha256(b"password", b"salt", 2, 32).unwrap();
        let b = pbkdf2_sha256(b"password", b"salt", 2, 32).unwrap();
        let c = pbkdf2_sha256(b"password", b"pepper", 2, 32).unwrap();
        assert_eq!(*a, *b);
        assert_ne!(*a, *c);
    }

    // RFC 7914 section 11, first PBKDF2-HMAC-SHA-256 vector.
    #[test]
    fn pbkdf2_known_answer() {
        let out = pbkdf2_sha256(b"passwd", b"salt", 1, 64).unwrap();
        assert_eq!(
            hex::encode(&out[..16]),
            "55ac046e56e3089fec1691c22544b605"
        );
    }

    #[test]
    fn pbkdf2_rejects_zero_iterations() {
        assert!(pbkdf2_sha256(b"p", b"s", 0, 16).is_err());
    }
}
