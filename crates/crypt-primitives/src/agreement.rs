//! X25519 key agreement and the ephemeral-static KEM built on it.

use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::error::{PrimitiveError, PrimitiveResult};
use crate::kdf::hkdf_sha256;

/// Size of X25519 scalars, public keys and shared secrets.
pub const X25519_SIZE: usize = 32;

const KEM_DOMAIN: &[u8] = b"crypt.x25519-kem.v1";

/// X25519 private scalar.
pub struct X25519Secret(StaticSecret);

impl X25519Secret {
    pub fn generate() -> Self {
        Self(StaticSecret::random_from_rng(OsRng))
    }

    pub fn from_slice(bytes: &[u8]) -> PrimitiveResult<Self> {
        let arr: [u8; X25519_SIZE] = bytes
            .try_into()
            .map_err(|_| PrimitiveError::InvalidKeyLength)?;
        Ok(Self(StaticSecret::from(arr)))
    }

    pub fn public_key(&self) -> [u8; X25519_SIZE] {
        PublicKey::from(&self.0).to_bytes()
    }

    /// Copy of the raw scalar.
    pub fn to_secret_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.0.to_bytes().to_vec())
    }

    /// Raw Diffie-Hellman with a peer public key.
    ///
    /// Fails on low-order peer points that would yield an all-zero secret.
    pub fn agree(&self, peer_public: &[u8]) -> PrimitiveResult<Zeroizing<Vec<u8>>> {
        let peer = parse_public(peer_public)?;
        let shared = self.0.diffie_hellman(&peer);
        if !shared.was_contributory() {
            return Err(PrimitiveError::InvalidKey);
        }
        Ok(Zeroizing::new(shared.as_bytes().to_vec()))
    }
}

impl std::fmt::Debug for X25519Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "X25519Secret(<redacted>)")
    }
}

/// Result of a KEM encapsulation.
pub struct KemEncapsulation {
    /// Ephemeral public key sent to the recipient.
    pub encapsulated: [u8; X25519_SIZE],
    /// Shared seed known to both sides.
    pub shared_seed: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for KemEncapsulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KemEncapsulation")
            .field("encapsulated", &hex::encode(self.encapsulated))
            .field("shared_seed", &"<redacted>")
            .finish()
    }
}

/// Encapsulate a fresh shared seed for `recipient_public`.
pub fn kem_encapsulate(recipient_public: &[u8]) -> PrimitiveResult<KemEncapsulation> {
    let ephemeral = X25519Secret::generate();
    let encapsulated = ephemeral.public_key();
    let shared = ephemeral.agree(recipient_public)?;
    let shared_seed = kem_seed(&shared, &encapsulated, recipient_public)?;
    Ok(KemEncapsulation {
        encapsulated,
        shared_seed,
    })
}

/// Recover the shared seed from an encapsulated value.
pub fn kem_decapsulate(
    recipient: &X25519Secret,
    encapsulated: &[u8],
) -> PrimitiveResult<Zeroizing<Vec<u8>>> {
    if encapsulated.len() != X25519_SIZE {
        return Err(PrimitiveError::InvalidInputLength);
    }
    let shared = recipient.agree(encapsulated)?;
    kem_seed(&shared, encapsulated, &recipient.public_key())
}

fn kem_seed(
    shared: &[u8],
    encapsulated: &[u8],
    recipient_public: &[u8],
) -> PrimitiveResult<Zeroizing<Vec<u8>>> {
    let mut info = Vec::with_capacity(KEM_DOMAIN.len() + 2 * X25519_SIZE);
    info.extend_from_slice(KEM_DOMAIN);
    info.extend_from_slice(encapsulated);
    info.extend_from_slice(recipient_public);
    hkdf_sha256(shared, &[], &info, X25519_SIZE)
}

fn parse_public(bytes: &[u8]) -> PrimitiveResult<PublicKey> {
    let arr: [u8; X25519_SIZE] = bytes
        .try_into()
        .map_err(|_| PrimitiveError::InvalidKeyLength)?;
    Ok(PublicKey::from(arr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_sides_agree() {
        let alice = X25519Secret::generate();
        let bob = X25519Secret::generate();
        let ab = alice.agree(&bob.public_key()).unwrap();
        let ba = bob.agree(&alice.public_key()).unwrap();
        assert_eq!(*ab, *ba);
    }

    #[test]
    fn low_order_point_is_rejected() {
        let alice = X25519Secret::generate();
        assert_eq!(
            alice.agree(&[0u8; 32]).unwrap_err(),
            PrimitiveError::InvalidKey
        );
    }

    #[test]
    fn kem_roundtrip() {
        let recipient = X25519Secret::generate();
        let enc = kem_encapsulate(&recipient.public_key()).unwrap();
        let seed = kem_decapsulate(&recipient, &enc.encapsulated).unwrap();
        assert_eq!(*seed, *enc.shared_seed);
        assert_eq!(seed.len(), X25519_SIZE);
    }

    #[test]
    fn kem_wrong_recipient_gets_different_seed() {
        let recipient = X25519Secret::generate();
        let other = X25519Secret::generate();
        let enc = kem_encapsulate(&recipient.public_key()).unwrap();
        let seed = kem_decapsulate(&other, &enc.encapsulated).unwrap();
        assert_ne!(*seed, *enc.shared_seed);
    }

    #[test]
    fn secret_roundtrips_through_bytes() {
        let secret = X25519Secret::generate();
        let restored = X25519Secret::from_slice(&secret.to_secret_bytes()).unwrap();
        assert_eq!(secret.public_key(), restored.public_key());
    }
}
