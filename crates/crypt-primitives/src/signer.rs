use zeroize::Zeroizing;

use crate::error::{PrimitiveError, PrimitiveResult};

/// Size of an Ed25519 signature in bytes.
pub const SIGNATURE_SIZE: usize = 64;

/// Size of Ed25519 secret and public key material in bytes.
pub const ED25519_KEY_SIZE: usize = 32;

/// Ed25519 signing key (private).
pub struct SigningKey(ed25519_dalek::SigningKey);

/// Ed25519 verifying key (public).
#[derive(Clone, PartialEq, Eq)]
pub struct VerifyingKey(ed25519_dalek::VerifyingKey);

impl SigningKey {
    /// Generate a new random signing key.
    pub fn generate() -> Self {
        let mut csprng = rand::thread_rng();
        Self(ed25519_dalek::SigningKey::generate(&mut csprng))
    }

    /// Create from a raw 32-byte secret.
    pub fn from_slice(bytes: &[u8]) -> PrimitiveResult<Self> {
        let arr: [u8; ED25519_KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| PrimitiveError::InvalidKeyLength)?;
        Ok(Self(ed25519_dalek::SigningKey::from_bytes(&arr)))
    }

    /// The corresponding public verifying key.
    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey(self.0.verifying_key())
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
        use ed25519_dalek::Signer;
        self.0.sign(message).to_bytes()
    }

    /// Copy of the raw secret.
    pub fn to_secret_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.0.to_bytes().to_vec())
    }
}

impl VerifyingKey {
    /// Create from a raw 32-byte public key.
    pub fn from_slice(bytes: &[u8]) -> PrimitiveResult<Self> {
        let arr: [u8; ED25519_KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| PrimitiveError::InvalidKeyLength)?;
        let key =
            ed25519_dalek::VerifyingKey::from_bytes(&arr).map_err(|_| PrimitiveError::InvalidKey)?;
        Ok(Self(key))
    }

    /// Verify a signature on a message.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> PrimitiveResult<()> {
        use ed25519_dalek::Verifier;
        let arr: [u8; SIGNATURE_SIZE] = signature
            .try_into()
            .map_err(|_| PrimitiveError::InvalidSignature)?;
        let sig = ed25519_dalek::Signature::from_bytes(&arr);
        self.0
            .verify(message, &sig)
            .map_err(|_| PrimitiveError::InvalidSignature)
    }

    /// Raw public key bytes.
    pub fn to_bytes(&self) -> [u8; ED25519_KEY_SIZE] {
        self.0.to_bytes()
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKey(<redacted>)")
    }
}

impl std::fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VerifyingKey({})", hex::encode(self.0.to_bytes()))
    }
}
