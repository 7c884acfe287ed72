use std::fmt;

use serde::{Deserialize, Serialize};

/// Discriminant of every object a provider can create, store or exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CryptoObjectType {
    /// Named or anonymous algorithm parameter set.
    DomainParameters,
    /// Secret key of a symmetric algorithm.
    SymmetricKey,
    /// Private half of an asymmetric key pair.
    PrivateKey,
    /// Public half of an asymmetric key pair.
    PublicKey,
    /// Digest, MAC or signature value.
    Signature,
    /// Algorithm-opaque secret bit sequence.
    SecretSeed,
    /// Salted password hash.
    PasswordHash,
}

impl CryptoObjectType {
    /// Stable 16-bit code, used when packing error support data.
    pub fn code(&self) -> u16 {
        match self {
            Self::DomainParameters => 1,
            Self::SymmetricKey => 2,
            Self::PrivateKey => 3,
            Self::PublicKey => 4,
            Self::Signature => 5,
            Self::SecretSeed => 6,
            Self::PasswordHash => 7,
        }
    }

    /// Returns `true` for types whose payload must never leave the provider
    /// unwrapped.
    pub fn is_secret(&self) -> bool {
        matches!(
            self,
            Self::SymmetricKey | Self::PrivateKey | Self::SecretSeed | Self::PasswordHash
        )
    }
}

impl fmt::Display for CryptoObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DomainParameters => write!(f, "domain-parameters"),
            Self::SymmetricKey => write!(f, "symmetric-key"),
            Self::PrivateKey => write!(f, "private-key"),
            Self::PublicKey => write!(f, "public-key"),
            Self::Signature => write!(f, "signature"),
            Self::SecretSeed => write!(f, "secret-seed"),
            Self::PasswordHash => write!(f, "password-hash"),
        }
    }
}

/// The three key shapes a [`CryptoObjectType`] key object can take.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    Symmetric,
    Private,
    Public,
}

impl KeyType {
    /// The object type corresponding to this key type.
    pub fn object_type(&self) -> CryptoObjectType {
        match self {
            Self::Symmetric => CryptoObjectType::SymmetricKey,
            Self::Private => CryptoObjectType::PrivateKey,
            Self::Public => CryptoObjectType::PublicKey,
        }
    }
}
