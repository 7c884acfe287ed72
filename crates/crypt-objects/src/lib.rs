//! Crypto object model.
//!
//! Every artifact a provider hands out is a [`CryptoObject`]: keys, secret
//! seeds, signatures, domain parameters and password hashes. Objects move
//! between the provider and key storage inside a [`TrustedContainer`] as an
//! encoded [`ObjectRecord`].
//!
//! # Object Types
//!
//! - [`SymmetricKey`], [`PrivateKey`], [`PublicKey`] -- key material with usage flags
//! - [`SecretSeed`] -- opaque secret with counter-style mutators
//! - [`Signature`] -- digest, MAC tag or signature value
//! - [`DomainParameters`] -- two-phase parameter set, shared via `Arc`
//! - [`PasswordHash`] -- salted PBKDF2 hash
//!
//! [`AnyObject`] is the tagged union used wherever the concrete type is only
//! known at runtime.

pub mod any;
pub mod container;
pub mod domain;
pub mod keys;
pub mod object;
pub mod password;
pub mod record;
pub mod seed;
pub mod signature;

pub use any::{AnyObject, Key};
pub use container::{
    ContainerBacking, ContainerOwner, ContainerUser, KeySlotContentProps, TrustedContainer,
};
pub use domain::{DomainParameters, ParameterSpec, KNOWN_SET_NAMES};
pub use keys::{PrivateKey, PublicKey, SymmetricKey};
pub use object::{CryptoObject, Key as KeyObject};
pub use password::PasswordHash;
pub use record::{
    max_storage_size, max_storage_size_any, seed_size, ObjectBody, ObjectDependency,
    ObjectHeader, ObjectRecord,
};
pub use seed::SecretSeed;
pub use signature::Signature;
