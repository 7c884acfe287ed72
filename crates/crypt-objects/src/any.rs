//! Tagged union over every object type.
//!
//! Conversion to a concrete type happens in exactly one place, the
//! `TryFrom<AnyObject>` impls below, and fails with `BadObjectType` carrying
//! the actual and expected discriminants.

use std::sync::Arc;

use crypt_types::{CryptoObjectType, KeyType, SecurityError, SecurityResult};
use zeroize::Zeroizing;

use crate::domain::DomainParameters;
use crate::keys::{PrivateKey, PublicKey, SymmetricKey};
use crate::object::{CryptoObject, Key as KeyObject};
use crate::password::PasswordHash;
use crate::record::{ObjectBody, ObjectHeader, ObjectRecord};
use crate::seed::SecretSeed;
use crate::signature::Signature;

#[derive(Debug)]
pub enum AnyObject {
    DomainParameters(Arc<DomainParameters>),
    SymmetricKey(SymmetricKey),
    PrivateKey(PrivateKey),
    PublicKey(PublicKey),
    Signature(Signature),
    SecretSeed(SecretSeed),
    PasswordHash(PasswordHash),
}

impl AnyObject {
    /// Rebuild the concrete object a record describes.
    ///
    /// Records whose body does not fit their header fail with
    /// `UnexpectedValue`.
    pub fn from_record(record: &ObjectRecord) -> SecurityResult<Self> {
        let header = record.header;
        let malformed = |_| SecurityError::UnexpectedValue;
        let object = match &record.body {
            ObjectBody::SymmetricKey { material } => Self::SymmetricKey(
                SymmetricKey::new(header, Zeroizing::new(material.clone())).map_err(malformed)?,
            ),
            ObjectBody::PrivateKey { secret, public } => {
                let key = PrivateKey::new(header, Zeroizing::new(secret.clone()))
                    .map_err(malformed)?;
                if key.public_material() != public.as_slice() {
                    return Err(SecurityError::UnexpectedValue);
                }
                Self::PrivateKey(key)
            }
            ObjectBody::PublicKey { material } => {
                Self::PublicKey(PublicKey::new(header, material.clone()).map_err(malformed)?)
            }
            ObjectBody::SecretSeed { material } => Self::SecretSeed(
                SecretSeed::new(header, Zeroizing::new(material.clone())).map_err(malformed)?,
            ),
            ObjectBody::Signature { value, hash_alg_id } => Self::Signature(
                Signature::new(header, value.clone(), *hash_alg_id).map_err(malformed)?,
            ),
            ObjectBody::DomainParameters { .. } => Self::DomainParameters(Arc::new(
                DomainParameters::from_record(record).map_err(malformed)?,
            )),
            ObjectBody::PasswordHash {
                salt,
                iterations,
                hash,
            } => Self::PasswordHash(
                PasswordHash::from_parts(header, salt.clone(), *iterations, hash.clone())
                    .map_err(malformed)?,
            ),
        };
        Ok(object)
    }

    pub fn as_object(&self) -> &dyn CryptoObject {
        match self {
            Self::DomainParameters(o) => o.as_ref(),
            Self::SymmetricKey(o) => o,
            Self::PrivateKey(o) => o,
            Self::PublicKey(o) => o,
            Self::Signature(o) => o,
            Self::SecretSeed(o) => o,
            Self::PasswordHash(o) => o,
        }
    }

    pub fn object_type(&self) -> CryptoObjectType {
        self.as_object().object_type()
    }

    pub fn header(&self) -> ObjectHeader {
        self.as_object().header()
    }

    fn mismatch(&self, expected: CryptoObjectType) -> SecurityError {
        SecurityError::bad_object_type(self.object_type(), expected)
    }
}

macro_rules! impl_try_from_any {
    ($ty:ty, $variant:ident) => {
        impl TryFrom<AnyObject> for $ty {
            type Error = SecurityError;

            fn try_from(value: AnyObject) -> SecurityResult<Self> {
                match value {
                    AnyObject::$variant(inner) => Ok(inner),
                    other => Err(other.mismatch(CryptoObjectType::$variant)),
                }
            }
        }

        impl From<$ty> for AnyObject {
            fn from(value: $ty) -> Self {
                AnyObject::$variant(value)
            }
        }
    };
}

impl_try_from_any!(Arc<DomainParameters>, DomainParameters);
impl_try_from_any!(SymmetricKey, SymmetricKey);
impl_try_from_any!(PrivateKey, PrivateKey);
impl_try_from_any!(PublicKey, PublicKey);
impl_try_from_any!(Signature, Signature);
impl_try_from_any!(SecretSeed, SecretSeed);
impl_try_from_any!(PasswordHash, PasswordHash);

/// The three key shapes.
#[derive(Debug)]
pub enum Key {
    Symmetric(SymmetricKey),
    Private(PrivateKey),
    Public(PublicKey),
}

impl Key {
    pub fn key_type(&self) -> KeyType {
        match self {
            Self::Symmetric(_) => KeyType::Symmetric,
            Self::Private(_) => KeyType::Private,
            Self::Public(_) => KeyType::Public,
        }
    }

    pub fn as_key(&self) -> &dyn KeyObject {
        match self {
            Self::Symmetric(k) => k,
            Self::Private(k) => k,
            Self::Public(k) => k,
        }
    }
}

impl TryFrom<AnyObject> for Key {
    type Error = SecurityError;

    fn try_from(value: AnyObject) -> SecurityResult<Self> {
        match value {
            AnyObject::SymmetricKey(k) => Ok(Self::Symmetric(k)),
            AnyObject::PrivateKey(k) => Ok(Self::Private(k)),
            AnyObject::PublicKey(k) => Ok(Self::Public(k)),
            other => Err(other.mismatch(CryptoObjectType::SymmetricKey)),
        }
    }
}
