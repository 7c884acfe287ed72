use crypt_types::{AlgId, AllowedUsage, CryptoObjectType, CryptoObjectUid, KeyType, SecurityResult};

use crate::container::ContainerOwner;
use crate::record::{ObjectDependency, ObjectHeader, ObjectRecord};

/// Common contract of every object a provider creates.
///
/// Objects are immutable once created, except for the counter-like mutators
/// on secret seeds. Identity (`object_id`) is absent until the object is
/// completed; objects without identity can be neither saved nor exported.
pub trait CryptoObject: Send + Sync + std::fmt::Debug {
    /// Snapshot of the shared attributes.
    fn header(&self) -> ObjectHeader;

    /// Full serializable form.
    fn to_record(&self) -> ObjectRecord;

    fn object_type(&self) -> CryptoObjectType {
        self.header().object_type
    }

    fn alg_id(&self) -> AlgId {
        self.header().alg_id
    }

    /// COUID, or `None` while the object has no identity.
    fn object_id(&self) -> Option<CryptoObjectUid> {
        self.header().uid.non_nil()
    }

    fn dependency(&self) -> Option<ObjectDependency> {
        self.header().dependency
    }

    fn is_session(&self) -> bool {
        self.header().is_session
    }

    fn is_exportable(&self) -> bool {
        self.header().is_exportable
    }

    /// Bytes this object occupies once serialized into a container.
    fn storage_size(&self) -> usize {
        self.to_record().storage_size()
    }

    /// Serialize into a container held with ownership access.
    fn save(&self, container: &mut ContainerOwner<'_>) -> SecurityResult<()> {
        container.store_record(&self.to_record())
    }
}

/// Objects that carry usage restrictions and key material.
pub trait Key: CryptoObject {
    fn key_type(&self) -> KeyType;

    fn allowed_usage(&self) -> AllowedUsage {
        self.header().allowed_usage
    }
}

/// Reject a header whose type is not `expected`.
pub(crate) fn expect_type(
    header: &ObjectHeader,
    expected: CryptoObjectType,
) -> SecurityResult<()> {
    if header.object_type != expected {
        return Err(crypt_types::SecurityError::bad_object_type(
            header.object_type,
            expected,
        ));
    }
    Ok(())
}
