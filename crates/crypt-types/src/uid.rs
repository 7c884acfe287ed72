use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Crypto Object Unique Identifier (COUID).
///
/// A COUID names the *source* that produced an object (`generator_uid`) and a
/// monotonically increasing `version_stamp` within that source. The nil COUID
/// (both parts zero) means "not yet assigned".
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CryptoObjectUid {
    generator_uid: Uuid,
    version_stamp: u64,
}

impl CryptoObjectUid {
    /// The nil COUID. Represents "no identity".
    pub const fn nil() -> Self {
        Self {
            generator_uid: Uuid::nil(),
            version_stamp: 0,
        }
    }

    /// Create from explicit parts.
    pub const fn new(generator_uid: Uuid, version_stamp: u64) -> Self {
        Self {
            generator_uid,
            version_stamp,
        }
    }

    /// Deterministic COUID for a well-known name (e.g. a named parameter set).
    pub fn from_name(name: &str) -> Self {
        Self {
            generator_uid: Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()),
            version_stamp: 1,
        }
    }

    /// Returns `true` if this is the nil COUID.
    pub fn is_nil(&self) -> bool {
        self.generator_uid.is_nil() && self.version_stamp == 0
    }

    /// The generator (source) part.
    pub fn generator_uid(&self) -> &Uuid {
        &self.generator_uid
    }

    /// The version part.
    pub fn version_stamp(&self) -> u64 {
        self.version_stamp
    }

    /// Returns `true` if both identifiers were produced by the same source.
    pub fn has_same_source_as(&self, other: &Self) -> bool {
        self.generator_uid == other.generator_uid
    }

    /// Returns `true` if `self` is a later version from the same source.
    pub fn has_later_version_than(&self, other: &Self) -> bool {
        self.has_same_source_as(other) && self.version_stamp > other.version_stamp
    }

    /// `None` for the nil COUID, `Some(self)` otherwise.
    pub fn non_nil(self) -> Option<Self> {
        if self.is_nil() {
            None
        } else {
            Some(self)
        }
    }

    /// Short representation (first 8 hex characters of the source + version).
    pub fn short_id(&self) -> String {
        format!(
            "{}:{}",
            hex::encode(&self.generator_uid.as_bytes()[..4]),
            self.version_stamp
        )
    }
}

impl Default for CryptoObjectUid {
    fn default() -> Self {
        Self::nil()
    }
}

impl fmt::Debug for CryptoObjectUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CryptoObjectUid({})", self.short_id())
    }
}

impl fmt::Display for CryptoObjectUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.generator_uid, self.version_stamp)
    }
}

/// Issues COUIDs for one source.
///
/// Version stamps start at 1 so that an issued COUID is never nil.
#[derive(Debug)]
pub struct CouidGenerator {
    source: Uuid,
    next: AtomicU64,
}

impl CouidGenerator {
    /// A generator for an explicit source identifier.
    pub fn new(source: Uuid) -> Self {
        Self {
            source,
            next: AtomicU64::new(1),
        }
    }

    /// A generator with a fresh, time-ordered source identifier (UUID v7).
    pub fn fresh() -> Self {
        Self::new(Uuid::now_v7())
    }

    /// The source identifier stamped into every COUID.
    pub fn source(&self) -> &Uuid {
        &self.source
    }

    /// Issue the next COUID.
    pub fn issue(&self) -> CryptoObjectUid {
        let stamp = self.next.fetch_add(1, Ordering::Relaxed);
        CryptoObjectUid::new(self.source, stamp)
    }
}
