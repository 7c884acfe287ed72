use serde::{Deserialize, Serialize};

/// Serialization format selector for public export/import.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatId {
    /// Self-describing envelope: header, metadata and payload.
    #[default]
    Default,
    /// Bare key material without metadata.
    Raw,
}

/// Number of a persistent key slot in a key storage provider.
pub type SlotNumber = u32;
