use std::path::Path;

use crypt_types::FormatId;
use serde::{Deserialize, Serialize};

/// Errors raised while loading a [`ProviderConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read provider configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML text is malformed or has fields of the wrong type.
    #[error("invalid provider configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The values are individually valid but inconsistent.
    #[error("inconsistent provider configuration: {0}")]
    Inconsistent(String),
}

/// Configuration for a [`CryptoProvider`](crate::CryptoProvider).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Upper bound on the bytes reserved across context and object slots.
    pub reservation_budget_bytes: usize,
    /// Upper bound on the number of slots in one reservation table.
    pub max_reserved_slots: usize,
    /// Context slots reserved when the provider is constructed.
    pub initial_context_slots: usize,
    /// Object slots reserved when the provider is constructed.
    pub initial_object_slots: usize,
    /// Shortest expected value a MAC context without verification usage
    /// will compare against.
    pub mac_min_compare_size: usize,
    /// Largest payload an authenticated-encryption session buffers before
    /// its final call.
    pub aead_buffer_limit: usize,
    /// Format used by export helpers when the caller does not pick one.
    pub default_format: FormatId,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            reservation_budget_bytes: 1024 * 1024,
            max_reserved_slots: 256,
            initial_context_slots: 0,
            initial_object_slots: 0,
            mac_min_compare_size: 8,
            aead_buffer_limit: 1024 * 1024,
            default_format: FormatId::Default,
        }
    }
}

impl ProviderConfig {
    /// A configuration for real-time use: `contexts` and `objects` slots are
    /// reserved up front.
    pub fn real_time(contexts: usize, objects: usize) -> Self {
        Self {
            initial_context_slots: contexts,
            initial_object_slots: objects,
            ..Default::default()
        }
    }

    /// Parse a TOML document. Missing fields take their default.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Check cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_context_slots > self.max_reserved_slots
            || self.initial_object_slots > self.max_reserved_slots
        {
            return Err(ConfigError::Inconsistent(format!(
                "initial slots exceed max_reserved_slots ({})",
                self.max_reserved_slots
            )));
        }
        if self.mac_min_compare_size == 0 {
            return Err(ConfigError::Inconsistent(
                "mac_min_compare_size must be at least 1".into(),
            ));
        }
        if self.aead_buffer_limit == 0 {
            return Err(ConfigError::Inconsistent(
                "aead_buffer_limit must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
