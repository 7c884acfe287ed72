//! Key storage for the crypto provider.
//!
//! A key storage provider (KSP) owns a set of numbered key slots. Each
//! provisioned slot is backed by one persistent [`TrustedContainer`]; the
//! provider writes objects into it through the container's ownership guard
//! and the container reports every change back to the KSP.
//!
//! # Backends
//!
//! All backends implement the [`KeyStorageProvider`] trait:
//!
//! - [`InMemoryKeyStorage`] -- `HashMap`-based slots for tests and embedding
//!
//! # Rules
//!
//! 1. A slot must be provisioned before it can be opened.
//! 2. The pair (object type, COUID) is unique across all slots.
//! 3. Session objects never reach a slot.
//! 4. The KSP never decodes payloads; it keeps only the content metadata.
//!
//! [`TrustedContainer`]: crypt_objects::TrustedContainer

pub mod memory;
pub mod slot;
pub mod traits;

pub use memory::InMemoryKeyStorage;
pub use slot::{SlotInfo, SlotSpec};
pub use traits::KeyStorageProvider;
