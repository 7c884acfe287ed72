//! Foundation types for the crypto provider.
//!
//! This crate provides the identifiers, flags and error taxonomy shared by
//! every other crate in the workspace. It carries no cryptography of its own.
//!
//! # Key Types
//!
//! - [`AlgId`] -- Closed registry of supported algorithms with their geometry
//! - [`CryptoObjectUid`] -- Persistent identity (COUID) of a completed object
//! - [`CryptoObjectType`] / [`KeyType`] -- Object discriminants
//! - [`AllowedUsage`] -- Usage restriction flags checked by every context
//! - [`ReservedIndex`] -- Heap sentinel or reserved-slot placement
//! - [`SecurityError`] -- Flat, enumerated failure taxonomy

pub mod alg;
pub mod error;
pub mod format;
pub mod mem_region;
pub mod object_type;
pub mod reserved;
pub mod uid;
pub mod usage;

pub use alg::{AlgFamily, AlgId, KeyFamily};
pub use error::{SecurityError, SecurityResult};
pub use format::{FormatId, SlotNumber};
pub use mem_region::{fill_to_vec, ReadOnlyMemRegion, ReadWriteMemRegion};
pub use object_type::{CryptoObjectType, KeyType};
pub use reserved::{ReservedContextIndex, ReservedIndex, ReservedObjectIndex};
pub use uid::{CouidGenerator, CryptoObjectUid};
pub use usage::AllowedUsage;
