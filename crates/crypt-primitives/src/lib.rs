//! Algorithm backends for the crypto provider.
//!
//! Every transformation the provider exposes bottoms out here. The provider
//! owns the state machines, usage checks and buffer conventions; this crate
//! only runs the math, and all of it wraps established libraries. The one
//! exception is the RFC 3394 / RFC 5649 key-wrap schedule, which is a fixed
//! sequence of AES block operations.

pub mod aead;
pub mod agreement;
pub mod block;
pub mod error;
pub mod hasher;
pub mod kdf;
pub mod keywrap;
pub mod mac;
pub mod rng;
pub mod signer;

pub use aead::{AeadEngine, AEAD_NONCE_SIZE, AEAD_TAG_SIZE};
pub use agreement::{kem_decapsulate, kem_encapsulate, KemEncapsulation, X25519Secret, X25519_SIZE};
pub use block::{pkcs7_pad, pkcs7_unpad, AesBlock, CbcChain, CtrKeystream, AES_BLOCK_SIZE};
pub use error::{PrimitiveError, PrimitiveResult};
pub use hasher::DigestEngine;
pub use kdf::{hkdf_sha256, pbkdf2_sha256};
pub use keywrap::{unwrap_key, wrap_key, wrapped_size, KEY_WRAP_SEMIBLOCK};
pub use mac::MacEngine;
pub use rng::DrbgEngine;
pub use signer::{SigningKey, VerifyingKey, ED25519_KEY_SIZE, SIGNATURE_SIZE};
