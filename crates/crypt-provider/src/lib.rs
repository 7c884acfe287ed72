//! Crypto provider: the trusted environment behind every key operation.
//!
//! A [`CryptoProvider`] creates transformation contexts and crypto objects,
//! places them into heap memory or pre-reserved slots, and moves objects
//! across the trust boundary through [`TrustedContainer`]s.
//!
//! # Quick Start
//!
//! ```rust
//! use crypt_provider::{BufferedDigest, CryptoProvider, StreamStarter};
//! use crypt_types::{AlgId, ReservedIndex};
//!
//! let provider = CryptoProvider::with_defaults();
//! let mut hash = provider
//!     .create_hash_function_ctx(AlgId::Sha256, ReservedIndex::Heap)
//!     .unwrap();
//! hash.start(&[]).unwrap();
//! hash.update(b"hello").unwrap();
//! hash.finish(false).unwrap();
//!
//! let mut digest = [0u8; 32];
//! assert_eq!(hash.get_digest(&mut digest, 0).unwrap(), 32);
//! ```
//!
//! # Real-time use
//!
//! Reserve slots up front, then switch the thread into real-time mode. Heap
//! placement then fails with `BadAlloc`; reserved slots keep working.
//!
//! [`TrustedContainer`]: crypt_objects::TrustedContainer

pub mod allocator;
pub mod config;
pub mod context;
pub mod provider;
pub mod transport;

// Re-exports for convenience.
pub use allocator::Placed;
pub use config::{ConfigError, ProviderConfig};
pub use context::{
    AuthnStreamCipherCtx, BufferedDigest, CryptoContext, CryptoTransform, HashFunctionCtx,
    KeyAgreementPrivateCtx, KeyDecapsulatorPrivateCtx, KeyDerivationFunctionCtx,
    KeyEncapsulatorPublicCtx, MessageAuthnCodeCtx, RandomGeneratorCtx, SecretMaterial,
    SignerPrivateCtx, StreamCipher, StreamCipherCtx, StreamStarter, SymmetricKeyWrapperCtx,
    VerifierPublicCtx,
};
pub use provider::{CryptoProvider, DEFAULT_PASSWORD_SALT};

#[cfg(test)]
mod tests {
    use super::*;
    use crypt_keys::{InMemoryKeyStorage, KeyStorageProvider, SlotSpec};
    use crypt_objects::{CryptoObject, KeyObject};
    use crypt_types::{AlgId, AllowedUsage, CryptoObjectType, ReservedIndex, SecurityError};

    const HEAP: ReservedIndex = ReservedIndex::Heap;

    // -----------------------------------------------------------------------
    // 1. Hash digest fits a buffer of exactly the digest size
    // -----------------------------------------------------------------------
    #[test]
    fn hash_digest_into_exact_buffer() {
        let provider = CryptoProvider::with_defaults();
        let mut hash = provider
            .create_hash_function_ctx(AlgId::Sha512, HEAP)
            .unwrap();
        hash.start(&[]).unwrap();
        hash.update(b"abc").unwrap();
        hash.finish(false).unwrap();

        let mut out = vec![0u8; hash.digest_size()];
        assert_eq!(hash.get_digest(&mut out, 0).unwrap(), hash.digest_size());
        assert!(out.iter().any(|&b| b != 0));
        assert_eq!(hash.get_digest(&mut out, hash.digest_size()).unwrap(), 0);
    }

    // -----------------------------------------------------------------------
    // 2. MAC signature object needs signature usage
    // -----------------------------------------------------------------------
    #[test]
    fn mac_signature_object_needs_signature_usage() {
        let provider = CryptoProvider::with_defaults();
        let key = provider
            .generate_symmetric_key(
                AlgId::HmacSha256,
                AllowedUsage::ALLOW_VERIFICATION,
                true,
                false,
                HEAP,
            )
            .unwrap();
        let mut mac = provider
            .create_message_authn_code_ctx(AlgId::HmacSha256, HEAP)
            .unwrap();
        mac.set_key(&key).unwrap();
        mac.start(&[]).unwrap();
        mac.update(b"message").unwrap();
        assert_eq!(mac.finish(true).unwrap_err(), SecurityError::UsageViolation);
    }

    // -----------------------------------------------------------------------
    // 3. Encapsulation into a short buffer produces no seed
    // -----------------------------------------------------------------------
    #[test]
    fn encapsulation_into_short_buffer() {
        let provider = CryptoProvider::with_defaults();
        let recipient = provider
            .generate_private_key(
                AlgId::X25519Kem,
                AllowedUsage::ALLOW_KEY_AGREEMENT,
                true,
                false,
                None,
                HEAP,
            )
            .unwrap();
        let mut kem = provider
            .create_key_encapsulator_public_ctx(AlgId::X25519Kem, HEAP)
            .unwrap();
        kem.set_key(&recipient.public_key()).unwrap();

        let mut out = vec![0u8; kem.encapsulated_size() - 1];
        assert_eq!(
            kem.encapsulate_seed(&mut out, AllowedUsage::ALLOW_KDF_MATERIAL, HEAP)
                .unwrap_err(),
            SecurityError::InsufficientCapacity {
                required: kem.encapsulated_size()
            }
        );
        assert!(out.iter().all(|&b| b == 0));
    }

    // -----------------------------------------------------------------------
    // 4. Heap request in real-time mode is BadAlloc, not resource exhaustion
    // -----------------------------------------------------------------------
    #[test]
    fn heap_request_in_real_time_mode() {
        let provider = CryptoProvider::with_defaults();
        provider.reserve_contexts(5).unwrap();
        provider.enter_real_time_mode();

        let held: Vec<_> = (0..5)
            .map(|i| {
                provider
                    .create_hash_function_ctx(AlgId::Sha256, ReservedIndex::Slot(i))
                    .unwrap()
            })
            .collect();
        assert_eq!(provider.occupied_context_slots(), 5);

        assert_eq!(
            provider
                .create_hash_function_ctx(AlgId::Sha256, HEAP)
                .unwrap_err(),
            SecurityError::BadAlloc
        );
        assert_eq!(
            provider
                .create_hash_function_ctx(AlgId::Sha256, ReservedIndex::Slot(5))
                .unwrap_err(),
            SecurityError::UnreservedResource
        );
        assert_eq!(
            provider
                .create_hash_function_ctx(AlgId::Sha256, ReservedIndex::Slot(0))
                .unwrap_err(),
            SecurityError::BusyResource
        );

        drop(held);
        provider.leave_real_time_mode();
    }

    // -----------------------------------------------------------------------
    // 5. Secured export of a non-exportable session object writes nothing
    // -----------------------------------------------------------------------
    #[test]
    fn secured_export_of_session_object() {
        let provider = CryptoProvider::with_defaults();
        let kek = provider
            .generate_symmetric_key(
                AlgId::Aes128Kw,
                AllowedUsage::ALLOW_KEY_EXPORTING,
                true,
                false,
                HEAP,
            )
            .unwrap();
        let mut transport = provider
            .create_symmetric_key_wrapper_ctx(AlgId::Aes128Kw, HEAP)
            .unwrap();
        transport.set_key(&kek, CryptoTransform::Wrap).unwrap();

        let session = provider
            .generate_seed(AlgId::HkdfSha256, AllowedUsage::ALLOW_KDF_MATERIAL, true, false, HEAP)
            .unwrap();
        let mut out = vec![0u8; 512];
        assert!(provider
            .export_secured_object(&*session, &transport, &mut out)
            .is_err());
        assert!(out.iter().all(|&b| b == 0));
    }

    // -----------------------------------------------------------------------
    // 6. Objects persist through a key storage slot
    // -----------------------------------------------------------------------
    #[test]
    fn objects_persist_through_key_storage() {
        let provider = CryptoProvider::with_defaults();
        let storage = InMemoryKeyStorage::new();
        let capacity = provider
            .payload_storage_size(AlgId::Ed25519, CryptoObjectType::PrivateKey)
            .unwrap();
        storage
            .provision_slot(1, SlotSpec::new(capacity).for_type(CryptoObjectType::PrivateKey))
            .unwrap();

        let key = provider
            .generate_private_key(
                AlgId::Ed25519,
                AllowedUsage::ALLOW_SIGNATURE,
                false,
                false,
                None,
                HEAP,
            )
            .unwrap();
        {
            let container = storage.open_as_owner(1).unwrap();
            key.save(&mut container.acquire_ownership().unwrap()).unwrap();
        }
        let uid = key.object_id().unwrap();
        assert_eq!(
            storage
                .find_object(CryptoObjectType::PrivateKey, &uid)
                .unwrap(),
            Some(1)
        );

        let container = storage.open_as_user(1).unwrap();
        let loaded = provider.load_private_key(&container, HEAP).unwrap();
        let mut signer = provider
            .create_signer_private_ctx(AlgId::Ed25519, HEAP)
            .unwrap();
        signer.set_key(&loaded).unwrap();
        let mut verifier = provider
            .create_verifier_public_ctx(AlgId::Ed25519, HEAP)
            .unwrap();
        verifier.set_key(&key.public_key()).unwrap();

        let signature = signer.sign(b"firmware image", HEAP).unwrap();
        assert!(verifier.verify(b"firmware image", &signature).unwrap());
    }

    // -----------------------------------------------------------------------
    // 7. Session objects never reach persistent storage
    // -----------------------------------------------------------------------
    #[test]
    fn session_objects_stay_volatile() {
        let provider = CryptoProvider::with_defaults();
        let storage = InMemoryKeyStorage::new();
        storage.provision_slot(2, SlotSpec::new(256)).unwrap();
        let key = provider
            .generate_symmetric_key(AlgId::Aes256Gcm, AllowedUsage::empty(), true, false, HEAP)
            .unwrap();
        let container = storage.open_as_owner(2).unwrap();
        assert_eq!(
            key.save(&mut container.acquire_ownership().unwrap())
                .unwrap_err(),
            SecurityError::ContentRestrictions
        );
        assert!(container.is_empty());
    }

    // -----------------------------------------------------------------------
    // 8. Key agreement feeds an AEAD channel
    // -----------------------------------------------------------------------
    #[test]
    fn agreed_key_protects_a_message() {
        let provider = CryptoProvider::with_defaults();
        let generate = || {
            provider
                .generate_private_key(
                    AlgId::X25519,
                    AllowedUsage::ALLOW_KEY_AGREEMENT,
                    true,
                    false,
                    None,
                    HEAP,
                )
                .unwrap()
        };
        let (alice, bob) = (generate(), generate());
        let agree = |own: &crypt_objects::PrivateKey, peer: &crypt_objects::PublicKey| {
            let mut ctx = provider
                .create_key_agreement_private_ctx(AlgId::X25519, HEAP)
                .unwrap();
            ctx.set_key(own).unwrap();
            ctx.agree_key(
                peer,
                AlgId::ChaCha20Poly1305,
                AllowedUsage::ALLOW_DATA_ENCRYPTION | AllowedUsage::ALLOW_DATA_DECRYPTION,
                b"",
                b"channel",
                HEAP,
            )
            .unwrap()
        };
        let sender_key = agree(&alice, &bob.public_key());
        let receiver_key = agree(&bob, &alice.public_key());
        assert!(sender_key.is_session());

        let nonce = [3u8; 12];
        let mut seal = provider
            .create_authn_stream_cipher_ctx(AlgId::ChaCha20Poly1305, HEAP)
            .unwrap();
        seal.set_key(&sender_key, CryptoTransform::Encrypt).unwrap();
        seal.start(&nonce).unwrap();
        seal.update_associated_data(b"hdr").unwrap();
        let mut sealed = vec![0u8; seal.estimate_required_capacity(5, true)];
        let n = seal.finish_bytes(b"hello", &mut sealed).unwrap();

        let mut open = provider
            .create_authn_stream_cipher_ctx(AlgId::ChaCha20Poly1305, HEAP)
            .unwrap();
        open.set_key(&receiver_key, CryptoTransform::Decrypt).unwrap();
        open.start(&nonce).unwrap();
        open.update_associated_data(b"hdr").unwrap();
        let mut plain = vec![0u8; 5];
        assert_eq!(open.finish_bytes(&sealed[..n], &mut plain).unwrap(), 5);
        assert_eq!(&plain, b"hello");
    }

    // -----------------------------------------------------------------------
    // 9. Derived keys stay within the source's derived usage
    // -----------------------------------------------------------------------
    #[test]
    fn kdf_respects_derived_usage() {
        let provider = CryptoProvider::with_defaults();
        let seed = provider
            .generate_seed(
                AlgId::HkdfSha256,
                AllowedUsage::ALLOW_KDF_MATERIAL | AllowedUsage::ALLOW_DERIVED_SIGNATURE,
                true,
                false,
                HEAP,
            )
            .unwrap();
        let mut kdf = provider
            .create_key_derivation_function_ctx(AlgId::HkdfSha256, HEAP)
            .unwrap();
        kdf.set_source_key_material(&*seed).unwrap();
        kdf.add_salt(b"salt");

        let mac_key = kdf
            .derive_key(
                AlgId::HmacSha256,
                AllowedUsage::ALLOW_SIGNATURE,
                b"mac",
                true,
                false,
                HEAP,
            )
            .unwrap();
        assert_eq!(mac_key.allowed_usage(), AllowedUsage::ALLOW_SIGNATURE);
        assert_eq!(
            kdf.derive_key(
                AlgId::Aes128Ctr,
                AllowedUsage::ALLOW_DATA_ENCRYPTION,
                b"enc",
                true,
                false,
                HEAP,
            )
            .unwrap_err(),
            SecurityError::UsageViolation
        );
    }

    // -----------------------------------------------------------------------
    // 10. Context-produced objects obey real-time placement
    // -----------------------------------------------------------------------
    #[test]
    fn context_products_in_real_time_mode() {
        let provider = CryptoProvider::with_defaults();
        let seed = provider
            .generate_seed(
                AlgId::HkdfSha256,
                AllowedUsage::ALLOW_KDF_MATERIAL | AllowedUsage::ALLOW_DERIVED_DATA_ENCRYPTION,
                true,
                false,
                HEAP,
            )
            .unwrap();
        provider.reserve_contexts(2).unwrap();
        provider
            .reserve_objects_for(&[vec![(AlgId::Aes256Gcm, CryptoObjectType::SymmetricKey)]])
            .unwrap();
        assert!(provider.enter_real_time_mode());

        let mut kdf = provider
            .create_key_derivation_function_ctx(AlgId::HkdfSha256, ReservedIndex::Slot(0))
            .unwrap();
        kdf.set_source_key_material(&*seed).unwrap();
        let usage = AllowedUsage::ALLOW_DATA_ENCRYPTION;
        assert_eq!(
            kdf.derive_key(AlgId::Aes256Gcm, usage, b"frame", true, false, HEAP)
                .unwrap_err(),
            SecurityError::BadAlloc
        );
        assert_eq!(provider.occupied_object_slots(), 0);

        let key = kdf
            .derive_key(AlgId::Aes256Gcm, usage, b"frame", true, false, ReservedIndex::Slot(0))
            .unwrap();
        assert_eq!(key.index(), ReservedIndex::Slot(0));
        assert_eq!(provider.occupied_object_slots(), 1);
        assert_eq!(
            kdf.derive_key(AlgId::Aes256Gcm, usage, b"next", true, false, ReservedIndex::Slot(0))
                .unwrap_err(),
            SecurityError::BusyResource
        );

        // the derived key drives a reserved AEAD context without touching the heap
        let mut seal = provider
            .create_authn_stream_cipher_ctx(AlgId::Aes256Gcm, ReservedIndex::Slot(1))
            .unwrap();
        seal.set_key(&key, CryptoTransform::Encrypt).unwrap();
        assert_eq!(seal.reserve_payload(16).unwrap_err(), SecurityError::BadAlloc);
        seal.start(&[9u8; 12]).unwrap();
        assert_eq!(
            seal.process_bytes(b"sample", &mut []).unwrap_err(),
            SecurityError::BadAlloc
        );
        assert_eq!(
            seal.finish(true).unwrap_err(),
            SecurityError::UsageViolation
        );

        drop(key);
        assert_eq!(provider.occupied_object_slots(), 0);
        assert!(provider.leave_real_time_mode());
    }
}
