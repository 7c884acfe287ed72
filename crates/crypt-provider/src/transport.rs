//! Moving objects across the trust boundary.
//!
//! Three envelopes are supported:
//!
//! - secured: `b"CPSX"` followed by the key wrap of
//!   `u64-LE length | record | zero padding`; needs a transport key
//! - public: `b"CPPB" | u32-LE length | u32-LE CRC-32 | record`; refused for
//!   secret objects
//! - raw: bare key material, for bootstrapping keys produced elsewhere
//!
//! Exports write nothing until every check has passed; calling with an
//! empty output buffer returns the required size.

use crypt_objects::record::{is_asymmetric_alg, is_symmetric_alg};
use crypt_objects::{
    seed_size, AnyObject, CryptoObject, DomainParameters, ObjectBody, ObjectRecord, PrivateKey,
    PublicKey, SecretSeed, SymmetricKey, TrustedContainer,
};
use crypt_primitives::KEY_WRAP_SEMIBLOCK;
use crypt_types::{
    AlgId, AllowedUsage, CryptoObjectType, CryptoObjectUid, FormatId, SecurityError,
    SecurityResult,
};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::context::{CryptoContext, SymmetricKeyWrapperCtx};
use crate::provider::{
    parameters_dependency, secured_plain_size, CryptoProvider, PUBLIC_ENVELOPE_OVERHEAD,
    SECURED_MAGIC_SIZE,
};

const SECURED_MAGIC: &[u8; 4] = b"CPSX";
const PUBLIC_MAGIC: &[u8; 4] = b"CPPB";

impl CryptoProvider {
    // ---- Secured export / import ----

    /// Export an exportable, completed object wrapped under the transport
    /// key loaded into `transport`.
    pub fn export_secured_object(
        &self,
        object: &dyn CryptoObject,
        transport: &SymmetricKeyWrapperCtx,
        out: &mut [u8],
    ) -> SecurityResult<usize> {
        self.export_secured_record(&object.to_record(), transport, out)
    }

    /// Export the object held by `container` without loading it.
    pub fn export_secured_container(
        &self,
        container: &TrustedContainer,
        transport: &SymmetricKeyWrapperCtx,
        out: &mut [u8],
    ) -> SecurityResult<usize> {
        let record = container.acquire_usage()?.load_record()?;
        self.export_secured_record(&record, transport, out)
    }

    fn export_secured_record(
        &self,
        record: &ObjectRecord,
        transport: &SymmetricKeyWrapperCtx,
        out: &mut [u8],
    ) -> SecurityResult<usize> {
        check_transport(transport, true)?;
        let header = &record.header;
        if !header.is_exportable {
            warn!(
                object_type = %header.object_type,
                uid = %header.uid.short_id(),
                "secured export of non-exportable object refused"
            );
            return Err(SecurityError::IncompatibleObject);
        }
        if header.uid.is_nil() {
            return Err(SecurityError::IncompleteArgState);
        }

        let encoded = Zeroizing::new(record.encode()?);
        let plain_len = secured_plain_size(encoded.len());
        let required = SECURED_MAGIC_SIZE + transport.calculate_wrapped_key_size(plain_len);
        if out.is_empty() {
            return Ok(required);
        }
        if out.len() < required {
            return Err(SecurityError::InsufficientCapacity { required });
        }

        let mut plain = Zeroizing::new(Vec::with_capacity(plain_len));
        plain.extend_from_slice(&(encoded.len() as u64).to_le_bytes());
        plain.extend_from_slice(&encoded);
        plain.resize(plain_len, 0);
        let wrapped = transport.wrap_bytes(&plain)?;

        out[..SECURED_MAGIC_SIZE].copy_from_slice(SECURED_MAGIC);
        out[SECURED_MAGIC_SIZE..required].copy_from_slice(&wrapped);
        info!(
            object_type = %header.object_type,
            uid = %header.uid.short_id(),
            transport = %transport.alg_id(),
            size = required,
            "object exported (secured)"
        );
        Ok(required)
    }

    /// Unwrap a secured blob and store the object into `container`.
    ///
    /// `is_exportable` replaces the exportability recorded in the blob. When
    /// `expected` is given, any other object type fails with
    /// `BadObjectType`.
    pub fn import_secured_object(
        &self,
        container: &TrustedContainer,
        serialized: &[u8],
        transport: &SymmetricKeyWrapperCtx,
        is_exportable: bool,
        expected: Option<CryptoObjectType>,
    ) -> SecurityResult<()> {
        check_transport(transport, false)?;
        let wrapped = serialized
            .strip_prefix(SECURED_MAGIC.as_slice())
            .ok_or(SecurityError::UnexpectedValue)?;
        if wrapped.len() < 2 * KEY_WRAP_SEMIBLOCK {
            return Err(SecurityError::UnexpectedValue);
        }
        let plain = transport.unwrap_bytes(wrapped)?;
        let mut record = decode_secured(&plain)?;
        check_expected(&record, expected)?;
        AnyObject::from_record(&record)?;

        record.header.is_exportable = is_exportable;
        container.acquire_ownership()?.store_record(&record)?;
        info!(
            object_type = %record.header.object_type,
            uid = %record.header.uid.short_id(),
            is_exportable,
            "object imported (secured)"
        );
        Ok(())
    }

    // ---- Public export / import ----

    /// Export a non-secret object in the configured default format.
    pub fn export_public_object(
        &self,
        object: &dyn CryptoObject,
        out: &mut [u8],
    ) -> SecurityResult<usize> {
        self.export_public_object_as(object, self.config().default_format, out)
    }

    /// Export a non-secret object in `format`.
    ///
    /// Secret objects fail with `UnexpectedValue`. `FormatId::Raw` writes
    /// the bare material of a public key.
    pub fn export_public_object_as(
        &self,
        object: &dyn CryptoObject,
        format: FormatId,
        out: &mut [u8],
    ) -> SecurityResult<usize> {
        self.export_public_record(&object.to_record(), format, out)
    }

    /// Export the non-secret object held by `container`.
    pub fn export_public(
        &self,
        container: &TrustedContainer,
        format: FormatId,
        out: &mut [u8],
    ) -> SecurityResult<usize> {
        let record = container.acquire_usage()?.load_record()?;
        self.export_public_record(&record, format, out)
    }

    fn export_public_record(
        &self,
        record: &ObjectRecord,
        format: FormatId,
        out: &mut [u8],
    ) -> SecurityResult<usize> {
        let header = &record.header;
        if header.object_type.is_secret() {
            warn!(
                object_type = %header.object_type,
                "public export of secret object refused"
            );
            return Err(SecurityError::UnexpectedValue);
        }

        let encoded = match format {
            FormatId::Raw => match &record.body {
                ObjectBody::PublicKey { material } => material.clone(),
                _ => return Err(SecurityError::UnsupportedFormat),
            },
            FormatId::Default => {
                if header.uid.is_nil() {
                    return Err(SecurityError::IncompleteArgState);
                }
                record.encode()?
            }
        };
        let required = match format {
            FormatId::Raw => encoded.len(),
            FormatId::Default => PUBLIC_ENVELOPE_OVERHEAD + encoded.len(),
        };
        if out.is_empty() {
            return Ok(required);
        }
        if out.len() < required {
            return Err(SecurityError::InsufficientCapacity { required });
        }

        match format {
            FormatId::Raw => out[..required].copy_from_slice(&encoded),
            FormatId::Default => {
                let len = u32::try_from(encoded.len()).map_err(|_| SecurityError::RuntimeFault)?;
                out[..4].copy_from_slice(PUBLIC_MAGIC);
                out[4..8].copy_from_slice(&len.to_le_bytes());
                out[8..12].copy_from_slice(&crc32fast::hash(&encoded).to_le_bytes());
                out[12..required].copy_from_slice(&encoded);
            }
        }
        debug!(
            object_type = %header.object_type,
            format = ?format,
            size = required,
            "object exported (public)"
        );
        Ok(required)
    }

    /// Parse a public envelope and store the object into `container`.
    ///
    /// Only `FormatId::Default` is accepted; bare material goes through
    /// [`import_raw_object`](Self::import_raw_object).
    pub fn import_public_object(
        &self,
        container: &TrustedContainer,
        serialized: &[u8],
        format: FormatId,
        expected: Option<CryptoObjectType>,
    ) -> SecurityResult<()> {
        if format != FormatId::Default {
            return Err(SecurityError::UnsupportedFormat);
        }
        let record = decode_public(serialized)?;
        if record.header.object_type.is_secret() {
            warn!(
                object_type = %record.header.object_type,
                "public envelope carrying secret object refused"
            );
            return Err(SecurityError::UnexpectedValue);
        }
        check_expected(&record, expected)?;
        AnyObject::from_record(&record)?;

        container.acquire_ownership()?.store_record(&record)?;
        debug!(
            object_type = %record.header.object_type,
            uid = %record.header.uid.short_id(),
            "object imported (public)"
        );
        Ok(())
    }

    // ---- Raw import ----

    /// Build an object from bare material and store it into `container`.
    ///
    /// Symmetric keys, key pairs (from the private scalar), public keys and
    /// seeds have a raw path; everything else fails with `Unsupported`. The
    /// new object is persistent and receives a fresh COUID, which is
    /// returned.
    #[allow(clippy::too_many_arguments)]
    pub fn import_raw_object(
        &self,
        container: &TrustedContainer,
        raw: &[u8],
        alg: AlgId,
        object_type: CryptoObjectType,
        usage: AllowedUsage,
        is_exportable: bool,
        params: Option<&DomainParameters>,
    ) -> SecurityResult<CryptoObjectUid> {
        let supported = match object_type {
            CryptoObjectType::SymmetricKey => is_symmetric_alg(alg),
            CryptoObjectType::PrivateKey | CryptoObjectType::PublicKey => is_asymmetric_alg(alg),
            CryptoObjectType::SecretSeed => seed_size(alg).is_ok(),
            _ => false,
        };
        if !supported {
            return Err(SecurityError::Unsupported);
        }
        let dependency = params.map(|p| parameters_dependency(p, alg)).transpose()?;
        let header = self
            .new_header(object_type, alg, usage)
            .with_dependency(dependency)
            .exportable(is_exportable);

        let record = match object_type {
            CryptoObjectType::SymmetricKey => {
                SymmetricKey::new(header, Zeroizing::new(raw.to_vec()))?.to_record()
            }
            CryptoObjectType::PrivateKey => {
                PrivateKey::new(header, Zeroizing::new(raw.to_vec()))?.to_record()
            }
            CryptoObjectType::PublicKey => PublicKey::new(header, raw.to_vec())?.to_record(),
            _ => SecretSeed::new(header, Zeroizing::new(raw.to_vec()))?.to_record(),
        };
        container.acquire_ownership()?.store_record(&record)?;
        info!(
            object_type = %object_type,
            alg = %alg,
            uid = %header.uid.short_id(),
            "raw object imported"
        );
        Ok(header.uid)
    }
}

/// The transport context must be keyed for the requested direction.
fn check_transport(transport: &SymmetricKeyWrapperCtx, wrap: bool) -> SecurityResult<()> {
    if !transport.is_initialized() {
        return Err(SecurityError::UninitializedContext);
    }
    let ready = if wrap {
        transport.can_wrap()
    } else {
        transport.can_unwrap()
    };
    if !ready {
        return Err(SecurityError::UsageViolation);
    }
    Ok(())
}

fn check_expected(record: &ObjectRecord, expected: Option<CryptoObjectType>) -> SecurityResult<()> {
    match expected {
        Some(expected) if expected != record.header.object_type => Err(
            SecurityError::bad_object_type(record.header.object_type, expected),
        ),
        _ => Ok(()),
    }
}

/// Length prefix, record, then nothing but zero padding.
fn decode_secured(plain: &[u8]) -> SecurityResult<ObjectRecord> {
    let (len, rest) = plain
        .split_first_chunk::<8>()
        .ok_or(SecurityError::UnexpectedValue)?;
    let len = usize::try_from(u64::from_le_bytes(*len))
        .map_err(|_| SecurityError::UnexpectedValue)?;
    if len > rest.len() {
        return Err(SecurityError::UnexpectedValue);
    }
    let (encoded, padding) = rest.split_at(len);
    if padding.len() >= KEY_WRAP_SEMIBLOCK || padding.iter().any(|&b| b != 0) {
        return Err(SecurityError::UnexpectedValue);
    }
    ObjectRecord::decode(encoded)
}

fn decode_public(serialized: &[u8]) -> SecurityResult<ObjectRecord> {
    let body = serialized
        .strip_prefix(PUBLIC_MAGIC.as_slice())
        .ok_or(SecurityError::UnexpectedValue)?;
    let (len, body) = body
        .split_first_chunk::<4>()
        .ok_or(SecurityError::UnexpectedValue)?;
    let (crc, encoded) = body
        .split_first_chunk::<4>()
        .ok_or(SecurityError::UnexpectedValue)?;
    if u32::from_le_bytes(*len) as usize != encoded.len()
        || u32::from_le_bytes(*crc) != crc32fast::hash(encoded)
    {
        return Err(SecurityError::UnexpectedValue);
    }
    ObjectRecord::decode(encoded)
}
