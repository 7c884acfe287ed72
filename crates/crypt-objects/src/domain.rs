//! Domain parameters with two-phase construction.
//!
//! A set starts *incomplete*: parameters are filled one by one by index.
//! [`DomainParameters::complete`] locks the set and exposes its COUID. Named
//! sets are born completed with a COUID derived from their name.

use crypt_types::{
    AlgId, AllowedUsage, CryptoObjectType, CryptoObjectUid, KeyFamily, SecurityError,
    SecurityResult,
};
use parking_lot::Mutex;
use tracing::debug;

use crate::object::{expect_type, CryptoObject};
use crate::record::{ObjectBody, ObjectHeader, ObjectRecord, MAX_PARAMETER_SET_NAME};

/// Name and exact size of one parameter slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub size: usize,
}

const CURVE_ID_SIZE: usize = 16;

const CURVE25519_SCHEMA: &[ParameterSpec] = &[
    ParameterSpec {
        name: "curve-id",
        size: CURVE_ID_SIZE,
    },
    ParameterSpec {
        name: "base-point",
        size: 32,
    },
    ParameterSpec {
        name: "cofactor",
        size: 1,
    },
];

/// Usage granted to named sets.
pub const NAMED_SET_USAGE: AllowedUsage = AllowedUsage::ALLOW_SIGNATURE
    .union(AllowedUsage::ALLOW_VERIFICATION)
    .union(AllowedUsage::ALLOW_KEY_AGREEMENT)
    .union(AllowedUsage::ALLOW_DATA_ENCRYPTION)
    .union(AllowedUsage::ALLOW_DATA_DECRYPTION);

/// Parameter layout for `alg`; `UnknownIdentifier` if it takes none.
pub fn parameter_schema(alg: AlgId) -> SecurityResult<&'static [ParameterSpec]> {
    match alg.key_family() {
        Some(KeyFamily::Edwards25519 | KeyFamily::Montgomery25519) => Ok(CURVE25519_SCHEMA),
        _ => Err(SecurityError::UnknownIdentifier),
    }
}

/// Names accepted by [`DomainParameters::named`].
pub const KNOWN_SET_NAMES: &[&str] = &["curve25519", "edwards25519"];

fn known_values(name: &str) -> Option<(AlgId, Vec<Vec<u8>>)> {
    let curve_id = |label: &str| {
        let mut id = vec![0u8; CURVE_ID_SIZE];
        id[..label.len()].copy_from_slice(label.as_bytes());
        id
    };
    match name.to_ascii_lowercase().as_str() {
        "curve25519" => {
            let mut base = vec![0u8; 32];
            base[0] = 9;
            Some((AlgId::X25519, vec![curve_id("curve25519"), base, vec![8]]))
        }
        "edwards25519" => {
            let mut base = vec![0x66u8; 32];
            base[0] = 0x58;
            Some((AlgId::Ed25519, vec![curve_id("edwards25519"), base, vec![8]]))
        }
        _ => None,
    }
}

#[derive(Debug)]
struct DomainState {
    values: Vec<Option<Vec<u8>>>,
    completed: bool,
    usage: AllowedUsage,
}

/// Shared, two-phase parameter set. Usually held in an `Arc`.
#[derive(Debug)]
pub struct DomainParameters {
    alg_id: AlgId,
    name: Option<String>,
    is_session: bool,
    is_exportable: bool,
    uid: CryptoObjectUid,
    state: Mutex<DomainState>,
}

impl DomainParameters {
    /// Empty, incomplete set. `uid` becomes visible once completed.
    pub fn new(
        alg_id: AlgId,
        uid: CryptoObjectUid,
        is_session: bool,
        is_exportable: bool,
    ) -> SecurityResult<Self> {
        let schema = parameter_schema(alg_id)?;
        Ok(Self {
            alg_id,
            name: None,
            is_session,
            is_exportable,
            uid,
            state: Mutex::new(DomainState {
                values: vec![None; schema.len()],
                completed: false,
                usage: AllowedUsage::PROTOTYPED_ONLY,
            }),
        })
    }

    /// A well-known set, born completed.
    pub fn named(name: &str) -> SecurityResult<Self> {
        let (alg_id, values) = known_values(name).ok_or(SecurityError::UnknownIdentifier)?;
        let name = name.to_ascii_lowercase();
        Ok(Self {
            alg_id,
            uid: CryptoObjectUid::from_name(&name),
            name: Some(name),
            is_session: false,
            is_exportable: true,
            state: Mutex::new(DomainState {
                values: values.into_iter().map(Some).collect(),
                completed: true,
                usage: NAMED_SET_USAGE,
            }),
        })
    }

    /// Rebuild from a stored record.
    pub fn from_record(record: &ObjectRecord) -> SecurityResult<Self> {
        expect_type(&record.header, CryptoObjectType::DomainParameters)?;
        let ObjectBody::DomainParameters { name, values } = &record.body else {
            return Err(SecurityError::UnexpectedValue);
        };
        if name.as_ref().is_some_and(|n| n.len() > MAX_PARAMETER_SET_NAME) {
            return Err(SecurityError::UnexpectedValue);
        }
        let schema = parameter_schema(record.header.alg_id)?;
        if values.len() != schema.len() {
            return Err(SecurityError::UnexpectedValue);
        }
        let completed = !record.header.uid.is_nil();
        let mut slots = Vec::with_capacity(values.len());
        for (value, spec) in values.iter().zip(schema) {
            match value.len() {
                0 if !completed => slots.push(None),
                n if n == spec.size => slots.push(Some(value.clone())),
                _ => return Err(SecurityError::UnexpectedValue),
            }
        }
        Ok(Self {
            alg_id: record.header.alg_id,
            name: name.clone(),
            is_session: record.header.is_session,
            is_exportable: record.header.is_exportable,
            uid: record.header.uid,
            state: Mutex::new(DomainState {
                values: slots,
                completed,
                usage: record.header.allowed_usage,
            }),
        })
    }

    /// Name of a well-known set, `None` for custom sets.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn parameters_count(&self) -> usize {
        self.schema().len()
    }

    pub fn parameter_name(&self, index: usize) -> SecurityResult<&'static str> {
        Ok(self.spec(index)?.name)
    }

    pub fn expected_parameter_size(&self, index: usize) -> SecurityResult<usize> {
        Ok(self.spec(index)?.size)
    }

    /// Value at `index`, if set.
    pub fn parameter(&self, index: usize) -> SecurityResult<Option<Vec<u8>>> {
        self.spec(index)?;
        Ok(self.state.lock().values[index].clone())
    }

    /// Set one parameter. Fails with `AccessViolation` once completed.
    pub fn set_parameter(&self, index: usize, value: &[u8]) -> SecurityResult<()> {
        let spec = self.spec(index)?;
        let mut state = self.state.lock();
        if state.completed {
            return Err(SecurityError::AccessViolation);
        }
        if value.len() != spec.size {
            return Err(SecurityError::InvalidInputSize);
        }
        state.values[index] = Some(value.to_vec());
        Ok(())
    }

    /// Lock the set.
    ///
    /// Returns `false` (and stays incomplete) while any parameter is missing.
    /// Calls after the first successful one return `true` and change nothing.
    pub fn complete(&self, usage: AllowedUsage) -> SecurityResult<bool> {
        let mut state = self.state.lock();
        if state.completed {
            return Ok(true);
        }
        if state.values.iter().any(Option::is_none) {
            return Ok(false);
        }
        state.completed = true;
        state.usage = usage;
        debug!(
            alg = %self.alg_id.name(),
            uid = %self.uid.short_id(),
            "domain parameters completed"
        );
        Ok(true)
    }

    pub fn is_completed(&self) -> bool {
        self.state.lock().completed
    }

    /// Returns `true` if the values equal those of some well-known set for
    /// the same key family.
    pub fn is_well_known(&self) -> bool {
        let state = self.state.lock();
        KNOWN_SET_NAMES.iter().filter_map(|n| known_values(n)).any(|(alg, values)| {
            alg.key_family() == self.alg_id.key_family()
                && state
                    .values
                    .iter()
                    .zip(&values)
                    .all(|(have, want)| have.as_deref() == Some(want.as_slice()))
        })
    }

    fn schema(&self) -> &'static [ParameterSpec] {
        parameter_schema(self.alg_id).unwrap_or(&[])
    }

    fn spec(&self, index: usize) -> SecurityResult<ParameterSpec> {
        self.schema()
            .get(index)
            .copied()
            .ok_or(SecurityError::AboveBoundary)
    }
}

impl CryptoObject for DomainParameters {
    fn header(&self) -> ObjectHeader {
        let state = self.state.lock();
        let uid = if state.completed {
            self.uid
        } else {
            CryptoObjectUid::nil()
        };
        ObjectHeader::new(CryptoObjectType::DomainParameters, self.alg_id)
            .with_uid(uid)
            .with_usage(state.usage)
            .session(self.is_session)
            .exportable(self.is_exportable)
    }

    fn to_record(&self) -> ObjectRecord {
        let header = self.header();
        let values = self
            .state
            .lock()
            .values
            .iter()
            .map(|v| v.clone().unwrap_or_default())
            .collect();
        ObjectRecord::new(
            header,
            ObjectBody::DomainParameters {
                name: self.name.clone(),
                values,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> DomainParameters {
        DomainParameters::new(
            AlgId::X25519,
            CryptoObjectUid::from_name("custom"),
            false,
            true,
        )
        .unwrap()
    }

    fn fill(params: &DomainParameters) {
        for i in 0..params.parameters_count() {
            let size = params.expected_parameter_size(i).unwrap();
            params.set_parameter(i, &vec![1u8; size]).unwrap();
        }
    }

    #[test]
    fn incomplete_set_has_no_identity() {
        let params = fresh();
        assert!(!params.is_completed());
        assert_eq!(params.object_id(), None);
    }

    #[test]
    fn complete_requires_every_parameter() {
        let params = fresh();
        params.set_parameter(0, &[0u8; 16]).unwrap();
        assert!(!params.complete(AllowedUsage::ALLOW_KEY_AGREEMENT).unwrap());
        assert!(!params.is_completed());
    }

    #[test]
    fn complete_is_idempotent() {
        let params = fresh();
        fill(&params);
        assert!(params.complete(AllowedUsage::ALLOW_KEY_AGREEMENT).unwrap());
        let uid = params.object_id();
        assert!(uid.is_some());
        assert!(params.complete(AllowedUsage::empty()).unwrap());
        assert_eq!(params.object_id(), uid);
        assert_eq!(
            params.header().allowed_usage,
            AllowedUsage::ALLOW_KEY_AGREEMENT
        );
    }

    #[test]
    fn set_after_complete_is_refused() {
        let params = fresh();
        fill(&params);
        params.complete(AllowedUsage::empty()).unwrap();
        assert_eq!(
            params.set_parameter(0, &[0u8; 16]).unwrap_err(),
            SecurityError::AccessViolation
        );
    }

    #[test]
    fn set_checks_index_and_size() {
        let params = fresh();
        assert_eq!(
            params.set_parameter(9, &[0]).unwrap_err(),
            SecurityError::AboveBoundary
        );
        assert_eq!(
            params.set_parameter(2, &[0, 0]).unwrap_err(),
            SecurityError::InvalidInputSize
        );
    }

    #[test]
    fn introspection_is_phase_independent() {
        let params = DomainParameters::named("curve25519").unwrap();
        assert_eq!(params.parameter_name(1).unwrap(), "base-point");
        assert_eq!(params.expected_parameter_size(1).unwrap(), 32);
        assert!(params.parameter_name(3).is_err());
    }

    #[test]
    fn named_sets_are_born_completed() {
        let params = DomainParameters::named("Curve25519").unwrap();
        assert!(params.is_completed());
        assert_eq!(params.name(), Some("curve25519"));
        assert_eq!(
            params.object_id(),
            Some(CryptoObjectUid::from_name("curve25519"))
        );
        assert!(params.is_well_known());
        assert!(DomainParameters::named("p-256").is_err());
    }

    #[test]
    fn record_roundtrip_keeps_phase() {
        let params = fresh();
        params.set_parameter(2, &[8]).unwrap();
        let restored = DomainParameters::from_record(&params.to_record()).unwrap();
        assert!(!restored.is_completed());
        assert_eq!(restored.parameter(2).unwrap(), Some(vec![8]));
        assert_eq!(restored.parameter(0).unwrap(), None);

        let named = DomainParameters::named("edwards25519").unwrap();
        let restored = DomainParameters::from_record(&named.to_record()).unwrap();
        assert!(restored.is_completed());
        assert_eq!(restored.object_id(), named.object_id());
    }

    #[test]
    fn custom_values_are_not_well_known() {
        let params = fresh();
        fill(&params);
        assert!(!params.is_well_known());
    }
}
