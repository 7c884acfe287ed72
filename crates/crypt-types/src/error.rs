use thiserror::Error;

use crate::object_type::CryptoObjectType;

/// Flat taxonomy of every failure the provider surfaces.
///
/// Errors are passed upward unchanged; no layer wraps or chains them.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SecurityError {
    // -- resource group ----------------------------------------------------
    #[error("resource fault")]
    ResourceFault,

    #[error("resource is busy")]
    BusyResource,

    #[error("insufficient resource")]
    InsufficientResource,

    #[error("resource was not reserved")]
    UnreservedResource,

    #[error("memory allocation refused")]
    BadAlloc,

    // -- logic group -------------------------------------------------------
    #[error("logic fault")]
    LogicFault,

    #[error("invalid argument")]
    InvalidArgument,

    #[error("unknown identifier")]
    UnknownIdentifier,

    #[error("insufficient output capacity: {required} bytes required")]
    InsufficientCapacity { required: usize },

    #[error("invalid input size")]
    InvalidInputSize,

    #[error("incompatible arguments")]
    IncompatibleArguments,

    #[error("input and output buffers intersect")]
    InOutBuffersIntersect,

    #[error("value is below the allowed boundary")]
    BelowBoundary,

    #[error("value is above the allowed boundary")]
    AboveBoundary,

    #[error("unsupported operation")]
    Unsupported,

    #[error("invalid usage order")]
    InvalidUsageOrder,

    #[error("context is not initialized")]
    UninitializedContext,

    #[error("processing has not been started")]
    ProcessingNotStarted,

    #[error("processing has not been finished")]
    ProcessingNotFinished,

    #[error("comparison is too short to be safe against brute force")]
    BruteForceRisk,

    #[error("content restrictions violated")]
    ContentRestrictions,

    #[error("bad object reference")]
    BadObjectReference,

    #[error("content duplication")]
    ContentDuplication,

    #[error("unexpected value")]
    UnexpectedValue,

    #[error("incompatible object")]
    IncompatibleObject,

    #[error("incomplete argument state")]
    IncompleteArgState,

    #[error("container is empty")]
    EmptyContainer,

    #[error("missing argument")]
    MissingArgument,

    #[error("bad object type: expected {expected}, got {actual}")]
    BadObjectType {
        actual: CryptoObjectType,
        expected: CryptoObjectType,
    },

    #[error("usage violation")]
    UsageViolation,

    #[error("access violation")]
    AccessViolation,

    // -- runtime group -----------------------------------------------------
    #[error("runtime fault")]
    RuntimeFault,

    #[error("unsupported format")]
    UnsupportedFormat,

    #[error("authentication tag is not valid")]
    AuthTagNotValid,
}

impl SecurityError {
    /// Stable numeric code of the error.
    pub fn code(&self) -> u32 {
        match self {
            Self::ResourceFault => 1,
            Self::BusyResource => 2,
            Self::InsufficientResource => 3,
            Self::UnreservedResource => 4,
            Self::BadAlloc => 5,
            Self::LogicFault => 100,
            Self::InvalidArgument => 101,
            Self::UnknownIdentifier => 102,
            Self::InsufficientCapacity { .. } => 103,
            Self::InvalidInputSize => 104,
            Self::IncompatibleArguments => 105,
            Self::InOutBuffersIntersect => 106,
            Self::BelowBoundary => 107,
            Self::AboveBoundary => 108,
            Self::Unsupported => 110,
            Self::InvalidUsageOrder => 111,
            Self::UninitializedContext => 112,
            Self::ProcessingNotStarted => 113,
            Self::ProcessingNotFinished => 114,
            Self::BruteForceRisk => 115,
            Self::ContentRestrictions => 116,
            Self::BadObjectReference => 117,
            Self::ContentDuplication => 118,
            Self::UnexpectedValue => 119,
            Self::IncompatibleObject => 120,
            Self::IncompleteArgState => 121,
            Self::EmptyContainer => 122,
            Self::MissingArgument => 123,
            Self::BadObjectType { .. } => 124,
            Self::UsageViolation => 125,
            Self::AccessViolation => 126,
            Self::RuntimeFault => 200,
            Self::UnsupportedFormat => 201,
            Self::AuthTagNotValid => 202,
        }
    }

    /// 32-bit support data attached to the error, `0` when none.
    ///
    /// `BadObjectType` packs the actual type code in the upper half and the
    /// expected type code in the lower half.
    pub fn support_data(&self) -> u32 {
        match self {
            Self::BadObjectType { actual, expected } => {
                (u32::from(actual.code()) << 16) | u32::from(expected.code())
            }
            Self::InsufficientCapacity { required } => {
                u32::try_from(*required).unwrap_or(u32::MAX)
            }
            _ => 0,
        }
    }

    /// Shorthand for a `BadObjectType` error.
    pub fn bad_object_type(actual: CryptoObjectType, expected: CryptoObjectType) -> Self {
        Self::BadObjectType { actual, expected }
    }
}

/// Result alias for every fallible provider operation.
pub type SecurityResult<T> = Result<T, SecurityError>;
