use crypt_types::SecurityError;

/// Errors from algorithm backends.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveError {
    #[error("invalid key length")]
    InvalidKeyLength,
    #[error("invalid input length")]
    InvalidInputLength,
    #[error("integrity check failed")]
    IntegrityCheckFailed,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid key")]
    InvalidKey,
    #[error("requested output is too long")]
    OutputTooLong,
    #[error("algorithm not supported by this backend")]
    UnsupportedAlgorithm,
}

impl From<PrimitiveError> for SecurityError {
    fn from(err: PrimitiveError) -> Self {
        match err {
            PrimitiveError::InvalidKeyLength => SecurityError::IncompatibleObject,
            PrimitiveError::InvalidInputLength => SecurityError::InvalidInputSize,
            PrimitiveError::IntegrityCheckFailed => SecurityError::AuthTagNotValid,
            PrimitiveError::InvalidSignature => SecurityError::UnexpectedValue,
            PrimitiveError::InvalidKey => SecurityError::UnexpectedValue,
            PrimitiveError::OutputTooLong => SecurityError::InvalidArgument,
            PrimitiveError::UnsupportedAlgorithm => SecurityError::Unsupported,
        }
    }
}

/// Result alias for backend operations.
pub type PrimitiveResult<T> = Result<T, PrimitiveError>;
