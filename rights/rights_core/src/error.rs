//! Error types for the rights policy engine.
//!
//! The root error type, `Error`, mirrors the taxonomy callers act on:
//! validation failures are never retried, missing records are reported as
//! `NotFound`, and storage problems surface either as `Storage` or, when a
//! bounded wait ran out, as `Timeout`.

use std::time::Duration;
use thiserror::Error;

/// Root error type for the rights engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Input failed validation (bad enum value, missing field).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The requested record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The backing store failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A bounded wait on the store or a usage lock expired.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether a caller may reasonably retry the failed operation.
    ///
    /// Only transient conditions qualify. Validation and missing records
    /// will fail the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Storage(StorageError::Unavailable(_))
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors raised while validating policy input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The policy type is not one of the recognized values.
    #[error("unknown policy type '{0}' (expected permission, prohibition or obligation)")]
    UnknownPolicyType(String),

    /// The action type is not one of the recognized values.
    #[error(
        "unknown action type '{0}' (expected use, reproduce, distribute, modify, archive or display)"
    )]
    UnknownActionType(String),

    /// A required field was missing or empty.
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Errors raised by a policy or decision store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend rejected or failed the operation.
    #[error("backend failure: {0}")]
    Backend(String),

    /// A stored record could not be decoded.
    #[error("corrupt record {record}: {reason}")]
    Corrupt {
        /// Which record was affected
        record: String,

        /// Why it could not be decoded
        reason: String,
    },

    /// The store cannot currently serve requests.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result type used throughout the rights engine.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let err: Error = ValidationError::MissingField("target_type").into();
        assert!(matches!(err, Error::Validation(_)));

        let err: Error = StorageError::Backend("disk full".to_string()).into();
        assert!(matches!(err, Error::Storage(_)));

        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_error_display() {
        let err: Error = ValidationError::UnknownPolicyType("grant".to_string()).into();
        let display = err.to_string();
        assert!(display.contains("unknown policy type 'grant'"));

        let err = Error::Timeout(Duration::from_millis(250));
        assert!(err.to_string().contains("250ms"));
    }

    #[test]
    fn test_retryable() {
        assert!(Error::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(Error::Storage(StorageError::Unavailable("restarting".into())).is_retryable());
        assert!(!Error::NotFound("policy 4".into()).is_retryable());
        assert!(!Error::from(ValidationError::MissingField("action_type")).is_retryable());
    }
}
