//! Error types for the pinlock guard

use thiserror::Error;

use crate::auth::AuthError;

/// Result type alias for guard operations
pub type Result<T> = std::result::Result<T, GuardError>;

/// Errors that can occur while running the guard
#[derive(Debug, Error)]
pub enum GuardError {
    /// Credential or lockout failure
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Persistence failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Core validation error
    #[error("Invalid value: {0}")]
    Core(#[from] pinlock_core::CoreError),

    /// Monitor started outside a tokio runtime
    #[error("Activity monitor requires a tokio runtime")]
    NoRuntime,
}

/// Errors from reading or writing the persisted settings document
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Every write attempt failed; in-memory state was left untouched
    #[error("Failed to persist state after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinlock_core::CoreError;

    #[test]
    fn test_guard_error_conversions() {
        let err: GuardError = AuthError::NoCredentialConfigured.into();
        assert!(matches!(err, GuardError::Auth(AuthError::NoCredentialConfigured)));
        assert_eq!(err.to_string(), AuthError::NoCredentialConfigured.to_string());

        let err: GuardError = CoreError::InvalidTimeout(0).into();
        assert!(matches!(err, GuardError::Core(CoreError::InvalidTimeout(0))));

        let err: GuardError = StoreError::Serialization("bad".into()).into();
        assert!(matches!(err, GuardError::Store(StoreError::Serialization(_))));
    }

    #[test]
    fn test_store_error_from_json() {
        let json_err = serde_json::from_str::<u32>("-1").unwrap_err();
        assert!(matches!(
            StoreError::from(json_err),
            StoreError::Serialization(_)
        ));
    }
}
