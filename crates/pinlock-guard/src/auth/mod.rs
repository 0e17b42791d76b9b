//! Authentication module for the pinlock guard
//!
//! Provides the attempt-counting lockout state machine that sits between the
//! presentation layer and the stored credential.
//!
//! # Security Model
//!
//! - The secret is four digits, hashed with a per-credential random salt
//! - Digest comparison is constant time
//! - Five consecutive failures refuse all attempts for five minutes
//! - Attempts made during a lockout are never hashed and never counted

mod guard;
mod lockout;

pub use guard::LockoutGuard;
pub use lockout::LockoutPolicy;

use serde::Serialize;

use crate::error::StoreError;

/// Guard state as seen by the presentation layer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum GuardState {
    /// Overlay hidden
    Unlocked,
    /// Overlay shown, accepting attempts
    Locked,
    /// Overlay shown, attempts refused until the given epoch millis
    LockedOut { until: u64 },
}

/// Authentication error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Password must be exactly 4 digits")]
    InvalidFormat,

    #[error("Incorrect password ({0} attempts remaining)")]
    VerificationFailed(u32),

    #[error("Locked out for {0} ms")]
    LockedOut(u64),

    #[error("No password configured - run setup first")]
    NoCredentialConfigured,

    #[error("Passwords do not match")]
    CredentialMismatch,

    #[error("Failed to persist state: {0}")]
    Persistence(String),
}

impl AuthError {
    /// Whether this is an ordinary counted mismatch
    ///
    /// The mismatch that starts a lockout is counted too, but surfaces as
    /// `LockedOut` with the full lockout duration.
    pub fn is_counted(&self) -> bool {
        matches!(self, AuthError::VerificationFailed(_))
    }

    /// Stable machine-readable code for wire responses
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidFormat => "invalidFormat",
            AuthError::VerificationFailed(_) => "verificationFailed",
            AuthError::LockedOut(_) => "lockedOut",
            AuthError::NoCredentialConfigured => "noCredentialConfigured",
            AuthError::CredentialMismatch => "credentialMismatch",
            AuthError::Persistence(_) => "persistence",
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        AuthError::Persistence(e.to_string())
    }
}

/// Wire form of a `submitAttempt` result
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_for_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

impl From<&Result<(), AuthError>> for AttemptResponse {
    fn from(result: &Result<(), AuthError>) -> Self {
        match result {
            Ok(()) => Self {
                accepted: true,
                ..Default::default()
            },
            Err(e) => Self {
                accepted: false,
                remaining_attempts: match e {
                    AuthError::VerificationFailed(remaining) => Some(*remaining),
                    _ => None,
                },
                locked_for_ms: match e {
                    AuthError::LockedOut(ms) => Some(*ms),
                    _ => None,
                },
                error: Some(e.code()),
            },
        }
    }
}
