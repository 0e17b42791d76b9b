//! Error types for pinlock core

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by credential and settings primitives
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Secret is not exactly four ASCII digits
    #[error("Secret must be exactly {0} digits")]
    InvalidFormat(usize),

    /// Hex field could not be decoded
    #[error("Invalid hex encoding: {0}")]
    InvalidHex(String),

    /// Decoded byte length does not match the expected size
    #[error("Invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Inactivity timeout must be at least one minute
    #[error("Inactivity timeout must be at least 1 minute, got {0}")]
    InvalidTimeout(u32),

    /// Unrecognised language code
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),
}

impl From<hex::FromHexError> for CoreError {
    fn from(e: hex::FromHexError) -> Self {
        CoreError::InvalidHex(e.to_string())
    }
}
