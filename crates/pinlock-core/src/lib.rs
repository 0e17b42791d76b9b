//! Pinlock Core - credential primitives and shared state types
//!
//! This crate provides the leaf pieces of the pinlock credential guard:
//! - Salted SHA-256 digests of a 4-digit secret, with constant-time checks
//! - The persisted settings document shared with the settings layer
//! - Lockout policy constants and remaining-time formatting
//! - A clock abstraction so timing windows can be tested deterministically

pub mod clock;
pub mod credential;
pub mod duration;
pub mod error;
pub mod settings;

pub use clock::{Clock, ManualClock, SystemClock};
pub use credential::{
    constant_time_eq, hash_secret, is_valid_format, verify_secret, Credential, Digest, Salt,
};
pub use duration::format_duration;
pub use error::{CoreError, Result};
pub use settings::{Language, LockSettings, LockoutState, TriggerConfig};

/// Number of digits in a secret
pub const SECRET_LENGTH: usize = 4;

/// Salt size in bytes
pub const SALT_LENGTH: usize = 16;

/// SHA-256 output size in bytes
pub const DIGEST_LENGTH: usize = 32;

/// Consecutive failures that trigger a lockout
pub const MAX_ATTEMPTS: u32 = 5;

/// Lockout duration in milliseconds (5 minutes)
pub const LOCKOUT_DURATION_MS: u64 = 5 * 60 * 1000;

/// Default inactivity timeout in minutes
pub const DEFAULT_INACTIVITY_TIMEOUT_MINUTES: u32 = 5;
