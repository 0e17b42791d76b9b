//! Pinlock Guard - lockout state machine and re-lock scheduling
//!
//! This crate composes the credential primitives from `pinlock-core` into
//! the running guard:
//! - `auth` - attempt counting and time-boxed lockout
//! - `store` - the single owner of persisted state, with synchronous writes
//! - `monitor` - idle and focus-loss triggers that re-engage the lock
//! - `controller` - the orchestrator that wires them together

pub mod auth;
pub mod config;
pub mod controller;
pub mod error;
pub mod monitor;
pub mod store;

pub use auth::{AttemptResponse, AuthError, GuardState, LockoutGuard, LockoutPolicy};
pub use config::{ConfigError, GuardConfig};
pub use controller::{ControllerOptions, GuardStatus, LockController};
pub use error::{GuardError, Result, StoreError};
pub use monitor::{ActivityMonitor, ActivitySender, ActivitySignal, LockReason, LockTarget};
pub use store::{FileBackend, MemoryBackend, SettingsStore, StateBackend};
