//! Attempt counting and lockout around the stored credential
//!
//! The guard never holds the settings itself. It reads a snapshot from the
//! shared `SettingsStore`, decides the transition, and writes the result back
//! through the store before reporting it.

use std::sync::Arc;

use pinlock_core::{is_valid_format, verify_secret, Credential, LockoutState};
use tracing::{debug, info, warn};

use super::{AuthError, GuardState, LockoutPolicy};
use crate::store::SettingsStore;

/// Lockout state machine for a single credential
pub struct LockoutGuard {
    /// Shared settings owner
    store: Arc<SettingsStore>,
    /// Lockout policy
    policy: LockoutPolicy,
    /// Whether the overlay is currently shown
    engaged: bool,
}

impl LockoutGuard {
    /// Create a guard over `store`, initially disengaged
    pub fn new(store: Arc<SettingsStore>, policy: LockoutPolicy) -> Self {
        Self {
            store,
            policy,
            engaged: false,
        }
    }

    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    /// Check if a credential has been configured
    pub fn needs_setup(&self) -> bool {
        !self.store.snapshot().has_credential()
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged
    }

    /// Current attempt counter and lockout deadline
    pub fn lockout(&self) -> LockoutState {
        self.store.snapshot().lockout()
    }

    /// Resolve the current state at `now`
    ///
    /// Lockout expiry is evaluated lazily here; nothing is persisted.
    pub fn state(&self, now: u64) -> GuardState {
        if !self.engaged {
            return GuardState::Unlocked;
        }
        let lockout = self.lockout();
        if lockout.is_locked_out(now) {
            GuardState::LockedOut {
                until: lockout.locked_until,
            }
        } else {
            GuardState::Locked
        }
    }

    /// Set a new credential (first time setup or change)
    ///
    /// Generates a fresh salt and clears any attempt count or lockout.
    pub fn set_credential(&mut self, secret: &str) -> Result<(), AuthError> {
        let credential = Credential::derive(secret).map_err(|_| AuthError::InvalidFormat)?;

        self.store.update(|s| {
            s.set_credential(&credential);
            s.attempts = 0;
            s.locked_until = 0;
        })?;

        info!("Credential configured");
        Ok(())
    }

    /// Set a credential entered twice, as in the setup flow
    pub fn set_credential_confirmed(
        &mut self,
        secret: &str,
        confirmation: &str,
    ) -> Result<(), AuthError> {
        if !is_valid_format(secret) {
            return Err(AuthError::InvalidFormat);
        }
        if secret != confirmation {
            return Err(AuthError::CredentialMismatch);
        }
        self.set_credential(secret)
    }

    /// Change the credential; the current one goes through the normal attempt path
    pub fn change_credential(
        &mut self,
        current: &str,
        new: &str,
        now: u64,
    ) -> Result<(), AuthError> {
        if !is_valid_format(new) {
            return Err(AuthError::InvalidFormat);
        }
        self.submit_attempt(current, now)?;
        self.set_credential(new)
    }

    /// Submit a credential attempt at `now`
    ///
    /// Attempts during a lockout are refused before any hashing and do not
    /// count. A mismatch increments the counter; reaching the policy threshold
    /// starts a lockout and returns `LockedOut` with its full duration.
    pub fn submit_attempt(&mut self, secret: &str, now: u64) -> Result<(), AuthError> {
        if !is_valid_format(secret) {
            return Err(AuthError::InvalidFormat);
        }

        let settings = self.store.snapshot();
        if !settings.has_credential() {
            return Err(AuthError::NoCredentialConfigured);
        }

        let lockout = settings.lockout();
        if let Some(remaining) = lockout.locked_for(now) {
            debug!("Attempt refused during lockout ({} ms left)", remaining);
            return Err(AuthError::LockedOut(remaining));
        }

        if verify_secret(secret, &settings.password_hash, &settings.salt) {
            let next = LockoutState {
                attempts: 0,
                locked_until: 0,
                last_unlock_time: now,
            };
            self.store.update(|s| s.apply_lockout(&next))?;
            self.engaged = false;
            info!("Unlocked");
            return Ok(());
        }

        let attempts = lockout.attempts.saturating_add(1);
        let locked_out = self.policy.should_lock_out(attempts);
        let next = LockoutState {
            attempts,
            locked_until: if locked_out {
                self.policy.lockout_deadline(now)
            } else {
                lockout.locked_until
            },
            last_unlock_time: lockout.last_unlock_time,
        };
        self.store.update(|s| s.apply_lockout(&next))?;

        if locked_out {
            warn!(
                "Locked out after {} failed attempts for {} ms",
                attempts,
                self.policy.lockout_millis()
            );
            Err(AuthError::LockedOut(self.policy.lockout_millis()))
        } else {
            let remaining = self.policy.attempts_remaining(attempts);
            debug!("Failed attempt {} ({} remaining)", attempts, remaining);
            Err(AuthError::VerificationFailed(remaining))
        }
    }

    /// Administrative reset: clears credential, counters and lockout
    pub fn reset_all(&mut self) -> Result<(), AuthError> {
        self.store.update(|s| {
            s.clear_credential();
            s.attempts = 0;
            s.locked_until = 0;
        })?;
        self.engaged = false;
        info!("Credential and lockout state reset");
        Ok(())
    }

    /// Show the overlay; returns true if the guard was not already engaged
    ///
    /// Without a configured credential there is nothing to unlock with, so
    /// this is a no-op until setup completes.
    pub fn engage_lock(&mut self) -> bool {
        if self.engaged {
            return false;
        }
        if self.needs_setup() {
            debug!("Lock engage skipped, no credential configured");
            return false;
        }
        self.engaged = true;
        true
    }

    /// Hide the overlay; counters and lockout are left as they are
    pub fn disengage_lock(&mut self) -> bool {
        let was_engaged = self.engaged;
        self.engaged = false;
        was_engaged
    }
}
