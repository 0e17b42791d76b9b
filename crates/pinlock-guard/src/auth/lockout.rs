//! Lockout policy for brute-force protection
//!
//! After `max_attempts` consecutive failures, attempts are refused for
//! `lockout_duration`. Expiry restores access but does not refill the
//! attempt budget; only a success or a reset does that, so the first
//! failure after expiry locks out again.

use std::time::Duration;

use pinlock_core::{format_duration, LockoutState, LOCKOUT_DURATION_MS, MAX_ATTEMPTS};

/// Fixed-window lockout policy
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Consecutive failures before lockout
    pub max_attempts: u32,
    /// How long attempts are refused once locked out
    pub lockout_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            lockout_duration: Duration::from_millis(LOCKOUT_DURATION_MS),
        }
    }
}

impl LockoutPolicy {
    pub fn new(max_attempts: u32, lockout_duration: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            lockout_duration,
        }
    }

    pub fn lockout_millis(&self) -> u64 {
        u64::try_from(self.lockout_duration.as_millis()).unwrap_or(u64::MAX)
    }

    /// Check whether `failed_attempts` has reached the lockout threshold
    pub fn should_lock_out(&self, failed_attempts: u32) -> bool {
        failed_attempts >= self.max_attempts
    }

    /// Attempts left before lockout
    pub fn attempts_remaining(&self, failed_attempts: u32) -> u32 {
        self.max_attempts.saturating_sub(failed_attempts)
    }

    /// Deadline for a lockout that starts at `now`
    pub fn lockout_deadline(&self, now: u64) -> u64 {
        now.saturating_add(self.lockout_millis())
    }

    /// Get a human-readable description of the current lockout state
    pub fn describe(&self, state: &LockoutState, now: u64) -> String {
        match state.locked_for(now) {
            Some(remaining) => format!("Locked for {}.", format_duration(remaining)),
            None => format!(
                "Incorrect password, {} attempts remaining",
                self.attempts_remaining(state.attempts)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = LockoutPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.lockout_millis(), 300_000);
    }

    #[test]
    fn test_threshold() {
        let policy = LockoutPolicy::default();
        assert!(!policy.should_lock_out(0));
        assert!(!policy.should_lock_out(4));
        assert!(policy.should_lock_out(5));
        assert!(policy.should_lock_out(9));
    }

    #[test]
    fn test_attempts_remaining_saturates() {
        let policy = LockoutPolicy::default();
        assert_eq!(policy.attempts_remaining(0), 5);
        assert_eq!(policy.attempts_remaining(4), 1);
        assert_eq!(policy.attempts_remaining(7), 0);
    }

    #[test]
    fn test_zero_max_attempts_clamped() {
        let policy = LockoutPolicy::new(0, Duration::from_secs(1));
        assert_eq!(policy.max_attempts, 1);
    }

    #[test]
    fn test_describe() {
        let policy = LockoutPolicy::default();
        let locked = LockoutState {
            attempts: 5,
            locked_until: 61_000,
            last_unlock_time: 0,
        };
        assert_eq!(policy.describe(&locked, 0), "Locked for 1 minute and 1 second.");

        let failing = LockoutState {
            attempts: 2,
            ..Default::default()
        };
        assert_eq!(
            policy.describe(&failing, 0),
            "Incorrect password, 3 attempts remaining"
        );
    }
}
