//! Lock controller
//!
//! Wires the lockout guard, the settings store and the activity monitor
//! together, and supplies the current time from its clock.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use pinlock_core::{Clock, Language, TriggerConfig};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::auth::{AuthError, GuardState, LockoutGuard, LockoutPolicy};
use crate::error::Result;
use crate::monitor::{
    ActivityMonitor, ActivitySender, ActivitySignal, LockReason, LockTarget, DEFAULT_TICK_INTERVAL,
};
use crate::store::SettingsStore;

/// Tunables for a controller
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub policy: LockoutPolicy,
    pub tick_interval: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            policy: LockoutPolicy::default(),
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

/// Snapshot of the guard for display
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardStatus {
    #[serde(flatten)]
    pub state: GuardState,
    pub attempts: u32,
    pub remaining_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_for_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lockout_message: Option<String>,
    pub last_unlock_time: u64,
    pub triggers: TriggerConfig,
    pub language: Language,
    pub needs_setup: bool,
}

/// Monitor-facing handle onto the shared guard
struct GuardTarget {
    guard: Arc<Mutex<LockoutGuard>>,
}

impl LockTarget for GuardTarget {
    fn engage_lock(&self, reason: LockReason) {
        let engaged = self
            .guard
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .engage_lock();
        if engaged {
            info!("Lock engaged ({})", reason);
        }
    }
}

/// Orchestrates the guard and its re-lock triggers
pub struct LockController {
    store: Arc<SettingsStore>,
    guard: Arc<Mutex<LockoutGuard>>,
    monitor: ActivityMonitor,
    clock: Arc<dyn Clock>,
}

impl LockController {
    /// Build a controller over `store`, engaging the lock if startup locking applies
    pub fn open(store: SettingsStore, clock: Arc<dyn Clock>, options: ControllerOptions) -> Self {
        let store = Arc::new(store);
        let guard = Arc::new(Mutex::new(LockoutGuard::new(
            Arc::clone(&store),
            options.policy,
        )));
        let target = Arc::new(GuardTarget {
            guard: Arc::clone(&guard),
        });

        let settings = store.snapshot();
        let monitor = ActivityMonitor::new(
            settings.triggers(),
            Arc::clone(&target) as Arc<dyn LockTarget>,
            Arc::clone(&clock),
        )
        .with_tick_interval(options.tick_interval);

        if settings.has_credential() && settings.lock_on_startup {
            target.engage_lock(LockReason::Startup);
        } else if !settings.has_credential() {
            debug!("No credential configured, setup required");
        }
        if settings.inactivity_timeout != settings.triggers().inactivity_timeout_minutes {
            warn!(
                "Stored inactivity timeout {} is invalid, using {} minutes",
                settings.inactivity_timeout,
                settings.triggers().inactivity_timeout_minutes
            );
        }

        Self {
            store,
            guard,
            monitor,
            clock,
        }
    }

    fn guard(&self) -> MutexGuard<'_, LockoutGuard> {
        self.guard.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> u64 {
        self.clock.now_millis()
    }

    pub fn needs_setup(&self) -> bool {
        self.guard().needs_setup()
    }

    pub fn state(&self) -> GuardState {
        let now = self.now();
        self.guard().state(now)
    }

    pub fn is_engaged(&self) -> bool {
        self.guard().is_engaged()
    }

    pub fn set_credential(&self, secret: &str) -> std::result::Result<(), AuthError> {
        self.guard().set_credential(secret)
    }

    pub fn set_credential_confirmed(
        &self,
        secret: &str,
        confirmation: &str,
    ) -> std::result::Result<(), AuthError> {
        self.guard().set_credential_confirmed(secret, confirmation)
    }

    pub fn change_credential(&self, current: &str, new: &str) -> std::result::Result<(), AuthError> {
        let now = self.now();
        self.guard().change_credential(current, new, now)
    }

    pub fn submit_attempt(&self, secret: &str) -> std::result::Result<(), AuthError> {
        let now = self.now();
        let result = self.guard().submit_attempt(secret, now);
        if result.is_ok() {
            // A successful unlock counts as activity
            self.monitor.record_activity();
        }
        result
    }

    pub fn reset_all(&self) -> std::result::Result<(), AuthError> {
        self.guard().reset_all()
    }

    /// Engage the lock by hand; no-op if already engaged
    pub fn engage_lock(&self) -> bool {
        let engaged = self.guard().engage_lock();
        if engaged {
            info!("Lock engaged ({})", LockReason::Manual);
        }
        engaged
    }

    pub fn disengage_lock(&self) -> bool {
        self.guard().disengage_lock()
    }

    pub fn triggers(&self) -> TriggerConfig {
        self.store.snapshot().triggers()
    }

    /// Persist new trigger settings and restart the monitor with them
    pub fn update_triggers(&mut self, triggers: TriggerConfig) -> Result<()> {
        triggers.validate()?;
        self.store.update(|s| s.apply_triggers(&triggers))?;
        self.monitor.update_config(triggers)?;
        info!("Lock triggers updated");
        Ok(())
    }

    pub fn set_language(&self, language: Language) -> Result<()> {
        self.store.update(|s| s.language = language)?;
        Ok(())
    }

    /// Current state with lockout details resolved at now
    pub fn status(&self) -> GuardStatus {
        let now = self.now();
        let guard = self.guard();
        let settings = self.store.snapshot();
        let lockout = settings.lockout();
        let policy = guard.policy();

        let locked_for_ms = lockout.locked_for(now);
        let lockout_message = if locked_for_ms.is_some() || lockout.attempts > 0 {
            Some(policy.describe(&lockout, now))
        } else {
            None
        };

        GuardStatus {
            state: guard.state(now),
            attempts: lockout.attempts,
            remaining_attempts: policy.attempts_remaining(lockout.attempts),
            locked_for_ms,
            lockout_message,
            last_unlock_time: lockout.last_unlock_time,
            triggers: settings.triggers(),
            language: settings.language,
            needs_setup: !settings.has_credential(),
        }
    }

    /// Start the background monitor on the current tokio runtime
    pub fn start_monitor(&mut self) -> Result<()> {
        self.monitor.start()
    }

    pub fn monitor(&self) -> &ActivityMonitor {
        &self.monitor
    }

    /// Sender for host signals, available while the monitor runs
    pub fn activity_sender(&self) -> Option<ActivitySender> {
        self.monitor.sender()
    }

    /// Handle a host signal synchronously
    pub fn handle_signal(&self, signal: ActivitySignal) -> bool {
        self.monitor.handle_signal(signal)
    }

    /// Stop the monitor; the guard and its state stay as they are
    pub fn shutdown(&mut self) {
        self.monitor.stop();
        debug!("Controller shut down (engaged: {})", self.is_engaged());
    }
}
