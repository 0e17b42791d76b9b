//! Idle and focus-loss triggers
//!
//! The monitor watches user activity and decides when the lock should be
//! re-engaged. It never touches guard state directly; it calls a
//! `LockTarget`, which must treat repeated engages as no-ops.
//!
//! The periodic tick and the signal channel live in one tokio task that is
//! started and stopped as a unit. Dropping the monitor stops it.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pinlock_core::{Clock, TriggerConfig, DEFAULT_INACTIVITY_TIMEOUT_MINUTES};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::{GuardError, Result};

/// Default idle-check cadence
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(60);

/// Why the lock was engaged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockReason {
    Startup,
    Inactivity,
    FocusLost,
    Manual,
}

impl fmt::Display for LockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LockReason::Startup => "startup",
            LockReason::Inactivity => "inactivity",
            LockReason::FocusLost => "focus lost",
            LockReason::Manual => "manual",
        };
        f.write_str(s)
    }
}

/// Something that can be locked; engaging an engaged target is a no-op
pub trait LockTarget: Send + Sync + 'static {
    fn engage_lock(&self, reason: LockReason);
}

/// Signals observed from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivitySignal {
    PointerDown,
    KeyDown,
    TouchStart,
    Scroll,
    FocusLost,
}

impl ActivitySignal {
    /// Whether this signal counts as user activity
    pub fn is_activity(&self) -> bool {
        !matches!(self, ActivitySignal::FocusLost)
    }
}

impl FromStr for ActivitySignal {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "pointer" | "mousedown" => Ok(ActivitySignal::PointerDown),
            "key" | "keydown" => Ok(ActivitySignal::KeyDown),
            "touch" | "touchstart" => Ok(ActivitySignal::TouchStart),
            "scroll" => Ok(ActivitySignal::Scroll),
            "blur" => Ok(ActivitySignal::FocusLost),
            other => Err(format!("unknown signal: {}", other)),
        }
    }
}

/// Never let an invalid timeout reach the scheduler
fn checked(config: TriggerConfig) -> TriggerConfig {
    if let Err(e) = config.validate() {
        warn!(
            "{}; using the default of {} minutes",
            e, DEFAULT_INACTIVITY_TIMEOUT_MINUTES
        );
    }
    config.sanitized()
}

/// Decision logic shared by the monitor and its background task
struct Triggers {
    config: TriggerConfig,
    clock: Arc<dyn Clock>,
    target: Arc<dyn LockTarget>,
    last_activity: Arc<AtomicU64>,
}

impl Triggers {
    fn record_activity(&self) {
        self.last_activity
            .store(self.clock.now_millis(), Ordering::Relaxed);
    }

    fn idle_millis(&self) -> u64 {
        self.clock
            .now_millis()
            .saturating_sub(self.last_activity.load(Ordering::Relaxed))
    }

    fn check_inactivity(&self) -> bool {
        if !self.config.lock_on_inactivity {
            return false;
        }
        let idle = self.idle_millis();
        debug!(
            "Idle for {} ms, threshold {} ms",
            idle,
            self.config.inactivity_timeout_millis()
        );
        if idle >= self.config.inactivity_timeout_millis() {
            info!("Inactivity threshold reached, locking");
            self.target.engage_lock(LockReason::Inactivity);
            return true;
        }
        false
    }

    fn focus_lost(&self) -> bool {
        if !self.config.lock_on_window_blur {
            return false;
        }
        info!("Focus lost, locking");
        self.target.engage_lock(LockReason::FocusLost);
        true
    }

    fn handle(&self, signal: ActivitySignal) -> bool {
        if signal.is_activity() {
            self.record_activity();
            false
        } else {
            self.focus_lost()
        }
    }
}

/// Cloneable handle for feeding host signals into a running monitor
///
/// Activity updates are a single atomic store and never wait. Once the
/// monitor stops, the handle goes inert.
#[derive(Clone)]
pub struct ActivitySender {
    last_activity: Arc<AtomicU64>,
    clock: Arc<dyn Clock>,
    tx: mpsc::UnboundedSender<ActivitySignal>,
}

impl ActivitySender {
    /// Deliver a signal; returns false if the monitor has stopped
    pub fn send(&self, signal: ActivitySignal) -> bool {
        if self.tx.is_closed() {
            return false;
        }
        if signal.is_activity() {
            self.last_activity
                .store(self.clock.now_millis(), Ordering::Relaxed);
            true
        } else {
            self.tx.send(signal).is_ok()
        }
    }
}

struct RunningTask {
    handle: JoinHandle<()>,
    tx: mpsc::UnboundedSender<ActivitySignal>,
}

/// Scheduler that re-engages the lock on idle timeout or focus loss
pub struct ActivityMonitor {
    triggers: Arc<Triggers>,
    tick_interval: Duration,
    task: Option<RunningTask>,
}

impl ActivityMonitor {
    /// Create a stopped monitor
    pub fn new(config: TriggerConfig, target: Arc<dyn LockTarget>, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_millis();
        Self {
            triggers: Arc::new(Triggers {
                config: checked(config),
                clock,
                target,
                last_activity: Arc::new(AtomicU64::new(now)),
            }),
            tick_interval: DEFAULT_TICK_INTERVAL,
            task: None,
        }
    }

    /// Override the idle-check cadence
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn config(&self) -> &TriggerConfig {
        &self.triggers.config
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Tick cadence actually used, never longer than the idle timeout
    pub fn effective_tick(&self) -> Duration {
        self.tick_interval
            .min(self.triggers.config.inactivity_timeout())
            .max(Duration::from_millis(1))
    }

    /// Epoch millis of the last observed activity
    pub fn last_activity(&self) -> u64 {
        self.triggers.last_activity.load(Ordering::Relaxed)
    }

    /// Record user activity now
    pub fn record_activity(&self) {
        self.triggers.record_activity();
    }

    /// Run one idle check; returns true if the lock was engaged
    pub fn check_inactivity(&self) -> bool {
        self.triggers.check_inactivity()
    }

    /// Handle a focus-loss event; returns true if the lock was engaged
    pub fn handle_focus_lost(&self) -> bool {
        self.triggers.focus_lost()
    }

    /// Handle any host signal directly
    pub fn handle_signal(&self, signal: ActivitySignal) -> bool {
        self.triggers.handle(signal)
    }

    /// Handle for delivering signals to the running task
    pub fn sender(&self) -> Option<ActivitySender> {
        self.task.as_ref().map(|task| ActivitySender {
            last_activity: Arc::clone(&self.triggers.last_activity),
            clock: Arc::clone(&self.triggers.clock),
            tx: task.tx.clone(),
        })
    }

    /// Start the tick and signal listener on the current tokio runtime
    pub fn start(&mut self) -> Result<()> {
        if self.task.is_some() {
            return Ok(());
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| GuardError::NoRuntime)?;

        let config = self.triggers.config;
        if config.lock_on_inactivity {
            // Fresh idle window whenever tracking (re)starts
            self.triggers.record_activity();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let tick = self.effective_tick();
        let handle = runtime.spawn(run(Arc::clone(&self.triggers), rx, tick));
        self.task = Some(RunningTask { handle, tx });

        info!(
            "Activity monitor started (inactivity: {}, timeout: {} min, blur: {})",
            config.lock_on_inactivity, config.inactivity_timeout_minutes, config.lock_on_window_blur
        );
        Ok(())
    }

    /// Stop the tick and drop all listeners; safe to call repeatedly
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.handle.abort();
            drop(task.tx);
            info!("Activity monitor stopped");
        }
    }

    /// Replace the configuration, re-deriving every listener from it
    pub fn update_config(&mut self, config: TriggerConfig) -> Result<()> {
        let was_running = self.is_running();
        self.stop();

        let config = checked(config);
        self.triggers = Arc::new(Triggers {
            config,
            clock: Arc::clone(&self.triggers.clock),
            target: Arc::clone(&self.triggers.target),
            last_activity: Arc::clone(&self.triggers.last_activity),
        });
        debug!("Monitor configuration updated: {:?}", config);

        if was_running {
            self.start()?;
        }
        Ok(())
    }
}

impl Drop for ActivityMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(
    triggers: Arc<Triggers>,
    mut rx: mpsc::UnboundedReceiver<ActivitySignal>,
    tick: Duration,
) {
    let mut interval = tokio::time::interval_at(Instant::now() + tick, tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let inactivity = triggers.config.lock_on_inactivity;

    loop {
        tokio::select! {
            _ = interval.tick(), if inactivity => {
                triggers.check_inactivity();
            }
            signal = rx.recv() => match signal {
                Some(signal) => {
                    triggers.handle(signal);
                }
                None => break,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinlock_core::ManualClock;
    use std::sync::atomic::AtomicU32;

    const T0: u64 = 1_700_000_000_000;

    #[derive(Default)]
    struct CountingTarget {
        engaged: AtomicU32,
    }

    impl CountingTarget {
        fn count(&self) -> u32 {
            self.engaged.load(Ordering::SeqCst)
        }
    }

    impl LockTarget for CountingTarget {
        fn engage_lock(&self, _reason: LockReason) {
            self.engaged.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn config(inactivity: bool, blur: bool, minutes: u32) -> TriggerConfig {
        TriggerConfig {
            lock_on_startup: false,
            lock_on_inactivity: inactivity,
            lock_on_window_blur: blur,
            inactivity_timeout_minutes: minutes,
        }
    }

    fn monitor(config: TriggerConfig) -> (ActivityMonitor, Arc<CountingTarget>, Arc<ManualClock>) {
        let target = Arc::new(CountingTarget::default());
        let clock = Arc::new(ManualClock::new(T0));
        let monitor = ActivityMonitor::new(config, target.clone(), clock.clone());
        (monitor, target, clock)
    }

    #[test]
    fn test_idle_timeout_engages() {
        let (monitor, target, clock) = monitor(config(true, false, 1));

        clock.advance(59_000);
        assert!(!monitor.check_inactivity());
        clock.advance(2_000);
        assert!(monitor.check_inactivity());
        assert_eq!(target.count(), 1);
    }

    #[test]
    fn test_keeps_engaging_until_activity() {
        let (monitor, target, clock) = monitor(config(true, false, 1));

        clock.advance(61_000);
        assert!(monitor.check_inactivity());
        clock.advance(60_000);
        assert!(monitor.check_inactivity());
        assert_eq!(target.count(), 2);

        monitor.record_activity();
        assert!(!monitor.check_inactivity());
        assert_eq!(target.count(), 2);
    }

    #[test]
    fn test_activity_then_idle_again() {
        let (monitor, target, clock) = monitor(config(true, false, 1));

        clock.advance(61_000);
        assert!(monitor.check_inactivity());

        monitor.handle_signal(ActivitySignal::KeyDown);
        clock.advance(61_000);
        assert!(monitor.check_inactivity());
        assert_eq!(target.count(), 2);
    }

    #[test]
    fn test_inactivity_disabled() {
        let (monitor, target, clock) = monitor(config(false, false, 1));
        clock.advance(10 * 60_000);
        assert!(!monitor.check_inactivity());
        assert_eq!(target.count(), 0);
    }

    #[test]
    fn test_focus_lost_respects_flag() {
        let (monitor, target, _) = monitor(config(false, false, 5));
        assert!(!monitor.handle_focus_lost());
        assert_eq!(target.count(), 0);

        let (monitor, target, _) = self::monitor(config(false, true, 5));
        assert!(monitor.handle_signal(ActivitySignal::FocusLost));
        assert_eq!(target.count(), 1);
    }

    #[test]
    fn test_invalid_timeout_falls_back_to_default() {
        let (monitor, target, clock) = monitor(config(true, false, 0));
        assert_eq!(
            monitor.config().inactivity_timeout_minutes,
            DEFAULT_INACTIVITY_TIMEOUT_MINUTES
        );
        assert_eq!(monitor.effective_tick(), DEFAULT_TICK_INTERVAL);

        monitor.record_activity();
        assert!(!monitor.check_inactivity());
        clock.advance(61_000);
        assert!(!monitor.check_inactivity());
        assert_eq!(target.count(), 0);
    }

    #[test]
    fn test_update_config_rejects_zero_timeout() {
        let (mut monitor, _, _) = monitor(config(true, false, 1));
        monitor.update_config(config(true, false, 0)).unwrap();
        assert_eq!(
            monitor.config().inactivity_timeout_minutes,
            DEFAULT_INACTIVITY_TIMEOUT_MINUTES
        );
    }

    #[test]
    fn test_effective_tick_clamped() {
        let (monitor, _, _) = monitor(config(true, false, 1));
        let monitor = monitor.with_tick_interval(Duration::from_secs(600));
        assert_eq!(monitor.effective_tick(), Duration::from_secs(60));
    }

    #[test]
    fn test_start_requires_runtime() {
        let (mut monitor, _, _) = monitor(config(true, false, 1));
        assert!(matches!(monitor.start(), Err(GuardError::NoRuntime)));
        assert!(!monitor.is_running());
    }

    #[test]
    fn test_parse_signal() {
        assert_eq!("pointer".parse(), Ok(ActivitySignal::PointerDown));
        assert_eq!("blur".parse(), Ok(ActivitySignal::FocusLost));
        assert!("wave".parse::<ActivitySignal>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_tick_engages() {
        let (monitor, target, clock) = monitor(config(true, false, 1));
        let mut monitor = monitor.with_tick_interval(Duration::from_millis(10));
        monitor.start().unwrap();

        clock.advance(61_000);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(target.count() >= 1);

        monitor.stop();
        assert!(!monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sender_activity_and_blur() {
        let (monitor, target, clock) = monitor(config(false, true, 1));
        let mut monitor = monitor.with_tick_interval(Duration::from_millis(10));
        monitor.start().unwrap();
        let sender = monitor.sender().unwrap();

        clock.advance(5_000);
        assert!(sender.send(ActivitySignal::Scroll));
        assert_eq!(monitor.last_activity(), T0 + 5_000);

        assert!(sender.send(ActivitySignal::FocusLost));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(target.count(), 1);

        monitor.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!sender.send(ActivitySignal::FocusLost));
        assert!(!sender.send(ActivitySignal::KeyDown));
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_config_rederives_listeners() {
        let (monitor, target, _) = monitor(config(false, true, 1));
        let mut monitor = monitor.with_tick_interval(Duration::from_millis(10));
        monitor.start().unwrap();

        monitor.update_config(config(false, false, 1)).unwrap();
        assert!(monitor.is_running());
        let sender = monitor.sender().unwrap();
        sender.send(ActivitySignal::FocusLost);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(target.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_resets_idle_window() {
        let (monitor, target, clock) = monitor(config(false, false, 1));
        let mut monitor = monitor.with_tick_interval(Duration::from_millis(10));
        monitor.start().unwrap();

        clock.advance(120_000);
        monitor.update_config(config(true, false, 1)).unwrap();
        assert_eq!(monitor.last_activity(), T0 + 120_000);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(target.count(), 0);
    }
}
