//! Proximity state machine.
//!
//! One [`Monitor::poll`] per tick: pace, detect a manual unlock, sample the
//! signal, transition, then check for hardening. All runtime state lives in
//! [`Runtime`] behind a mutex shared with the lock-program supervision
//! worker; the poll loop holds it for the whole mutation phase of a tick, and
//! the worker takes it before reacting to a lock program that exited on its
//! own. Neither side calls back into code that re-acquires it.
//!
//! Backend failures never escape a tick. They are logged and the state is
//! left as if the action had not happened, so the next eligible tick retries.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;

use super::proximity::{DeviceState, classify};
use crate::core::clock::{Clock, elapsed};
use crate::core::config::{Config, ThresholdConfig, Timers};
use crate::locker::{ExitHook, LockBackend};
use crate::radio::StrengthReader;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Screen lock state as driven by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LockState {
    #[default]
    Unlocked,
    Locked,
    /// Escalated lock. Only an out-of-band unlock of the hardened backend
    /// leaves this state.
    Hardened,
}

impl LockState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unlocked => "unlocked",
            Self::Locked => "locked",
            Self::Hardened => "hardened",
        }
    }

    /// Whether `device` already agrees with this state (no change pending).
    const fn agrees_with(self, device: DeviceState) -> bool {
        matches!(
            (self, device),
            (Self::Unlocked, DeviceState::Here) | (Self::Locked, DeviceState::Gone)
        )
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the poll loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The user unlocked outside our control and no rearm cooldown is set.
    ManualOverride,
    /// SIGINT/SIGTERM.
    Shutdown,
    /// A bounded loop ran all its ticks.
    Completed,
}

/// Outcome of a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Continue,
    Stop(StopReason),
}

/// Monitor runtime record. Mutated only under the runtime mutex.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Runtime {
    pub state: LockState,
    /// Time spent disagreeing with `state` in the current hysteresis window.
    pub count: Duration,
    pub last_locked: Option<DateTime<Utc>>,
    pub last_rearm: Option<DateTime<Utc>>,
    pub last_poll: Option<DateTime<Utc>>,
    pub min_strength: Option<i32>,
    pub max_strength: Option<i32>,
    /// Set by the supervision worker; honoured at the start of the next tick.
    pub stop_requested: Option<StopReason>,
    /// Supervised pid holding the current lock. Exit hooks for any other pid
    /// are stale and ignored.
    pub lock_pid: Option<u32>,
}

/// What the monitor needs from the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    pub thresholds: ThresholdConfig,
    pub timers: Timers,
    /// Emit the per-tick report at `info` instead of `debug`.
    pub verbose: bool,
}

impl MonitorSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            thresholds: config.thresholds,
            timers: config.timing.timers(),
            verbose: config.logging.verbose,
        }
    }
}

/// One line of per-tick telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub lock_state: LockState,
    pub device_state: DeviceState,
    pub change_time: Duration,
    pub last_locked: Option<DateTime<Utc>>,
    pub strength: i32,
    pub min_strength: i32,
    pub max_strength: i32,
}

impl fmt::Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lock_state: {}\tdevice_state: {}\tchange_time: {:.2}\tlast_locked: {}\t\
             signal_strength: {}\tmax_strength: {}\tmin_strength: {}",
            self.lock_state,
            self.device_state,
            self.change_time.as_secs_f64(),
            self.last_locked.map_or(0, |t| t.timestamp()),
            self.strength,
            self.max_strength,
            self.min_strength,
        )
    }
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

pub struct Monitor {
    settings: MonitorSettings,
    source: Box<dyn StrengthReader>,
    backend: Box<dyn LockBackend>,
    hardened: Option<Box<dyn LockBackend>>,
    clock: Arc<dyn Clock>,
    runtime: Arc<Mutex<Runtime>>,
    shutdown: Option<Arc<AtomicBool>>,
}

impl Monitor {
    /// Wire up a monitor in the `Unlocked` state and register the manual
    /// unlock hook with the backend.
    pub fn new(
        settings: MonitorSettings,
        source: Box<dyn StrengthReader>,
        mut backend: Box<dyn LockBackend>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let runtime = Arc::new(Mutex::new(Runtime::default()));
        backend.set_exit_hook(manual_unlock_hook(
            Arc::clone(&runtime),
            Arc::clone(&clock),
            settings.timers.rearm_cooldown,
        ));
        Self {
            settings,
            source,
            backend,
            hardened: None,
            clock,
            runtime,
            shutdown: None,
        }
    }

    /// Backend used for escalation once `harden_time` elapses.
    #[must_use]
    pub fn with_hardened(mut self, hardened: Box<dyn LockBackend>) -> Self {
        self.hardened = Some(hardened);
        self
    }

    /// Flag checked after every pacing sleep; when set the loop stops.
    #[must_use]
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = Some(flag);
        self
    }

    #[must_use]
    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Snapshot of the runtime record.
    #[must_use]
    pub fn runtime(&self) -> Runtime {
        self.runtime.lock().clone()
    }

    /// Mutate the runtime record under its lock.
    pub fn with_runtime<R>(&self, f: impl FnOnce(&mut Runtime) -> R) -> R {
        f(&mut self.runtime.lock())
    }

    /// Poll `count` times, or until stopped when `count` is `None`.
    pub fn poll_loop(&mut self, count: Option<usize>) -> StopReason {
        let mut remaining = count;
        loop {
            if remaining == Some(0) {
                return StopReason::Completed;
            }
            if let Tick::Stop(reason) = self.poll() {
                return reason;
            }
            if let Some(n) = remaining.as_mut() {
                *n -= 1;
            }
        }
    }

    /// Run one tick, sleeping first if the previous tick was less than
    /// `poll_interval` ago.
    pub fn poll(&mut self) -> Tick {
        self.pace();
        if self
            .shutdown
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
        {
            return Tick::Stop(StopReason::Shutdown);
        }

        let now = self.clock.now();
        {
            let runtime = Arc::clone(&self.runtime);
            let mut rt = runtime.lock();
            rt.last_poll = Some(now);
            if let Some(reason) = rt.stop_requested.take() {
                return Tick::Stop(reason);
            }
            if rt.state == LockState::Locked && !self.backend_reports_locked() {
                if self.settings.timers.rearm_cooldown.is_zero() {
                    tracing::info!("screen unlocked manually and no rearm cooldown set; exiting");
                    return Tick::Stop(StopReason::ManualOverride);
                }
                tracing::info!(
                    rearm_cooldown = self.settings.timers.rearm_cooldown.as_secs(),
                    "screen unlocked manually; rearming after cooldown"
                );
                rt.state = LockState::Unlocked;
                rt.last_rearm = Some(now);
                rt.lock_pid = None;
            }
        }

        let strength = self.source.read_strength();
        self.update(strength);
        Tick::Continue
    }

    /// Classify one reading, transition, track min/max, escalate if due, and
    /// emit the tick report.
    pub fn update(&mut self, strength: i32) -> TickReport {
        let device = classify(
            strength,
            self.settings.thresholds.lock_strength,
            self.settings.thresholds.unlock_strength,
        );
        let runtime = Arc::clone(&self.runtime);
        let mut rt = runtime.lock();
        let now = self.clock.now();

        self.apply_transition(&mut rt, device, now);

        let min = rt.min_strength.map_or(strength, |m| m.min(strength));
        let max = rt.max_strength.map_or(strength, |m| m.max(strength));
        rt.min_strength = Some(min);
        rt.max_strength = Some(max);

        self.maybe_harden(&mut rt, now);

        if rt.state == LockState::Unlocked && device == DeviceState::Here {
            if let Err(e) = self.backend.simulate_activity() {
                tracing::warn!(error = %e, "activity command failed");
            }
        }

        let report = TickReport {
            lock_state: rt.state,
            device_state: device,
            change_time: rt.count,
            last_locked: rt.last_locked,
            strength,
            min_strength: min,
            max_strength: max,
        };
        if self.settings.verbose {
            tracing::info!("{report}");
        } else {
            tracing::debug!("{report}");
        }
        report
    }

    /// Apply one state-machine transition for `device` at the current time.
    pub fn transition(&mut self, device: DeviceState) {
        let runtime = Arc::clone(&self.runtime);
        let mut rt = runtime.lock();
        let now = self.clock.now();
        self.apply_transition(&mut rt, device, now);
    }

    fn pace(&self) {
        let Some(last_poll) = self.runtime.lock().last_poll else {
            return;
        };
        let interval = TimeDelta::from_std(self.settings.timers.poll_interval)
            .unwrap_or(TimeDelta::zero());
        let delta = self.clock.now() - last_poll;
        if delta < interval {
            let wait = (interval - delta).to_std().unwrap_or(Duration::ZERO);
            self.clock.sleep(wait);
        }
    }

    fn backend_reports_locked(&mut self) -> bool {
        match self.backend.is_locked() {
            Ok(locked) => locked,
            Err(e) => {
                tracing::warn!(backend = self.backend.name(), error = %e, "lock status check failed");
                true
            }
        }
    }

    fn apply_transition(&mut self, rt: &mut Runtime, device: DeviceState, now: DateTime<Utc>) {
        if rt.state == LockState::Hardened {
            self.check_hardened_release(rt, now);
            return;
        }

        if device == DeviceState::Neither || rt.state.agrees_with(device) {
            rt.count = Duration::ZERO;
            return;
        }

        let timers = self.settings.timers;
        rt.count += timers.poll_interval;

        match rt.state {
            LockState::Locked if rt.count >= timers.unlock_time => match self.backend.unlock() {
                Ok(()) => {
                    tracing::info!(backend = self.backend.name(), "device back; unlocked");
                    rt.count = Duration::ZERO;
                    rt.state = LockState::Unlocked;
                    rt.lock_pid = None;
                }
                Err(e) => tracing::warn!(backend = self.backend.name(), error = %e, "unlock failed"),
            },
            LockState::Unlocked if rt.count >= timers.lock_time => {
                if !cooldowns_clear(rt, &timers, now) {
                    tracing::debug!(
                        count = rt.count.as_secs_f64(),
                        "lock due but cooldown still active"
                    );
                    return;
                }
                match self.backend.lock() {
                    Ok(()) => {
                        tracing::info!(backend = self.backend.name(), "device gone; locked");
                        rt.state = LockState::Locked;
                        rt.count = Duration::ZERO;
                        rt.last_locked = Some(now);
                        rt.lock_pid = self.backend.supervised_pid();
                    }
                    Err(e) => {
                        tracing::warn!(backend = self.backend.name(), error = %e, "lock failed");
                    }
                }
            }
            _ => {}
        }
    }

    fn check_hardened_release(&mut self, rt: &mut Runtime, now: DateTime<Utc>) {
        let still_locked = match self.hardened.as_mut().map(|h| h.is_locked()) {
            Some(Ok(locked)) => locked,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "hardened lock status check failed");
                true
            }
            None => false,
        };
        if still_locked {
            return;
        }
        rt.last_rearm = Some(now);
        if let Err(e) = self.backend.unlock() {
            tracing::warn!(backend = self.backend.name(), error = %e, "unlock after hardened release failed");
        }
        rt.state = LockState::Unlocked;
        rt.count = Duration::ZERO;
        rt.lock_pid = None;
        tracing::info!("hardened lock released; unlocked");
    }

    fn maybe_harden(&mut self, rt: &mut Runtime, now: DateTime<Utc>) {
        let Some(harden_time) = self.settings.timers.harden_time else {
            return;
        };
        if rt.state != LockState::Locked
            || !rt.last_locked.is_none_or(|t| elapsed(t, now) >= harden_time)
        {
            return;
        }
        let Some(hardened) = self.hardened.as_mut() else {
            return;
        };
        match hardened.lock() {
            Ok(()) => {
                tracing::info!(backend = hardened.name(), "locked for too long; hardened");
                rt.state = LockState::Hardened;
            }
            Err(e) => tracing::warn!(backend = hardened.name(), error = %e, "hardening failed"),
        }
    }
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("settings", &self.settings)
            .field("backend", &self.backend.name())
            .field("hardened", &self.hardened.as_ref().map(|h| h.name()))
            .field("runtime", &*self.runtime.lock())
            .finish_non_exhaustive()
    }
}

/// Both the lock cooldown and the rearm cooldown have run out. Inclusive:
/// exactly at the deadline the lock is allowed.
fn cooldowns_clear(rt: &Runtime, timers: &Timers, now: DateTime<Utc>) -> bool {
    let clear = |since: Option<DateTime<Utc>>, cooldown: Duration| {
        since.is_none_or(|t| {
            TimeDelta::from_std(cooldown)
                .ok()
                .and_then(|d| t.checked_add_signed(d))
                .is_some_and(|deadline| now >= deadline)
        })
    };
    clear(rt.last_locked, timers.lock_cooldown) && clear(rt.last_rearm, timers.rearm_cooldown)
}

/// Worker-side reaction to the current lock program exiting while we think
/// the screen is locked: the same rule the poll loop applies in its override
/// check.
fn manual_unlock_hook(
    runtime: Arc<Mutex<Runtime>>,
    clock: Arc<dyn Clock>,
    rearm_cooldown: Duration,
) -> ExitHook {
    Arc::new(move |pid| {
        let mut rt = runtime.lock();
        if rt.state != LockState::Locked {
            return;
        }
        if rt.lock_pid != Some(pid) {
            tracing::debug!(pid, current = ?rt.lock_pid, "ignoring exit of a stale lock program");
            return;
        }
        if rearm_cooldown.is_zero() {
            tracing::info!(pid, "lock program exited; stopping at next tick");
            rt.stop_requested = Some(StopReason::ManualOverride);
        } else {
            tracing::info!(pid, "lock program exited; rearming after cooldown");
            rt.state = LockState::Unlocked;
            rt.last_rearm = Some(clock.now());
            rt.lock_pid = None;
        }
    })
}
