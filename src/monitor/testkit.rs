//! Fakes for driving [`Monitor`](super::Monitor) without radios or processes.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::engine::{Monitor, MonitorSettings};
use crate::core::clock::{Clock, ManualClock};
use crate::core::config::{ThresholdConfig, Timers};
use crate::core::errors::{LbError, Result};
use crate::locker::{ExitHook, LockBackend};
use crate::radio::StrengthReader;

/// Replays queued readings, then repeats `fallback`.
#[derive(Debug, Clone)]
pub struct ScriptedReader {
    queue: Arc<Mutex<VecDeque<i32>>>,
    fallback: Arc<Mutex<i32>>,
}

impl ScriptedReader {
    pub fn new(fallback: i32) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            fallback: Arc::new(Mutex::new(fallback)),
        }
    }

    pub fn push(&self, readings: &[i32]) {
        self.queue.lock().extend(readings.iter().copied());
    }

    pub fn set_fallback(&self, strength: i32) {
        *self.fallback.lock() = strength;
    }
}

impl StrengthReader for ScriptedReader {
    fn read_strength(&mut self) -> i32 {
        self.queue
            .lock()
            .pop_front()
            .unwrap_or_else(|| *self.fallback.lock())
    }
}

#[derive(Default)]
struct BackendState {
    locked: bool,
    /// Forces `is_locked` regardless of `locked`.
    reported: Option<bool>,
    status_error: bool,
    fail_lock: bool,
    fail_unlock: bool,
    calls: Vec<&'static str>,
    hook: Option<ExitHook>,
}

/// Backend that records calls. Cloned handles share state, so a test can keep
/// one while the monitor owns another.
#[derive(Clone, Default)]
pub struct RecordingBackend {
    name: &'static str,
    state: Arc<Mutex<BackendState>>,
}

impl RecordingBackend {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Arc::default(),
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.state.lock().calls.iter().filter(|c| **c == call).count()
    }

    pub fn is_held(&self) -> bool {
        self.state.lock().locked
    }

    /// Simulate an out-of-band unlock.
    pub fn release(&self) {
        let mut state = self.state.lock();
        state.locked = false;
        state.reported = None;
    }

    pub fn report_locked(&self, value: Option<bool>) {
        self.state.lock().reported = value;
    }

    pub fn fail_status(&self, fail: bool) {
        self.state.lock().status_error = fail;
    }

    pub fn fail_lock(&self, fail: bool) {
        self.state.lock().fail_lock = fail;
    }

    pub fn fail_unlock(&self, fail: bool) {
        self.state.lock().fail_unlock = fail;
    }

    /// Fire the registered exit hook as the supervision worker would.
    pub fn fire_exit_hook(&self, pid: u32) {
        let hook = self.state.lock().hook.clone();
        if let Some(hook) = hook {
            hook(pid);
        }
    }
}

impl LockBackend for RecordingBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn lock(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push("lock");
        if state.fail_lock {
            return Err(LbError::Runtime {
                details: "lock refused".to_string(),
            });
        }
        state.locked = true;
        Ok(())
    }

    fn unlock(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push("unlock");
        if state.fail_unlock {
            return Err(LbError::Runtime {
                details: "unlock refused".to_string(),
            });
        }
        state.locked = false;
        Ok(())
    }

    fn is_locked(&mut self) -> Result<bool> {
        let mut state = self.state.lock();
        state.calls.push("is_locked");
        if state.status_error {
            return Err(LbError::Runtime {
                details: "status unavailable".to_string(),
            });
        }
        Ok(state.reported.unwrap_or(state.locked))
    }

    fn simulate_activity(&mut self) -> Result<()> {
        self.state.lock().calls.push("activity");
        Ok(())
    }

    fn set_exit_hook(&mut self, hook: ExitHook) {
        self.state.lock().hook = Some(hook);
    }
}

/// Timers with the reference defaults (`lock_time` 6, `unlock_time` 1,
/// no cooldowns, poll every second).
pub fn timers() -> Timers {
    Timers {
        lock_time: Duration::from_secs(6),
        unlock_time: Duration::from_secs(1),
        lock_cooldown: Duration::ZERO,
        rearm_cooldown: Duration::ZERO,
        poll_interval: Duration::from_secs(1),
        connect_interval: Duration::from_secs(1),
        harden_time: None,
    }
}

pub fn settings(timers: Timers) -> MonitorSettings {
    MonitorSettings {
        thresholds: ThresholdConfig {
            lock_strength: -10,
            unlock_strength: -3,
        },
        timers,
        verbose: false,
    }
}

/// Everything a monitor test needs a handle on.
pub struct Rig {
    pub monitor: Monitor,
    pub reader: ScriptedReader,
    pub backend: RecordingBackend,
    pub hardened: RecordingBackend,
    pub clock: Arc<ManualClock>,
}

pub const HERE: i32 = -1;
pub const GONE: i32 = -50;
pub const NEITHER: i32 = -5;

pub fn rig(timers: Timers) -> Rig {
    let clock = Arc::new(ManualClock::at_secs(1_000));
    let reader = ScriptedReader::new(HERE);
    let backend = RecordingBackend::new("recording");
    let hardened = RecordingBackend::new("hardened");
    let shared: Arc<dyn Clock> = clock.clone();
    let mut monitor = Monitor::new(
        settings(timers),
        Box::new(reader.clone()),
        Box::new(backend.clone()),
        shared,
    );
    if timers.harden_time.is_some() {
        monitor = monitor.with_hardened(Box::new(hardened.clone()));
    }
    Rig {
        monitor,
        reader,
        backend,
        hardened,
        clock,
    }
}
