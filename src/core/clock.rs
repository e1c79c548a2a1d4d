//! Wall-clock and sleep abstraction.
//!
//! Every timer in the daemon (hysteresis, cooldowns, reconnect throttle,
//! hardening) reads time through [`Clock`], so the state machine can be
//! driven by [`ManualClock`] in tests without real waits.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;

/// Time source shared by all components.
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Suspend the calling thread for `duration`. Implementations may return
    /// early when woken for shutdown.
    fn sleep(&self, duration: Duration);
}

/// Real clock backed by the system time.
///
/// With a wake channel attached, [`Clock::sleep`] becomes a timed wait that
/// returns as soon as anything is sent on the channel.
#[derive(Debug, Default)]
pub struct SystemClock {
    wake: Option<Receiver<()>>,
}

impl SystemClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a wake channel so sleeps end early on shutdown.
    #[must_use]
    pub fn with_wake(wake: Receiver<()>) -> Self {
        Self { wake: Some(wake) }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        match &self.wake {
            Some(wake) => match wake.recv_timeout(duration) {
                Ok(()) | Err(RecvTimeoutError::Timeout) => {}
                // Nobody left to wake us; fall back to a plain sleep.
                Err(RecvTimeoutError::Disconnected) => std::thread::sleep(duration),
            },
            None => std::thread::sleep(duration),
        }
    }
}

/// Deterministic clock for tests: `sleep` advances time instantly and every
/// requested sleep is recorded.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Clock starting at `secs` seconds after the Unix epoch.
    #[must_use]
    pub fn at_secs(secs: i64) -> Self {
        Self::new(DateTime::from_timestamp(secs, 0).unwrap_or_default())
    }

    /// Jump to an absolute time (may move backwards).
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }

    /// Jump to `secs` seconds after the Unix epoch.
    pub fn set_secs(&self, secs: i64) {
        self.set(DateTime::from_timestamp(secs, 0).unwrap_or_default());
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += TimeDelta::from_std(by).unwrap_or(TimeDelta::zero());
    }

    /// Every duration passed to `sleep` so far, in order.
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
        self.advance(duration);
    }
}

/// Non-negative time elapsed from `since` to `now`; zero if the clock went
/// backwards.
#[must_use]
pub fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}
