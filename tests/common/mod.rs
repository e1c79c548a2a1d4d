//! Shared helpers for integration tests: CLI runner and monitor fakes.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::sync::Arc;

use lazyblue::core::clock::{Clock, ManualClock};
use lazyblue::core::config::{ThresholdConfig, Timers};
use lazyblue::core::errors::{LbError, Result};
use lazyblue::locker::LockBackend;
use lazyblue::monitor::{Monitor, MonitorSettings};
use lazyblue::radio::StrengthReader;
use parking_lot::Mutex;

// ──────────────────── CLI ────────────────────

pub struct CliResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

/// Run the binary with `args`, keeping a log of the exchange under the
/// target directory for post-mortem.
pub fn run_cli_case(case: &str, args: &[&str]) -> CliResult {
    run_cli_case_in(case, args, None)
}

pub fn run_cli_case_in(case: &str, args: &[&str], cwd: Option<&Path>) -> CliResult {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_lazyblue"));
    cmd.args(args).env_remove("RUST_LOG");
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    let output = cmd.output().expect("run lazyblue binary");
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    let log_dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("cli-cases");
    fs::create_dir_all(&log_dir).expect("create log dir");
    let log_path = log_dir.join(format!("{case}.log"));
    fs::write(
        &log_path,
        format!(
            "args: {args:?}\nstatus: {}\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}\n",
            output.status
        ),
    )
    .expect("write case log");

    CliResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

// ──────────────────── monitor fakes ────────────────────

pub const HERE: i32 = -1;
pub const GONE: i32 = -40;
pub const NEITHER: i32 = -6;

/// Replays queued readings, then `fallback` forever.
#[derive(Clone)]
pub struct Script {
    queue: Arc<Mutex<VecDeque<i32>>>,
    fallback: Arc<Mutex<i32>>,
}

impl Script {
    pub fn new(fallback: i32) -> Self {
        Self {
            queue: Arc::default(),
            fallback: Arc::new(Mutex::new(fallback)),
        }
    }

    pub fn push(&self, readings: &[i32]) {
        self.queue.lock().extend(readings);
    }

    pub fn set_fallback(&self, value: i32) {
        *self.fallback.lock() = value;
    }
}

impl StrengthReader for Script {
    fn read_strength(&mut self) -> i32 {
        let next = self.queue.lock().pop_front();
        next.unwrap_or_else(|| *self.fallback.lock())
    }
}

#[derive(Default)]
struct Screen {
    locked: bool,
    log: Vec<&'static str>,
    refuse: bool,
}

/// A screen that records every call and can be unlocked by hand.
#[derive(Clone, Default)]
pub struct FakeScreen {
    inner: Arc<Mutex<Screen>>,
}

impl FakeScreen {
    pub fn log(&self) -> Vec<&'static str> {
        self.inner.lock().log.clone()
    }

    pub fn actions(&self) -> Vec<&'static str> {
        self.log()
            .into_iter()
            .filter(|c| *c == "lock" || *c == "unlock")
            .collect()
    }

    pub fn is_locked_now(&self) -> bool {
        self.inner.lock().locked
    }

    pub fn unlock_by_hand(&self) {
        self.inner.lock().locked = false;
    }

    pub fn refuse(&self, refuse: bool) {
        self.inner.lock().refuse = refuse;
    }
}

impl LockBackend for FakeScreen {
    fn name(&self) -> &'static str {
        "fake-screen"
    }

    fn lock(&mut self) -> Result<()> {
        let mut s = self.inner.lock();
        s.log.push("lock");
        if s.refuse {
            return Err(LbError::Runtime {
                details: "screen refused".to_string(),
            });
        }
        s.locked = true;
        Ok(())
    }

    fn unlock(&mut self) -> Result<()> {
        let mut s = self.inner.lock();
        s.log.push("unlock");
        if s.refuse {
            return Err(LbError::Runtime {
                details: "screen refused".to_string(),
            });
        }
        s.locked = false;
        Ok(())
    }

    fn is_locked(&mut self) -> Result<bool> {
        let mut s = self.inner.lock();
        s.log.push("is_locked");
        Ok(s.locked)
    }

    fn simulate_activity(&mut self) -> Result<()> {
        self.inner.lock().log.push("activity");
        Ok(())
    }
}

pub fn timers(lock_time: u64, unlock_time: u64) -> Timers {
    Timers {
        lock_time: std::time::Duration::from_secs(lock_time),
        unlock_time: std::time::Duration::from_secs(unlock_time),
        lock_cooldown: std::time::Duration::ZERO,
        rearm_cooldown: std::time::Duration::ZERO,
        poll_interval: std::time::Duration::from_secs(1),
        connect_interval: std::time::Duration::from_secs(1),
        harden_time: None,
    }
}

pub struct Harness {
    pub monitor: Monitor,
    pub script: Script,
    pub screen: FakeScreen,
    pub clock: Arc<ManualClock>,
}

/// Monitor with thresholds lock=-10, unlock=-3 at t=0.
pub fn harness(timers: Timers) -> Harness {
    let clock = Arc::new(ManualClock::at_secs(0));
    let script = Script::new(HERE);
    let screen = FakeScreen::default();
    let shared: Arc<dyn Clock> = clock.clone();
    let monitor = Monitor::new(
        MonitorSettings {
            thresholds: ThresholdConfig {
                lock_strength: -10,
                unlock_strength: -3,
            },
            timers,
            verbose: false,
        },
        Box::new(script.clone()),
        Box::new(screen.clone()),
        shared,
    );
    Harness {
        monitor,
        script,
        screen,
        clock,
    }
}
