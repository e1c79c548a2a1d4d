//! Daemon configuration: defaults, TOML file, command-line overrides and
//! validation.
//!
//! Precedence is defaults → file → overrides. [`Config::finalize`] applies the
//! implied settings (dry run implies verbose, no commands implies vlock) and
//! validates the merged record, reporting every problem at once.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{LbError, Result};

/// Sentinel strength reported when the device cannot be measured at all.
pub const FAR_AWAY_STRENGTH: i32 = -255;

const DEFAULT_RSSI_COMMAND: &str = "hcitool rssi {mac}";
const DEFAULT_LINK_COMMAND: &str = "rfcomm connect hci0 {mac} {channel}";
const DEFAULT_ESCALATED_COMMAND: &str =
    "sudo sh -c 'USER={user} vlock -a -n </dev/null >/dev/null 2>&1 & echo $!; wait $!'";
const DEFAULT_ESCALATED_PROCESS: &str = "vlock-main";
const DEFAULT_ESCALATED_KILL: &str = "sudo kill {pid}";

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Full daemon configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// MAC address of the paired device. Required before the monitor starts.
    pub device_mac: Option<String>,
    /// RFCOMM channel used for the liveness link.
    pub channel: u8,
    pub thresholds: ThresholdConfig,
    pub timing: TimingConfig,
    pub commands: CommandConfig,
    pub backend: BackendConfig,
    pub logging: LoggingConfig,
}

/// Signal-strength thresholds. `lock_strength < unlock_strength`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Device is gone when strength < this.
    pub lock_strength: i32,
    /// Device is here when strength >= this.
    pub unlock_strength: i32,
}

/// Timers, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub lock_time: u64,
    pub unlock_time: u64,
    pub lock_cooldown: u64,
    /// 0 means "exit when the user unlocks manually".
    pub rearm_cooldown: u64,
    /// Fractional seconds are allowed.
    pub poll_interval: f64,
    pub connect_interval: u64,
    /// Escalate to the hardened lock after this long locked. Unset disables.
    pub harden_time: Option<u64>,
}

/// External commands. Empty strings mean "not configured".
///
/// `rssi` and `link` may contain `{mac}` and `{channel}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub lock: String,
    pub unlock: String,
    pub status: String,
    pub activity: String,
    pub rssi: String,
    pub link: String,
}

/// Backend selection flags and escalated-lock settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Run the lock command as a long-lived child and kill it to unlock.
    pub foreground_lock: bool,
    /// Use the privilege-escalated vlock backend.
    pub vlock: bool,
    /// Log what would happen instead of locking.
    pub dry_run: bool,
    /// Supervisor command; must print the lock program's pid on its first
    /// stdout line. `{user}` is replaced by the login name.
    pub escalated_command: String,
    /// Process name that identifies a live escalated lock.
    pub escalated_process_name: String,
    /// Fallback used when the pid cannot be signalled directly. `{pid}` is
    /// replaced by the reported pid.
    pub escalated_kill_command: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub verbose: bool,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_mac: None,
            channel: 1,
            thresholds: ThresholdConfig::default(),
            timing: TimingConfig::default(),
            commands: CommandConfig::default(),
            backend: BackendConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            lock_strength: -1,
            unlock_strength: 0,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            lock_time: 6,
            unlock_time: 1,
            lock_cooldown: 15,
            rearm_cooldown: 0,
            poll_interval: 1.0,
            connect_interval: 1,
            harden_time: None,
        }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            lock: String::new(),
            unlock: String::new(),
            status: String::new(),
            activity: String::new(),
            rssi: DEFAULT_RSSI_COMMAND.to_string(),
            link: DEFAULT_LINK_COMMAND.to_string(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            foreground_lock: false,
            vlock: false,
            dry_run: false,
            escalated_command: DEFAULT_ESCALATED_COMMAND.to_string(),
            escalated_process_name: DEFAULT_ESCALATED_PROCESS.to_string(),
            escalated_kill_command: DEFAULT_ESCALATED_KILL.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Runtime views
// ---------------------------------------------------------------------------

/// [`TimingConfig`] converted to durations for the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timers {
    pub lock_time: Duration,
    pub unlock_time: Duration,
    pub lock_cooldown: Duration,
    pub rearm_cooldown: Duration,
    pub poll_interval: Duration,
    pub connect_interval: Duration,
    pub harden_time: Option<Duration>,
}

impl TimingConfig {
    /// Durations view. Call after validation: a non-finite or negative poll
    /// interval collapses to zero.
    #[must_use]
    pub fn timers(&self) -> Timers {
        Timers {
            lock_time: Duration::from_secs(self.lock_time),
            unlock_time: Duration::from_secs(self.unlock_time),
            lock_cooldown: Duration::from_secs(self.lock_cooldown),
            rearm_cooldown: Duration::from_secs(self.rearm_cooldown),
            poll_interval: Duration::try_from_secs_f64(self.poll_interval)
                .unwrap_or(Duration::ZERO),
            connect_interval: Duration::from_secs(self.connect_interval),
            harden_time: self.harden_time.map(Duration::from_secs),
        }
    }
}

/// `secs` as a pacing interval, if it rounds to a nonzero [`Duration`] that
/// also fits a [`chrono::TimeDelta`].
fn usable_poll_interval(secs: f64) -> Option<Duration> {
    let interval = Duration::try_from_secs_f64(secs).ok()?;
    (!interval.is_zero() && chrono::TimeDelta::from_std(interval).is_ok()).then_some(interval)
}

/// Which [`crate::locker::LockBackend`] variant the configuration selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    DryRun,
    Escalated,
    Foreground,
    Command,
}

// ---------------------------------------------------------------------------
// Overrides
// ---------------------------------------------------------------------------

/// Command-line values layered on top of the file. `None`/`false` leaves the
/// underlying value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub device_mac: Option<String>,
    pub channel: Option<u8>,
    pub lock_strength: Option<i32>,
    pub unlock_strength: Option<i32>,
    pub lock_time: Option<u64>,
    pub unlock_time: Option<u64>,
    pub lock_cooldown: Option<u64>,
    pub rearm_cooldown: Option<u64>,
    pub poll_interval: Option<f64>,
    pub connect_interval: Option<u64>,
    pub harden_time: Option<u64>,
    pub lock_command: Option<String>,
    pub unlock_command: Option<String>,
    pub status_command: Option<String>,
    pub activity_command: Option<String>,
    pub foreground_lock: bool,
    pub vlock: bool,
    pub dry_run: bool,
    pub verbose: bool,
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Load / merge / validate / write
// ---------------------------------------------------------------------------

impl Config {
    /// Load defaults, then the file at `path` if one is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Err(LbError::MissingConfig {
                path: path.to_path_buf(),
            });
        }
        let raw = std::fs::read_to_string(path).map_err(|e| LbError::io(path, e))?;
        Self::from_toml_str(&raw)
    }

    /// Parse a TOML document; absent keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Layer command-line overrides on top of this configuration.
    pub fn apply_overrides(&mut self, o: &ConfigOverrides) {
        fn set<T: Clone>(slot: &mut T, value: Option<&T>) {
            if let Some(value) = value {
                *slot = value.clone();
            }
        }

        if o.device_mac.is_some() {
            self.device_mac.clone_from(&o.device_mac);
        }
        set(&mut self.channel, o.channel.as_ref());
        set(&mut self.thresholds.lock_strength, o.lock_strength.as_ref());
        set(&mut self.thresholds.unlock_strength, o.unlock_strength.as_ref());
        set(&mut self.timing.lock_time, o.lock_time.as_ref());
        set(&mut self.timing.unlock_time, o.unlock_time.as_ref());
        set(&mut self.timing.lock_cooldown, o.lock_cooldown.as_ref());
        set(&mut self.timing.rearm_cooldown, o.rearm_cooldown.as_ref());
        set(&mut self.timing.poll_interval, o.poll_interval.as_ref());
        set(&mut self.timing.connect_interval, o.connect_interval.as_ref());
        if o.harden_time.is_some() {
            self.timing.harden_time = o.harden_time;
        }
        set(&mut self.commands.lock, o.lock_command.as_ref());
        set(&mut self.commands.unlock, o.unlock_command.as_ref());
        set(&mut self.commands.status, o.status_command.as_ref());
        set(&mut self.commands.activity, o.activity_command.as_ref());
        self.backend.foreground_lock |= o.foreground_lock;
        self.backend.vlock |= o.vlock;
        self.backend.dry_run |= o.dry_run;
        self.logging.verbose |= o.verbose;
        if o.log_file.is_some() {
            self.logging.log_file.clone_from(&o.log_file);
        }
    }

    /// Apply implied settings and validate. Returns every problem found in a
    /// single [`LbError::InvalidConfig`].
    pub fn finalize(mut self) -> Result<Self> {
        let mut problems = Vec::<String>::new();

        if self
            .device_mac
            .as_deref()
            .is_none_or(|mac| mac.trim().is_empty())
        {
            problems.push("you must specify the MAC address of your device".to_string());
        }

        if self.backend.dry_run {
            self.logging.verbose = true;
        }

        if self.backend.foreground_lock && (self.backend.vlock || !self.commands.unlock.is_empty())
        {
            problems.push("--foreground-lock conflicts with --vlock and unlock command".to_string());
        }

        if !self.has_any_screen_command() {
            self.backend.vlock = true;
        }

        if self.backend.vlock && !self.commands.status.is_empty() {
            problems.push("may not use both --vlock and a status command".to_string());
        }

        let poll = self.timing.poll_interval;
        if !poll.is_finite() || poll <= 0.0 {
            problems.push(format!("poll_interval must be a positive number, not {poll}"));
        } else if usable_poll_interval(poll).is_none() {
            problems.push(format!("poll_interval {poll} is too small or too large to pace by"));
        }

        if self.thresholds.lock_strength >= self.thresholds.unlock_strength {
            problems.push(format!(
                "lock strength ({}) must be < unlock strength ({})",
                self.thresholds.lock_strength, self.thresholds.unlock_strength
            ));
        }

        if problems.is_empty() {
            Ok(self)
        } else {
            Err(LbError::InvalidConfig {
                details: problems.join("; "),
            })
        }
    }

    /// Backend variant selected by the flags. Dry run wins, then vlock, then
    /// foreground, then plain commands.
    #[must_use]
    pub fn backend_kind(&self) -> BackendKind {
        if self.backend.dry_run {
            BackendKind::DryRun
        } else if self.backend.vlock {
            BackendKind::Escalated
        } else if self.backend.foreground_lock {
            BackendKind::Foreground
        } else {
            BackendKind::Command
        }
    }

    fn has_any_screen_command(&self) -> bool {
        [
            &self.commands.activity,
            &self.commands.status,
            &self.commands.lock,
            &self.commands.unlock,
        ]
        .iter()
        .any(|command| !command.is_empty())
    }

    /// Render as a TOML document.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write as TOML to `path`, creating parent directories.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let body = self.to_toml_string()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| LbError::io(parent, e))?;
        }
        std::fs::write(path, body).map_err(|e| LbError::io(path, e))
    }
}

/// Replace `{name}` placeholders in `template`.
#[must_use]
pub fn fill_placeholders(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{name}}}"), value)
    })
}
