//! Top-level CLI definition and dispatch.

use std::path::PathBuf;

use clap::Parser;

use crate::core::config::{Config, ConfigOverrides};
use crate::core::errors::Result;
use crate::daemon::{detach, loop_main, signals};
use crate::logger;
use crate::monitor::StopReason;

/// Lock the screen when your phone walks away, unlock it when it comes back.
#[derive(Debug, Parser)]
#[command(name = "lazyblue", version, about)]
pub struct Cli {
    /// TOML configuration file; command-line flags override its values.
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// MAC address of the device to track.
    #[arg(short = 'm', long = "device-mac", value_name = "MAC")]
    pub device_mac: Option<String>,

    /// RFCOMM channel for the liveness link.
    #[arg(long)]
    pub channel: Option<u8>,

    /// Device is gone below this strength.
    #[arg(short = 'S', long, allow_negative_numbers = true, value_name = "RSSI")]
    pub lock_strength: Option<i32>,

    /// Device is here at or above this strength.
    #[arg(short = 's', long, allow_negative_numbers = true, value_name = "RSSI")]
    pub unlock_strength: Option<i32>,

    /// Seconds the device must be gone before locking.
    #[arg(short = 'T', long, value_name = "SECS")]
    pub lock_time: Option<u64>,

    /// Seconds the device must be here before unlocking.
    #[arg(short = 't', long, value_name = "SECS")]
    pub unlock_time: Option<u64>,

    /// Minimum seconds between two locks.
    #[arg(short = 'C', long, value_name = "SECS")]
    pub lock_cooldown: Option<u64>,

    /// Seconds to wait after a manual unlock before locking again. 0 exits
    /// on manual unlock instead.
    #[arg(short = 'r', long, value_name = "SECS")]
    pub rearm_cooldown: Option<u64>,

    /// Seconds between signal samples (fractions allowed).
    #[arg(short = 'i', long, value_name = "SECS")]
    pub poll_interval: Option<f64>,

    /// Minimum seconds between reconnect attempts.
    #[arg(short = 'I', long, value_name = "SECS")]
    pub connect_interval: Option<u64>,

    /// Escalate to a vlock after this many seconds locked.
    #[arg(short = 'H', long, value_name = "SECS")]
    pub harden_time: Option<u64>,

    /// Command that locks the screen.
    #[arg(short = 'E', long, value_name = "CMD")]
    pub lock_command: Option<String>,

    /// Command that unlocks the screen.
    #[arg(short = 'e', long, value_name = "CMD")]
    pub unlock_command: Option<String>,

    /// Command run every tick while you are present.
    #[arg(long, value_name = "CMD")]
    pub activity_command: Option<String>,

    /// Command whose zero exit status means "unlocked".
    #[arg(long, value_name = "CMD")]
    pub status_command: Option<String>,

    /// The lock command stays in the foreground while locked; unlock by
    /// killing it.
    #[arg(long)]
    pub foreground_lock: bool,

    /// Lock all consoles with vlock (the default when no command is given).
    #[arg(long)]
    pub vlock: bool,

    /// Log what would happen instead of locking. Implies --verbose.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Log a status line every tick.
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Detach and keep running in the background.
    #[arg(short = 'd', long)]
    pub daemon: bool,

    /// Append logs to this file instead of stderr.
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Write the merged configuration to FILE and exit.
    #[arg(long, value_name = "FILE")]
    pub write_config: Option<PathBuf>,
}

impl Cli {
    /// Flags that layer over the configuration file.
    #[must_use]
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            device_mac: self.device_mac.clone(),
            channel: self.channel,
            lock_strength: self.lock_strength,
            unlock_strength: self.unlock_strength,
            lock_time: self.lock_time,
            unlock_time: self.unlock_time,
            lock_cooldown: self.lock_cooldown,
            rearm_cooldown: self.rearm_cooldown,
            poll_interval: self.poll_interval,
            connect_interval: self.connect_interval,
            harden_time: self.harden_time,
            lock_command: self.lock_command.clone(),
            unlock_command: self.unlock_command.clone(),
            status_command: self.status_command.clone(),
            activity_command: self.activity_command.clone(),
            foreground_lock: self.foreground_lock,
            vlock: self.vlock,
            dry_run: self.dry_run,
            verbose: self.verbose,
            log_file: self.log_file.clone(),
        }
    }

    /// Defaults, then the config file, then flags; validated.
    pub fn resolve_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        config.apply_overrides(&self.overrides());
        config.finalize()
    }
}

/// Dispatch the parsed command line.
///
/// # Errors
/// Returns an error for invalid configuration or a failure to start.
pub fn run(cli: &Cli) -> Result<()> {
    let config = cli.resolve_config()?;

    if let Some(path) = &cli.write_config {
        config.write_to(path)?;
        println!("configuration written to {}", path.display());
        return Ok(());
    }

    let detached = detach::is_detached_child();
    if cli.daemon && !detached {
        let pid = detach::spawn_detached()?;
        println!("lazyblue running in the background (pid {pid})");
        return Ok(());
    }

    logger::init(config.logging.verbose, config.logging.log_file.as_deref())?;
    if detached {
        detach::settle()?;
    }

    let shutdown = signals::Shutdown::new();
    let _signals = signals::install(&shutdown)?;
    match loop_main::run(&config, &shutdown)? {
        StopReason::ManualOverride => {
            tracing::warn!("manual unlock with no rearm cooldown; exiting");
        }
        StopReason::Shutdown | StopReason::Completed => {}
    }
    Ok(())
}
