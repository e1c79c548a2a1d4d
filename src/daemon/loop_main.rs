//! Daemon entry: wire a validated [`Config`] into a running [`Monitor`].

use std::sync::Arc;

use crate::core::clock::{Clock, SystemClock};
use crate::core::config::{BackendKind, Config};
use crate::core::errors::{LbError, Result};
use crate::locker::{
    DryRunBackend, LockBackend, ProcessRunner, ShellRunner, build_backend, build_escalated_backend,
};
use crate::monitor::{Monitor, MonitorSettings, StopReason};
use crate::radio::{CommandStrengthQuery, RfcommTransport, SignalSource, StrengthReader};

use super::signals::Shutdown;

/// Assemble the monitor around an already-built strength reader.
///
/// The hardened backend is only created when `harden_time` is set; in dry-run
/// mode it is another dry-run backend.
#[must_use]
pub fn build_monitor(
    config: &Config,
    source: Box<dyn StrengthReader>,
    runner: Arc<dyn ProcessRunner>,
    clock: Arc<dyn Clock>,
) -> Monitor {
    let backend = build_backend(config, Arc::clone(&runner));
    tracing::info!(backend = backend.name(), "lock backend selected");

    let monitor = Monitor::new(MonitorSettings::from_config(config), source, backend, clock);
    if config.timing.harden_time.is_none() {
        return monitor;
    }
    let hardened: Box<dyn LockBackend> = match config.backend_kind() {
        BackendKind::DryRun => Box::new(DryRunBackend::new()),
        _ => build_escalated_backend(config, runner),
    };
    monitor.with_hardened(hardened)
}

/// Run the daemon until shutdown or a manual override without rearm.
pub fn run(config: &Config, shutdown: &Shutdown) -> Result<StopReason> {
    let mac = config
        .device_mac
        .as_deref()
        .ok_or_else(|| LbError::InvalidConfig {
            details: "device MAC address is required".to_string(),
        })?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::with_wake(shutdown.wake_receiver()));
    let timers = config.timing.timers();

    let source = SignalSource::new(
        mac,
        config.channel,
        Box::new(RfcommTransport::new(config.commands.link.clone())),
        Box::new(CommandStrengthQuery::new(config.commands.rssi.clone())),
        Arc::clone(&clock),
        timers.connect_interval,
    );
    let runner: Arc<dyn ProcessRunner> = Arc::new(ShellRunner);
    let mut monitor = build_monitor(config, Box::new(source), runner, clock)
        .with_shutdown(shutdown.flag());

    tracing::info!(
        device = mac,
        poll_interval = timers.poll_interval.as_secs_f64(),
        lock_strength = config.thresholds.lock_strength,
        unlock_strength = config.thresholds.unlock_strength,
        "monitoring started"
    );
    let reason = monitor.poll_loop(None);
    tracing::info!(?reason, "monitoring stopped");
    Ok(reason)
}
