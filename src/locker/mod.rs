//! Screen locking backends.
//!
//! Every variant implements [`LockBackend`]; the daemon picks one at startup
//! from [`Config::backend_kind`]. Calling `lock` while locked or `unlock`
//! while unlocked is harmless for all of them.

pub mod command;
pub mod dry_run;
pub mod escalated;
pub mod foreground;
pub mod process;

#[cfg(test)]
pub(crate) mod fake;

use std::sync::Arc;

pub use command::CommandBackend;
pub use dry_run::{DryRunBackend, DryRunEvent};
pub use escalated::EscalatedBackend;
pub use foreground::ForegroundBackend;
pub use process::{ExitHook, LockChild, ProcessRunner, ShellRunner, SignalError, SupervisedProcess};

use crate::core::config::{BackendKind, Config};
use crate::core::errors::Result;

/// Capability set shared by all lock backends.
pub trait LockBackend: Send {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn lock(&mut self) -> Result<()>;

    fn unlock(&mut self) -> Result<()>;

    /// Whether a lock is currently in force, as far as the backend can tell.
    fn is_locked(&mut self) -> Result<bool>;

    /// Nudge the session while the user is present (e.g. keep a screensaver
    /// from kicking in).
    fn simulate_activity(&mut self) -> Result<()> {
        Ok(())
    }

    /// Register a callback for when a supervised lock program exits on its
    /// own. Backends without a supervised process ignore it.
    fn set_exit_hook(&mut self, _hook: ExitHook) {}

    /// Pid the exit hook will report for the current lock, if a supervised
    /// process holds it.
    fn supervised_pid(&self) -> Option<u32> {
        None
    }
}

/// Build the backend the configuration selects.
#[must_use]
pub fn build_backend(config: &Config, runner: Arc<dyn ProcessRunner>) -> Box<dyn LockBackend> {
    match config.backend_kind() {
        BackendKind::DryRun => Box::new(DryRunBackend::new()),
        BackendKind::Escalated => build_escalated_backend(config, runner),
        BackendKind::Foreground => Box::new(ForegroundBackend::new(
            config.commands.lock.clone(),
            runner,
        )),
        BackendKind::Command => Box::new(CommandBackend::new(&config.commands, runner)),
    }
}

/// Build the escalated backend used for vlock mode and for hardening.
#[must_use]
pub fn build_escalated_backend(
    config: &Config,
    runner: Arc<dyn ProcessRunner>,
) -> Box<dyn LockBackend> {
    Box::new(EscalatedBackend::new(
        &config.backend,
        &login_name(),
        runner,
    ))
}

/// Name of the user running the daemon.
#[must_use]
pub fn login_name() -> String {
    #[cfg(unix)]
    {
        use nix::unistd::{Uid, User};

        if let Ok(Some(user)) = User::from_uid(Uid::current()) {
            return user.name;
        }
    }
    std::env::var("USER").unwrap_or_default()
}
