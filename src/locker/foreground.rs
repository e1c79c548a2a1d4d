//! Lock by running a program, unlock by terminating it (xtrlock style).

use std::sync::Arc;

use super::LockBackend;
use super::process::{ExitHook, ProcessRunner, SignalError, SupervisedProcess};
use crate::core::errors::{LbError, Result};

/// Supervises one long-lived lock program. `process == None` is the only
/// representation of "unlocked".
pub struct ForegroundBackend {
    command: String,
    runner: Arc<dyn ProcessRunner>,
    process: Option<SupervisedProcess>,
    exit_hook: Option<ExitHook>,
}

impl ForegroundBackend {
    #[must_use]
    pub fn new(command: impl Into<String>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            command: command.into(),
            runner,
            process: None,
            exit_hook: None,
        }
    }

    /// Pid of the running lock program, if any.
    #[must_use]
    pub fn lock_pid(&self) -> Option<u32> {
        self.process.as_ref().map(SupervisedProcess::pid)
    }
}

impl LockBackend for ForegroundBackend {
    fn name(&self) -> &'static str {
        "foreground"
    }

    fn lock(&mut self) -> Result<()> {
        if self.process.as_ref().is_some_and(|p| !p.has_exited()) {
            tracing::debug!("lock program already running");
            return Ok(());
        }
        let child = self.runner.spawn(&self.command)?;
        let process = SupervisedProcess::start(child, self.exit_hook.clone())?;
        tracing::info!(pid = process.pid(), command = %self.command, "lock program started");
        self.process = Some(process);
        Ok(())
    }

    fn unlock(&mut self) -> Result<()> {
        let Some(process) = self.process.take() else {
            return Ok(());
        };
        if process.has_exited() {
            return Ok(());
        }
        match self.runner.terminate(process.pid()) {
            Ok(()) | Err(SignalError::NoSuchProcess) => Ok(()),
            Err(e) => {
                // Still ours; keep tracking it so a later unlock can retry.
                let pid = process.pid();
                self.process = Some(process);
                Err(LbError::Signal {
                    pid,
                    details: e.to_string(),
                })
            }
        }
    }

    fn is_locked(&mut self) -> Result<bool> {
        let Some(process) = &self.process else {
            return Ok(false);
        };
        if process.has_exited() {
            self.process = None;
            return Ok(false);
        }
        Ok(true)
    }

    fn set_exit_hook(&mut self, hook: ExitHook) {
        self.exit_hook = Some(hook);
    }

    fn supervised_pid(&self) -> Option<u32> {
        self.lock_pid()
    }
}
