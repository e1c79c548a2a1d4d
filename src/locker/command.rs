//! Lock backend driven by independent lock/unlock/status/activity commands.

use std::sync::Arc;

use super::LockBackend;
use super::process::ProcessRunner;
use crate::core::config::CommandConfig;
use crate::core::errors::Result;

/// Runs configured shell commands to completion. Exit status is ignored
/// except for the status command: zero means unlocked.
pub struct CommandBackend {
    lock: String,
    unlock: String,
    status: String,
    activity: String,
    runner: Arc<dyn ProcessRunner>,
}

impl CommandBackend {
    #[must_use]
    pub fn new(commands: &CommandConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            lock: commands.lock.clone(),
            unlock: commands.unlock.clone(),
            status: commands.status.clone(),
            activity: commands.activity.clone(),
            runner,
        }
    }

    fn fire(&self, what: &str, command: &str) -> Result<()> {
        if command.is_empty() {
            tracing::debug!(what, "no command configured");
            return Ok(());
        }
        let code = self.runner.run(command)?;
        tracing::debug!(what, command, ?code, "command finished");
        Ok(())
    }
}

impl LockBackend for CommandBackend {
    fn name(&self) -> &'static str {
        "command"
    }

    fn lock(&mut self) -> Result<()> {
        self.fire("lock", &self.lock)
    }

    fn unlock(&mut self) -> Result<()> {
        self.fire("unlock", &self.unlock)
    }

    /// Without a status command there is nothing to observe, so trust the
    /// state machine and report locked.
    fn is_locked(&mut self) -> Result<bool> {
        if self.status.is_empty() {
            return Ok(true);
        }
        Ok(self.runner.run(&self.status)? != Some(0))
    }

    fn simulate_activity(&mut self) -> Result<()> {
        self.fire("activity", &self.activity)
    }
}
