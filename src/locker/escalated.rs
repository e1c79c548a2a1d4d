//! Privilege-escalated lock (vlock style).
//!
//! Launch is a two-stage protocol: we spawn a supervisor (normally `sudo`)
//! which starts the real lock program as root and prints that program's pid
//! as its first stdout line before blocking. The reported pid, not the
//! supervisor we hold, is the control point for unlocking and for status.
//!
//! Status is read from the process table by pid and name. Pids can be
//! reused, so this is a best-effort check.

use std::sync::Arc;

use super::LockBackend;
use super::process::{ExitHook, LockChild, ProcessRunner, SignalError, SupervisedProcess};
use crate::core::config::{BackendConfig, fill_placeholders};
use crate::core::errors::{LbError, Result};

pub struct EscalatedBackend {
    command: String,
    process_name: String,
    kill_template: String,
    runner: Arc<dyn ProcessRunner>,
    supervisor: Option<SupervisedProcess>,
    lock_pid: Option<u32>,
    exit_hook: Option<ExitHook>,
}

impl EscalatedBackend {
    /// `user` replaces `{user}` in the supervisor command.
    #[must_use]
    pub fn new(backend: &BackendConfig, user: &str, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            command: fill_placeholders(&backend.escalated_command, &[("user", user)]),
            process_name: backend.escalated_process_name.clone(),
            kill_template: backend.escalated_kill_command.clone(),
            runner,
            supervisor: None,
            lock_pid: None,
            exit_hook: None,
        }
    }

    /// Pid reported by the supervisor for the current lock.
    #[must_use]
    pub fn lock_pid(&self) -> Option<u32> {
        self.lock_pid
    }

    fn process_alive(&self, pid: u32) -> Result<bool> {
        let listing = self.runner.capture(&format!("ps -p {pid} -o comm="))?;
        Ok(listing.contains(&self.process_name))
    }

    fn clear(&mut self) {
        self.lock_pid = None;
        self.supervisor = None;
    }
}

impl LockBackend for EscalatedBackend {
    fn name(&self) -> &'static str {
        "escalated"
    }

    fn lock(&mut self) -> Result<()> {
        if let Some(pid) = self.lock_pid {
            if self.process_alive(pid)? {
                tracing::debug!(pid, "escalated lock already active");
                return Ok(());
            }
            self.clear();
        }

        let mut child = self.runner.spawn(&self.command)?;
        let pid = match read_reported_pid(child.as_mut()) {
            Ok(pid) => pid,
            Err(details) => {
                abandon(child);
                return Err(LbError::ProcessProtocol {
                    command: self.command.clone(),
                    details,
                });
            }
        };

        let supervisor = SupervisedProcess::start(child, self.exit_hook.clone())?;
        tracing::info!(
            pid,
            supervisor = supervisor.pid(),
            "escalated lock started"
        );
        self.supervisor = Some(supervisor);
        self.lock_pid = Some(pid);
        Ok(())
    }

    fn unlock(&mut self) -> Result<()> {
        let Some(pid) = self.lock_pid else {
            return Ok(());
        };
        match self.runner.terminate(pid) {
            Ok(()) | Err(SignalError::NoSuchProcess) => {}
            Err(SignalError::PermissionDenied) => {
                let pid_text = pid.to_string();
                let command = fill_placeholders(&self.kill_template, &[("pid", pid_text.as_str())]);
                let code = self.runner.run(&command)?;
                if code != Some(0) {
                    return Err(LbError::Signal {
                        pid,
                        details: format!("`{command}` exited with {code:?}"),
                    });
                }
            }
            Err(SignalError::Other(details)) => return Err(LbError::Signal { pid, details }),
        }
        tracing::info!(pid, "escalated lock terminated");
        self.clear();
        Ok(())
    }

    fn is_locked(&mut self) -> Result<bool> {
        let Some(pid) = self.lock_pid else {
            return Ok(false);
        };
        let alive = self.process_alive(pid)?;
        if !alive {
            self.clear();
        }
        Ok(alive)
    }

    fn set_exit_hook(&mut self, hook: ExitHook) {
        self.exit_hook = Some(hook);
    }

    fn supervised_pid(&self) -> Option<u32> {
        self.supervisor.as_ref().map(SupervisedProcess::pid)
    }
}

fn read_reported_pid(child: &mut dyn LockChild) -> std::result::Result<u32, String> {
    let line = child
        .read_line()
        .map_err(|e| format!("no pid reported: {e}"))?;
    line.trim()
        .parse::<u32>()
        .map_err(|_| format!("expected a pid, got {line:?}"))
}

/// Kill a supervisor that broke the pid protocol and reap it off-thread.
fn abandon(mut child: Box<dyn LockChild>) {
    let pid = child.pid();
    if let Err(e) = child.kill() {
        tracing::warn!(pid, error = %e, "cannot kill supervisor");
    }
    if let Err(e) = SupervisedProcess::start(child, None) {
        tracing::warn!(pid, error = %e, "supervisor left unreaped");
    }
}
