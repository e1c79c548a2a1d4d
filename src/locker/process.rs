//! Process execution for lock backends: run-to-completion commands,
//! long-lived lock programs, and the worker threads that wait on them.

use std::io::{self, BufRead, BufReader};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crate::core::errors::{LbError, Result};

/// Called from a supervision worker with the pid of the lock program that
/// just exited.
pub type ExitHook = Arc<dyn Fn(u32) + Send + Sync>;

/// Why a termination signal could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalError {
    /// The process belongs to someone else (typically root).
    PermissionDenied,
    /// The process is already gone.
    NoSuchProcess,
    Other(String),
}

impl std::fmt::Display for SignalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PermissionDenied => f.write_str("permission denied"),
            Self::NoSuchProcess => f.write_str("no such process"),
            Self::Other(details) => f.write_str(details),
        }
    }
}

/// A spawned, long-lived lock program.
pub trait LockChild: Send {
    fn pid(&self) -> u32;

    /// Block until the process exits. Returns its exit code, `None` when
    /// killed by a signal.
    fn wait(&mut self) -> io::Result<Option<i32>>;

    /// Read one line from the process's stdout, without the line ending.
    fn read_line(&mut self) -> io::Result<String>;

    /// Force the process to exit. A process that already exited is not an
    /// error. The caller still has to [`wait`](Self::wait) for it.
    fn kill(&mut self) -> io::Result<()>;
}

/// Process-execution collaborator shared by all backends.
pub trait ProcessRunner: Send + Sync {
    /// Run a shell command to completion. Returns its exit code, `None` when
    /// killed by a signal.
    fn run(&self, command: &str) -> Result<Option<i32>>;

    /// Run a shell command to completion and return its stdout.
    fn capture(&self, command: &str) -> Result<String>;

    /// Launch a long-lived shell command with stdin and stdout piped.
    fn spawn(&self, command: &str) -> Result<Box<dyn LockChild>>;

    /// Send SIGTERM to `pid`.
    fn terminate(&self, pid: u32) -> std::result::Result<(), SignalError>;
}

// ---------------------------------------------------------------------------
// Real implementation
// ---------------------------------------------------------------------------

/// Runs everything through `sh -c`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

impl ShellRunner {
    fn shell(command: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

impl ProcessRunner for ShellRunner {
    fn run(&self, command: &str) -> Result<Option<i32>> {
        let status = Self::shell(command)
            .stdin(Stdio::null())
            .status()
            .map_err(|e| LbError::spawn(command, e))?;
        Ok(status.code())
    }

    fn capture(&self, command: &str) -> Result<String> {
        let output = Self::shell(command)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|e| LbError::spawn(command, e))?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn spawn(&self, command: &str) -> Result<Box<dyn LockChild>> {
        let mut child = Self::shell(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| LbError::spawn(command, e))?;
        let stdout = child.stdout.take().map(BufReader::new);
        Ok(Box::new(SpawnedChild { child, stdout }))
    }

    #[cfg(unix)]
    fn terminate(&self, pid: u32) -> std::result::Result<(), SignalError> {
        use nix::errno::Errno;
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let raw = i32::try_from(pid).map_err(|_| SignalError::Other(format!("pid {pid} out of range")))?;
        match kill(Pid::from_raw(raw), Signal::SIGTERM) {
            Ok(()) => Ok(()),
            Err(Errno::EPERM) => Err(SignalError::PermissionDenied),
            Err(Errno::ESRCH) => Err(SignalError::NoSuchProcess),
            Err(other) => Err(SignalError::Other(other.desc().to_string())),
        }
    }

    #[cfg(not(unix))]
    fn terminate(&self, pid: u32) -> std::result::Result<(), SignalError> {
        Err(SignalError::Other(format!(
            "cannot signal pid {pid}: unsupported platform"
        )))
    }
}

struct SpawnedChild {
    child: Child,
    stdout: Option<BufReader<ChildStdout>>,
}

impl LockChild for SpawnedChild {
    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn wait(&mut self) -> io::Result<Option<i32>> {
        Ok(self.child.wait()?.code())
    }

    fn read_line(&mut self) -> io::Result<String> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdout not captured"));
        };
        let mut line = String::new();
        if stdout.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "process closed stdout before reporting",
            ));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn kill(&mut self) -> io::Result<()> {
        match self.child.kill() {
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            other => other,
        }
    }
}

// ---------------------------------------------------------------------------
// Supervision
// ---------------------------------------------------------------------------

/// A lock program owned by a worker thread that blocks in `wait()`.
///
/// The worker flips [`SupervisedProcess::has_exited`] and then runs the exit
/// hook, if any. Dropping the handle detaches the worker; it still reaps the
/// child.
pub struct SupervisedProcess {
    pid: u32,
    exited: Arc<AtomicBool>,
    _worker: JoinHandle<()>,
}

impl SupervisedProcess {
    pub fn start(mut child: Box<dyn LockChild>, hook: Option<ExitHook>) -> Result<Self> {
        let pid = child.pid();
        let exited = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&exited);
        let worker = std::thread::Builder::new()
            .name(format!("lock-watch-{pid}"))
            .spawn(move || {
                match child.wait() {
                    Ok(code) => tracing::debug!(pid, ?code, "lock program exited"),
                    Err(e) => tracing::warn!(pid, error = %e, "waiting on lock program failed"),
                }
                flag.store(true, Ordering::SeqCst);
                if let Some(hook) = hook {
                    hook(pid);
                }
            })
            .map_err(|e| LbError::Runtime {
                details: format!("cannot start supervision thread for pid {pid}: {e}"),
            })?;
        Ok(Self {
            pid,
            exited,
            _worker: worker,
        })
    }

    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    #[must_use]
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for SupervisedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisedProcess")
            .field("pid", &self.pid)
            .field("exited", &self.has_exited())
            .finish_non_exhaustive()
    }
}
