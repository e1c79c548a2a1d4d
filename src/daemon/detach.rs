//! Background detachment for `--daemon`.
//!
//! The parent re-executes the current binary without the daemon flag, in a
//! new process group with stdio on `/dev/null`, and then exits. The child is
//! marked through [`DETACHED_ENV`] so it never detaches again; it moves to `/`
//! itself once its configuration has been read, so relative paths given on
//! the command line still resolve.

use std::ffi::{OsStr, OsString};
use std::process::{Command, Stdio};

use crate::core::errors::{LbError, Result};

/// Set in the environment of the re-executed child.
pub const DETACHED_ENV: &str = "LAZYBLUE_DETACHED";

/// Whether this process is the detached child.
#[must_use]
pub fn is_detached_child() -> bool {
    std::env::var_os(DETACHED_ENV).is_some()
}

/// Drop `-d`/`--daemon` from an argument list (program name excluded).
#[must_use]
pub fn strip_daemon_flags<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .filter(|arg| arg != OsStr::new("-d") && arg != OsStr::new("--daemon"))
        .collect()
}

/// Start the detached child and return its pid.
#[cfg(unix)]
pub fn spawn_detached() -> Result<u32> {
    use std::os::unix::process::CommandExt;

    let exe = std::env::current_exe().map_err(|e| LbError::Runtime {
        details: format!("cannot locate own executable: {e}"),
    })?;
    let args = strip_daemon_flags(std::env::args_os().skip(1));
    let child = Command::new(&exe)
        .args(&args)
        .env(DETACHED_ENV, "1")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()
        .map_err(|e| LbError::spawn(exe.display().to_string(), e))?;
    Ok(child.id())
}

#[cfg(not(unix))]
pub fn spawn_detached() -> Result<u32> {
    Err(LbError::UnsupportedPlatform {
        details: "--daemon requires a unix platform".to_string(),
    })
}

/// Child-side setup once configuration has been read.
pub fn settle() -> Result<()> {
    std::env::set_current_dir("/").map_err(|e| LbError::io("/", e))
}
