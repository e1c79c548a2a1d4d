//! Tracing subscriber setup.
//!
//! Filter precedence: `RUST_LOG`, then `lazyblue=info` when verbose, else
//! `lazyblue=warn`. With a log file the output is appended there without
//! ANSI colours; otherwise it goes to stderr.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::core::errors::{LbError, Result};

/// Default filter directive when `RUST_LOG` is unset.
#[must_use]
pub const fn default_directive(verbose: bool) -> &'static str {
    if verbose { "lazyblue=info" } else { "lazyblue=warn" }
}

/// Install the global subscriber. Fails if one is already installed or the
/// log file cannot be opened.
pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let installed = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| LbError::io(path, e))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    installed.map_err(|e| LbError::Runtime {
        details: format!("logger already initialised: {e}"),
    })
}
