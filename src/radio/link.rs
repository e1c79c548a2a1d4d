//! Liveness link to the remote device.
//!
//! The link carries no data we care about. Holding it open keeps the radio
//! connection up so the out-of-band strength query has something to measure,
//! and probing it tells us when the connection silently died.

use std::process::{Child, Command, Stdio};
use std::time::Duration;

use crate::core::config::fill_placeholders;
use crate::core::errors::{LbError, Result};

/// How long a probe may wait before concluding "nothing happened".
pub const LINK_PROBE_TIMEOUT: Duration = Duration::from_millis(10);

/// Result of a short non-blocking liveness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The link produced data.
    Data,
    /// Nothing arrived within the timeout. The link is presumed alive.
    TimedOut,
    /// Any other failure. The link is dead and must be re-established.
    Failed(String),
}

/// An open connection to the device.
pub trait Link: Send {
    fn probe(&mut self, timeout: Duration) -> ProbeOutcome;

    /// Tear the connection down. Must be safe to call more than once.
    fn close(&mut self);
}

/// Opens [`Link`]s.
pub trait Transport: Send {
    fn connect(&mut self, address: &str, channel: u8) -> Result<Box<dyn Link>>;
}

// ---------------------------------------------------------------------------
// RFCOMM via an external helper
// ---------------------------------------------------------------------------

/// Holds an RFCOMM connection open by supervising a helper process such as
/// `rfcomm connect`. The link is alive exactly as long as the helper runs.
#[derive(Debug, Clone)]
pub struct RfcommTransport {
    command_template: String,
}

impl RfcommTransport {
    /// `command_template` may use `{mac}` and `{channel}`.
    #[must_use]
    pub fn new(command_template: impl Into<String>) -> Self {
        Self {
            command_template: command_template.into(),
        }
    }
}

impl Transport for RfcommTransport {
    fn connect(&mut self, address: &str, channel: u8) -> Result<Box<dyn Link>> {
        let channel = channel.to_string();
        let command = fill_placeholders(
            &self.command_template,
            &[("mac", address), ("channel", channel.as_str())],
        );
        let child = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| LbError::Link {
                address: address.to_string(),
                details: format!("cannot start `{command}`: {e}"),
            })?;
        tracing::debug!(pid = child.id(), %command, "link helper started");
        Ok(Box::new(RfcommLink { child: Some(child) }))
    }
}

#[derive(Debug)]
struct RfcommLink {
    child: Option<Child>,
}

impl RfcommLink {
    fn exited(child: &mut Child) -> Option<ProbeOutcome> {
        match child.try_wait() {
            Ok(None) => None,
            Ok(Some(status)) => Some(ProbeOutcome::Failed(format!(
                "link helper exited with {status}"
            ))),
            Err(e) => Some(ProbeOutcome::Failed(e.to_string())),
        }
    }
}

impl Link for RfcommLink {
    fn probe(&mut self, timeout: Duration) -> ProbeOutcome {
        let Some(child) = self.child.as_mut() else {
            return ProbeOutcome::Failed("link closed".to_string());
        };
        if let Some(outcome) = Self::exited(child) {
            return outcome;
        }
        std::thread::sleep(timeout);
        Self::exited(child).unwrap_or(ProbeOutcome::TimedOut)
    }

    fn close(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Drop for RfcommLink {
    fn drop(&mut self) {
        self.close();
    }
}
