//! Out-of-band signal strength query.

use std::process::{Command, Stdio};

use crate::core::config::fill_placeholders;
use crate::core::errors::{LbError, Result};

/// Asks the radio stack how strong the device's signal is.
pub trait StrengthQuery: Send {
    /// `Ok(None)` means the stack reports the device as not connected.
    fn query(&mut self, address: &str) -> Result<Option<i32>>;
}

/// Runs a utility such as `hcitool rssi {mac}` and parses its first line.
#[derive(Debug, Clone)]
pub struct CommandStrengthQuery {
    command_template: String,
}

impl CommandStrengthQuery {
    #[must_use]
    pub fn new(command_template: impl Into<String>) -> Self {
        Self {
            command_template: command_template.into(),
        }
    }
}

impl StrengthQuery for CommandStrengthQuery {
    fn query(&mut self, address: &str) -> Result<Option<i32>> {
        let command = fill_placeholders(&self.command_template, &[("mac", address)]);
        let output = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|e| LbError::StrengthQuery {
                address: address.to_string(),
                details: format!("`{command}`: {e}"),
            })?;
        Ok(parse_strength_line(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parse output of the form `identifier: <int>`.
///
/// Only the first line is considered. Anything without a `:` (for example
/// `Not connected.`) or with a non-integer value yields `None`.
#[must_use]
pub fn parse_strength_line(output: &str) -> Option<i32> {
    let first = output.lines().next()?;
    first.split(':').nth(1)?.trim().parse().ok()
}
