//! Reconnecting signal source.
//!
//! [`SignalSource`] never fails: transport trouble degrades into repeated
//! [`FAR_AWAY_STRENGTH`] readings, which the monitor treats as "device gone".

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::link::{LINK_PROBE_TIMEOUT, Link, ProbeOutcome, Transport};
use super::rssi::StrengthQuery;
use crate::core::clock::{Clock, elapsed};
use crate::core::config::FAR_AWAY_STRENGTH;

/// Anything that can produce one strength sample per poll.
pub trait StrengthReader {
    fn read_strength(&mut self) -> i32;
}

/// Best-effort strength readings for one remote device.
pub struct SignalSource {
    address: String,
    channel: u8,
    transport: Box<dyn Transport>,
    query: Box<dyn StrengthQuery>,
    clock: Arc<dyn Clock>,
    connect_interval: Duration,
    link: Option<Box<dyn Link>>,
    last_connected: Option<DateTime<Utc>>,
}

impl SignalSource {
    /// Build the source and make the first connection attempt immediately.
    pub fn new(
        address: impl Into<String>,
        channel: u8,
        transport: Box<dyn Transport>,
        query: Box<dyn StrengthQuery>,
        clock: Arc<dyn Clock>,
        connect_interval: Duration,
    ) -> Self {
        let mut source = Self {
            address: address.into(),
            channel,
            transport,
            query,
            clock,
            connect_interval,
            link: None,
            last_connected: None,
        };
        source.attempt_reconnect();
        source
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// When the last connection attempt started, successful or not.
    #[must_use]
    pub fn last_connected(&self) -> Option<DateTime<Utc>> {
        self.last_connected
    }

    /// Drop any existing link and try a fresh one, unless the previous
    /// attempt is younger than `connect_interval`. Errors are logged and
    /// swallowed.
    pub fn attempt_reconnect(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close();
        }

        let now = self.clock.now();
        if self
            .last_connected
            .is_some_and(|last| elapsed(last, now) < self.connect_interval)
        {
            return;
        }

        // Stamped before connecting so a failed attempt still throttles.
        self.last_connected = Some(now);
        match self.transport.connect(&self.address, self.channel) {
            Ok(link) => {
                tracing::debug!(address = %self.address, channel = self.channel, "link established");
                self.link = Some(link);
            }
            Err(e) => {
                tracing::debug!(address = %self.address, error = %e, "connect attempt failed");
            }
        }
    }

    fn link_needs_reconnect(&mut self) -> bool {
        let Some(link) = self.link.as_mut() else {
            return true;
        };
        match link.probe(LINK_PROBE_TIMEOUT) {
            ProbeOutcome::Data | ProbeOutcome::TimedOut => false,
            ProbeOutcome::Failed(reason) => {
                tracing::debug!(address = %self.address, %reason, "link probe failed");
                true
            }
        }
    }
}

impl StrengthReader for SignalSource {
    fn read_strength(&mut self) -> i32 {
        if self.link_needs_reconnect() {
            self.attempt_reconnect();
        }
        match self.query.query(&self.address) {
            Ok(Some(strength)) => strength,
            Ok(None) => FAR_AWAY_STRENGTH,
            Err(e) => {
                tracing::debug!(address = %self.address, error = %e, "strength query failed");
                FAR_AWAY_STRENGTH
            }
        }
    }
}

impl std::fmt::Debug for SignalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalSource")
            .field("address", &self.address)
            .field("channel", &self.channel)
            .field("connected", &self.link.is_some())
            .field("last_connected", &self.last_connected)
            .finish_non_exhaustive()
    }
}
