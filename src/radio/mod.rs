//! Radio side: liveness link, strength query, and the reconnecting
//! [`SignalSource`] built from them.

pub mod link;
pub mod rssi;
pub mod source;

pub use link::{LINK_PROBE_TIMEOUT, Link, ProbeOutcome, RfcommTransport, Transport};
pub use rssi::{CommandStrengthQuery, StrengthQuery, parse_strength_line};
pub use source::{SignalSource, StrengthReader};
