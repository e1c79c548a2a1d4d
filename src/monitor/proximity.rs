//! Signal strength → device presence.

use std::fmt;

/// Where the device appears to be, from a single reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceState {
    Here,
    Gone,
    /// Dead zone between the two thresholds.
    Neither,
}

impl DeviceState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Here => "here",
            Self::Gone => "gone",
            Self::Neither => "neither",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify `strength` against `lock_strength < unlock_strength`.
///
/// Below `lock_strength` is gone, at or above `unlock_strength` is here, and
/// anything between is neither, so a reading hovering at one threshold
/// cannot flip the state back and forth.
#[must_use]
pub const fn classify(strength: i32, lock_strength: i32, unlock_strength: i32) -> DeviceState {
    if strength < lock_strength {
        DeviceState::Gone
    } else if strength >= unlock_strength {
        DeviceState::Here
    } else {
        DeviceState::Neither
    }
}
