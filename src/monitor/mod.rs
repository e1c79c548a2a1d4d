//! Proximity monitoring: reading classification and the lock state machine.

pub mod engine;
pub mod proximity;

#[cfg(test)]
pub(crate) mod testkit;

pub use engine::{LockState, Monitor, MonitorSettings, Runtime, StopReason, Tick, TickReport};
pub use proximity::{DeviceState, classify};
