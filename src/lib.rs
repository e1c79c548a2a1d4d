//! lazyblue: lock the screen when a paired Bluetooth device leaves, unlock it
//! when it comes back.
//!
//! The [`monitor::Monitor`] state machine turns signal-strength readings from
//! a [`radio::SignalSource`] into actions on a [`locker::LockBackend`], with
//! hysteresis, cooldowns and an optional hardened lock.

#![allow(missing_docs)]

pub mod core;
pub mod locker;
pub mod logger;
pub mod monitor;
pub mod radio;

#[cfg(feature = "daemon")]
pub mod daemon;

#[cfg(feature = "cli")]
pub mod cli_app;
