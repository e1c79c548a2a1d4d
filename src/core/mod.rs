//! Core building blocks shared by every subsystem: errors, configuration,
//! time.

pub mod clock;
pub mod config;
pub mod errors;
