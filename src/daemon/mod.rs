//! Daemon subsystem: main loop wiring, signal handling, detachment.

pub mod detach;
pub mod loop_main;
pub mod signals;
