//! Graceful shutdown on SIGINT/SIGTERM.
//!
//! A background thread waits on the signal iterator, sets the shared shutdown
//! flag and pokes the wake channel so a pacing sleep in progress returns at
//! once. The poll loop notices the flag at its next tick boundary.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};

use crate::core::errors::{LbError, Result};

/// Shared shutdown state. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    #[must_use]
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = crossbeam_channel::bounded(1);
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            wake_tx,
            wake_rx,
        }
    }

    /// Flag for [`crate::monitor::Monitor::with_shutdown`].
    #[must_use]
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Receiver for [`crate::core::clock::SystemClock::with_wake`].
    #[must_use]
    pub fn wake_receiver(&self) -> Receiver<()> {
        self.wake_rx.clone()
    }

    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Request shutdown and wake any sleeper.
    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
        // Full channel means a wake is already pending.
        let _ = self.wake_tx.try_send(());
    }
}

/// Running signal listener. Dropping it stops the listener thread.
#[derive(Debug)]
pub struct SignalGuard {
    handle: Handle,
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        self.handle.close();
    }
}

/// Route SIGINT and SIGTERM into `shutdown`.
pub fn install(shutdown: &Shutdown) -> Result<SignalGuard> {
    let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(|e| LbError::Runtime {
        details: format!("cannot register signal handlers: {e}"),
    })?;
    let handle = signals.handle();
    let shutdown = shutdown.clone();
    thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            for signal in signals.forever() {
                tracing::info!(signal, "shutdown requested");
                shutdown.request();
            }
        })
        .map_err(|e| LbError::spawn("signal listener thread", e))?;
    Ok(SignalGuard { handle })
}
