//! Backend with no external effects.

use super::LockBackend;
use crate::core::errors::Result;

/// One action the dry-run backend would have taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DryRunEvent {
    Lock,
    Unlock,
    Activity,
}

impl DryRunEvent {
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Lock => "lock screen",
            Self::Unlock => "unlock screen",
            Self::Activity => "simulate activity",
        }
    }
}

/// Logs what would happen and records it. Always reports locked, so the
/// monitor never sees a manual override.
#[derive(Debug, Default)]
pub struct DryRunBackend {
    events: Vec<DryRunEvent>,
}

impl DryRunBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> &[DryRunEvent] {
        &self.events
    }

    fn record(&mut self, event: DryRunEvent) {
        tracing::info!(dry_run = true, event = event.describe(), "would {}", event.describe());
        self.events.push(event);
    }
}

impl LockBackend for DryRunBackend {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    fn lock(&mut self) -> Result<()> {
        self.record(DryRunEvent::Lock);
        Ok(())
    }

    fn unlock(&mut self) -> Result<()> {
        self.record(DryRunEvent::Unlock);
        Ok(())
    }

    fn is_locked(&mut self) -> Result<bool> {
        Ok(true)
    }

    fn simulate_activity(&mut self) -> Result<()> {
        self.record(DryRunEvent::Activity);
        Ok(())
    }
}
