//! Debouncing and single-flight bookkeeping for wizard actions

use std::time::Duration;
use tokio::time::Instant;

/// Suppresses duplicate start/cancel/finish actions caused by rapid input.
///
/// Plain fields owned by the wizard and only touched while its state lock is
/// held, so no extra synchronization lives here.
#[derive(Debug, Default)]
pub struct InteractionGuard {
    lock_until: Option<Instant>,
    start_intent: bool,
    starting: bool,
    cancelling: bool,
    finishing: bool,
}

impl InteractionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock interactions for at least `window` from now. Never shortens an
    /// existing lock.
    pub fn lock(&mut self, window: Duration) {
        let until = Instant::now() + window;
        self.lock_until = Some(match self.lock_until {
            Some(current) if current > until => current,
            _ => until,
        });
    }

    pub fn is_locked(&self) -> bool {
        self.lock_until.is_some_and(|until| Instant::now() < until)
    }

    /// Record an explicit start click
    pub fn arm_start_intent(&mut self) {
        self.start_intent = true;
    }

    /// Consume the start intent, returning whether it was armed
    pub fn take_start_intent(&mut self) -> bool {
        std::mem::take(&mut self.start_intent)
    }

    pub fn clear_start_intent(&mut self) {
        self.start_intent = false;
    }

    pub fn try_begin_start(&mut self) -> bool {
        !std::mem::replace(&mut self.starting, true)
    }

    pub fn end_start(&mut self) {
        self.starting = false;
    }

    pub fn try_begin_cancel(&mut self) -> bool {
        !std::mem::replace(&mut self.cancelling, true)
    }

    pub fn end_cancel(&mut self) {
        self.cancelling = false;
    }

    pub fn try_begin_finish(&mut self) -> bool {
        !std::mem::replace(&mut self.finishing, true)
    }

    pub fn end_finish(&mut self) {
        self.finishing = false;
    }

    pub fn is_starting(&self) -> bool {
        self.starting
    }

    pub fn is_cancelling(&self) -> bool {
        self.cancelling
    }

    pub fn is_finishing(&self) -> bool {
        self.finishing
    }

    /// Whether any boundary call started by the user is outstanding
    pub fn is_busy(&self) -> bool {
        self.starting || self.cancelling || self.finishing
    }
}
