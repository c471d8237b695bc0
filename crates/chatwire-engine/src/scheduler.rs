use std::time::Duration;

use tokio::time::Instant;

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(100);

/// Throttles store writes during streaming.
///
/// A change outside the window flushes at once. A change inside it arms a
/// single deadline at the end of the window; further changes before that
/// deadline collapse into it. The caller owns the timer: it sleeps until
/// [`deadline`](Self::deadline) and flushes when it fires.
#[derive(Debug)]
pub struct UpdateScheduler {
    window: Duration,
    last_flush: Option<Instant>,
    deadline: Option<Instant>,
}

impl Default for UpdateScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_FLUSH_INTERVAL)
    }
}

impl UpdateScheduler {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_flush: None,
            deadline: None,
        }
    }

    /// Record a change. Returns true when the caller should flush now.
    pub fn note_change(&mut self, now: Instant) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        match self.last_flush {
            Some(last) if now.saturating_duration_since(last) < self.window => {
                self.deadline = Some(last + self.window);
                false
            }
            _ => true,
        }
    }

    /// When the pending deferred flush is due, if one is armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn has_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Record that a flush happened, disarming any pending deadline.
    pub fn mark_flushed(&mut self, now: Instant) {
        self.last_flush = Some(now);
        self.deadline = None;
    }

    /// Drop a pending deferred flush ahead of a terminal write.
    pub fn cancel_pending(&mut self) {
        self.deadline = None;
    }
}
