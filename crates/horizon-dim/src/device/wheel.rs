//! Turns a stream of wheel steps into one press, drag and release.

use std::time::{Duration, Instant};

/// Wheel-as-button emulation.
///
/// The first step of a burst starts a synthetic press. Every step refreshes
/// the burst; a periodic [`poll`](Self::poll) ends it once the wheel has been
/// quiet for the release delay.
#[derive(Debug, Clone)]
pub struct WheelEmulator {
    active: bool,
    last_step: Option<Instant>,
    release_after: Duration,
}

impl WheelEmulator {
    pub fn new(release_after: Duration) -> Self {
        Self {
            active: false,
            last_step: None,
            release_after,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Record a wheel step. Returns true when it begins a new press.
    pub fn step(&mut self, now: Instant) -> bool {
        self.last_step = Some(now);
        !std::mem::replace(&mut self.active, true)
    }

    /// Returns true, once, when the press should be released.
    pub fn poll(&mut self, now: Instant) -> bool {
        let quiet = self
            .last_step
            .is_some_and(|t| now.saturating_duration_since(t) > self.release_after);
        if self.active && quiet {
            self.active = false;
            return true;
        }
        false
    }
}
