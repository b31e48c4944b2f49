//! Button press/release state machine with double-click detection.

use std::time::{Duration, Instant};

use crate::event::Gesture;

#[derive(Debug, Clone, Copy)]
struct Press {
    button: u8,
    time: Instant,
}

/// What a release completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Release {
    pub button: u8,
    pub gesture: Gesture,
    /// The press before this one was on the same button and recent enough.
    pub double_click: bool,
}

/// Tracks which button is down.
///
/// Only one button may be down at a time: a second button pressed during an
/// active click is ignored until the first one is released. A release counts
/// as a double click when the previous press of the same button happened
/// less than the threshold before it.
#[derive(Debug, Clone)]
pub struct ButtonTracker {
    active: Option<(u8, Gesture)>,
    last_press: Option<Press>,
    previous_press: Option<Press>,
    threshold: Duration,
}

impl ButtonTracker {
    pub fn new(threshold: Duration) -> Self {
        Self {
            active: None,
            last_press: None,
            previous_press: None,
            threshold,
        }
    }

    /// The button currently down and the gesture it drives.
    pub fn active(&self) -> Option<(u8, Gesture)> {
        self.active
    }

    /// Record a press. Returns false if another click is already active.
    pub fn press(&mut self, button: u8, gesture: Gesture, now: Instant) -> bool {
        if self.active.is_some() {
            return false;
        }
        self.active = Some((button, gesture));
        self.previous_press = self.last_press.replace(Press { button, time: now });
        true
    }

    /// Record a release. Returns `None` for a button that is not the active one.
    pub fn release(&mut self, button: u8, now: Instant) -> Option<Release> {
        let (active, gesture) = self.active?;
        if active != button {
            return None;
        }
        self.active = None;

        let double_click = self
            .previous_press
            .is_some_and(|p| p.button == button && now.saturating_duration_since(p.time) < self.threshold);
        if double_click {
            // a third click starts a new pair
            self.previous_press = None;
            self.last_press = None;
        }
        Some(Release {
            button,
            gesture,
            double_click,
        })
    }

    /// Forget any active click, e.g. when the device switches modes.
    pub fn reset(&mut self) {
        self.active = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_millis(700);

    fn ms(base: Instant, n: u64) -> Instant {
        base + Duration::from_millis(n)
    }

    #[test]
    fn test_chord_is_ignored() {
        let t0 = Instant::now();
        let mut b = ButtonTracker::new(T);
        assert!(b.press(1, Gesture::Pan, t0));
        assert!(!b.press(3, Gesture::Rotate, t0));
        assert_eq!(b.release(3, t0), None);
        assert_eq!(b.active(), Some((1, Gesture::Pan)));
        assert!(b.release(1, t0).is_some());
        assert_eq!(b.release(1, t0), None);
    }

    #[test]
    fn test_double_click_within_threshold() {
        let t0 = Instant::now();
        let mut b = ButtonTracker::new(T);
        b.press(1, Gesture::Pan, t0);
        assert!(!b.release(1, ms(t0, 50)).unwrap().double_click);
        b.press(1, Gesture::Pan, ms(t0, 200));
        assert!(b.release(1, ms(t0, 300)).unwrap().double_click);

        // third click does not pair with the second
        b.press(1, Gesture::Pan, ms(t0, 400));
        assert!(!b.release(1, ms(t0, 450)).unwrap().double_click);
    }

    #[test]
    fn test_slow_or_mixed_clicks_are_single() {
        let t0 = Instant::now();
        let mut b = ButtonTracker::new(T);
        b.press(1, Gesture::Pan, t0);
        b.release(1, ms(t0, 10));
        b.press(1, Gesture::Pan, ms(t0, 900));
        assert!(!b.release(1, ms(t0, 950)).unwrap().double_click);

        b.press(3, Gesture::Rotate, ms(t0, 1000));
        assert!(!b.release(3, ms(t0, 1010)).unwrap().double_click);
    }
}
