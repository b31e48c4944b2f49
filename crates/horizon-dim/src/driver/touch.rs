//! Multi-touch gesture protocol.
//!
//! Every message is `gesture x y [args...] life`, with `x y` normalized to the
//! touch surface and `life` one of 0 (begin), 1 (middle), 2 (end). One device
//! lives for one gesture and is removed after its end.

use std::time::Instant;

use horizon_dim_core::logging::targets;
use horizon_dim_core::{Bounds, Point};

use super::{Driver, NORMALIZED, Tokens};
use crate::device::DeviceCore;
use crate::error::{Result, RouteError};
use crate::event::{Gesture, LifePoint};
use crate::widget::WidgetKind;

const SINGLE_TOUCH: i32 = 1;
const DOUBLE_CLICK: i32 = 2;
const BIG_TOUCH: i32 = 3;
const ZOOM: i32 = 4;
const MULTI_TOUCH_HOLD: i32 = 5;
const MULTI_TOUCH_SWIPE: i32 = 6;

/// Zoom amounts arrive as fractions of the surface.
pub const ZOOM_FACTOR: f64 = 700.0;
/// Dragging an application moves it faster than the finger.
pub const APP_DRAG_SPEEDUP: f64 = 3.0;

const PAN_BUTTON: u8 = 1;
const ZOOM_BUTTON: u8 = 4;

/// Driver for a touch surface covering the whole display.
#[derive(Debug)]
pub struct TouchDriver {
    alive: bool,
    /// Finger position the last app drag step was measured from.
    finger: Point,
    swipe_start: Point,
}

impl TouchDriver {
    pub fn new() -> Self {
        Self {
            alive: true,
            finger: Point::ZERO,
            swipe_start: Point::ZERO,
        }
    }

    fn drags_app(core: &DeviceCore) -> bool {
        core.capture_kind() == Some(WidgetKind::App)
    }

    /// Keep the pointer one pixel inside the display.
    fn inset(bounds: Bounds) -> Bounds {
        Bounds::new(bounds.left + 1, bounds.right - 1, bounds.top - 1, bounds.bottom + 1)
    }

    /// Where the pointer goes when the finger at `at` drags an application.
    fn accelerated(&mut self, core: &DeviceCore, at: Point) -> Point {
        let speed = APP_DRAG_SPEEDUP * core.global_scale();
        let dx = ((f64::from(at.x) - f64::from(self.finger.x)) * speed) as i32;
        let dy = ((f64::from(at.y) - f64::from(self.finger.y)) * speed) as i32;
        self.finger = at;
        Self::inset(core.display_bounds()).clamp(core.position().offset(dx, dy))
    }

    fn single_touch(&mut self, core: &mut DeviceCore, at: Point, life: LifePoint, now: Instant) {
        match life {
            LifePoint::Begin => {
                self.finger = at;
                core.set_position(at);
                core.post_click(PAN_BUTTON, true, Gesture::Pan, now);
            }
            LifePoint::Middle => {
                if at == core.position() {
                    return;
                }
                if !Self::drags_app(core) {
                    core.drag_or_move(at);
                    return;
                }
                let window = core.config().accidental_touch_window();
                let settled = core
                    .press_time()
                    .is_none_or(|t| now.saturating_duration_since(t) >= window);
                if settled {
                    let to = self.accelerated(core, at);
                    core.drag_or_move(to);
                } else {
                    tracing::trace!(target: targets::DEVICE, device = %core.id(), "touch on app ignored while settling");
                    self.finger = at;
                    core.set_position(at);
                }
            }
            LifePoint::End => {
                if Self::drags_app(core) {
                    let to = self.accelerated(core, at);
                    core.set_position(to);
                } else {
                    core.set_position(at);
                }
                core.post_click(PAN_BUTTON, false, Gesture::Pan, now);
            }
        }
    }

    fn zoom(core: &mut DeviceCore, at: Point, amount: f64, life: LifePoint, now: Instant) {
        match life {
            LifePoint::Begin => {
                core.set_position(at);
                core.post_click(ZOOM_BUTTON, true, Gesture::Zoom, now);
            }
            LifePoint::Middle => {
                let dx = (amount * ZOOM_FACTOR * core.global_scale()) as i32;
                core.post_analog(Gesture::Zoom, at, dx, 0, 0);
            }
            LifePoint::End => {
                core.set_position(at);
                core.post_click(ZOOM_BUTTON, false, Gesture::Zoom, now);
            }
        }
    }
}

impl Default for TouchDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for TouchDriver {
    fn on_message(&mut self, core: &mut DeviceCore, payload: &str, first: bool, now: Instant) -> Result<()> {
        let id = core.id().clone();
        let mut tokens = Tokens::new(&id, payload);
        let gesture: i32 = tokens.parse("gesture")?;
        let nx = tokens.normalized("x", NORMALIZED)?;
        let ny = tokens.normalized("y", NORMALIZED)?;
        let args = tokens.rest();
        let (life, args) = args
            .split_last()
            .ok_or_else(|| RouteError::malformed(&id, "missing life point"))?;
        let life = life
            .parse()
            .ok()
            .and_then(LifePoint::from_code)
            .ok_or_else(|| RouteError::malformed(&id, format!("bad life point '{life}'")))?;
        let arg = |index: usize, what: &str| -> Result<f64> {
            args.get(index)
                .and_then(|token| token.parse::<f64>().ok())
                .filter(|v| v.is_finite())
                .ok_or_else(|| RouteError::malformed(&id, format!("missing or bad {what}")))
        };

        let at = core.display_bounds().denormalize(nx, ny);
        if first {
            core.set_position(at);
        }

        match gesture {
            SINGLE_TOUCH => self.single_touch(core, at, life, now),
            DOUBLE_CLICK => {
                core.set_position(at);
                core.post_double_click(PAN_BUTTON, Gesture::Pan);
            }
            BIG_TOUCH => {
                core.post_big_click(at, life);
            }
            ZOOM => {
                let amount = arg(0, "zoom amount")?;
                Self::zoom(core, at, amount, life, now);
            }
            MULTI_TOUCH_HOLD => {
                let touches = arg(0, "touch count")? as u32;
                core.post_multi_touch_hold(at, touches, life);
            }
            MULTI_TOUCH_SWIPE => {
                let touches = arg(2, "touch count")? as u32;
                if life == LifePoint::Begin {
                    self.swipe_start = at;
                }
                core.post_multi_touch_swipe(at, touches, self.swipe_start, life);
            }
            other => {
                return Err(RouteError::malformed(&id, format!("unknown touch gesture {other}")));
            }
        }

        if life == LifePoint::End {
            self.alive = false;
        }
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use horizon_dim_core::DeviceConfig;
    use parking_lot::Mutex;

    use crate::device::DeviceId;
    use crate::dispatcher::Dispatcher;
    use crate::event::{DisplayInfo, EventData, EventKind, GenericEvent};
    use crate::widget::WidgetBuilder;

    fn setup(config: DeviceConfig) -> (Arc<Dispatcher>, DeviceCore) {
        let dispatcher = Arc::new(Dispatcher::with_defaults());
        dispatcher.post_generic(GenericEvent::DisplayInfo(DisplayInfo {
            display_id: 0,
            bounds: Bounds::new(0, 1000, 1000, 0),
        }));
        let core = DeviceCore::new(DeviceId::from("h:touch0"), "touch", dispatcher.clone(), &config);
        (dispatcher, core)
    }

    #[test]
    fn test_single_touch_clicks_and_dies() {
        let (dispatcher, mut core) = setup(DeviceConfig::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        dispatcher
            .register(
                WidgetBuilder::new(WidgetKind::Button)
                    .bounds(Bounds::new(0, 200, 200, 0))
                    .on(EventKind::Click, move |_, ev| {
                        if let EventData::Click { is_down, .. } = ev.data {
                            log.lock().push(is_down);
                        }
                        Ok(())
                    }),
            )
            .unwrap();

        let mut touch = TouchDriver::new();
        let now = Instant::now();
        touch.on_message(&mut core, "1 0.1 0.1 0", true, now).unwrap();
        assert!(touch.is_alive());
        touch.on_message(&mut core, "1 0.1 0.1 2", false, now).unwrap();
        assert!(!touch.is_alive());
        assert_eq!(*seen.lock(), vec![true, false]);
    }

    #[test]
    fn test_zoom_posts_scaled_analog() {
        let (dispatcher, mut core) = setup(DeviceConfig::default());
        let zooms = Arc::new(Mutex::new(Vec::new()));
        let log = zooms.clone();
        dispatcher
            .register(
                WidgetBuilder::new(WidgetKind::Panel)
                    .bounds(Bounds::new(0, 1000, 1000, 0))
                    .on(EventKind::Analog3, move |_, ev| {
                        if let EventData::Analog { dx, .. } = ev.data {
                            log.lock().push(dx);
                        }
                        Ok(())
                    }),
            )
            .unwrap();

        let mut touch = TouchDriver::new();
        let now = Instant::now();
        touch.on_message(&mut core, "4 0.5 0.5 0 0", true, now).unwrap();
        touch.on_message(&mut core, "4 0.5 0.5 0.1 1", false, now).unwrap();
        touch.on_message(&mut core, "4 0.5 0.5 0 2", false, now).unwrap();
        let scale = dispatcher.global_scale();
        assert_eq!(*zooms.lock(), vec![(0.1 * ZOOM_FACTOR * scale) as i32]);
    }

    #[test]
    fn test_settling_touch_on_app_does_not_drag() {
        let config = DeviceConfig::default().accidental_touch(Duration::from_millis(250));
        let (dispatcher, mut core) = setup(config);
        let drags = Arc::new(Mutex::new(0));
        let log = drags.clone();
        dispatcher
            .register(
                WidgetBuilder::new(WidgetKind::App)
                    .window(1)
                    .bounds(Bounds::new(0, 1000, 1000, 0))
                    .on(EventKind::Click, |_, _| Ok(()))
                    .on(EventKind::Analog1, move |_, _| {
                        *log.lock() += 1;
                        Ok(())
                    }),
            )
            .unwrap();

        let mut touch = TouchDriver::new();
        let t0 = Instant::now();
        touch.on_message(&mut core, "1 0.5 0.5 0", true, t0).unwrap();
        touch
            .on_message(&mut core, "1 0.55 0.5 1", false, t0 + Duration::from_millis(100))
            .unwrap();
        assert_eq!(*drags.lock(), 0);
        touch
            .on_message(&mut core, "1 0.6 0.5 1", false, t0 + Duration::from_millis(400))
            .unwrap();
        assert_eq!(*drags.lock(), 1);
    }

    #[test]
    fn test_missing_life_point_is_malformed() {
        let (_d, mut core) = setup(DeviceConfig::default());
        let mut touch = TouchDriver::new();
        assert!(touch.on_message(&mut core, "1 0.5", false, Instant::now()).is_err());
        assert!(touch.on_message(&mut core, "1 0.5 0.5 7", false, Instant::now()).is_err());
    }
}
