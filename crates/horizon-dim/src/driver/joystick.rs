//! Game controller protocol.
//!
//! Axis messages are relative: the pointer moves by the deflection times
//! [`AXIS_SPEED`] on every message and stays on the display. Joysticks are
//! special devices and post on their own event channel.
//!
//! | Message          | Meaning                                  |
//! |------------------|------------------------------------------|
//! | `1 x y`          | axis deflection, each in `-1.0..=1.0`    |
//! | `2 button down`  | 1 pan, 2 rotate, 3 zoom                  |
//! | `3 pov`          | hat switch in hundredths of a degree     |
//! | `4 steps`        | wheel                                    |

use std::time::Instant;

use horizon_dim_core::Point;

use super::{AXIS, Driver, Tokens};
use crate::device::DeviceCore;
use crate::error::{Result, RouteError};
use crate::event::{ArrowDirection, Gesture};

const MOVE: i32 = 1;
const CLICK: i32 = 2;
const ARROW: i32 = 3;
const WHEEL: i32 = 4;

/// Pixels per message at full deflection.
pub const AXIS_SPEED: f64 = 100.0;

/// Where a fresh joystick pointer appears.
const START: Point = Point::new(100, 100);

fn arrow_for(pov: i32) -> Option<ArrowDirection> {
    match pov {
        0 => Some(ArrowDirection::Up),
        9000 => Some(ArrowDirection::Right),
        18000 => Some(ArrowDirection::Down),
        27000 => Some(ArrowDirection::Left),
        _ => None,
    }
}

#[derive(Debug, Default)]
pub struct JoystickDriver;

impl JoystickDriver {
    pub fn new() -> Self {
        Self
    }
}

impl Driver for JoystickDriver {
    fn on_message(&mut self, core: &mut DeviceCore, payload: &str, first: bool, now: Instant) -> Result<()> {
        let id = core.id().clone();
        let mut tokens = Tokens::new(&id, payload);
        if first {
            let bounds = core.display_bounds();
            core.set_position(bounds.clamp(START.offset(bounds.left, bounds.bottom)));
        }

        match tokens.parse::<i32>("message code")? {
            MOVE => {
                let x = tokens.normalized("x axis", AXIS)?;
                let y = tokens.normalized("y axis", AXIS)?;
                // screen y grows upwards, the stick reports it downwards
                let raw = Point::new((x * AXIS_SPEED) as i32, -(y * AXIS_SPEED) as i32);
                let delta = core.smooth(raw);
                let at = core.display_bounds().clamp(core.position().offset(delta.x, delta.y));
                core.drag_or_move(at);
            }
            CLICK => {
                let button: u8 = tokens.parse("button")?;
                let down: u8 = tokens.parse("button state")?;
                let gesture = match button {
                    1 => Gesture::Pan,
                    2 => Gesture::Rotate,
                    3 => Gesture::Zoom,
                    other => {
                        return Err(RouteError::malformed(&id, format!("unknown joystick button {other}")));
                    }
                };
                core.post_click(button, down != 0, gesture, now);
            }
            ARROW => {
                let pov: i32 = tokens.parse("hat position")?;
                if let Some(direction) = arrow_for(pov) {
                    core.post_arrow(direction);
                }
            }
            WHEEL => {
                let steps: i32 = tokens.parse("wheel steps")?;
                core.on_wheel(steps, now);
            }
            other => {
                return Err(RouteError::malformed(&id, format!("unknown joystick message {other}")));
            }
        }
        Ok(())
    }

    fn is_special(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use horizon_dim_core::{Bounds, DeviceConfig};
    use parking_lot::Mutex;

    use crate::device::DeviceId;
    use crate::dispatcher::Dispatcher;
    use crate::event::{Channel, DisplayInfo, EventData, EventKind, GenericEvent};
    use crate::widget::{WidgetBuilder, WidgetKind};

    fn setup() -> (Arc<Dispatcher>, DeviceCore) {
        let dispatcher = Arc::new(Dispatcher::with_defaults());
        dispatcher.post_generic(GenericEvent::DisplayInfo(DisplayInfo {
            display_id: 0,
            bounds: Bounds::new(0, 400, 400, 0),
        }));
        let config = DeviceConfig::default().smoothing_depth(1);
        let mut core = DeviceCore::new(DeviceId::from("h:joystick0"), "joystick", dispatcher.clone(), &config);
        core.set_special(0);
        (dispatcher, core)
    }

    #[test]
    fn test_axes_move_relative_and_stay_on_display() {
        let (_d, mut core) = setup();
        let mut stick = JoystickDriver::new();
        let now = Instant::now();
        stick.on_message(&mut core, "1 0.5 0.5", true, now).unwrap();
        assert_eq!(core.position(), Point::new(150, 50));
        stick.on_message(&mut core, "1 1.0 1.0", false, now).unwrap();
        assert_eq!(core.position(), Point::new(250, 0));
    }

    #[test]
    fn test_arrows_use_the_special_channel() {
        let (dispatcher, mut core) = setup();
        let arrows = Arc::new(Mutex::new(Vec::new()));
        let log = arrows.clone();
        dispatcher
            .register(
                WidgetBuilder::new(WidgetKind::Panel)
                    .bounds(Bounds::new(0, 400, 400, 0))
                    .on(EventKind::Arrow, |_, _| Ok(()))
                    .on_special(EventKind::Arrow, move |_, ev| {
                        if let EventData::Arrow(direction) = ev.data {
                            log.lock().push((ev.channel, direction));
                        }
                        Ok(())
                    }),
            )
            .unwrap();

        let mut stick = JoystickDriver::new();
        let now = Instant::now();
        stick.on_message(&mut core, "3 9000", true, now).unwrap();
        stick.on_message(&mut core, "3 4500", false, now).unwrap();
        assert_eq!(*arrows.lock(), vec![(Channel::Special, ArrowDirection::Right)]);
        assert!(stick.is_special());
    }

    #[test]
    fn test_unknown_button_is_malformed() {
        let (_d, mut core) = setup();
        assert!(JoystickDriver::new().on_message(&mut core, "2 9 1", true, Instant::now()).is_err());
    }
}
