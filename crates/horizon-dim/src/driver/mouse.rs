//! Desktop mouse protocol.
//!
//! | Message          | Meaning                                   |
//! |------------------|-------------------------------------------|
//! | `1 x y`          | move to normalized `(x, y)`               |
//! | `2 button down`  | press (`down = 1`) or release             |
//! | `3 steps`        | wheel                                     |
//! | `4 code`, `k code` | key                                     |
//! | `5 button`       | double click detected by the hardware     |
//! | `10`             | the hardware reports its own double clicks |

use std::time::Instant;

use horizon_dim_core::logging::targets;

use super::{Driver, NORMALIZED, Tokens};
use crate::device::DeviceCore;
use crate::error::{Result, RouteError};
use crate::event::Gesture;

const MOVE: i32 = 1;
const CLICK: i32 = 2;
const WHEEL: i32 = 3;
const KEY: i32 = 4;
const DOUBLE_CLICK: i32 = 5;
const HAS_DOUBLE_CLICK: i32 = 10;

pub const BUTTON_LEFT: u8 = 1;
pub const BUTTON_MIDDLE: u8 = 2;
pub const BUTTON_RIGHT: u8 = 3;

fn gesture_for(button: u8) -> Option<Gesture> {
    match button {
        BUTTON_LEFT => Some(Gesture::Pan),
        BUTTON_RIGHT => Some(Gesture::Rotate),
        _ => None,
    }
}

/// Driver for pointer devices reporting normalized positions.
#[derive(Debug, Default)]
pub struct MouseDriver {
    middle_down: bool,
}

impl MouseDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn on_click(&mut self, core: &mut DeviceCore, button: u8, is_down: bool, now: Instant) {
        if button == BUTTON_MIDDLE {
            // the middle button only switches modes, on release
            if self.middle_down && !is_down {
                core.toggle_mode();
            }
            self.middle_down = is_down;
            return;
        }
        match gesture_for(button) {
            Some(gesture) => {
                core.post_click(button, is_down, gesture, now);
            }
            None => {
                tracing::debug!(target: targets::DEVICE, device = %core.id(), button, "unmapped mouse button");
            }
        }
    }
}

impl Driver for MouseDriver {
    fn on_message(&mut self, core: &mut DeviceCore, payload: &str, first: bool, now: Instant) -> Result<()> {
        let id = core.id().clone();
        let mut tokens = Tokens::new(&id, payload);

        if payload.trim_start().starts_with('k') {
            tokens.parse::<String>("key marker")?;
            let code = tokens.parse("key code")?;
            core.post_key(code);
            return Ok(());
        }

        match tokens.parse::<i32>("message code")? {
            MOVE => {
                let nx = tokens.normalized("x", NORMALIZED)?;
                let ny = tokens.normalized("y", NORMALIZED)?;
                let raw = core.display_bounds().denormalize(nx, ny);
                let at = core.smooth(raw);
                if first {
                    core.post_move(at);
                } else {
                    core.drag_or_move(at);
                }
            }
            CLICK => {
                let button: u8 = tokens.parse("button")?;
                let down: u8 = tokens.parse("button state")?;
                self.on_click(core, button, down != 0, now);
            }
            WHEEL => {
                let steps: i32 = tokens.parse("wheel steps")?;
                core.on_wheel(steps, now);
            }
            KEY => {
                let code = tokens.parse("key code")?;
                core.post_key(code);
            }
            DOUBLE_CLICK => {
                let button: u8 = tokens.parse("button")?;
                if let Some(gesture) = gesture_for(button) {
                    core.post_double_click(button, gesture);
                }
            }
            HAS_DOUBLE_CLICK => core.set_native_double_click(true),
            other => {
                return Err(RouteError::malformed(&id, format!("unknown mouse message {other}")));
            }
        }
        Ok(())
    }
}
