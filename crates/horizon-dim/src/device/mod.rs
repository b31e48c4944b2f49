//! Virtual input devices.
//!
//! A [`Device`] pairs the hardware-specific [`Driver`] that parses raw
//! messages with a [`DeviceCore`] holding everything drivers share: position,
//! smoothing, the click state machine, wheel emulation, the routing mode and
//! the dispatcher handle. Drivers only decode; the core turns their calls into
//! semantic [`DeviceEvent`]s.

mod click;
mod smoothing;
mod wheel;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use horizon_dim_core::logging::targets;
use horizon_dim_core::{Bounds, DeviceConfig, Point, REFERENCE_HEIGHT, REFERENCE_WIDTH};

pub use click::{ButtonTracker, Release};
pub use smoothing::Smoother;
pub use wheel::WheelEmulator;

use crate::dispatcher::{Dispatcher, PointerUpdate};
use crate::driver::Driver;
use crate::error::Result;
use crate::gateway::PointerShape;
use crate::event::{
    ArrowDirection, DeviceEvent, DropSubject, EventData, Gesture, LifePoint, PostOutcome, Routing,
};
use crate::widget::{WidgetKey, WidgetKind};

/// Button number of the synthetic wheel press.
pub const WHEEL_BUTTON: u8 = 4;

/// Wheel steps are scaled by this many pixels before UI scaling.
pub const WHEEL_STEP_PX: f64 = 15.0;

/// Identity of an input device, e.g. `"10.0.0.7:mouse0"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(Arc<str>);

impl DeviceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part after the host qualifier.
    pub fn name(&self) -> &str {
        self.0.rsplit_once(':').map_or(&self.0, |(_, name)| name)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(Arc::from(id))
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a device's events go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceMode {
    /// Desktop-level dispatch with spatial search.
    #[default]
    Global,
    /// Everything goes straight to one application widget.
    App(WidgetKey),
}

/// State and event synthesis shared by every driver.
pub struct DeviceCore {
    id: DeviceId,
    device_type: String,
    dispatcher: Arc<Dispatcher>,
    config: DeviceConfig,
    display_id: u32,
    position: Point,
    click_position: Point,
    smoother: Smoother,
    buttons: ButtonTracker,
    wheel: WheelEmulator,
    mode: DeviceMode,
    special_id: Option<u32>,
    has_native_double_click: bool,
    active_gesture: Option<Gesture>,
    press_time: Option<Instant>,
    selection_start: Option<Point>,
    pointer_shown: bool,
    destroy_me: bool,
}

impl DeviceCore {
    pub fn new(
        id: DeviceId,
        device_type: impl Into<String>,
        dispatcher: Arc<Dispatcher>,
        config: &DeviceConfig,
    ) -> Self {
        Self {
            id,
            device_type: device_type.into(),
            dispatcher,
            config: config.clone(),
            display_id: 0,
            position: Point::ZERO,
            click_position: Point::ZERO,
            smoother: Smoother::from_config(config),
            buttons: ButtonTracker::new(config.double_click_window()),
            wheel: WheelEmulator::new(config.wheel_release_delay()),
            mode: DeviceMode::Global,
            special_id: None,
            has_native_double_click: false,
            active_gesture: None,
            press_time: None,
            selection_start: None,
            pointer_shown: false,
            destroy_me: false,
        }
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn device_type(&self) -> &str {
        &self.device_type
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn position(&self) -> Point {
        self.position
    }

    /// Move without posting anything, e.g. to place the device on its first message.
    pub fn set_position(&mut self, at: Point) {
        self.position = at;
    }

    pub fn click_position(&self) -> Point {
        self.click_position
    }

    pub fn display_id(&self) -> u32 {
        self.display_id
    }

    pub fn set_display(&mut self, display_id: u32) {
        self.display_id = display_id;
    }

    /// The wall bounds of this device's display, or a reference-sized
    /// placeholder before the display has been announced.
    pub fn display_bounds(&self) -> Bounds {
        self.dispatcher.display_bounds(self.display_id).unwrap_or_else(|| {
            Bounds::from_origin_size(0, 0, REFERENCE_WIDTH as i32, REFERENCE_HEIGHT as i32)
        })
    }

    pub fn global_scale(&self) -> f64 {
        self.dispatcher.global_scale()
    }

    pub fn smooth(&mut self, at: Point) -> Point {
        self.smoother.push(at)
    }

    pub fn smoother_mut(&mut self) -> &mut Smoother {
        &mut self.smoother
    }

    pub fn mode(&self) -> DeviceMode {
        self.mode
    }

    pub fn special_id(&self) -> Option<u32> {
        self.special_id
    }

    /// Route this device's events on the special channel as `id`.
    pub fn set_special(&mut self, id: u32) {
        self.special_id = Some(id);
    }

    /// The hardware reports double clicks itself.
    pub fn set_native_double_click(&mut self, native: bool) {
        self.has_native_double_click = native;
    }

    /// Gesture of the button currently down.
    pub fn active_gesture(&self) -> Option<Gesture> {
        self.active_gesture
    }

    /// When the current click started.
    pub fn press_time(&self) -> Option<Instant> {
        self.press_time
    }

    /// Ask the manager to remove this device before the next message.
    pub fn destroy(&mut self) {
        self.destroy_me = true;
    }

    pub fn should_destroy(&self) -> bool {
        self.destroy_me
    }

    /// Ask the display for this device's pointer at the current position.
    pub fn show_pointer(&mut self) {
        let result = self.dispatcher.show_pointer(&self.id, self.position, self.display_id);
        self.pointer_shown = result.is_ok();
        self.log_failure("pointer creation", result);
    }

    pub fn has_pointer(&self) -> bool {
        self.pointer_shown
    }

    /// Move the pointer to where the device is now.
    pub fn sync_pointer(&mut self) {
        let (at, display_id) = (self.position, self.display_id);
        self.update_pointer(PointerUpdate::Move(at, display_id));
    }

    pub fn update_pointer(&self, update: PointerUpdate) {
        if self.pointer_shown {
            let result = self.dispatcher.update_pointer(&self.id, update);
            self.log_failure("pointer update", result);
        }
    }

    /// The kind of widget capturing this device, if any.
    pub fn capture_kind(&self) -> Option<WidgetKind> {
        self.dispatcher.capture_info(&self.id).map(|info| info.kind)
    }

    fn event(&mut self, data: EventData) -> DeviceEvent {
        let mut event = DeviceEvent::new(self.id.clone(), self.position, data).on_display(self.display_id);
        if let Some(special) = self.special_id {
            event = event.special(special);
        }
        if let DeviceMode::App(app) = self.mode {
            if self.dispatcher.widget_bounds(app).is_some() {
                event.routing = Routing::Direct(app);
            } else {
                tracing::debug!(target: targets::DEVICE, device = %self.id, "app is gone; back to global mode");
                self.mode = DeviceMode::Global;
                self.update_pointer(PointerUpdate::InApp(false));
            }
        }
        event
    }

    fn post(&mut self, data: EventData) -> PostOutcome {
        let event = self.event(data);
        self.dispatcher.post_event(event)
    }

    fn log_failure(&self, what: &str, result: Result<()>) {
        if let Err(err) = result {
            tracing::debug!(target: targets::DEVICE, device = %self.id, %err, "{what} failed");
        }
    }

    pub fn post_move(&mut self, at: Point) -> PostOutcome {
        self.position = at;
        self.post(EventData::Move)
    }

    /// Move to `at`, as a drag of the active gesture if a button is down.
    /// Does nothing when the position is unchanged.
    pub fn drag_or_move(&mut self, at: Point) -> PostOutcome {
        if at == self.position {
            return PostOutcome::default();
        }
        let (dx, dy) = (at.x.saturating_sub(self.position.x), at.y.saturating_sub(self.position.y));
        match self.active_gesture {
            Some(gesture) => self.post_analog(gesture, at, dx, dy, 0),
            None => self.post_move(at),
        }
    }

    /// Post a press or release.
    ///
    /// Handles the chord guard, selection gestures in global mode, drop
    /// synthesis at the end of a drag, and double clicks for hardware that
    /// does not report them.
    pub fn post_click(&mut self, button: u8, is_down: bool, gesture: Gesture, now: Instant) -> PostOutcome {
        if let Some(capture) = self.dispatcher.capture_info(&self.id) {
            if capture.captured && self.active_gesture.is_some_and(|g| g != gesture) {
                tracing::trace!(target: targets::DEVICE, device = %self.id, ?gesture, "click ignored during captured gesture");
                return PostOutcome::default();
            }
        }

        let release = if is_down {
            if !self.buttons.press(button, gesture, now) {
                tracing::trace!(target: targets::DEVICE, device = %self.id, button, "chorded press ignored");
                return PostOutcome::default();
            }
            self.active_gesture = Some(gesture);
            self.press_time = Some(now);
            self.click_position = self.position;
            None
        } else {
            match self.buttons.release(button, now) {
                Some(release) => {
                    self.active_gesture = None;
                    self.press_time = None;
                    Some(release)
                }
                None => return PostOutcome::default(),
            }
        };

        if self.mode == DeviceMode::Global && gesture == Gesture::Rotate {
            if is_down {
                self.begin_selection();
            } else {
                self.end_selection();
            }
            return PostOutcome::default();
        }

        let mut drop = PostOutcome::default();
        if !is_down && gesture == Gesture::Pan {
            if let Some(capture) = self.dispatcher.capture_info(&self.id).filter(|c| c.allows_drag) {
                let event = self
                    .event(EventData::Drop(DropSubject::Widget(capture.key)))
                    .routed(Routing::Spatial);
                drop = self.dispatcher.post_event(event);
            }
        }

        let mut click = self.event(EventData::Click {
            button,
            is_down,
            gesture,
        });
        click.dropped_on_target = drop.dropped_on_target;
        let outcome = self.dispatcher.post_event(click);

        if drop.deselect_all || outcome.deselect_all {
            let result = self.dispatcher.deselect_all(&self.id);
            self.log_failure("deselect", result);
        }

        if let Some(release) = release {
            if release.double_click && gesture == Gesture::Pan && !self.has_native_double_click {
                self.post_double_click(button, gesture);
            }
        }
        outcome
    }

    pub fn post_double_click(&mut self, button: u8, gesture: Gesture) -> PostOutcome {
        self.post(EventData::DoubleClick { button, gesture })
    }

    /// Post a drag of `gesture` ending at `at`. Ignored unless that gesture's
    /// button is down.
    pub fn post_analog(&mut self, gesture: Gesture, at: Point, dx: i32, dy: i32, dz: i32) -> PostOutcome {
        if self.active_gesture != Some(gesture) {
            return PostOutcome::default();
        }
        self.position = at;
        if gesture == Gesture::Rotate && self.mode == DeviceMode::Global {
            if let Some(start) = self.selection_start {
                let dragged = (f64::from(at.x) - f64::from(start.x)).hypot(f64::from(at.y) - f64::from(start.y));
                if dragged > f64::from(self.config.selection_drag_px) * self.global_scale() {
                    let result = self.dispatcher.select_in_rect(&self.id, start, at, self.display_id);
                    self.log_failure("rubber-band selection", result);
                }
                self.update_pointer(PointerUpdate::Selection(Bounds::spanning(start, at)));
            }
        }
        let start = self.click_position;
        self.post(EventData::Analog {
            gesture,
            start,
            dx,
            dy,
            dz,
        })
    }

    pub fn post_fast_drag(&mut self, dx: i32, dy: i32) -> PostOutcome {
        self.post(EventData::FastDrag { dx, dy })
    }

    pub fn post_arrow(&mut self, direction: ArrowDirection) -> PostOutcome {
        self.post(EventData::Arrow(direction))
    }

    pub fn post_key(&mut self, code: u32) -> PostOutcome {
        self.post(EventData::Key(code))
    }

    pub fn post_custom(&mut self, code: i32, payload: impl Into<String>) -> PostOutcome {
        self.post(EventData::Custom {
            code,
            payload: payload.into(),
        })
    }

    pub fn post_multi_touch_hold(&mut self, at: Point, touches: u32, life: LifePoint) -> PostOutcome {
        self.position = at;
        self.post(EventData::MultiTouchHold { touches, life })
    }

    pub fn post_multi_touch_swipe(
        &mut self,
        at: Point,
        touches: u32,
        start: Point,
        life: LifePoint,
    ) -> PostOutcome {
        self.position = at;
        self.click_position = at;
        self.post(EventData::MultiTouchSwipe {
            touches,
            dx: at.x.saturating_sub(start.x),
            dy: at.y.saturating_sub(start.y),
            start,
            life,
        })
    }

    pub fn post_big_click(&mut self, at: Point, life: LifePoint) -> PostOutcome {
        self.position = at;
        self.click_position = at;
        self.post(EventData::BigClick(life))
    }

    /// Feed wheel steps: the first step of a burst presses the zoom button,
    /// every step drags it.
    pub fn on_wheel(&mut self, steps: i32, now: Instant) {
        if self.wheel.step(now) {
            self.post_click(WHEEL_BUTTON, true, Gesture::Zoom, now);
        }
        let amount = (f64::from(steps) * WHEEL_STEP_PX * self.global_scale()) as i32;
        let at = self.position;
        self.post_analog(Gesture::Zoom, at, amount, 0, 0);
    }

    /// Periodic work: releases the emulated wheel button after a quiet spell.
    pub fn tick(&mut self, now: Instant) {
        if self.wheel.poll(now) {
            self.post_click(WHEEL_BUTTON, false, Gesture::Zoom, now);
        }
    }

    fn begin_selection(&mut self) {
        let at = self.position;
        self.selection_start = Some(at);
        if let Err(err) = self.dispatcher.begin_selection(&self.id, at, self.display_id) {
            tracing::debug!(target: targets::DEVICE, device = %self.id, %err, "selection start failed");
        }
    }

    fn end_selection(&mut self) {
        self.selection_start = None;
        let result = self.dispatcher.release_capture(&self.id);
        self.log_failure("selection end", result);
        self.update_pointer(PointerUpdate::Shape(PointerShape::Normal));
    }

    /// Send all further events to `app`.
    pub fn to_app_mode(&mut self, app: WidgetKey) {
        tracing::debug!(target: targets::DEVICE, device = %self.id, ?app, "app mode");
        self.mode = DeviceMode::App(app);
        self.update_pointer(PointerUpdate::InApp(true));
    }

    pub fn to_global_mode(&mut self) {
        tracing::debug!(target: targets::DEVICE, device = %self.id, "global mode");
        self.mode = DeviceMode::Global;
        self.update_pointer(PointerUpdate::InApp(false));
    }

    /// Leave app mode, or enter it for the app under the pointer.
    pub fn toggle_mode(&mut self) {
        match self.mode {
            DeviceMode::App(_) => self.to_global_mode(),
            DeviceMode::Global => {
                let under = self
                    .dispatcher
                    .last_handler_info(&self.id)
                    .filter(|info| info.kind == WidgetKind::App);
                if let Some(app) = under {
                    self.to_app_mode(app.key);
                }
            }
        }
    }
}

impl fmt::Debug for DeviceCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceCore")
            .field("id", &self.id)
            .field("device_type", &self.device_type)
            .field("display_id", &self.display_id)
            .field("position", &self.position)
            .field("mode", &self.mode)
            .field("special_id", &self.special_id)
            .finish_non_exhaustive()
    }
}

/// A live device: its driver plus shared core state.
pub struct Device {
    core: DeviceCore,
    driver: Box<dyn Driver>,
}

impl Device {
    pub fn new(core: DeviceCore, driver: Box<dyn Driver>) -> Self {
        Self { core, driver }
    }

    pub fn id(&self) -> &DeviceId {
        self.core.id()
    }

    pub fn core(&self) -> &DeviceCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut DeviceCore {
        &mut self.core
    }

    pub fn is_special(&self) -> bool {
        self.driver.is_special()
    }

    /// Alive until the driver says otherwise or the core asked to be destroyed.
    pub fn is_alive(&self) -> bool {
        self.driver.is_alive() && !self.core.should_destroy()
    }

    /// Hand one raw payload to the driver, then bring the pointer along.
    ///
    /// The first message creates the pointer where the driver placed the device.
    pub fn on_message(&mut self, payload: &str, first: bool, now: Instant) -> Result<()> {
        let result = self.driver.on_message(&mut self.core, payload, first, now);
        if first && self.driver.shows_pointer() {
            self.core.show_pointer();
        } else {
            self.core.sync_pointer();
        }
        result
    }

    pub fn tick(&mut self, now: Instant) {
        self.core.tick(now);
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device").field("core", &self.core).finish_non_exhaustive()
    }
}
