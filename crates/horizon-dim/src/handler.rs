//! The view of dispatcher state a callback gets while it runs.
//!
//! Callbacks run synchronously on the posting device's thread, inside the
//! dispatcher lock. They must stay short: hand slow work to a background
//! worker. Anything a callback wants to change about routing goes through the
//! [`HandlerContext`] it receives, never through the shared `Dispatcher`.

use horizon_dim_core::Point;

use crate::device::DeviceId;
use crate::dispatcher::{DispatchState, PointerUpdate};
use crate::error::Result;
use crate::event::{Channel, DeviceEvent, EventKind};
use crate::gateway::OverlayMessage;
use crate::widget::{Handler, Widget, WidgetBuilder, WidgetKey, WidgetTree};

/// Access to routing state from inside a callback.
pub struct HandlerContext<'a> {
    state: &'a mut DispatchState,
    target: WidgetKey,
}

impl<'a> HandlerContext<'a> {
    pub(crate) fn new(state: &'a mut DispatchState, target: WidgetKey) -> Self {
        Self { state, target }
    }

    /// The widget this callback belongs to.
    pub fn target(&self) -> WidgetKey {
        self.target
    }

    /// The callback's own widget, if it still exists.
    pub fn widget(&self) -> Option<&Widget> {
        self.state.tree.get(self.target)
    }

    pub fn tree(&self) -> &WidgetTree {
        &self.state.tree
    }

    /// Mutable tree access for geometry, z and flag changes.
    ///
    /// Use [`unregister`](Self::unregister) to remove widgets so device routes
    /// are purged as well.
    pub fn tree_mut(&mut self) -> &mut WidgetTree {
        &mut self.state.tree
    }

    /// Direct all further events from `device` to this widget.
    pub fn capture(&mut self, device: &DeviceId) {
        self.state.set_capture(device, Some(self.target));
    }

    /// Release `device`'s capture. A no-op when nothing is captured.
    pub fn release_capture(&mut self, device: &DeviceId) {
        self.state.release_capture(device);
    }

    pub fn capture_of(&self, device: &DeviceId) -> Option<WidgetKey> {
        self.state.routes.get(device).and_then(|r| r.to_handler)
    }

    /// Set this widget's "keep my events" flag.
    ///
    /// Fails with [`RouteError::StaleWidget`](crate::RouteError::StaleWidget)
    /// once the widget has unregistered itself.
    pub fn set_captured(&mut self, captured: bool) -> Result<()> {
        self.state.tree.set_captured(self.target, captured)
    }

    pub fn select(&mut self, device: &DeviceId, key: WidgetKey) -> bool {
        self.state.select(device, key)
    }

    pub fn deselect(&mut self, device: &DeviceId, key: WidgetKey) -> bool {
        self.state.deselect(device, key)
    }

    /// Toggle selection of `key`; returns the new state.
    pub fn toggle_selected(&mut self, device: &DeviceId, key: WidgetKey) -> bool {
        self.state.toggle_selected(device, key)
    }

    pub fn deselect_all(&mut self, device: &DeviceId) {
        self.state.deselect_all(device);
    }

    pub fn selection(&self, device: &DeviceId) -> Vec<WidgetKey> {
        self.state
            .routes
            .get(device)
            .map(|r| r.selection.members().to_vec())
            .unwrap_or_default()
    }

    /// Queue an event for delivery after the current one completes.
    pub fn post(&mut self, event: DeviceEvent) {
        self.state.pending.push_back(event);
    }

    pub fn register(&mut self, builder: WidgetBuilder) -> Result<WidgetKey> {
        self.state.register(builder)
    }

    pub fn unregister(&mut self, key: WidgetKey) -> bool {
        self.state.unregister(key)
    }

    /// Install or replace a primary-channel callback on a widget.
    pub fn set_handler(&mut self, key: WidgetKey, kind: EventKind, handler: Handler) -> Result<()> {
        self.state.tree.set_handler(key, kind, Channel::Primary, handler)
    }

    /// Send a visual command for `key` if it has an overlay.
    pub fn send_overlay_message(&self, key: WidgetKey, message: OverlayMessage) {
        self.state.send_overlay_message(key, message);
    }

    /// Change `device`'s on-screen pointer, e.g. its shape while dragging.
    pub fn update_pointer(&mut self, device: &DeviceId, update: PointerUpdate) {
        self.state.update_pointer(device, update);
    }

    /// Resolve the widget under a point without touching any device state.
    pub fn hit_test(&self, at: Point, display_id: u32) -> Option<WidgetKey> {
        self.state.resolve_plain(at, display_id)
    }

    pub fn global_scale(&self) -> f64 {
        self.state.global_scale
    }
}
