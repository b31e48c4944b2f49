//! On-screen pointers, one per device.
//!
//! A pointer overlay is requested when a device first shows up. The display
//! answers asynchronously with an [`ObjectInfo`](crate::GenericEvent::ObjectInfo)
//! naming the overlay; until then updates only change the recorded state, and
//! the reply replays whatever differs from a fresh pointer.

use std::collections::HashMap;

use horizon_dim_core::logging::targets;
use horizon_dim_core::{Bounds, Point};

use super::state::DispatchState;
use crate::device::DeviceId;
use crate::gateway::{OverlayId, OverlayMessage, OverlaySpec, PointerShape};
use crate::widget::{TOP_Z, WidgetId, WidgetKind};

/// A change to a device's pointer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerUpdate {
    /// Follow the device to a point on a display.
    Move(Point, u32),
    Shape(PointerShape),
    InApp(bool),
    /// Draw a rubber-band rectangle; the shape becomes [`PointerShape::Select`].
    Selection(Bounds),
}

#[derive(Debug)]
pub(crate) struct PointerOverlay {
    widget: WidgetId,
    overlay: Option<OverlayId>,
    position: Point,
    display_id: u32,
    shape: PointerShape,
    in_app: bool,
}

/// Pointer overlays of live devices.
#[derive(Debug, Default)]
pub(crate) struct Pointers {
    by_device: HashMap<DeviceId, PointerOverlay>,
    owners: HashMap<WidgetId, DeviceId>,
    /// Pointers removed before their overlay reply arrived.
    orphaned: Vec<WidgetId>,
}

impl Pointers {
    pub(crate) fn overlay_of(&self, device: &DeviceId) -> Option<OverlayId> {
        self.by_device.get(device).and_then(|p| p.overlay)
    }

    pub(crate) fn contains(&self, device: &DeviceId) -> bool {
        self.by_device.contains_key(device)
    }
}

impl DispatchState {
    /// Request a pointer overlay for `device` at `at`. Does nothing if the
    /// device already has one.
    pub(crate) fn show_pointer(&mut self, device: &DeviceId, at: Point, display_id: u32) {
        if self.pointers.contains(device) {
            return;
        }
        let widget = self.tree.reserve_system_id();
        self.gateway.add_overlay(OverlaySpec {
            widget,
            kind: WidgetKind::Pointer,
            bounds: Bounds::new(at.x, at.x, at.y, at.y),
            z: TOP_Z,
            display_id,
            parent: None,
        });
        self.pointers.owners.insert(widget, device.clone());
        self.pointers.by_device.insert(
            device.clone(),
            PointerOverlay {
                widget,
                overlay: None,
                position: at,
                display_id,
                shape: PointerShape::Normal,
                in_app: false,
            },
        );
        tracing::debug!(target: targets::DISPATCH, %device, %widget, "pointer requested");
    }

    pub(crate) fn update_pointer(&mut self, device: &DeviceId, update: PointerUpdate) {
        let Some(pointer) = self.pointers.by_device.get_mut(device) else {
            return;
        };
        let message = match update {
            PointerUpdate::Move(at, display_id) => {
                if pointer.position == at && pointer.display_id == display_id {
                    return;
                }
                pointer.position = at;
                pointer.display_id = display_id;
                OverlayMessage::MovePointer(at)
            }
            PointerUpdate::Shape(shape) => {
                if pointer.shape == shape {
                    return;
                }
                pointer.shape = shape;
                OverlayMessage::PointerShape(shape)
            }
            PointerUpdate::InApp(in_app) => {
                if pointer.in_app == in_app {
                    return;
                }
                pointer.in_app = in_app;
                OverlayMessage::InApp(in_app)
            }
            PointerUpdate::Selection(area) => {
                pointer.shape = PointerShape::Select;
                OverlayMessage::ShowSelection(area)
            }
        };
        if let Some(overlay) = pointer.overlay {
            self.gateway.send_overlay_message(overlay, message);
        }
    }

    /// Remove `device`'s pointer, or arrange for its overlay to be removed
    /// as soon as the display names it.
    pub(crate) fn hide_pointer(&mut self, device: &DeviceId) {
        let Some(pointer) = self.pointers.by_device.remove(device) else {
            return;
        };
        self.pointers.owners.remove(&pointer.widget);
        match pointer.overlay {
            Some(overlay) => self.gateway.remove_overlay(overlay),
            None => self.pointers.orphaned.push(pointer.widget),
        }
    }

    /// Attach an overlay reply to a pointer. Returns false when `widget` is
    /// not a pointer.
    pub(crate) fn attach_pointer(&mut self, widget: WidgetId, overlay: OverlayId) -> bool {
        if let Some(index) = self.pointers.orphaned.iter().position(|w| *w == widget) {
            self.pointers.orphaned.swap_remove(index);
            self.gateway.remove_overlay(overlay);
            return true;
        }
        let Some(device) = self.pointers.owners.get(&widget) else {
            return false;
        };
        let Some(pointer) = self.pointers.by_device.get_mut(device) else {
            return false;
        };
        pointer.overlay = Some(overlay);
        // the overlay was created at the first position
        self.gateway
            .send_overlay_message(overlay, OverlayMessage::MovePointer(pointer.position));
        if pointer.shape != PointerShape::Normal {
            self.gateway
                .send_overlay_message(overlay, OverlayMessage::PointerShape(pointer.shape));
        }
        if pointer.in_app {
            self.gateway.send_overlay_message(overlay, OverlayMessage::InApp(true));
        }
        true
    }
}
