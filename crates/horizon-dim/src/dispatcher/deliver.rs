//! Delivery of one device event.
//!
//! # Event Flow
//!
//! 1. **Target**: an explicit target (a `Direct` route, or the device's capture
//!    under `Capture` routing) skips spatial search. Otherwise the target is
//!    resolved at the event position.
//!
//! 2. **Transitions**: when the resolved widget changes, the previous one gets
//!    `LeftWindow` and the new one `EnteredWindow`. Analog continuations never
//!    cross a widget border: they are dropped instead. A captured drag tracks
//!    the drop target under the pointer separately.
//!
//! 3. **Fan-out**: a target in the device's selection shares clicks, drags,
//!    zooms and drops with every selected member. Copies are marked
//!    non-original and are never fanned out again.
//!
//! 4. **Drop substitution**: a dropped widget that is itself selected is
//!    replaced by the whole selection.
//!
//! 5. **Failure**: a callback reporting [`HandlerError::Stale`] is purged;
//!    any other failure is logged. Neither reaches the posting device.

use horizon_dim_core::PerfSpan;
use horizon_dim_core::logging::{span_names, targets};

use super::state::{DispatchState, Origin};
use crate::error::HandlerError;
use crate::event::{DeviceEvent, DropSubject, EventData, EventKind, PostOutcome, Routing};
use crate::handler::HandlerContext;
use crate::widget::WidgetKey;

impl DispatchState {
    /// Deliver one event, then report what happened.
    pub(crate) fn deliver(&mut self, mut event: DeviceEvent) -> PostOutcome {
        let _span = PerfSpan::new(span_names::DELIVER).warn_after(self.config.slow_delivery_warn());
        let kind = event.kind();
        let device = event.device.clone();
        self.route_mut(&device).origin = Origin::of(&event);

        let explicit = match event.routing {
            Routing::Direct(key) => Some(key),
            Routing::Capture => self.routes.get(&device).and_then(|r| r.to_handler),
            Routing::Spatial => None,
        };
        let explicit = explicit.filter(|&key| {
            let live = self.tree.contains(key);
            if !live {
                tracing::warn!(target: targets::DISPATCH, %device, ?key, "stale target; resolving spatially");
            }
            live
        });

        let target = match explicit {
            Some(target) => {
                event.routing = Routing::Direct(target);
                let drags = self.tree.get(target).is_some_and(|w| w.allows_drag);
                if kind == EventKind::Analog1 && drags {
                    self.enlarge_near(&event);
                    let under = self.resolve(event.position, event.display_id, Some(&device));
                    self.track_drop_hover(&event, target, under);
                    self.route_mut(&device).last_handler = under;
                }
                Some(target)
            }
            None => {
                let handler = self.resolve(event.position, event.display_id, Some(&device));
                if matches!(kind, EventKind::Move | EventKind::Analog1) {
                    self.enlarge_near(&event);
                }
                let last = self.routes.get(&device).and_then(|r| r.last_handler);
                if handler != last {
                    if kind.is_analog() {
                        tracing::trace!(target: targets::DISPATCH, %device, ?kind, "analog event left its handler; dropped");
                        return PostOutcome::default();
                    }
                    self.transition_hover(&event, handler);
                    self.route_mut(&device).last_handler = handler;
                }
                handler.filter(|&k| self.tree.get(k).is_some_and(|w| !w.captured))
            }
        };

        let Some(target) = target else {
            return PostOutcome::default();
        };

        let click = match event.data {
            EventData::Click { is_down, .. } if event.original => Some(is_down),
            _ => None,
        };
        if click == Some(true) && self.routes.get(&device).is_none_or(|r| r.to_handler.is_none()) {
            self.set_capture(&device, Some(target));
        }

        self.send_event(target, &mut event);

        if click == Some(false) {
            self.release_capture(&device);
        }

        PostOutcome {
            delivered_to: Some(target),
            deselect_all: event.deselect_all,
            dropped_on_target: event.dropped_on_target,
            queued: false,
        }
    }

    /// Send `LeftWindow` to the hovered widget and `EnteredWindow` to
    /// `handler` if it wants one.
    fn transition_hover(&mut self, event: &DeviceEvent, handler: Option<WidgetKey>) {
        let device = &event.device;
        let origin = Origin::of(event);
        let entered = handler.filter(|&k| {
            self.tree.get(k).is_some_and(|w| {
                !w.captured && (w.has_handler(event.kind(), event.channel) || w.allows_drop())
            })
        });
        let left = std::mem::replace(&mut self.route_mut(device).hovered, entered);

        if let Some(left) = left {
            let mut notice = origin.notify(device, EventData::LeftWindow, left);
            self.invoke(left, &mut notice);
        }
        if let Some(entered) = entered {
            let mut notice = origin.notify(device, EventData::EnteredWindow, entered);
            self.invoke(entered, &mut notice);
        }
    }

    /// Enter/leave bookkeeping for drop targets under a captured drag.
    fn track_drop_hover(&mut self, event: &DeviceEvent, dragged: WidgetKey, under: Option<WidgetKey>) {
        let device = &event.device;
        let hovered = self.routes.get(device).and_then(|r| r.hovered);
        let candidate = under.filter(|&k| {
            k != dragged && Some(k) != hovered && self.tree.get(k).is_some_and(|w| w.allows_drop())
        });
        let route = self.route_mut(device);
        if route.drop_hover == candidate {
            return;
        }
        let left = std::mem::replace(&mut route.drop_hover, candidate);
        let origin = Origin::of(event);

        if let Some(left) = left {
            let mut notice = origin.notify(device, EventData::LeftWindow, left);
            self.invoke(left, &mut notice);
        }
        if let Some(entered) = candidate {
            let mut notice = origin.notify(device, EventData::EnteredWindow, entered);
            self.invoke(entered, &mut notice);
        }
    }

    /// Apply fan-out and drop substitution, then call the target.
    fn send_event(&mut self, target: WidgetKey, event: &mut DeviceEvent) {
        let selected = self
            .routes
            .get(&event.device)
            .is_some_and(|r| r.selection.contains(target));

        if selected && event.original && event.kind().fans_out() {
            self.fan_out(event);
            return;
        }

        if let EventData::Drop(DropSubject::Widget(dropped)) = event.data {
            if let Some(route) = self.routes.get(&event.device) {
                if route.selection.contains(dropped) {
                    event.data = EventData::Drop(route.selection.subject());
                }
            }
        }
        self.invoke(target, event);
    }

    /// Deliver a copy of `event` to every member of the device's selection.
    fn fan_out(&mut self, event: &mut DeviceEvent) {
        let members = match self.routes.get(&event.device) {
            Some(route) => route.selection.members().to_vec(),
            None => return,
        };
        tracing::debug!(
            target: targets::SELECT,
            device = %event.device,
            kind = ?event.kind(),
            members = members.len(),
            "fanning out to selection"
        );
        for member in members {
            let mut copy = event.clone();
            copy.original = false;
            copy.routing = Routing::Direct(member);
            copy.deselect_all = false;
            copy.dropped_on_target = false;
            self.invoke(member, &mut copy);
            event.deselect_all |= copy.deselect_all;
            event.dropped_on_target |= copy.dropped_on_target;
        }
    }

    /// Call `target`'s callback for the event. Returns whether one ran.
    pub(crate) fn invoke(&mut self, target: WidgetKey, event: &mut DeviceEvent) -> bool {
        let kind = event.kind();
        let channel = event.channel;
        let Some(handler) = self.tree.get(target).and_then(|w| w.handler(kind, channel)) else {
            return false;
        };

        let result = {
            let mut ctx = HandlerContext::new(self, target);
            handler(&mut ctx, event)
        };

        match result {
            Ok(()) => {}
            Err(HandlerError::Stale) => {
                self.tree.purge_handler(target, kind, channel);
                tracing::warn!(target: targets::DISPATCH, ?target, ?kind, "stale callback purged");
            }
            Err(HandlerError::Failed(reason)) => {
                tracing::warn!(target: targets::DISPATCH, ?target, ?kind, %reason, "callback failed");
            }
        }
        true
    }
}
