//! Dispatcher state shared by every device, and the per-device routes.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use horizon_dim_core::logging::targets;
use horizon_dim_core::{DimConfig, DispatchConfig, Point, ScaleConfig, enlarge_multiplier};
use slotmap::SlotMap;

use super::pointer::Pointers;
use super::{AppFactory, GenericCallback, SubscriptionKey, WidgetInfo};
use crate::device::DeviceId;
use crate::error::Result;
use crate::event::{Channel, DeviceEvent, EventData, Routing};
use crate::gateway::{DisplayGateway, OverlayMessage, OverlaySpec};
use crate::select::MultiSelect;
use crate::widget::{WidgetBuilder, WidgetKey, WidgetKind, WidgetTree};

/// Largest multiplier a widget reaches with the pointer on top of it.
pub(crate) const ENLARGE_MAX: f64 = 2.0;

/// Where a device's latest event came from. Used to address enter/leave
/// notifications that are synthesized outside a delivery.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Origin {
    position: Point,
    display_id: u32,
    channel: Channel,
    special_id: Option<u32>,
}

impl Origin {
    pub(crate) fn of(event: &DeviceEvent) -> Self {
        Self {
            position: event.position,
            display_id: event.display_id,
            channel: event.channel,
            special_id: event.special_id,
        }
    }

    /// A notification for `target` carrying this origin.
    pub(crate) fn notify(&self, device: &DeviceId, data: EventData, target: WidgetKey) -> DeviceEvent {
        let mut event = DeviceEvent::new(device.clone(), self.position, data)
            .on_display(self.display_id)
            .routed(Routing::Direct(target));
        event.channel = self.channel;
        event.special_id = self.special_id;
        event
    }
}

/// Routing bookkeeping for one device.
#[derive(Debug, Default)]
pub(crate) struct DeviceRoute {
    /// Capture target: receives every event until released.
    pub(crate) to_handler: Option<WidgetKey>,
    /// Widget the last spatially routed event resolved to.
    pub(crate) last_handler: Option<WidgetKey>,
    /// Input to the sticky-candidate rule.
    pub(crate) previous_hit: Option<WidgetKey>,
    /// Widget that received the latest unmatched `EnteredWindow`.
    pub(crate) hovered: Option<WidgetKey>,
    /// Drop target currently under a captured drag.
    pub(crate) drop_hover: Option<WidgetKey>,
    pub(crate) selection: MultiSelect,
    pub(crate) origin: Origin,
}

impl DeviceRoute {
    /// Clear every reference to a removed widget.
    pub(crate) fn forget(&mut self, key: WidgetKey) {
        for slot in [
            &mut self.to_handler,
            &mut self.last_handler,
            &mut self.previous_hit,
            &mut self.hovered,
            &mut self.drop_hover,
        ] {
            if *slot == Some(key) {
                *slot = None;
            }
        }
        self.selection.deselect(key);
    }
}

/// Everything behind the dispatcher lock.
pub(crate) struct DispatchState {
    pub(crate) tree: WidgetTree,
    pub(crate) routes: HashMap<DeviceId, DeviceRoute>,
    pub(crate) gateway: Arc<dyn DisplayGateway>,
    pub(crate) config: DispatchConfig,
    pub(crate) scale_config: ScaleConfig,
    pub(crate) global_scale: f64,
    /// Wall widget per display id.
    pub(crate) walls: BTreeMap<u32, WidgetKey>,
    /// App widget per application window.
    pub(crate) apps: HashMap<i64, WidgetKey>,
    pub(crate) app_factory: Option<AppFactory>,
    pub(crate) subscribers: SlotMap<SubscriptionKey, GenericCallback>,
    /// Events posted by callbacks, delivered after the current one.
    pub(crate) pending: VecDeque<DeviceEvent>,
    pub(crate) pointers: Pointers,
}

impl DispatchState {
    pub(crate) fn new(config: &DimConfig, gateway: Arc<dyn DisplayGateway>) -> Self {
        Self {
            tree: WidgetTree::new(),
            routes: HashMap::new(),
            gateway,
            config: config.dispatch.clone(),
            scale_config: config.scale.clone(),
            global_scale: 1.0,
            walls: BTreeMap::new(),
            apps: HashMap::new(),
            app_factory: None,
            subscribers: SlotMap::with_key(),
            pending: VecDeque::new(),
            pointers: Pointers::default(),
        }
    }

    pub(crate) fn route_mut(&mut self, device: &DeviceId) -> &mut DeviceRoute {
        self.routes.entry(device.clone()).or_default()
    }

    pub(crate) fn register(&mut self, builder: WidgetBuilder) -> Result<WidgetKey> {
        let (key, fresh) = self.tree.insert(builder)?;
        if !fresh {
            tracing::debug!(target: targets::DISPATCH, ?key, "widget already registered");
            return Ok(key);
        }
        if let Some(widget) = self.tree.get(key) {
            if widget.id.is_system() && widget.drawable {
                let parent = widget.parent.and_then(|p| self.tree.get(p)).map(|p| p.id);
                self.gateway.add_overlay(OverlaySpec {
                    widget: widget.id,
                    kind: widget.kind.clone(),
                    bounds: widget.bounds,
                    z: widget.z,
                    display_id: widget.display_id,
                    parent,
                });
            }
        }
        Ok(key)
    }

    /// Remove `key` and its subtree. Returns false if it was already gone.
    pub(crate) fn unregister(&mut self, key: WidgetKey) -> bool {
        let removed = self.tree.remove_subtree(key);
        if removed.is_empty() {
            return false;
        }
        for (k, widget) in &removed {
            if let Some(overlay) = widget.overlay_id {
                self.gateway.remove_overlay(overlay);
            }
            for route in self.routes.values_mut() {
                route.forget(*k);
            }
        }
        let tree = &self.tree;
        self.walls.retain(|_, k| tree.contains(*k));
        self.apps.retain(|_, k| tree.contains(*k));
        tracing::debug!(target: targets::DISPATCH, ?key, removed = removed.len(), "widget unregistered");
        true
    }

    pub(crate) fn set_capture(&mut self, device: &DeviceId, key: Option<WidgetKey>) {
        tracing::debug!(target: targets::DISPATCH, %device, ?key, "capture set");
        self.route_mut(device).to_handler = key;
    }

    /// Clear `device`'s capture and close any drop hover it opened.
    pub(crate) fn release_capture(&mut self, device: &DeviceId) {
        let Some(route) = self.routes.get_mut(device) else {
            return;
        };
        let Some(released) = route.to_handler.take() else {
            return;
        };
        let drop_hover = route.drop_hover.take();
        route.last_handler = route.hovered;
        let origin = route.origin;
        tracing::debug!(target: targets::DISPATCH, %device, ?released, "capture released");
        if let Some(left) = drop_hover {
            let mut event = origin.notify(device, EventData::LeftWindow, left);
            self.invoke(left, &mut event);
        }
    }

    /// Drop all routing state of a device that went away.
    pub(crate) fn forget_device(&mut self, device: &DeviceId) {
        self.deselect_all(device);
        self.hide_pointer(device);
        let Some(route) = self.routes.remove(device) else {
            return;
        };
        for left in [route.hovered, route.drop_hover].into_iter().flatten() {
            let mut event = route.origin.notify(device, EventData::LeftWindow, left);
            self.invoke(left, &mut event);
        }
    }

    fn mark_selected(&mut self, key: WidgetKey, selected: bool) {
        if !selected && self.routes.values().any(|r| r.selection.contains(key)) {
            return;
        }
        if let Some(widget) = self.tree.get_mut(key) {
            if widget.selected == selected {
                return;
            }
            widget.selected = selected;
            if let Some(overlay) = widget.overlay_id {
                self.gateway
                    .send_overlay_message(overlay, OverlayMessage::Select(selected));
            }
        }
    }

    pub(crate) fn select(&mut self, device: &DeviceId, key: WidgetKey) -> bool {
        let Some(kind) = self.tree.get(key).map(|w| w.kind.clone()) else {
            tracing::warn!(target: targets::SELECT, ?key, "cannot select unregistered widget");
            return false;
        };
        let change = self.route_mut(device).selection.select(key, &kind);
        for dropped in change.deselected {
            self.mark_selected(dropped, false);
        }
        if change.added {
            self.mark_selected(key, true);
            tracing::debug!(target: targets::SELECT, %device, ?key, "selected");
        }
        change.added
    }

    pub(crate) fn deselect(&mut self, device: &DeviceId, key: WidgetKey) -> bool {
        let removed = self
            .routes
            .get_mut(device)
            .is_some_and(|r| r.selection.deselect(key));
        if removed {
            self.mark_selected(key, false);
        }
        removed
    }

    pub(crate) fn toggle_selected(&mut self, device: &DeviceId, key: WidgetKey) -> bool {
        let member = self
            .routes
            .get(device)
            .is_some_and(|r| r.selection.contains(key));
        if member {
            self.deselect(device, key);
            false
        } else {
            self.select(device, key)
        }
    }

    pub(crate) fn deselect_all(&mut self, device: &DeviceId) {
        let members = match self.routes.get_mut(device) {
            Some(route) => route.selection.clear(),
            None => return,
        };
        if !members.is_empty() {
            tracing::debug!(target: targets::SELECT, %device, count = members.len(), "deselected all");
        }
        for key in members {
            self.mark_selected(key, false);
        }
    }

    /// Select every shown widget of the selection's kind overlapping the
    /// drag rectangle `start..end`.
    pub(crate) fn select_in_rect(&mut self, device: &DeviceId, start: Point, end: Point, display_id: u32) {
        let kind = self
            .routes
            .get(device)
            .and_then(|r| r.selection.kind().cloned())
            .unwrap_or(WidgetKind::App);
        let area = horizon_dim_core::Bounds::spanning(start, end);
        for key in self.tree.overlapping(&kind, display_id, &area) {
            let allowed = self.tree.get(key).is_some_and(|w| w.allows_selection);
            if allowed {
                self.select(device, key);
            }
        }
    }

    pub(crate) fn send_overlay_message(&self, key: WidgetKey, message: OverlayMessage) {
        if let Some(overlay) = self.tree.get(key).and_then(|w| w.overlay_id) {
            self.gateway.send_overlay_message(overlay, message);
        }
    }

    pub(crate) fn widget_info(&self, key: WidgetKey) -> Option<WidgetInfo> {
        self.tree.get(key).map(|w| WidgetInfo {
            key,
            id: w.id,
            kind: w.kind.clone(),
            bounds: w.bounds,
            z: w.z,
            display_id: w.display_id,
            allows_drag: w.allows_drag,
            allows_selection: w.allows_selection,
            captured: w.captured,
        })
    }

    /// Hit test with transparency stripping but no sticky candidate.
    pub(crate) fn resolve_plain(&self, at: Point, display_id: u32) -> Option<WidgetKey> {
        self.tree
            .hit_test(at.x, at.y, display_id)
            .filter(|&k| self.tree.get(k).is_some_and(|w| !w.event_transparent))
    }

    /// Spatial resolution with the sticky-candidate rule and transparency
    /// stripping. Updates the device's previous hit when `device` is given.
    pub(crate) fn resolve(&mut self, at: Point, display_id: u32, device: Option<&DeviceId>) -> Option<WidgetKey> {
        let candidate = self.tree.hit_test(at.x, at.y, display_id);
        let previous = device
            .and_then(|d| self.routes.get(d))
            .and_then(|r| r.previous_hit)
            .filter(|&k| {
                self.tree
                    .get(k)
                    .is_some_and(|w| w.display_id == display_id && w.is_shown() && w.contains_point(at))
            });

        let mut found = candidate;
        if let (Some(prev), Some(cand)) = (previous, candidate) {
            let prev_z = self.tree.get(prev).map(|w| w.z);
            let cand_z = self.tree.get(cand).map(|w| w.z);
            if cand != prev && prev_z < cand_z {
                tracing::trace!(target: targets::HIT_TEST, ?prev, ?cand, "keeping previous handler");
                found = Some(prev);
            }
        }
        let found = found.filter(|&k| self.tree.get(k).is_some_and(|w| !w.event_transparent));
        if let Some(device) = device {
            self.route_mut(device).previous_hit = found;
        }
        found
    }

    /// Grow buttons and menus near the pointer.
    pub(crate) fn enlarge_near(&mut self, event: &DeviceEvent) {
        if !self.config.enlarge_widgets {
            return;
        }
        let threshold = f64::from(self.config.enlarge_threshold_px) * self.global_scale;
        let at = event.position;
        let changed: Vec<(WidgetKey, f64)> = self
            .tree
            .iter()
            .filter(|(_, w)| w.kind.enlarges_near_pointer() && w.display_id == event.display_id && w.is_shown())
            .filter_map(|(k, w)| {
                let mult = enlarge_multiplier(w.bounds.distance(at.x, at.y), threshold, ENLARGE_MAX);
                ((mult - w.scale_multiplier).abs() > 1e-3).then_some((k, mult))
            })
            .collect();
        for (key, mult) in changed {
            if let Some(widget) = self.tree.get_mut(key) {
                widget.scale_multiplier = mult;
            }
            self.send_overlay_message(key, OverlayMessage::TempScale(mult));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::NullGateway;
    use horizon_dim_core::Bounds;

    fn state() -> DispatchState {
        DispatchState::new(&DimConfig::default(), Arc::new(NullGateway))
    }

    #[test]
    fn test_route_forget_clears_every_slot() {
        let mut s = state();
        let key = s.register(WidgetBuilder::new(WidgetKind::App)).unwrap();
        let device = DeviceId::from("h:mouse0");
        {
            let route = s.route_mut(&device);
            route.to_handler = Some(key);
            route.last_handler = Some(key);
            route.hovered = Some(key);
        }
        s.select(&device, key);
        assert!(s.unregister(key));
        let route = &s.routes[&device];
        assert_eq!(route.to_handler, None);
        assert_eq!(route.last_handler, None);
        assert_eq!(route.hovered, None);
        assert!(route.selection.is_empty());
        assert!(!s.unregister(key));
    }

    #[test]
    fn test_sticky_previous_handler_in_front() {
        let mut s = state();
        let panel = s
            .register(WidgetBuilder::new(WidgetKind::Panel).bounds(Bounds::new(0, 200, 200, 0)).z(0.0))
            .unwrap();
        let a = s
            .register(WidgetBuilder::new(WidgetKind::Thumbnail).bounds(Bounds::new(0, 100, 100, 0)).parent(panel))
            .unwrap();
        let b = s
            .register(WidgetBuilder::new(WidgetKind::Thumbnail).bounds(Bounds::new(50, 150, 100, 0)).parent(panel))
            .unwrap();
        let device = DeviceId::from("h:mouse0");

        assert_eq!(s.resolve(Point::new(20, 20), 0, Some(&device)), Some(a));
        // enlarged thumbnail pulled in front of its sibling
        s.tree.set_temp_z_offset(a, -0.5).unwrap();
        assert_eq!(s.resolve(Point::new(75, 20), 0, Some(&device)), Some(a));
        // without the device the plain hit wins
        assert_eq!(s.resolve(Point::new(75, 20), 0, None), Some(b));

        s.tree.set_temp_z_offset(a, 0.0).unwrap();
        assert_eq!(s.resolve(Point::new(75, 20), 0, Some(&device)), Some(b));
    }

    #[test]
    fn test_toggle_and_kind_switch() {
        let mut s = state();
        let device = DeviceId::from("h:mouse0");
        let app = s.register(WidgetBuilder::new(WidgetKind::App)).unwrap();
        let thumb = s.register(WidgetBuilder::new(WidgetKind::Thumbnail)).unwrap();

        assert!(s.toggle_selected(&device, app));
        assert!(s.tree.get(app).unwrap().is_selected());
        assert!(s.select(&device, thumb));
        assert!(!s.tree.get(app).unwrap().is_selected());
        assert!(!s.toggle_selected(&device, thumb));
        assert!(!s.tree.get(thumb).unwrap().is_selected());
    }

    #[test]
    fn test_enlarge_near_pointer() {
        let mut config = DimConfig::default();
        config.dispatch = config.dispatch.enlarge_widgets(true).enlarge_threshold_px(100);
        let mut s = DispatchState::new(&config, Arc::new(NullGateway));
        let button = s
            .register(WidgetBuilder::new(WidgetKind::Button).bounds(Bounds::new(100, 120, 20, 0)))
            .unwrap();
        let label = s
            .register(WidgetBuilder::new(WidgetKind::Label).bounds(Bounds::new(100, 120, 20, 0)))
            .unwrap();

        let ev = DeviceEvent::new(DeviceId::from("h:mouse0"), Point::new(50, 10), EventData::Move);
        s.enlarge_near(&ev);
        assert!((s.tree.get(button).unwrap().scale_multiplier() - 1.5).abs() < 1e-9);
        assert!((s.tree.get(label).unwrap().scale_multiplier() - 1.0).abs() < 1e-9);
    }
}
