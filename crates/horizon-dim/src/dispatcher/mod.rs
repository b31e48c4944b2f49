//! The shared dispatcher: widget index, device routes and event delivery.
//!
//! Every device thread posts into one [`Dispatcher`]. Its state sits behind a
//! re-entrant lock, so a callback running on the posting thread may post
//! again: those events are queued and delivered, in order, right after the
//! current one. Structural calls made from inside a callback on the shared
//! `Dispatcher` fail with [`RouteError::Reentrant`]; callbacks use their
//! [`HandlerContext`](crate::HandlerContext) instead.
//!
//! # Usage
//!
//! ```ignore
//! use horizon_dim::{Dispatcher, EventKind, WidgetBuilder, WidgetKind};
//!
//! let dispatcher = Dispatcher::with_defaults();
//! let button = dispatcher.register(
//!     WidgetBuilder::new(WidgetKind::Button)
//!         .bounds(Bounds::new(0, 100, 50, 0))
//!         .on(EventKind::Click, |_ctx, _ev| Ok(())),
//! )?;
//! let outcome = dispatcher.post_event(event);
//! assert_eq!(outcome.delivered_to, Some(button));
//! ```

mod deliver;
mod generic;
mod pointer;
mod state;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::Arc;

use horizon_dim_core::logging::targets;
use horizon_dim_core::{Bounds, DimConfig, Point};
use parking_lot::{Mutex, ReentrantMutex};
use slotmap::new_key_type;

pub use pointer::PointerUpdate;
pub(crate) use state::DispatchState;

use crate::device::DeviceId;
use crate::error::{HandlerResult, Result, RouteError};
use crate::event::{AppInfo, Channel, DeviceEvent, EventKind, GenericEvent, PostOutcome};
use crate::gateway::{DisplayGateway, NullGateway, OverlayId};
use crate::handler::HandlerContext;
use crate::widget::{WidgetBuilder, WidgetId, WidgetKey, WidgetKind, WidgetTree};

new_key_type! {
    /// Handle of a generic-event subscription.
    pub struct SubscriptionKey;
}

/// Callback notified of every generic event.
pub type GenericCallback = Arc<dyn Fn(&GenericEvent) + Send + Sync>;

/// Builds the widget registered for a newly announced application.
pub type AppFactory = Arc<dyn Fn(&AppInfo) -> WidgetBuilder + Send + Sync>;

/// Work posted while the state was borrowed by a running callback.
enum Deferred {
    Device(DeviceEvent),
    Generic(GenericEvent),
}

/// Snapshot of one widget, for callers outside the lock.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetInfo {
    pub key: WidgetKey,
    pub id: WidgetId,
    pub kind: WidgetKind,
    pub bounds: Bounds,
    pub z: f64,
    pub display_id: u32,
    pub allows_drag: bool,
    pub allows_selection: bool,
    pub captured: bool,
}

/// Snapshot of one device's routing state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteSnapshot {
    pub capture: Option<WidgetKey>,
    pub last_handler: Option<WidgetKey>,
    pub hovered: Option<WidgetKey>,
    pub selection: Vec<WidgetKey>,
}

/// Routes device events to widgets.
pub struct Dispatcher {
    state: ReentrantMutex<RefCell<DispatchState>>,
    deferred: Mutex<VecDeque<Deferred>>,
}

impl Dispatcher {
    pub fn new(config: &DimConfig, gateway: Arc<dyn DisplayGateway>) -> Self {
        Self {
            state: ReentrantMutex::new(RefCell::new(DispatchState::new(config, gateway))),
            deferred: Mutex::new(VecDeque::new()),
        }
    }

    /// A dispatcher with default settings that discards display commands.
    pub fn with_defaults() -> Self {
        Self::new(&DimConfig::default(), Arc::new(NullGateway))
    }

    fn read<R>(&self, f: impl FnOnce(&DispatchState) -> R) -> Result<R> {
        let guard = self.state.lock();
        let state = guard.try_borrow().map_err(|_| RouteError::Reentrant)?;
        Ok(f(&state))
    }

    fn write<R>(&self, f: impl FnOnce(&mut DispatchState) -> R) -> Result<R> {
        let guard = self.state.lock();
        let result = {
            let mut state = guard.try_borrow_mut().map_err(|_| RouteError::Reentrant)?;
            f(&mut state)
        };
        self.flush(&guard);
        Ok(result)
    }

    /// Deliver everything callbacks queued, until nothing is left.
    fn flush(&self, cell: &RefCell<DispatchState>) {
        loop {
            let notify = {
                let Ok(mut state) = cell.try_borrow_mut() else {
                    return;
                };
                while let Some(event) = state.pending.pop_front() {
                    state.deliver(event);
                }
                let next = self.deferred.lock().pop_front();
                match next {
                    None => return,
                    Some(Deferred::Device(event)) => {
                        state.deliver(event);
                        None
                    }
                    Some(Deferred::Generic(event)) => {
                        let subscribers = state.apply_generic(&event);
                        Some((subscribers, event))
                    }
                }
            };
            if let Some((subscribers, event)) = notify {
                for subscriber in subscribers {
                    subscriber(&event);
                }
            }
        }
    }

    /// Register a widget. Registering an identity twice returns the first key.
    pub fn register(&self, builder: WidgetBuilder) -> Result<WidgetKey> {
        self.write(|s| s.register(builder))?
    }

    /// Remove a widget and its subtree. Removing an absent widget is a no-op
    /// that returns `false`.
    pub fn unregister(&self, key: WidgetKey) -> Result<bool> {
        self.write(|s| s.unregister(key))
    }

    pub fn unregister_id(&self, id: WidgetId) -> Result<bool> {
        self.write(|s| match s.tree.key_of(id) {
            Some(key) => s.unregister(key),
            None => false,
        })
    }

    /// Look up a widget by identity.
    pub fn key_of(&self, id: WidgetId) -> Result<WidgetKey> {
        self.read(|s| s.require(id))?
    }

    /// Route one device event.
    ///
    /// Called from a callback on the dispatching thread, the event is queued
    /// and the returned outcome has `queued` set.
    pub fn post_event(&self, event: DeviceEvent) -> PostOutcome {
        let guard = self.state.lock();
        let outcome = match guard.try_borrow_mut() {
            Ok(mut state) => state.deliver(event),
            Err(_) => {
                tracing::trace!(target: targets::DISPATCH, device = %event.device, "event deferred");
                self.deferred.lock().push_back(Deferred::Device(event));
                return PostOutcome {
                    queued: true,
                    ..PostOutcome::default()
                };
            }
        };
        self.flush(&guard);
        outcome
    }

    /// Apply a session event, then notify subscribers.
    pub fn post_generic(&self, event: GenericEvent) {
        let guard = self.state.lock();
        let subscribers = match guard.try_borrow_mut() {
            Ok(mut state) => state.apply_generic(&event),
            Err(_) => {
                self.deferred.lock().push_back(Deferred::Generic(event));
                return;
            }
        };
        for subscriber in subscribers {
            subscriber(&event);
        }
        self.flush(&guard);
    }

    /// Resolve the handler at a point the way event delivery does, including
    /// the sticky-candidate rule for `device`.
    pub fn resolve_handler_at(
        &self,
        at: Point,
        display_id: u32,
        device: Option<&DeviceId>,
    ) -> Option<WidgetKey> {
        self.write(|s| s.resolve(at, display_id, device)).ok().flatten()
    }

    /// Plain hit test that leaves device state untouched.
    pub fn hit_test(&self, at: Point, display_id: u32) -> Option<WidgetKey> {
        self.read(|s| s.resolve_plain(at, display_id)).ok().flatten()
    }

    pub fn widget_info(&self, key: WidgetKey) -> Option<WidgetInfo> {
        self.read(|s| s.widget_info(key)).ok().flatten()
    }

    /// The widget capturing `device`, if any.
    pub fn capture_info(&self, device: &DeviceId) -> Option<WidgetInfo> {
        self.read(|s| {
            s.routes
                .get(device)
                .and_then(|r| r.to_handler)
                .and_then(|k| s.widget_info(k))
        })
        .ok()
        .flatten()
    }

    /// The widget `device`'s last spatially routed event resolved to.
    pub fn last_handler_info(&self, device: &DeviceId) -> Option<WidgetInfo> {
        self.read(|s| {
            s.routes
                .get(device)
                .and_then(|r| r.last_handler)
                .and_then(|k| s.widget_info(k))
        })
        .ok()
        .flatten()
    }

    /// Direct all of `device`'s events to `key` until released.
    pub fn capture(&self, device: &DeviceId, key: WidgetKey) -> Result<()> {
        self.write(|s| {
            if !s.tree.contains(key) {
                return Err(RouteError::StaleWidget(key));
            }
            s.set_capture(device, Some(key));
            Ok(())
        })?
    }

    /// Release `device`'s capture. Releasing with no capture is a no-op.
    pub fn release_capture(&self, device: &DeviceId) -> Result<()> {
        self.write(|s| s.release_capture(device))
    }

    pub fn route(&self, device: &DeviceId) -> Option<RouteSnapshot> {
        self.read(|s| {
            s.routes.get(device).map(|r| RouteSnapshot {
                capture: r.to_handler,
                last_handler: r.last_handler,
                hovered: r.hovered,
                selection: r.selection.members().to_vec(),
            })
        })
        .ok()
        .flatten()
    }

    /// Drop all routing state of a device that went away.
    pub fn forget_device(&self, device: &DeviceId) -> Result<()> {
        self.write(|s| s.forget_device(device))
    }

    /// Ask the display for `device`'s pointer overlay at `at`.
    pub fn show_pointer(&self, device: &DeviceId, at: Point, display_id: u32) -> Result<()> {
        self.write(|s| s.show_pointer(device, at, display_id))
    }

    /// Change `device`'s pointer. Ignored when the device has none.
    pub fn update_pointer(&self, device: &DeviceId, update: PointerUpdate) -> Result<()> {
        self.write(|s| s.update_pointer(device, update))
    }

    /// The overlay the display assigned to `device`'s pointer, once known.
    pub fn pointer_overlay(&self, device: &DeviceId) -> Option<OverlayId> {
        self.read(|s| s.pointers.overlay_of(device)).ok().flatten()
    }

    pub fn has_pointer(&self, device: &DeviceId) -> bool {
        self.read(|s| s.pointers.contains(device)).unwrap_or(false)
    }

    pub fn select(&self, device: &DeviceId, key: WidgetKey) -> Result<bool> {
        self.write(|s| s.select(device, key))
    }

    pub fn deselect(&self, device: &DeviceId, key: WidgetKey) -> Result<bool> {
        self.write(|s| s.deselect(device, key))
    }

    pub fn deselect_all(&self, device: &DeviceId) -> Result<()> {
        self.write(|s| s.deselect_all(device))
    }

    /// Start a selection gesture at `at`.
    ///
    /// On a wall this clears the selection; on a selectable widget it toggles
    /// that widget. Either way the device captures the widget under the point
    /// until [`release_capture`](Self::release_capture).
    pub fn begin_selection(&self, device: &DeviceId, at: Point, display_id: u32) -> Result<Option<WidgetKey>> {
        self.write(|s| {
            let handler = s.resolve(at, display_id, Some(device));
            if let Some(key) = handler {
                let (wall, selectable) = s
                    .tree
                    .get(key)
                    .map(|w| (w.kind == WidgetKind::Wall, w.allows_selection))
                    .unwrap_or_default();
                if wall {
                    s.deselect_all(device);
                } else if selectable {
                    s.toggle_selected(device, key);
                }
                s.set_capture(device, Some(key));
            }
            handler
        })
    }

    /// Select every selectable widget overlapping the drag from `start` to `end`.
    pub fn select_in_rect(&self, device: &DeviceId, start: Point, end: Point, display_id: u32) -> Result<()> {
        self.write(|s| s.select_in_rect(device, start, end, display_id))
    }

    /// Read access to the widget tree.
    pub fn with_tree<R>(&self, f: impl FnOnce(&WidgetTree) -> R) -> Result<R> {
        self.read(|s| f(&s.tree))
    }

    /// Write access to the widget tree, for geometry and flag changes.
    pub fn with_tree_mut<R>(&self, f: impl FnOnce(&mut WidgetTree) -> R) -> Result<R> {
        self.write(|s| f(&mut s.tree))
    }

    pub fn widget_bounds(&self, key: WidgetKey) -> Option<Bounds> {
        self.read(|s| s.tree.get(key).map(|w| w.bounds)).ok().flatten()
    }

    /// Bounds of the wall covering `display_id`, once it has been announced.
    pub fn display_bounds(&self, display_id: u32) -> Option<Bounds> {
        self.read(|s| s.wall(display_id).and_then(|k| s.tree.get(k)).map(|w| w.bounds))
            .ok()
            .flatten()
    }

    pub fn global_scale(&self) -> f64 {
        self.read(|s| s.global_scale).unwrap_or(1.0)
    }

    pub fn subscribe_generic<F>(&self, callback: F) -> Result<SubscriptionKey>
    where
        F: Fn(&GenericEvent) + Send + Sync + 'static,
    {
        self.write(|s| s.subscribers.insert(Arc::new(callback)))
    }

    pub fn unsubscribe_generic(&self, key: SubscriptionKey) -> Result<bool> {
        self.write(|s| s.subscribers.remove(key).is_some())
    }

    /// Customize the widget registered for new applications.
    pub fn set_app_widget_factory<F>(&self, factory: F) -> Result<()>
    where
        F: Fn(&AppInfo) -> WidgetBuilder + Send + Sync + 'static,
    {
        self.write(|s| s.app_factory = Some(Arc::new(factory)))
    }

    /// The widget registered for an application window.
    pub fn app_widget(&self, window: i64) -> Option<WidgetKey> {
        self.read(|s| s.apps.get(&window).copied()).ok().flatten()
    }

    /// Install or replace a primary-channel callback.
    pub fn on<F>(&self, key: WidgetKey, kind: EventKind, callback: F) -> Result<()>
    where
        F: Fn(&mut HandlerContext<'_>, &mut DeviceEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.set_handler(key, kind, Channel::Primary, callback)
    }

    pub fn set_handler<F>(&self, key: WidgetKey, kind: EventKind, channel: Channel, callback: F) -> Result<()>
    where
        F: Fn(&mut HandlerContext<'_>, &mut DeviceEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.write(|s| s.tree.set_handler(key, kind, channel, Arc::new(callback)))?
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let widgets = self.read(|s| s.tree.len()).ok();
        f.debug_struct("Dispatcher")
            .field("widgets", &widgets)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventData;
    use parking_lot::Mutex as PlMutex;

    fn mouse() -> DeviceId {
        DeviceId::from("h:mouse0")
    }

    #[test]
    fn test_callback_posts_are_delivered_after() {
        let dispatcher = Dispatcher::with_defaults();
        let log = Arc::new(PlMutex::new(Vec::new()));

        let sink_log = log.clone();
        let sink = dispatcher
            .register(
                WidgetBuilder::new(WidgetKind::Label)
                    .bounds(Bounds::new(500, 600, 100, 0))
                    .on(EventKind::Key, move |_ctx, _ev| {
                        sink_log.lock().push("sink");
                        Ok(())
                    }),
            )
            .unwrap();

        let source_log = log.clone();
        dispatcher
            .register(
                WidgetBuilder::new(WidgetKind::Button)
                    .bounds(Bounds::new(0, 100, 100, 0))
                    .on(EventKind::Key, move |ctx, ev| {
                        source_log.lock().push("source");
                        let follow = DeviceEvent::new(ev.device.clone(), ev.position, EventData::Key(2))
                            .routed(crate::event::Routing::Direct(sink));
                        ctx.post(follow);
                        source_log.lock().push("source done");
                        Ok(())
                    }),
            )
            .unwrap();

        let outcome = dispatcher.post_event(DeviceEvent::new(mouse(), Point::new(10, 10), EventData::Key(1)));
        assert!(outcome.delivered_to.is_some());
        assert_eq!(*log.lock(), vec!["source", "source done", "sink"]);
    }

    #[test]
    fn test_reentrant_structural_call_is_rejected() {
        let dispatcher = Arc::new(Dispatcher::with_defaults());
        let seen = Arc::new(PlMutex::new(None));
        let inner = dispatcher.clone();
        let seen_in = seen.clone();
        dispatcher
            .register(
                WidgetBuilder::new(WidgetKind::Button)
                    .bounds(Bounds::new(0, 100, 100, 0))
                    .on(EventKind::Key, move |_ctx, _ev| {
                        *seen_in.lock() = Some(inner.register(WidgetBuilder::new(WidgetKind::Label)));
                        Ok(())
                    }),
            )
            .unwrap();
        dispatcher.post_event(DeviceEvent::new(mouse(), Point::new(10, 10), EventData::Key(1)));
        assert!(matches!(*seen.lock(), Some(Err(RouteError::Reentrant))));
    }

    #[test]
    fn test_reentrant_post_is_queued() {
        let dispatcher = Arc::new(Dispatcher::with_defaults());
        let count = Arc::new(PlMutex::new(0));
        let inner = dispatcher.clone();
        let counter = count.clone();
        dispatcher
            .register(
                WidgetBuilder::new(WidgetKind::Button)
                    .bounds(Bounds::new(0, 100, 100, 0))
                    .on(EventKind::Key, move |_ctx, ev| {
                        *counter.lock() += 1;
                        if let EventData::Key(1) = ev.data {
                            let again = DeviceEvent::new(ev.device.clone(), ev.position, EventData::Key(2));
                            assert!(inner.post_event(again).queued);
                        }
                        Ok(())
                    }),
            )
            .unwrap();
        dispatcher.post_event(DeviceEvent::new(mouse(), Point::new(10, 10), EventData::Key(1)));
        assert_eq!(*count.lock(), 2);
    }

    #[test]
    fn test_stale_callback_is_purged() {
        let dispatcher = Dispatcher::with_defaults();
        let key = dispatcher
            .register(
                WidgetBuilder::new(WidgetKind::Button)
                    .bounds(Bounds::new(0, 100, 100, 0))
                    .on(EventKind::Key, |_ctx, _ev| Err(crate::error::HandlerError::Stale)),
            )
            .unwrap();
        dispatcher.post_event(DeviceEvent::new(mouse(), Point::new(10, 10), EventData::Key(1)));
        let still_there = dispatcher
            .with_tree(|t| t.get(key).unwrap().has_handler(EventKind::Key, Channel::Primary))
            .unwrap();
        assert!(!still_there);
    }
}
