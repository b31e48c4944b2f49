//! Session events: applications, displays and overlay replies.

use horizon_dim_core::logging::{span_names, targets};
use horizon_dim_core::{PerfSpan, global_scale};

use super::GenericCallback;
use super::state::DispatchState;
use crate::error::{Result, RouteError};
use crate::event::{AppInfo, DisplayInfo, GenericEvent};
use crate::widget::{WALL_Z, WidgetBuilder, WidgetKey, WidgetKind, Z_CHILD_DIFF};

impl DispatchState {
    /// Update the widget tree for a session event. Returns the subscribers to
    /// notify once the state is released.
    pub(crate) fn apply_generic(&mut self, event: &GenericEvent) -> Vec<GenericCallback> {
        let _span = PerfSpan::new(span_names::GENERIC);
        match event {
            GenericEvent::NewApp(info) => match self.apps.get(&info.window) {
                Some(&key) => self.update_app(key, info),
                None => self.add_app(info),
            },
            GenericEvent::AppInfo(info) => match self.apps.get(&info.window) {
                Some(&key) => self.update_app(key, info),
                None => self.add_app(info),
            },
            GenericEvent::AppKilled { window } => self.remove_app(*window),
            GenericEvent::ZChange(changes) => {
                for &(window, z) in changes {
                    self.restack_app(window, z);
                }
            }
            GenericEvent::DisplayInfo(info) => self.update_display(info),
            GenericEvent::ObjectInfo { overlay_id, widget } => {
                if self.attach_pointer(*widget, *overlay_id) {
                    tracing::debug!(target: targets::DISPATCH, %widget, %overlay_id, "pointer overlay attached");
                } else {
                    match self.tree.key_of(*widget).and_then(|k| self.tree.get_mut(k)) {
                        Some(w) => w.overlay_id = Some(*overlay_id),
                        None => {
                            tracing::debug!(target: targets::DISPATCH, %widget, %overlay_id, "overlay reply for unknown widget");
                        }
                    }
                }
            }
        }
        self.subscribers.values().cloned().collect()
    }

    fn add_app(&mut self, info: &AppInfo) {
        let builder = match &self.app_factory {
            Some(factory) => factory(info),
            None => WidgetBuilder::new(WidgetKind::App)
                .allows_drag(true)
                .allows_selection(true),
        };
        let builder = builder
            .window(info.window)
            .bounds(info.bounds)
            .z(info.z)
            .display(info.display_id);
        match self.register(builder) {
            Ok(key) => {
                self.apps.insert(info.window, key);
                tracing::debug!(target: targets::DISPATCH, window = info.window, name = %info.name, "app added");
            }
            Err(err) => {
                tracing::warn!(target: targets::DISPATCH, window = info.window, %err, "app widget not registered");
            }
        }
    }

    fn update_app(&mut self, key: WidgetKey, info: &AppInfo) {
        if let Err(err) = self.try_update_app(key, info) {
            tracing::warn!(target: targets::DISPATCH, window = info.window, %err, "app update failed");
        }
    }

    fn try_update_app(&mut self, key: WidgetKey, info: &AppInfo) -> Result<()> {
        self.tree.set_bounds(key, info.bounds)?;
        self.tree.set_z(key, info.z)?;
        self.tree.set_display(key, info.display_id)
    }

    fn remove_app(&mut self, window: i64) {
        let roots = self.tree.window_roots(window);
        for key in &roots {
            self.unregister(*key);
        }
        self.apps.remove(&window);
        tracing::debug!(target: targets::DISPATCH, window, removed = roots.len(), "app killed");
    }

    /// Move an app to `z`. Other top-level widgets tied to the same window
    /// stay just in front of it.
    fn restack_app(&mut self, window: i64, z: f64) {
        let app = self.apps.get(&window).copied();
        let companions: Vec<WidgetKey> = self
            .tree
            .window_roots(window)
            .into_iter()
            .filter(|&k| Some(k) != app)
            .filter(|&k| self.tree.get(k).is_some_and(|w| w.parent.is_none()))
            .collect();

        if let Err(err) = self.try_restack(app, &companions, z) {
            tracing::warn!(target: targets::DISPATCH, window, %err, "z change failed");
        }
    }

    fn try_restack(&mut self, app: Option<WidgetKey>, companions: &[WidgetKey], z: f64) -> Result<()> {
        if let Some(app) = app {
            self.tree.set_z(app, z)?;
        }
        for &key in companions {
            self.tree.set_z(key, z + Z_CHILD_DIFF)?;
        }
        Ok(())
    }

    fn update_display(&mut self, info: &DisplayInfo) {
        match self.walls.get(&info.display_id) {
            Some(&wall) => {
                if let Err(err) = self.tree.set_bounds(wall, info.bounds) {
                    tracing::warn!(target: targets::DISPATCH, display = info.display_id, %err, "wall resize failed");
                }
            }
            None => {
                let builder = WidgetBuilder::new(WidgetKind::Wall)
                    .bounds(info.bounds)
                    .z(WALL_Z)
                    .display(info.display_id);
                match self.register(builder) {
                    Ok(key) => {
                        self.walls.insert(info.display_id, key);
                    }
                    Err(err) => {
                        tracing::warn!(target: targets::DISPATCH, display = info.display_id, %err, "wall not registered");
                        return;
                    }
                }
            }
        }

        if self.walls.keys().next() == Some(&info.display_id) {
            self.global_scale = global_scale(info.bounds.width(), info.bounds.height(), &self.scale_config);
            tracing::info!(
                target: targets::DISPATCH,
                display = info.display_id,
                bounds = %info.bounds,
                scale = self.global_scale,
                "display geometry updated"
            );
        }
    }

    /// The wall widget covering `display_id`.
    pub(crate) fn wall(&self, display_id: u32) -> Option<WidgetKey> {
        self.walls.get(&display_id).copied()
    }

    /// Look up a widget by identity, as an error when absent.
    pub(crate) fn require(&self, id: crate::widget::WidgetId) -> Result<WidgetKey> {
        self.tree.key_of(id).ok_or(RouteError::UnknownWidget(id))
    }
}
