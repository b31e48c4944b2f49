//! The widget arena and its spatial queries.

use std::collections::HashMap;

use horizon_dim_core::Bounds;
use horizon_dim_core::logging::targets;
use slotmap::SlotMap;

use super::{Handler, Widget, WidgetBuilder, WidgetId, WidgetKey, WidgetKind, Z_CHILD_DIFF};
use crate::error::{Result, RouteError};
use crate::event::{Channel, EventKind};

/// Arena of registered widgets with an identity index and ordered roots.
///
/// Roots are kept in registration order and children in the order their parent
/// added them. Hit testing relies on both orders: later entries overlay earlier
/// ones when z ties.
#[derive(Debug)]
pub struct WidgetTree {
    widgets: SlotMap<WidgetKey, Widget>,
    by_id: HashMap<WidgetId, WidgetKey>,
    roots: Vec<WidgetKey>,
    next_system_id: i64,
}

impl Default for WidgetTree {
    fn default() -> Self {
        Self::new()
    }
}

impl WidgetTree {
    pub fn new() -> Self {
        Self {
            widgets: SlotMap::with_key(),
            by_id: HashMap::new(),
            roots: Vec::new(),
            next_system_id: -1,
        }
    }

    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }

    #[inline]
    pub fn contains(&self, key: WidgetKey) -> bool {
        self.widgets.contains_key(key)
    }

    #[inline]
    pub fn get(&self, key: WidgetKey) -> Option<&Widget> {
        self.widgets.get(key)
    }

    pub(crate) fn get_mut(&mut self, key: WidgetKey) -> Option<&mut Widget> {
        self.widgets.get_mut(key)
    }

    /// Look up a widget by identity.
    pub fn key_of(&self, id: WidgetId) -> Option<WidgetKey> {
        self.by_id.get(&id).copied()
    }

    /// Top-level widgets in registration order.
    pub fn roots(&self) -> &[WidgetKey] {
        &self.roots
    }

    pub fn iter(&self) -> impl Iterator<Item = (WidgetKey, &Widget)> {
        self.widgets.iter()
    }

    fn allocate_system_id(&mut self, window: Option<i64>) -> WidgetId {
        loop {
            let id = WidgetId::system(self.next_system_id, window);
            self.next_system_id -= 1;
            if !self.by_id.contains_key(&id) {
                return id;
            }
        }
    }

    /// Take a fresh system id for something drawn outside the tree.
    pub(crate) fn reserve_system_id(&mut self) -> WidgetId {
        self.allocate_system_id(None)
    }

    /// Insert a widget. Registering an identity that is already present
    /// returns the existing key unchanged.
    pub(crate) fn insert(&mut self, builder: WidgetBuilder) -> Result<(WidgetKey, bool)> {
        if let Some(id) = builder.id {
            if let Some(&existing) = self.by_id.get(&id) {
                return Ok((existing, false));
            }
        }
        let parent = builder.parent;
        let parent_state = match parent {
            Some(p) => {
                let pw = self.widgets.get(p).ok_or(RouteError::StaleWidget(p))?;
                Some((pw.z, pw.display_id))
            }
            None => None,
        };

        let id = match builder.id {
            Some(id) => id,
            None => self.allocate_system_id(builder.window),
        };
        let mut widget = builder.into_widget(id);
        if let Some((parent_z, display)) = parent_state {
            widget.z = parent_z + Z_CHILD_DIFF + widget.temp_z_offset;
            widget.display_id = display;
        }

        let key = self.widgets.insert(widget);
        self.by_id.insert(id, key);
        match parent {
            Some(p) => {
                if let Some(pw) = self.widgets.get_mut(p) {
                    pw.children.push(key);
                }
            }
            None => self.roots.push(key),
        }
        tracing::trace!(target: targets::DISPATCH, ?key, %id, "widget registered");
        Ok((key, true))
    }

    /// Collect all descendants depth-first, children before parents.
    pub fn descendants(&self, key: WidgetKey) -> Vec<WidgetKey> {
        let mut result = Vec::new();
        self.collect_descendants(key, &mut result);
        result
    }

    fn collect_descendants(&self, key: WidgetKey, result: &mut Vec<WidgetKey>) {
        if let Some(widget) = self.widgets.get(key) {
            for &child in &widget.children {
                self.collect_descendants(child, result);
                result.push(child);
            }
        }
    }

    /// Remove a widget and its whole subtree. Returns the removed records,
    /// descendants first. Removing an absent key returns nothing.
    pub(crate) fn remove_subtree(&mut self, key: WidgetKey) -> Vec<(WidgetKey, Widget)> {
        if !self.widgets.contains_key(key) {
            return Vec::new();
        }
        let mut doomed = self.descendants(key);
        doomed.push(key);

        let parent = self.widgets.get(key).and_then(|w| w.parent);
        match parent {
            Some(p) => {
                if let Some(pw) = self.widgets.get_mut(p) {
                    pw.children.retain(|&c| c != key);
                }
            }
            None => self.roots.retain(|&r| r != key),
        }

        let mut removed = Vec::with_capacity(doomed.len());
        for k in doomed {
            if let Some(widget) = self.widgets.remove(k) {
                self.by_id.remove(&widget.id);
                removed.push((k, widget));
            }
        }
        removed
    }

    fn is_ancestor_of(&self, potential_ancestor: WidgetKey, key: WidgetKey) -> bool {
        let mut current = Some(key);
        while let Some(k) = current {
            if k == potential_ancestor {
                return true;
            }
            current = self.widgets.get(k).and_then(|w| w.parent);
        }
        false
    }

    /// Move a widget under a new parent, or make it top-level with `None`.
    pub fn set_parent(&mut self, key: WidgetKey, new_parent: Option<WidgetKey>) -> Result<()> {
        if !self.widgets.contains_key(key) {
            return Err(RouteError::StaleWidget(key));
        }
        if let Some(parent) = new_parent {
            if !self.widgets.contains_key(parent) {
                return Err(RouteError::StaleWidget(parent));
            }
            if self.is_ancestor_of(key, parent) {
                return Err(RouteError::CircularParentage { child: key, parent });
            }
        }

        match self.widgets.get(key).and_then(|w| w.parent) {
            Some(old) => {
                if let Some(pw) = self.widgets.get_mut(old) {
                    pw.children.retain(|&c| c != key);
                }
            }
            None => self.roots.retain(|&r| r != key),
        }

        if let Some(widget) = self.widgets.get_mut(key) {
            widget.parent = new_parent;
        }
        match new_parent {
            Some(parent) => {
                if let Some(pw) = self.widgets.get_mut(parent) {
                    pw.children.push(key);
                }
                self.restack(key);
            }
            None => self.roots.push(key),
        }
        Ok(())
    }

    /// Set the z of a widget and restack its descendants.
    pub fn set_z(&mut self, key: WidgetKey, z: f64) -> Result<()> {
        let widget = self.widgets.get_mut(key).ok_or(RouteError::StaleWidget(key))?;
        widget.z = z;
        self.restack_children(key);
        Ok(())
    }

    /// Temporarily pull a child forward (negative) or back (positive) relative
    /// to its siblings, e.g. while it is enlarged under the pointer.
    pub fn set_temp_z_offset(&mut self, key: WidgetKey, offset: f64) -> Result<()> {
        let widget = self.widgets.get_mut(key).ok_or(RouteError::StaleWidget(key))?;
        let old = widget.temp_z_offset;
        widget.temp_z_offset = offset;
        if widget.parent.is_none() {
            widget.z += offset - old;
            self.restack_children(key);
        } else {
            self.restack(key);
        }
        Ok(())
    }

    /// Recompute the z of `key` from its parent, then of its subtree.
    fn restack(&mut self, key: WidgetKey) {
        let parent_z = self
            .widgets
            .get(key)
            .and_then(|w| w.parent)
            .and_then(|p| self.widgets.get(p))
            .map(|p| p.z);
        if let (Some(parent_z), Some(widget)) = (parent_z, self.widgets.get_mut(key)) {
            widget.z = parent_z + Z_CHILD_DIFF + widget.temp_z_offset;
        }
        self.restack_children(key);
    }

    fn restack_children(&mut self, key: WidgetKey) {
        let children = match self.widgets.get(key) {
            Some(w) => w.children.clone(),
            None => return,
        };
        for child in children {
            self.restack(child);
        }
    }

    pub fn set_bounds(&mut self, key: WidgetKey, bounds: Bounds) -> Result<()> {
        let widget = self.widgets.get_mut(key).ok_or(RouteError::StaleWidget(key))?;
        widget.bounds = bounds;
        Ok(())
    }

    /// Move a widget and its subtree to another display.
    pub fn set_display(&mut self, key: WidgetKey, display_id: u32) -> Result<()> {
        if !self.widgets.contains_key(key) {
            return Err(RouteError::StaleWidget(key));
        }
        let mut keys = self.descendants(key);
        keys.push(key);
        for k in keys {
            if let Some(w) = self.widgets.get_mut(k) {
                w.display_id = display_id;
            }
        }
        Ok(())
    }

    pub fn set_visible(&mut self, key: WidgetKey, visible: bool) -> Result<()> {
        let widget = self.widgets.get_mut(key).ok_or(RouteError::StaleWidget(key))?;
        widget.visible = visible;
        Ok(())
    }

    pub fn set_event_transparent(&mut self, key: WidgetKey, transparent: bool) -> Result<()> {
        let widget = self.widgets.get_mut(key).ok_or(RouteError::StaleWidget(key))?;
        widget.event_transparent = transparent;
        Ok(())
    }

    /// Set the widget's own "keep my events" flag.
    pub fn set_captured(&mut self, key: WidgetKey, captured: bool) -> Result<()> {
        let widget = self.widgets.get_mut(key).ok_or(RouteError::StaleWidget(key))?;
        widget.captured = captured;
        Ok(())
    }

    /// Install or replace a callback.
    pub fn set_handler(
        &mut self,
        key: WidgetKey,
        kind: EventKind,
        channel: Channel,
        handler: Handler,
    ) -> Result<()> {
        let widget = self.widgets.get_mut(key).ok_or(RouteError::StaleWidget(key))?;
        widget.handlers.insert((kind, channel), handler);
        Ok(())
    }

    /// Drop one callback from a widget's table.
    pub(crate) fn purge_handler(&mut self, key: WidgetKey, kind: EventKind, channel: Channel) -> bool {
        self.widgets
            .get_mut(key)
            .is_some_and(|w| w.handlers.remove(&(kind, channel)).is_some())
    }

    /// The outermost widgets tied to an application window.
    pub fn window_roots(&self, window: i64) -> Vec<WidgetKey> {
        self.widgets
            .iter()
            .filter(|(_, w)| w.id.window == Some(window))
            .filter(|(_, w)| {
                w.parent
                    .and_then(|p| self.widgets.get(p))
                    .is_none_or(|p| p.id.window != Some(window))
            })
            .map(|(k, _)| k)
            .collect()
    }

    /// Shown widgets of `kind` on `display` overlapping `area`.
    pub fn overlapping(&self, kind: &WidgetKind, display_id: u32, area: &Bounds) -> Vec<WidgetKey> {
        self.widgets
            .iter()
            .filter(|(_, w)| &w.kind == kind && w.display_id == display_id && w.is_shown())
            .filter(|(_, w)| w.bounds.overlaps(area))
            .map(|(k, _)| k)
            .collect()
    }

    /// Top-level hit-test candidates.
    ///
    /// An event-transparent root is replaced by its non-transparent
    /// descendants, found the same way, so a pass-through container spanning
    /// the wall never shadows the stacks inside it.
    pub fn top_level_candidates(&self) -> Vec<WidgetKey> {
        let mut out = Vec::with_capacity(self.roots.len());
        for &root in &self.roots {
            self.expand_transparent(root, &mut out);
        }
        out
    }

    fn expand_transparent(&self, key: WidgetKey, out: &mut Vec<WidgetKey>) {
        let Some(widget) = self.widgets.get(key) else {
            return;
        };
        if !widget.event_transparent {
            out.push(key);
        } else if widget.is_shown() {
            for &child in &widget.children {
                self.expand_transparent(child, out);
            }
        }
    }

    /// Pure spatial hit test, without sticky-candidate handling or
    /// transparency stripping.
    ///
    /// Picks the frontmost (numerically smallest z) shown candidate on
    /// `display_id` containing the point, with later candidates winning ties,
    /// then descends into the last containing shown child at every level.
    pub fn hit_test(&self, x: i32, y: i32, display_id: u32) -> Option<WidgetKey> {
        let mut found = None;
        let mut last_z = f64::INFINITY;
        for key in self.top_level_candidates() {
            let Some(widget) = self.widgets.get(key) else {
                continue;
            };
            if widget.display_id == display_id
                && widget.z <= last_z
                && widget.is_shown()
                && widget.contains(x, y)
            {
                found = Some(key);
                last_z = widget.z;
            }
        }
        let result = found.map(|root| self.deepest_child_at(root, x, y));
        tracing::trace!(target: targets::HIT_TEST, x, y, display_id, ?result, "hit test");
        result
    }

    /// The deepest shown descendant of `key` containing the point, or `key` itself.
    pub fn deepest_child_at(&self, key: WidgetKey, x: i32, y: i32) -> WidgetKey {
        let mut found = key;
        if let Some(widget) = self.widgets.get(key) {
            for &child in &widget.children {
                if let Some(cw) = self.widgets.get(child) {
                    if cw.is_shown() && cw.contains(x, y) {
                        found = self.deepest_child_at(child, x, y);
                    }
                }
            }
        }
        found
    }
}
