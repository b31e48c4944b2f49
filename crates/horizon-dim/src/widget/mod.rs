//! Widgets: anything on the wall that can receive device events.
//!
//! Widgets live in a [`WidgetTree`] arena owned by the dispatcher. Parent and
//! child links are [`WidgetKey`]s, never owning pointers, so destroying a
//! subtree cannot leave cycles behind.
//!
//! Every concrete kind (app window, button, thumbnail, sizer, ...) shares the
//! same [`Widget`] record. Kind-specific behavior is expressed by the
//! callbacks installed through [`WidgetBuilder::on`].

mod tree;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use horizon_dim_core::{Bounds, Point};
use slotmap::new_key_type;

use crate::error::HandlerResult;
use crate::event::{Channel, DeviceEvent, EventKind};
use crate::gateway::OverlayId;
use crate::handler::HandlerContext;

pub use tree::WidgetTree;

new_key_type! {
    /// Arena key of a registered widget.
    pub struct WidgetKey;
}

/// Frontmost z value. Smaller z is further in front.
pub const TOP_Z: f64 = -10_000.0;
/// Backmost z value.
pub const BOTTOM_Z: f64 = 10_000.0;
/// Z of the wall background on every display.
pub const WALL_Z: f64 = BOTTOM_Z - 1.0;
/// Offset of a child's z from its parent's. Negative, so children draw in front.
pub const Z_CHILD_DIFF: f64 = -0.01;

/// Identity of a widget.
///
/// Negative ids are assigned by the routing engine itself, non-negative ids by
/// the application owning `window`. The pair is unique, the id alone is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WidgetId {
    pub id: i64,
    pub window: Option<i64>,
}

impl WidgetId {
    /// An application-assigned id.
    pub const fn app(id: i64, window: i64) -> Self {
        Self {
            id,
            window: Some(window),
        }
    }

    /// A system-assigned id, optionally tied to an application window.
    pub const fn system(id: i64, window: Option<i64>) -> Self {
        Self { id, window }
    }

    #[inline]
    pub fn is_system(&self) -> bool {
        self.id < 0
    }
}

impl fmt::Display for WidgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.window {
            Some(window) => write!(f, "{}@{}", self.id, window),
            None => write!(f, "{}", self.id),
        }
    }
}

/// The closed set of widget kinds.
///
/// Multi-selection never mixes kinds, and only buttons and menus grow when the
/// pointer approaches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WidgetKind {
    Wall,
    App,
    Button,
    Thumbnail,
    Sizer,
    Panel,
    Splitter,
    Menu,
    Label,
    Icon,
    /// A device's on-screen pointer. Pointers are drawn but never registered
    /// in the tree, so they are never hit.
    Pointer,
    Custom(Arc<str>),
}

impl WidgetKind {
    pub fn enlarges_near_pointer(&self) -> bool {
        matches!(self, Self::Button | Self::Menu)
    }
}

/// A registered event callback.
pub type Handler = Arc<dyn Fn(&mut HandlerContext<'_>, &mut DeviceEvent) -> HandlerResult + Send + Sync>;

/// Shape used by the containment test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HitShape {
    #[default]
    Rect,
    /// Inscribed ellipse; corners do not count.
    Round,
}

/// One widget record in the arena.
pub struct Widget {
    pub(crate) id: WidgetId,
    pub(crate) kind: WidgetKind,
    pub(crate) bounds: Bounds,
    pub(crate) z: f64,
    pub(crate) temp_z_offset: f64,
    pub(crate) display_id: u32,
    pub(crate) visible: bool,
    pub(crate) drawable: bool,
    pub(crate) event_transparent: bool,
    pub(crate) captured: bool,
    pub(crate) allows_drag: bool,
    pub(crate) allows_selection: bool,
    pub(crate) selected: bool,
    pub(crate) shape: HitShape,
    pub(crate) scale_multiplier: f64,
    pub(crate) overlay_id: Option<OverlayId>,
    pub(crate) parent: Option<WidgetKey>,
    pub(crate) children: Vec<WidgetKey>,
    pub(crate) handlers: HashMap<(EventKind, Channel), Handler>,
}

impl Widget {
    pub fn id(&self) -> WidgetId {
        self.id
    }

    pub fn kind(&self) -> &WidgetKind {
        &self.kind
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn z(&self) -> f64 {
        self.z
    }

    pub fn display_id(&self) -> u32 {
        self.display_id
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Whether hit testing may consider this widget.
    ///
    /// Structural containers that are never drawn count as always shown.
    #[inline]
    pub fn is_shown(&self) -> bool {
        !self.drawable || self.visible
    }

    pub fn is_event_transparent(&self) -> bool {
        self.event_transparent
    }

    pub fn is_captured(&self) -> bool {
        self.captured
    }

    pub fn allows_drag(&self) -> bool {
        self.allows_drag
    }

    /// A widget accepts drops when it has a drop callback on any channel.
    pub fn allows_drop(&self) -> bool {
        self.handlers.keys().any(|(kind, _)| *kind == EventKind::Drop)
    }

    pub fn allows_selection(&self) -> bool {
        self.allows_selection
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn scale_multiplier(&self) -> f64 {
        self.scale_multiplier
    }

    pub fn overlay_id(&self) -> Option<OverlayId> {
        self.overlay_id
    }

    pub fn parent(&self) -> Option<WidgetKey> {
        self.parent
    }

    pub fn children(&self) -> &[WidgetKey] {
        &self.children
    }

    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        match self.shape {
            HitShape::Rect => self.bounds.contains(x, y),
            HitShape::Round => self.bounds.contains_round(x, y),
        }
    }

    pub fn contains_point(&self, p: Point) -> bool {
        self.contains(p.x, p.y)
    }

    pub fn has_handler(&self, kind: EventKind, channel: Channel) -> bool {
        self.handlers.contains_key(&(kind, channel))
    }

    pub(crate) fn handler(&self, kind: EventKind, channel: Channel) -> Option<Handler> {
        self.handlers.get(&(kind, channel)).cloned()
    }
}

impl fmt::Debug for Widget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Widget")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("bounds", &self.bounds)
            .field("z", &self.z)
            .field("display_id", &self.display_id)
            .field("visible", &self.visible)
            .field("event_transparent", &self.event_transparent)
            .field("parent", &self.parent)
            .field("children", &self.children.len())
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Builder for a widget registration.
///
/// ```ignore
/// let key = dispatcher.register(
///     WidgetBuilder::new(WidgetKind::Button)
///         .bounds(Bounds::new(10, 90, 40, 10))
///         .parent(panel)
///         .on(EventKind::Click, |ctx, ev| { /* ... */ Ok(()) }),
/// )?;
/// ```
pub struct WidgetBuilder {
    pub(crate) id: Option<WidgetId>,
    pub(crate) window: Option<i64>,
    pub(crate) kind: WidgetKind,
    pub(crate) bounds: Bounds,
    pub(crate) z: f64,
    pub(crate) temp_z_offset: f64,
    pub(crate) display_id: u32,
    pub(crate) visible: bool,
    pub(crate) drawable: bool,
    pub(crate) event_transparent: bool,
    pub(crate) allows_drag: bool,
    pub(crate) allows_selection: bool,
    pub(crate) shape: HitShape,
    pub(crate) parent: Option<WidgetKey>,
    pub(crate) handlers: HashMap<(EventKind, Channel), Handler>,
}

impl WidgetBuilder {
    /// Start a drawable, visible widget of `kind` at the front of the stack.
    pub fn new(kind: WidgetKind) -> Self {
        Self {
            id: None,
            window: None,
            kind,
            bounds: Bounds::default(),
            z: TOP_Z,
            temp_z_offset: 0.0,
            display_id: 0,
            visible: true,
            drawable: true,
            event_transparent: false,
            allows_drag: false,
            allows_selection: false,
            shape: HitShape::Rect,
            parent: None,
            handlers: HashMap::new(),
        }
    }

    /// Use an explicit identity instead of a fresh system id.
    pub fn id(mut self, id: WidgetId) -> Self {
        self.window = id.window;
        self.id = Some(id);
        self
    }

    /// Tie a system-assigned widget to an application window.
    pub fn window(mut self, window: i64) -> Self {
        self.window = Some(window);
        if let Some(id) = self.id.as_mut() {
            id.window = Some(window);
        }
        self
    }

    pub fn bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// Z for a top-level widget. Children derive theirs from the parent.
    pub fn z(mut self, z: f64) -> Self {
        self.z = z;
        self
    }

    pub fn temp_z_offset(mut self, offset: f64) -> Self {
        self.temp_z_offset = offset;
        self
    }

    pub fn display(mut self, display_id: u32) -> Self {
        self.display_id = display_id;
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    /// Mark as a structural container that is never drawn.
    pub fn structural(mut self) -> Self {
        self.drawable = false;
        self
    }

    pub fn event_transparent(mut self, transparent: bool) -> Self {
        self.event_transparent = transparent;
        self
    }

    pub fn allows_drag(mut self, allows: bool) -> Self {
        self.allows_drag = allows;
        self
    }

    pub fn allows_selection(mut self, allows: bool) -> Self {
        self.allows_selection = allows;
        self
    }

    pub fn shape(mut self, shape: HitShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn parent(mut self, parent: WidgetKey) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Install a primary-channel callback.
    pub fn on<F>(self, kind: EventKind, callback: F) -> Self
    where
        F: Fn(&mut HandlerContext<'_>, &mut DeviceEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.on_channel(kind, Channel::Primary, callback)
    }

    /// Install a special-device callback.
    pub fn on_special<F>(self, kind: EventKind, callback: F) -> Self
    where
        F: Fn(&mut HandlerContext<'_>, &mut DeviceEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.on_channel(kind, Channel::Special, callback)
    }

    pub fn on_channel<F>(mut self, kind: EventKind, channel: Channel, callback: F) -> Self
    where
        F: Fn(&mut HandlerContext<'_>, &mut DeviceEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.handlers.insert((kind, channel), Arc::new(callback));
        self
    }

    pub(crate) fn into_widget(self, id: WidgetId) -> Widget {
        Widget {
            id,
            kind: self.kind,
            bounds: self.bounds,
            z: self.z,
            temp_z_offset: self.temp_z_offset,
            display_id: self.display_id,
            visible: self.visible,
            drawable: self.drawable,
            event_transparent: self.event_transparent,
            captured: false,
            allows_drag: self.allows_drag,
            allows_selection: self.allows_selection,
            selected: false,
            shape: self.shape,
            scale_multiplier: 1.0,
            overlay_id: None,
            parent: self.parent,
            children: Vec::new(),
            handlers: self.handlers,
        }
    }
}

impl fmt::Debug for WidgetBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetBuilder")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("bounds", &self.bounds)
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(Widget: Send, Sync);
static_assertions::assert_impl_all!(WidgetBuilder: Send);
