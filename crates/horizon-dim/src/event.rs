//! Semantic device events and session-level generic events.
//!
//! Drivers never hand raw hardware data to the dispatcher. They normalize it
//! into a [`DeviceEvent`], a tagged [`EventData`] plus routing metadata:
//! which device sent it, where, on which [`Channel`], and how it should be
//! routed ([`Routing`]).

use horizon_dim_core::{Bounds, Point};

use crate::device::DeviceId;
use crate::gateway::OverlayId;
use crate::widget::{WidgetId, WidgetKey, WidgetKind};

/// Event kind tags, used as callback table keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Move,
    Click,
    DoubleClick,
    /// Pan / drag.
    Analog1,
    /// Rotate.
    Analog2,
    /// Zoom.
    Analog3,
    FastDrag,
    Arrow,
    Key,
    Custom,
    MultiTouchHold,
    MultiTouchSwipe,
    BigClick,
    EnteredWindow,
    LeftWindow,
    Drop,
}

impl EventKind {
    /// Continuation kinds that must never be retargeted mid-gesture.
    #[inline]
    pub fn is_analog(self) -> bool {
        matches!(self, Self::Analog1 | Self::Analog2 | Self::Analog3)
    }

    /// Kinds that a selected widget shares with the rest of its selection.
    #[inline]
    pub fn fans_out(self) -> bool {
        matches!(self, Self::Click | Self::Analog1 | Self::Analog3 | Self::Drop)
    }
}

/// Which gesture a button press drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gesture {
    Pan,
    Rotate,
    Zoom,
}

impl Gesture {
    /// The analog event kind this gesture produces while dragging.
    pub fn analog_kind(self) -> EventKind {
        match self {
            Self::Pan => EventKind::Analog1,
            Self::Rotate => EventKind::Analog2,
            Self::Zoom => EventKind::Analog3,
        }
    }
}

/// Event-kind namespace an event travels on.
///
/// Special devices (lenses and other accessory pointers) use a parallel set of
/// callbacks so they never collide with the primary pointer's handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Channel {
    #[default]
    Primary,
    Special,
}

/// Gesture life cycle reported by touch hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifePoint {
    Begin,
    Middle,
    End,
}

impl LifePoint {
    /// Parse the wire code (0 begin, 1 middle, 2 end).
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Begin),
            1 => Some(Self::Middle),
            2 => Some(Self::End),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrowDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ArrowDirection {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Up),
            2 => Some(Self::Down),
            3 => Some(Self::Left),
            4 => Some(Self::Right),
            _ => None,
        }
    }
}

/// What a drop carries.
#[derive(Debug, Clone, PartialEq)]
pub enum DropSubject {
    /// A single dragged widget.
    Widget(WidgetKey),
    /// The dragging device's whole selection.
    Selection {
        members: Vec<WidgetKey>,
        kind: Option<WidgetKind>,
    },
}

/// Kind-specific payload.
#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    Move,
    Click {
        button: u8,
        is_down: bool,
        gesture: Gesture,
    },
    DoubleClick {
        button: u8,
        gesture: Gesture,
    },
    /// Pan, rotate or zoom drag, depending on `gesture`.
    Analog {
        gesture: Gesture,
        start: Point,
        dx: i32,
        dy: i32,
        dz: i32,
    },
    FastDrag {
        dx: i32,
        dy: i32,
    },
    Arrow(ArrowDirection),
    Key(u32),
    Custom {
        code: i32,
        payload: String,
    },
    MultiTouchHold {
        touches: u32,
        life: LifePoint,
    },
    MultiTouchSwipe {
        touches: u32,
        dx: i32,
        dy: i32,
        start: Point,
        life: LifePoint,
    },
    BigClick(LifePoint),
    EnteredWindow,
    LeftWindow,
    Drop(DropSubject),
}

impl EventData {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Move => EventKind::Move,
            Self::Click { .. } => EventKind::Click,
            Self::DoubleClick { .. } => EventKind::DoubleClick,
            Self::Analog { gesture, .. } => gesture.analog_kind(),
            Self::FastDrag { .. } => EventKind::FastDrag,
            Self::Arrow(_) => EventKind::Arrow,
            Self::Key(_) => EventKind::Key,
            Self::Custom { .. } => EventKind::Custom,
            Self::MultiTouchHold { .. } => EventKind::MultiTouchHold,
            Self::MultiTouchSwipe { .. } => EventKind::MultiTouchSwipe,
            Self::BigClick(_) => EventKind::BigClick,
            Self::EnteredWindow => EventKind::EnteredWindow,
            Self::LeftWindow => EventKind::LeftWindow,
            Self::Drop(_) => EventKind::Drop,
        }
    }
}

/// How the dispatcher picks the receiving widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Routing {
    /// Deliver to the device's capture target if it has one, else hit-test.
    #[default]
    Capture,
    /// Always hit-test, ignoring capture.
    Spatial,
    /// Skip hit-testing and deliver to this widget.
    Direct(WidgetKey),
}

/// A normalized event from one device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceEvent {
    pub data: EventData,
    pub device: DeviceId,
    pub display_id: u32,
    pub position: Point,
    pub channel: Channel,
    /// Set for events from special devices.
    pub special_id: Option<u32>,
    pub routing: Routing,
    /// False on copies made by selection fan-out.
    pub original: bool,
    /// Set by a callback to clear the device's selection after delivery.
    pub deselect_all: bool,
    /// Set by a drop callback that accepted the drop.
    pub dropped_on_target: bool,
}

impl DeviceEvent {
    /// Create an event on the primary channel with capture routing.
    pub fn new(device: DeviceId, position: Point, data: EventData) -> Self {
        Self {
            data,
            device,
            display_id: 0,
            position,
            channel: Channel::Primary,
            special_id: None,
            routing: Routing::Capture,
            original: true,
            deselect_all: false,
            dropped_on_target: false,
        }
    }

    #[inline]
    pub fn kind(&self) -> EventKind {
        self.data.kind()
    }

    pub fn on_display(mut self, display_id: u32) -> Self {
        self.display_id = display_id;
        self
    }

    pub fn routed(mut self, routing: Routing) -> Self {
        self.routing = routing;
        self
    }

    /// Mark the event as coming from special device `id`.
    pub fn special(mut self, id: u32) -> Self {
        self.channel = Channel::Special;
        self.special_id = Some(id);
        self
    }

    /// The explicit delivery target, if any.
    pub fn to_handler(&self) -> Option<WidgetKey> {
        match self.routing {
            Routing::Direct(key) => Some(key),
            _ => None,
        }
    }
}

/// Description of one application window, as reported by the session layer.
#[derive(Debug, Clone, PartialEq)]
pub struct AppInfo {
    pub window: i64,
    pub name: String,
    pub bounds: Bounds,
    pub z: f64,
    pub display_id: u32,
}

/// Geometry of one display (a whole tiled wall).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayInfo {
    pub display_id: u32,
    pub bounds: Bounds,
}

/// Session-level events from the application layer.
#[derive(Debug, Clone, PartialEq)]
pub enum GenericEvent {
    NewApp(AppInfo),
    AppKilled { window: i64 },
    AppInfo(AppInfo),
    DisplayInfo(DisplayInfo),
    /// New z values per application window.
    ZChange(Vec<(i64, f64)>),
    /// Reply to an add-overlay request.
    ObjectInfo { overlay_id: OverlayId, widget: WidgetId },
}

/// What a posted device event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PostOutcome {
    /// The widget whose callback table the event was delivered to.
    pub delivered_to: Option<WidgetKey>,
    pub deselect_all: bool,
    pub dropped_on_target: bool,
    /// The event was queued behind a running delivery on this thread.
    pub queued: bool,
}
