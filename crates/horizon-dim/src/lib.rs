//! Multi-device input routing for tiled display walls.
//!
//! Many pointing devices (mice, touch surfaces, joysticks, trackers) drive one
//! shared wall of widgets at the same time. This crate turns their raw
//! messages into semantic events and delivers each one to the right widget:
//!
//! - **Widgets**: an arena of [`Widget`]s with z-ordered stacking, event
//!   transparency and per-event callbacks, built with [`WidgetBuilder`]
//! - **Dispatcher**: hit testing, capture, enter/leave synthesis, multi-select
//!   fan-out and drop handling, behind one re-entrant lock
//! - **Devices**: smoothing, click and double-click detection, wheel
//!   emulation and app/global modes shared by every [`Driver`]
//! - **Device manager**: lazy device creation by type name and cleanup of
//!   finished devices
//! - **Listener**: a TCP front end for hardware daemons
//! - **Context**: [`DispatcherContext`] wires it all together
//!
//! # Example
//!
//! ```
//! use horizon_dim::{
//!     Bounds, DeviceEvent, DeviceId, Dispatcher, EventData, EventKind, Point, WidgetBuilder,
//!     WidgetKind,
//! };
//!
//! let dispatcher = Dispatcher::with_defaults();
//! let button = dispatcher
//!     .register(
//!         WidgetBuilder::new(WidgetKind::Button)
//!             .bounds(Bounds::new(0, 100, 50, 0))
//!             .on(EventKind::Move, |_ctx, _event| Ok(())),
//!     )
//!     .unwrap();
//!
//! let event = DeviceEvent::new(DeviceId::from("host:mouse0"), Point::new(10, 10), EventData::Move);
//! assert_eq!(dispatcher.post_event(event).delivered_to, Some(button));
//! ```

mod context;
mod device;
mod dispatcher;
mod driver;
mod error;
mod event;
mod gateway;
mod handler;
mod listener;
mod manager;
mod select;
mod widget;

pub use context::DispatcherContext;
pub use device::{
    ButtonTracker, Device, DeviceCore, DeviceId, DeviceMode, Release, Smoother, WHEEL_BUTTON, WHEEL_STEP_PX,
    WheelEmulator,
};
pub use dispatcher::{
    AppFactory, Dispatcher, GenericCallback, PointerUpdate, RouteSnapshot, SubscriptionKey, WidgetInfo,
};
pub use driver::{Driver, DriverFactory, DriverRegistry, JoystickDriver, MouseDriver, TouchDriver};
pub use error::{HandlerError, HandlerResult, Result, RouteError};
pub use event::{
    AppInfo, ArrowDirection, Channel, DeviceEvent, DisplayInfo, DropSubject, EventData, EventKind, GenericEvent,
    Gesture, LifePoint, PostOutcome, Routing,
};
pub use gateway::{
    ChannelGateway, DisplayGateway, GatewayCommand, NullGateway, OverlayId, OverlayMessage, OverlaySpec, PointerShape,
};
pub use handler::HandlerContext;
pub use listener::{Envelope, HardwareListener};
pub use manager::{DeviceCommand, DeviceManager};
pub use select::{MultiSelect, SelectionChange};
pub use widget::{
    BOTTOM_Z, Handler, HitShape, TOP_Z, WALL_Z, Widget, WidgetBuilder, WidgetId, WidgetKey, WidgetKind, WidgetTree,
    Z_CHILD_DIFF,
};

pub use horizon_dim_core::{
    Bounds, DeviceConfig, DimConfig, DispatchConfig, ListenerConfig, Point, RunFlag, ScaleConfig,
};

static_assertions::assert_impl_all!(Dispatcher: Send, Sync);
static_assertions::assert_impl_all!(DeviceManager: Send, Sync);
static_assertions::assert_impl_all!(DispatcherContext: Send, Sync);
static_assertions::assert_impl_all!(Device: Send);
static_assertions::assert_impl_all!(DeviceEvent: Send, Sync, Clone);
