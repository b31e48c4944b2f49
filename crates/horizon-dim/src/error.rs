//! Error types for routing operations.
//!
//! Nothing here is fatal. Dispatch-time failures are logged and the event is
//! dropped; these errors only surface from explicit API calls such as
//! registration or driver lookup.

use crate::device::DeviceId;
use crate::widget::{WidgetId, WidgetKey};

/// Result type alias for routing operations.
pub type Result<T> = std::result::Result<T, RouteError>;

/// Errors raised by the dispatcher, the device layer, and the listener.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RouteError {
    /// The widget key no longer refers to a registered widget.
    #[error("widget {0:?} is not registered")]
    StaleWidget(WidgetKey),

    /// No widget with this identity is registered.
    #[error("no widget registered as {0}")]
    UnknownWidget(WidgetId),

    /// Reparenting would make a widget its own ancestor.
    #[error("setting the parent of {child:?} to {parent:?} would create a cycle")]
    CircularParentage { child: WidgetKey, parent: WidgetKey },

    /// A structural call was made from inside a callback on the dispatching thread.
    ///
    /// Callbacks must use their `HandlerContext` instead.
    #[error("dispatcher state is already borrowed by a running callback")]
    Reentrant,

    /// A raw device message could not be parsed.
    #[error("malformed message from '{device}': {reason}")]
    MalformedMessage { device: DeviceId, reason: String },

    /// No live device has this id.
    #[error("no device '{0}'")]
    UnknownDevice(DeviceId),

    /// No driver is registered for the device type.
    #[error("no driver registered for device type '{0}'")]
    UnknownDeviceType(String),

    /// A listener line could not be split into device id, type and payload.
    #[error("invalid message envelope: {0}")]
    InvalidEnvelope(String),
}

impl RouteError {
    /// Create a malformed-message error.
    pub fn malformed(device: &DeviceId, reason: impl Into<String>) -> Self {
        Self::MalformedMessage {
            device: device.clone(),
            reason: reason.into(),
        }
    }
}

/// Outcome of a failed callback.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HandlerError {
    /// The callback's owner no longer exists; the callback is purged.
    #[error("callback owner is gone")]
    Stale,

    /// The callback failed; the failure is logged and dispatch continues.
    #[error("callback failed: {0}")]
    Failed(String),
}

/// Result returned by every event callback.
pub type HandlerResult = std::result::Result<(), HandlerError>;
