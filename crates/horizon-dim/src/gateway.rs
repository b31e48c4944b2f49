//! Outbound channel to the rendering and window-management side.
//!
//! The routing engine never draws. When widget state changes in a way the
//! remote display must show (selection, proximity enlargement, creation and
//! removal) it sends a fire-and-forget command through a [`DisplayGateway`].
//! Gateway calls happen inside the dispatcher lock and must not block.

use std::fmt;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use horizon_dim_core::{Bounds, Point};
use horizon_dim_core::logging::targets;

use crate::widget::{WidgetId, WidgetKind};

/// Identifier the remote display assigned to a widget's overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OverlayId(pub u32);

impl fmt::Display for OverlayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "overlay#{}", self.0)
    }
}

/// Cursor shape of a device pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointerShape {
    #[default]
    Normal,
    Down,
    Up,
    Drag,
    Zoom,
    Rotate,
    /// Drawing a rubber-band selection.
    Select,
}

/// Visual state change for one overlay.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayMessage {
    /// Temporary scale while the pointer is near.
    TempScale(f64),
    /// Selection highlight on or off.
    Select(bool),
    Visible(bool),
    /// Move a device pointer.
    MovePointer(Point),
    PointerShape(PointerShape),
    /// Pointer tint for a device in app mode.
    InApp(bool),
    /// Rubber-band rectangle drawn by a pointer.
    ShowSelection(Bounds),
    /// Widget-specific command.
    Custom { code: i32, args: Vec<String> },
}

/// Everything the display needs to create an overlay for a widget.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlaySpec {
    pub widget: WidgetId,
    pub kind: WidgetKind,
    pub bounds: Bounds,
    pub z: f64,
    pub display_id: u32,
    pub parent: Option<WidgetId>,
}

/// Outbound display commands.
///
/// `add_overlay` is asynchronous: the assigned [`OverlayId`] comes back later
/// as a [`GenericEvent::ObjectInfo`](crate::GenericEvent::ObjectInfo).
pub trait DisplayGateway: Send + Sync {
    fn send_overlay_message(&self, overlay: OverlayId, message: OverlayMessage);
    fn add_overlay(&self, spec: OverlaySpec);
    fn remove_overlay(&self, overlay: OverlayId);
}

/// Gateway that discards every command.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullGateway;

impl DisplayGateway for NullGateway {
    fn send_overlay_message(&self, _overlay: OverlayId, _message: OverlayMessage) {}
    fn add_overlay(&self, _spec: OverlaySpec) {}
    fn remove_overlay(&self, _overlay: OverlayId) {}
}

/// A queued display command.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCommand {
    Message(OverlayId, OverlayMessage),
    Add(OverlaySpec),
    Remove(OverlayId),
}

/// Gateway that queues commands for a separate sender thread.
///
/// The queue is bounded. When the consumer falls behind, commands are dropped
/// and logged rather than stalling event delivery.
#[derive(Debug, Clone)]
pub struct ChannelGateway {
    tx: Sender<GatewayCommand>,
}

impl ChannelGateway {
    /// Create a gateway and the receiving end of its queue.
    pub fn new(capacity: usize) -> (Self, Receiver<GatewayCommand>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self { tx }, rx)
    }

    fn push(&self, command: GatewayCommand) {
        match self.tx.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(command)) => {
                tracing::warn!(target: targets::GATEWAY, ?command, "gateway queue full; command dropped");
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!(target: targets::GATEWAY, "gateway consumer gone");
            }
        }
    }
}

impl DisplayGateway for ChannelGateway {
    fn send_overlay_message(&self, overlay: OverlayId, message: OverlayMessage) {
        self.push(GatewayCommand::Message(overlay, message));
    }

    fn add_overlay(&self, spec: OverlaySpec) {
        self.push(GatewayCommand::Add(spec));
    }

    fn remove_overlay(&self, overlay: OverlayId) {
        self.push(GatewayCommand::Remove(overlay));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_gateway_forwards_in_order() {
        let (gateway, rx) = ChannelGateway::new(8);
        gateway.send_overlay_message(OverlayId(3), OverlayMessage::Select(true));
        gateway.remove_overlay(OverlayId(3));

        assert_eq!(
            rx.try_recv().unwrap(),
            GatewayCommand::Message(OverlayId(3), OverlayMessage::Select(true))
        );
        assert_eq!(rx.try_recv().unwrap(), GatewayCommand::Remove(OverlayId(3)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let (gateway, rx) = ChannelGateway::new(1);
        gateway.remove_overlay(OverlayId(1));
        gateway.remove_overlay(OverlayId(2));
        assert_eq!(rx.len(), 1);
        assert_eq!(rx.try_recv().unwrap(), GatewayCommand::Remove(OverlayId(1)));
    }

    #[test]
    fn test_disconnected_consumer_is_tolerated() {
        let (gateway, rx) = ChannelGateway::new(1);
        drop(rx);
        gateway.remove_overlay(OverlayId(1));
    }
}
