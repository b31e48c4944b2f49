//! Shared helpers for the routing integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use horizon_dim::{
    Bounds, DeviceEvent, DeviceId, Dispatcher, DisplayInfo, EventData, EventKind, GenericEvent, Point,
    WidgetBuilder,
};
use parking_lot::Mutex;

/// One delivered event, as seen by a recording callback.
#[derive(Debug, Clone, PartialEq)]
pub struct Seen {
    pub widget: &'static str,
    pub kind: EventKind,
    pub original: bool,
}

/// Collects deliveries from any number of widgets.
#[derive(Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install recording callbacks for `kinds` on `builder`, labelled `name`.
    pub fn watch(&self, builder: WidgetBuilder, name: &'static str, kinds: &[EventKind]) -> WidgetBuilder {
        kinds.iter().fold(builder, |b, &kind| {
            let seen = self.seen.clone();
            b.on(kind, move |_ctx, ev| {
                seen.lock().push(Seen {
                    widget: name,
                    kind: ev.kind(),
                    original: ev.original,
                });
                Ok(())
            })
        })
    }

    pub fn take(&self) -> Vec<Seen> {
        std::mem::take(&mut *self.seen.lock())
    }

    /// `(widget, kind)` pairs, in delivery order.
    pub fn take_pairs(&self) -> Vec<(&'static str, EventKind)> {
        self.take().into_iter().map(|s| (s.widget, s.kind)).collect()
    }
}

/// A dispatcher with one wall covering `(0, 0)..(1920, 1080)` on display 0.
pub fn dispatcher_with_wall() -> Dispatcher {
    let dispatcher = Dispatcher::with_defaults();
    dispatcher.post_generic(GenericEvent::DisplayInfo(DisplayInfo {
        display_id: 0,
        bounds: Bounds::new(0, 1920, 1080, 0),
    }));
    dispatcher
}

pub fn mouse() -> DeviceId {
    DeviceId::from("10.0.0.1:mouse0")
}

pub fn move_to(device: &DeviceId, x: i32, y: i32) -> DeviceEvent {
    DeviceEvent::new(device.clone(), Point::new(x, y), EventData::Move)
}

pub fn click(device: &DeviceId, x: i32, y: i32, is_down: bool) -> DeviceEvent {
    DeviceEvent::new(
        device.clone(),
        Point::new(x, y),
        EventData::Click {
            button: 1,
            is_down,
            gesture: horizon_dim::Gesture::Pan,
        },
    )
}

pub fn drag(device: &DeviceId, x: i32, y: i32) -> DeviceEvent {
    DeviceEvent::new(
        device.clone(),
        Point::new(x, y),
        EventData::Analog {
            gesture: horizon_dim::Gesture::Pan,
            start: Point::ZERO,
            dx: 1,
            dy: 0,
            dz: 0,
        },
    )
}

/// Route log output through the test harness. Safe to call from every test.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}
