//! Enter/leave synthesis.

mod common;

use common::{Recorder, dispatcher_with_wall, mouse, move_to};
use horizon_dim::{Bounds, Channel, DeviceId, EventKind, WidgetBuilder, WidgetKind};
use parking_lot::Mutex;
use std::sync::Arc;

const HOVER: &[EventKind] = &[EventKind::Move, EventKind::EnteredWindow, EventKind::LeftWindow];

#[test]
fn test_enter_and_leave_alternate_across_widgets() {
    let d = dispatcher_with_wall();
    let rec = Recorder::new();
    let device = mouse();
    let names = ["a", "b", "c", "d"];
    for (i, name) in names.iter().enumerate() {
        let left = i as i32 * 200;
        d.register(rec.watch(
            WidgetBuilder::new(WidgetKind::Button).bounds(Bounds::new(left, left + 100, 100, 0)).z(0.0),
            name,
            HOVER,
        ))
        .unwrap();
    }

    // through every widget, with gaps of bare wall between them
    for x in [50, 150, 250, 350, 450, 550, 650, 50] {
        d.post_event(move_to(&device, x, 50));
    }

    let transitions: Vec<_> = rec
        .take_pairs()
        .into_iter()
        .filter(|(_, kind)| *kind != EventKind::Move)
        .collect();
    assert_eq!(
        transitions,
        vec![
            ("a", EventKind::EnteredWindow),
            ("a", EventKind::LeftWindow),
            ("b", EventKind::EnteredWindow),
            ("b", EventKind::LeftWindow),
            ("c", EventKind::EnteredWindow),
            ("c", EventKind::LeftWindow),
            ("d", EventKind::EnteredWindow),
            ("d", EventKind::LeftWindow),
            ("a", EventKind::EnteredWindow),
        ]
    );
}

#[test]
fn test_adjacent_widgets_pair_without_gaps() {
    let d = dispatcher_with_wall();
    let rec = Recorder::new();
    let device = mouse();
    for (name, left) in [("a", 0), ("b", 101), ("c", 202)] {
        d.register(rec.watch(
            WidgetBuilder::new(WidgetKind::Button).bounds(Bounds::new(left, left + 100, 100, 0)).z(0.0),
            name,
            HOVER,
        ))
        .unwrap();
    }

    for x in [10, 120, 230, 120, 10] {
        d.post_event(move_to(&device, x, 50));
    }

    let mut open: Option<&str> = None;
    for (widget, kind) in rec.take_pairs() {
        match kind {
            EventKind::EnteredWindow => {
                assert_eq!(open, None, "entered {widget} while {open:?} was still open");
                open = Some(widget);
            }
            EventKind::LeftWindow => {
                assert_eq!(open, Some(widget));
                open = None;
            }
            _ => {}
        }
    }
    assert_eq!(open, Some("a"));
}

#[test]
fn test_devices_track_hover_independently() {
    let d = dispatcher_with_wall();
    let rec = Recorder::new();
    let first = mouse();
    let second = DeviceId::from("10.0.0.2:mouse0");
    d.register(rec.watch(
        WidgetBuilder::new(WidgetKind::Button).bounds(Bounds::new(0, 100, 100, 0)).z(0.0),
        "a",
        HOVER,
    ))
    .unwrap();

    d.post_event(move_to(&first, 50, 50));
    d.post_event(move_to(&second, 50, 50));
    d.post_event(move_to(&second, 500, 500));

    let transitions: Vec<_> = rec
        .take_pairs()
        .into_iter()
        .filter(|(_, kind)| *kind != EventKind::Move)
        .collect();
    assert_eq!(
        transitions,
        vec![
            ("a", EventKind::EnteredWindow),
            ("a", EventKind::EnteredWindow),
            ("a", EventKind::LeftWindow),
        ]
    );
    assert!(d.route(&first).unwrap().hovered.is_some());
    assert!(d.route(&second).unwrap().hovered.is_none());
}

#[test]
fn test_special_device_uses_its_own_channel() {
    let d = dispatcher_with_wall();
    let channels = Arc::new(Mutex::new(Vec::new()));
    let log = channels.clone();
    d.register(
        WidgetBuilder::new(WidgetKind::Button)
            .bounds(Bounds::new(0, 100, 100, 0))
            .z(0.0)
            .on_special(EventKind::Move, |_, _| Ok(()))
            .on_special(EventKind::EnteredWindow, move |_, ev| {
                log.lock().push(ev.channel);
                Ok(())
            }),
    )
    .unwrap();

    let lens = DeviceId::from("10.0.0.1:joystick0");
    d.post_event(move_to(&mouse(), 50, 50));
    d.post_event(move_to(&lens, 50, 50).special(0));

    // the primary pointer sees no primary callbacks and gets no enter
    assert!(d.route(&mouse()).unwrap().hovered.is_none());
    assert_eq!(*channels.lock(), vec![Channel::Special]);
}
