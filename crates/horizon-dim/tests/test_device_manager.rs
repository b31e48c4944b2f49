//! Hardware messages through the device manager.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{Recorder, dispatcher_with_wall, init_logging};
use horizon_dim::{
    Bounds, DeviceConfig, DeviceId, DeviceManager, DeviceMode, DriverRegistry, EventKind, RouteError, WidgetBuilder,
    WidgetKind,
};
use parking_lot::Mutex;

fn setup() -> (DeviceManager, Recorder) {
    init_logging();
    let dispatcher = Arc::new(dispatcher_with_wall());
    let rec = Recorder::new();
    dispatcher
        .register(rec.watch(
            WidgetBuilder::new(WidgetKind::Panel)
                .bounds(Bounds::new(0, 960, 540, 0))
                .z(0.0)
                .allows_drag(true),
            "panel",
            &[
                EventKind::Move,
                EventKind::Click,
                EventKind::Analog1,
                EventKind::Analog3,
                EventKind::Key,
                EventKind::EnteredWindow,
                EventKind::LeftWindow,
            ],
        ))
        .unwrap();
    let config = DeviceConfig::default().smoothing_depth(1);
    let manager = DeviceManager::new(dispatcher, DriverRegistry::with_builtin(), &config);
    (manager, rec)
}

#[test]
fn test_mouse_press_drag_release() {
    let (manager, rec) = setup();
    let id = DeviceId::from("10.0.0.1:mouse0");
    let now = Instant::now();
    for payload in ["1 0.1 0.1", "1 0.2 0.2", "2 1 1", "1 0.8 0.8", "2 1 0", "k 65"] {
        manager.on_hardware_message_at(&id, "mouse", payload, now).unwrap();
    }

    assert_eq!(
        rec.take_pairs(),
        vec![
            ("panel", EventKind::EnteredWindow),
            ("panel", EventKind::Move),
            ("panel", EventKind::Move),
            ("panel", EventKind::Click),
            // captured: the drag follows the panel past its edge
            ("panel", EventKind::Analog1),
            ("panel", EventKind::Click),
            // the key resolves where the pointer is now: the wall
            ("panel", EventKind::LeftWindow),
        ]
    );
    assert!(manager.contains(&id));
    assert_eq!(manager.with_device(&id, |core| core.position()).unwrap(), horizon_dim::Point::new(1536, 864));
}

#[test]
fn test_wheel_burst_is_released_by_tick() {
    let (manager, rec) = setup();
    let id = DeviceId::from("10.0.0.1:mouse0");
    let t0 = Instant::now();
    manager.on_hardware_message_at(&id, "mouse", "1 0.1 0.1", t0).unwrap();
    rec.take();

    manager.on_hardware_message_at(&id, "mouse", "3 1", t0).unwrap();
    manager
        .on_hardware_message_at(&id, "mouse", "3 2", t0 + Duration::from_millis(100))
        .unwrap();
    assert_eq!(
        rec.take_pairs(),
        vec![
            ("panel", EventKind::Click),
            ("panel", EventKind::Analog3),
            ("panel", EventKind::Analog3),
        ]
    );

    manager.tick(t0 + Duration::from_millis(200));
    assert!(rec.take().is_empty());
    manager.tick(t0 + Duration::from_secs(1));
    assert_eq!(rec.take_pairs(), vec![("panel", EventKind::Click)]);
    assert_eq!(manager.dispatcher().route(&id).unwrap().capture, None);
}

#[test]
fn test_touch_devices_vanish_after_their_gesture() {
    let (manager, rec) = setup();
    let id = DeviceId::from("10.0.0.2:touch17");
    manager.on_hardware_message(&id, "touch", "1 0.1 0.1 0").unwrap();
    manager.on_hardware_message(&id, "touch", "1 0.1 0.1 2").unwrap();
    assert!(rec.take_pairs().contains(&("panel", EventKind::Click)));

    // removal happens on the next pass, which also clears routing state
    assert!(manager.contains(&id));
    manager.tick(Instant::now());
    assert!(!manager.contains(&id));
    assert!(manager.dispatcher().route(&id).is_none());
}

#[test]
fn test_errors_are_reported_not_fatal() {
    let (manager, _rec) = setup();
    let id = DeviceId::from("10.0.0.1:mouse0");
    assert!(matches!(
        manager.on_hardware_message(&id, "glove", "1 2 3"),
        Err(RouteError::UnknownDeviceType(_))
    ));
    assert!(manager.is_empty());

    manager.on_hardware_message(&id, "mouse", "1 0.5 0.5").unwrap();
    assert!(matches!(
        manager.on_hardware_message(&id, "mouse", "1 nope 0.5"),
        Err(RouteError::MalformedMessage { .. })
    ));
    assert_eq!(manager.len(), 1);

    let ghost = DeviceId::from("nowhere:mouse9");
    assert!(matches!(manager.with_device(&ghost, |_| ()), Err(RouteError::UnknownDevice(_))));
}

#[test]
fn test_mode_switch_through_the_manager() {
    let (manager, _rec) = setup();
    let id = DeviceId::from("10.0.0.1:mouse0");
    let app = manager
        .dispatcher()
        .register(
            WidgetBuilder::new(WidgetKind::App)
                .window(11)
                .bounds(Bounds::new(1000, 1800, 1000, 600))
                .z(0.0)
                .on(EventKind::Move, |_, _| Ok(())),
        )
        .unwrap();
    manager.on_hardware_message(&id, "mouse", "1 0.7 0.7").unwrap();
    manager.on_hardware_message(&id, "mouse", "2 2 1").unwrap();
    manager.on_hardware_message(&id, "mouse", "2 2 0").unwrap();
    assert_eq!(manager.with_device(&id, |core| core.mode()).unwrap(), DeviceMode::App(app));

    // an app that goes away drops the device back to global mode
    manager.dispatcher().unregister(app).unwrap();
    manager.on_hardware_message(&id, "mouse", "1 0.1 0.1").unwrap();
    assert_eq!(manager.with_device(&id, |core| core.mode()).unwrap(), DeviceMode::Global);
}

#[test]
fn test_removing_a_device_closes_its_hover() {
    let (manager, rec) = setup();
    let id = DeviceId::from("10.0.0.1:mouse0");
    manager.on_hardware_message(&id, "mouse", "1 0.1 0.1").unwrap();
    rec.take();

    assert!(manager.remove(&id));
    assert!(!manager.remove(&id));
    assert_eq!(rec.take_pairs(), vec![("panel", EventKind::LeftWindow)]);
}

#[test]
fn test_wild_coordinates_are_rejected_without_moving() {
    let (manager, rec) = setup();
    let mouse = DeviceId::from("10.0.0.1:mouse0");
    manager.on_hardware_message(&mouse, "mouse", "1 0.5 0.5").unwrap();
    rec.take();
    let before = manager.with_device(&mouse, |core| core.position()).unwrap();

    for _ in 0..12 {
        assert!(matches!(
            manager.on_hardware_message(&mouse, "mouse", "1 -1e12 0.5"),
            Err(RouteError::MalformedMessage { .. })
        ));
    }
    for payload in ["1 1e12 0.5", "1 inf 0.5", "1 0.5 NaN", "1 -inf -inf"] {
        assert!(manager.on_hardware_message(&mouse, "mouse", payload).is_err(), "{payload}");
    }
    assert_eq!(manager.with_device(&mouse, |core| core.position()).unwrap(), before);
    assert!(rec.take().is_empty());

    // the device keeps working afterwards
    manager.on_hardware_message(&mouse, "mouse", "1 0.6 0.5").unwrap();
    assert_eq!(rec.take_pairs(), vec![("panel", EventKind::Move)]);

    let touch = DeviceId::from("10.0.0.2:touch4");
    assert!(manager.on_hardware_message(&touch, "touch", "1 NaN 0.5 0").is_err());
    assert!(manager.on_hardware_message(&touch, "touch", "4 0.5 0.5 inf 1").is_err());
    let stick = DeviceId::from("10.0.0.3:joystick0");
    assert!(manager.on_hardware_message(&stick, "joystick", "1 1e12 0").is_err());
    assert!(manager.on_hardware_message(&stick, "joystick", "1 0 -inf").is_err());
}

#[test]
fn test_callbacks_reach_the_manager_without_blocking() {
    init_logging();
    let dispatcher = Arc::new(dispatcher_with_wall());
    let config = DeviceConfig::default().smoothing_depth(1);
    let manager = Arc::new(DeviceManager::new(dispatcher.clone(), DriverRegistry::with_builtin(), &config));
    let app = dispatcher
        .register(
            WidgetBuilder::new(WidgetKind::App)
                .window(11)
                .bounds(Bounds::new(1000, 1800, 1000, 600))
                .z(0.0),
        )
        .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let (log, inner) = (seen.clone(), manager.clone());
    dispatcher
        .register(
            WidgetBuilder::new(WidgetKind::Button)
                .bounds(Bounds::new(0, 200, 200, 0))
                .z(0.0)
                .on(EventKind::Click, move |_, ev| {
                    let direct = inner.with_device(&ev.device, |core| core.mode());
                    let reentrant = matches!(direct, Err(RouteError::Reentrant));
                    log.lock().push((inner.len(), inner.contains(&ev.device), reentrant));
                    inner.queue(&ev.device, move |core| core.to_app_mode(app)).unwrap();
                    Ok(())
                }),
        )
        .unwrap();

    let id = DeviceId::from("10.0.0.1:mouse0");
    manager.on_hardware_message(&id, "mouse", "1 0.05 0.05").unwrap();
    manager.on_hardware_message(&id, "mouse", "2 1 1").unwrap();

    assert_eq!(*seen.lock(), vec![(1, true, true)]);
    assert_eq!(manager.with_device(&id, |core| core.mode()).unwrap(), DeviceMode::App(app));
}

#[test]
fn test_queue_on_an_idle_device_runs_at_once() {
    let (manager, _rec) = setup();
    let id = DeviceId::from("10.0.0.1:mouse0");
    assert!(matches!(
        manager.queue(&id, |_| ()),
        Err(RouteError::UnknownDevice(_))
    ));
    manager.on_hardware_message(&id, "mouse", "1 0.5 0.5").unwrap();

    let ran = Arc::new(Mutex::new(false));
    let flag = ran.clone();
    manager.queue(&id, move |_| *flag.lock() = true).unwrap();
    assert!(*ran.lock());
}
