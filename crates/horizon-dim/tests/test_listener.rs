//! End-to-end: hardware lines over TCP reach the device manager.

mod common;

use std::io::Write;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::{Duration, Instant};

use horizon_dim::{
    Bounds, DeviceId, DimConfig, DispatcherContext, DisplayInfo, EventKind, GenericEvent, ListenerConfig,
    NullGateway, WidgetBuilder, WidgetKind,
};
use parking_lot::Mutex;

fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn context() -> DispatcherContext {
    context_with(ListenerConfig::new("127.0.0.1:0").read_timeout(Duration::from_millis(20)))
}

fn context_with(listener: ListenerConfig) -> DispatcherContext {
    common::init_logging();
    let config = DimConfig::default().listener(listener);
    let context = DispatcherContext::with_builtin_drivers(config, Arc::new(NullGateway));
    context.dispatcher().post_generic(GenericEvent::DisplayInfo(DisplayInfo {
        display_id: 0,
        bounds: Bounds::new(0, 1920, 1080, 0),
    }));
    context
}

#[test]
fn test_lines_become_devices_and_events() {
    let context = context();
    let moves = Arc::new(Mutex::new(0));
    let counter = moves.clone();
    context
        .dispatcher()
        .register(
            WidgetBuilder::new(WidgetKind::Panel)
                .bounds(Bounds::new(0, 1920, 1080, 0))
                .z(0.0)
                .on(EventKind::Move, move |_, _| {
                    *counter.lock() += 1;
                    Ok(())
                }),
        )
        .unwrap();
    context.start_listener().unwrap();
    let addr = context.listener_addr().unwrap();

    let mut stream = TcpStream::connect(addr).unwrap();
    // the second line arrives in two pieces
    stream.write_all(b"mouse0 mouse 1 0.5 0.5\nmouse0 mouse 1 0.6").unwrap();
    stream.flush().unwrap();
    std::thread::sleep(Duration::from_millis(60));
    stream.write_all(b" 0.5\nnot-an-envelope\nlens0 glove 1 2 3\n").unwrap();
    stream.flush().unwrap();

    let id = DeviceId::from("127.0.0.1:mouse0");
    wait_for("two moves", || *moves.lock() == 2);
    assert!(context.devices().contains(&id));
    assert!(!context.devices().contains(&DeviceId::from("127.0.0.1:lens0")));
    assert_eq!(context.devices().len(), 1);

    drop(stream);
    context.shutdown();
    assert!(!context.is_running());
}

fn count_moves(context: &DispatcherContext) -> Arc<Mutex<usize>> {
    let moves = Arc::new(Mutex::new(0));
    let counter = moves.clone();
    context
        .dispatcher()
        .register(
            WidgetBuilder::new(WidgetKind::Panel)
                .bounds(Bounds::new(0, 1920, 1080, 0))
                .z(0.0)
                .on(EventKind::Move, move |_, _| {
                    *counter.lock() += 1;
                    Ok(())
                }),
        )
        .unwrap();
    moves
}

#[test]
fn test_non_utf8_line_is_dropped_and_connection_survives() {
    let context = context();
    let moves = count_moves(&context);
    context.start_listener().unwrap();
    let mut stream = TcpStream::connect(context.listener_addr().unwrap()).unwrap();

    stream.write_all(b"mouse0 mouse 1 0.5 0.5\n").unwrap();
    stream.write_all(b"mouse0 mouse 1 \xff\xfe 0.5\n").unwrap();
    stream.write_all(b"mouse0 mouse 1 0.6 0.5\n").unwrap();
    stream.flush().unwrap();

    wait_for("both valid moves", || *moves.lock() == 2);
    drop(stream);
    context.shutdown();
}

#[test]
fn test_oversized_line_is_skipped_up_to_its_newline() {
    let context = context_with(
        ListenerConfig::new("127.0.0.1:0")
            .read_timeout(Duration::from_millis(20))
            .max_message_len(64),
    );
    let moves = count_moves(&context);
    context.start_listener().unwrap();
    let mut stream = TcpStream::connect(context.listener_addr().unwrap()).unwrap();

    // far past the limit, sent in pieces with no newline until the end
    stream.write_all(b"big0 mouse 1 0.5 0.5 ").unwrap();
    let filler = vec![b'x'; 64 * 1024];
    for _ in 0..16 {
        stream.write_all(&filler).unwrap();
    }
    stream.write_all(b"\nsmall0 mouse 1 0.5 0.5\n").unwrap();
    stream.flush().unwrap();

    wait_for("the line after the oversized one", || *moves.lock() == 1);
    assert!(context.devices().contains(&DeviceId::from("127.0.0.1:small0")));
    assert!(!context.devices().contains(&DeviceId::from("127.0.0.1:big0")));
    drop(stream);
    context.shutdown();
}

#[test]
fn test_listener_starts_once_and_stops_cleanly() {
    let context = context();
    context.start_listener().unwrap();
    let addr = context.listener_addr().unwrap();
    context.start_listener().unwrap();
    assert_eq!(context.listener_addr(), Some(addr));

    let mut a = TcpStream::connect(addr).unwrap();
    let idle = TcpStream::connect(addr).unwrap();
    a.write_all(b"m0 mouse 1 0.1 0.1\n").unwrap();
    wait_for("first device", || context.devices().contains(&DeviceId::from("127.0.0.1:m0")));

    // shutdown joins connection threads even while clients stay connected
    context.shutdown();
    assert_eq!(context.listener_addr(), None);
    drop((a, idle));
}

#[test]
fn test_ticker_removes_finished_touches() {
    common::init_logging();
    let config = DimConfig::default().device(horizon_dim::DeviceConfig {
        poll_interval_ms: 10,
        ..Default::default()
    });
    let context = DispatcherContext::with_builtin_drivers(config, Arc::new(NullGateway));
    context.start_ticker().unwrap();

    let id = DeviceId::from("10.1.1.1:touch3");
    context.devices().on_hardware_message(&id, "touch", "1 0.5 0.5 0").unwrap();
    context.devices().on_hardware_message(&id, "touch", "1 0.5 0.5 2").unwrap();
    wait_for("touch removal", || !context.devices().contains(&id));
    context.shutdown();
}
