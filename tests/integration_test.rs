//! Integration tests for discovery, sessions and event dispatch.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use toio_driver::bluetooth::mock::MockTransport;
use toio_driver::bluetooth::{DiscoveryManager, Endpoint, MotionReading};
use toio_driver::config::Config;
use toio_driver::events::run_dispatch;
use toio_driver::state::LinkRegistry;

const CUBE_A: &str = "D0:8B:7F:12:34:56";
const CUBE_B: &str = "E4:5F:01:AB:CD:EF";

fn setup() -> (MockTransport, DiscoveryManager<MockTransport>) {
    let mock = MockTransport::new();
    mock.add_peer(CUBE_A, "toio Core Cube-A", true);
    mock.add_peer(CUBE_B, "toio Core Cube-B", true);
    mock.add_peer("11:22:33:44:55:66", "Keyboard", false);
    let manager = DiscoveryManager::new(Arc::new(mock.clone()), LinkRegistry::new(), &Config::default());
    (mock, manager)
}

#[tokio::test(start_paused = true)]
async fn test_notification_flow() {
    let (mock, manager) = setup();
    let cubes = manager.scan(3).await;
    assert_eq!(cubes.len(), 2);
    let cube = manager.get(CUBE_A).unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    let l = log.clone();
    cube.on_connection(move |c| l.lock().push(format!("connection:{}", c)));
    let l = log.clone();
    cube.on_battery(move |b| l.lock().push(format!("battery:{}", b)));
    let l = log.clone();
    cube.on_button(move |b| l.lock().push(format!("button:{}", b)));
    let l = log.clone();
    cube.on_motion(move |m: MotionReading| {
        l.lock().push(format!("motion:{}:{}:{}:{}", m.flat, m.clash, m.double_tap, m.attitude))
    });

    assert!(cube.connect().await);

    assert!(mock.notify(CUBE_A, Endpoint::Motion, &[0x01, 1, 0, 1, 5]));
    assert!(mock.notify(CUBE_A, Endpoint::Button, &[0x01, 0x80]));
    assert!(mock.notify(CUBE_A, Endpoint::Battery, &[90]));
    // Malformed payloads are dropped silently
    mock.notify(CUBE_A, Endpoint::Battery, &[80, 0]);
    mock.notify(CUBE_A, Endpoint::Button, &[0x02, 0x00]);

    // Nothing is delivered before a tick
    assert!(log.lock().is_empty());

    manager.tick();
    assert_eq!(
        *log.lock(),
        vec![
            "connection:true",
            "battery:90",
            "button:true",
            "motion:true:false:true:5",
        ]
    );

    manager.tick();
    assert_eq!(log.lock().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_latest_value_wins() {
    let (mock, manager) = setup();
    manager.scan(1).await;
    let cube = manager.get(CUBE_A).unwrap();

    let levels = Arc::new(Mutex::new(Vec::new()));
    let l = levels.clone();
    cube.on_battery(move |level| l.lock().push(level));

    assert!(cube.connect().await);
    mock.notify(CUBE_A, Endpoint::Battery, &[70]);
    mock.notify(CUBE_A, Endpoint::Battery, &[60]);
    manager.tick();

    assert_eq!(*levels.lock(), vec![60]);
}

#[tokio::test(start_paused = true)]
async fn test_single_owner_under_concurrent_connects() {
    let (mock, manager) = setup();
    manager.scan(1).await;
    let a = manager.get(CUBE_A).unwrap();
    let b = manager.get(CUBE_B).unwrap();

    let (a_ok, b_ok) = tokio::join!(a.connect(), b.connect());

    assert_eq!(a_ok, a.is_connected());
    assert_eq!(b_ok, b.is_connected());
    assert!(a_ok ^ b_ok);
    let connected = manager.sessions().iter().filter(|s| s.is_connected()).count();
    assert_eq!(connected, 1);
    assert!(manager.connected().is_some());
    assert_eq!(mock.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_foreign_link_notifications_not_delivered() {
    let (mock, manager) = setup();
    manager.scan(1).await;
    let a = manager.get(CUBE_A).unwrap();
    let b = manager.get(CUBE_B).unwrap();

    let a_levels = Arc::new(Mutex::new(Vec::new()));
    let l = a_levels.clone();
    a.on_battery(move |level| l.lock().push(level));
    let b_levels = Arc::new(Mutex::new(Vec::new()));
    let l = b_levels.clone();
    b.on_battery(move |level| l.lock().push(level));

    assert!(a.connect().await);
    // a's link drops but its notification stream is still registered
    mock.drop_link(CUBE_A);
    assert!(b.connect().await);

    assert!(mock.notify(CUBE_A, Endpoint::Battery, &[11]));
    mock.notify(CUBE_A, Endpoint::Button, &[0x01, 0x80]);
    assert!(mock.notify(CUBE_B, Endpoint::Battery, &[22]));
    mock.notify(CUBE_A, Endpoint::Battery, &[12]);

    manager.tick();
    assert_eq!(*b_levels.lock(), vec![22]);
    assert!(a_levels.lock().is_empty());
    assert!(!a.is_connected());
    assert!(b.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_failed_takeover_keeps_owner() {
    let (mock, manager) = setup();
    manager.scan(1).await;
    let a = manager.get(CUBE_A).unwrap();
    let b = manager.get(CUBE_B).unwrap();

    let states = Arc::new(Mutex::new(Vec::new()));
    let s = states.clone();
    a.on_connection(move |c| s.lock().push(c));
    let levels = Arc::new(Mutex::new(Vec::new()));
    let l = levels.clone();
    a.on_battery(move |level| l.lock().push(level));

    assert!(a.connect().await);
    manager.tick();

    mock.remove_endpoint(Endpoint::Motor);
    assert!(!b.connect().await);
    assert!(!b.is_connected());
    assert!(a.is_connected());
    assert_eq!(manager.registry().owner(), Some(a.id()));

    mock.notify(CUBE_A, Endpoint::Battery, &[77]);
    manager.tick();
    manager.tick();
    assert_eq!(*states.lock(), vec![true]);
    assert_eq!(*levels.lock(), vec![77]);

    // a still sees its own disconnection
    a.disconnect().await;
    manager.tick();
    assert_eq!(*states.lock(), vec![true, false]);
}

#[tokio::test(start_paused = true)]
async fn test_non_owner_tick_does_not_drain() {
    let (mock, manager) = setup();
    manager.scan(1).await;
    let a = manager.get(CUBE_A).unwrap();
    let b = manager.get(CUBE_B).unwrap();

    let b_calls = Arc::new(Mutex::new(0));
    let c = b_calls.clone();
    b.on_button(move |_| *c.lock() += 1);
    let a_calls = Arc::new(Mutex::new(0));
    let c = a_calls.clone();
    a.on_button(move |_| *c.lock() += 1);

    assert!(a.connect().await);
    mock.notify(CUBE_A, Endpoint::Button, &[0x01, 0x00]);

    b.tick();
    assert_eq!(*b_calls.lock(), 0);
    a.tick();
    assert_eq!(*a_calls.lock(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_remote_link_drop() {
    let (mock, manager) = setup();
    manager.scan(1).await;
    let cube = manager.get(CUBE_A).unwrap();

    let states = Arc::new(Mutex::new(Vec::new()));
    let s = states.clone();
    cube.on_connection(move |c| s.lock().push(c));
    let levels = Arc::new(Mutex::new(Vec::new()));
    let l = levels.clone();
    cube.on_battery(move |level| l.lock().push(level));

    assert!(cube.connect().await);
    manager.tick();
    mock.drop_link(CUBE_A);
    assert!(!cube.is_connected());

    // No owner: late notifications are dropped
    assert!(mock.notify(CUBE_A, Endpoint::Battery, &[50]));

    manager.tick();
    assert_eq!(*states.lock(), vec![true, false]);
    assert!(levels.lock().is_empty());
    assert!(!cube.drive(100, 0).await);

    // The tick that saw the drop released the stale link
    assert_eq!(mock.release_count(), 1);
    assert!(!mock.notify(CUBE_A, Endpoint::Battery, &[40]));

    // Reconnect works after a drop
    assert!(cube.connect().await);
    assert!(cube.is_connected());
    assert_eq!(mock.connect_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_write_failure_reported() {
    let (mock, manager) = setup();
    manager.scan(1).await;
    let cube = manager.get(CUBE_A).unwrap();
    assert!(cube.connect().await);

    mock.fail_writes(true);
    assert!(!cube.turn_on_led(1, 2, 3).await);
    assert!(cube.is_connected());

    mock.fail_writes(false);
    assert!(cube.turn_on_led(1, 2, 3).await);
}

#[tokio::test(start_paused = true)]
async fn test_dispatch_loop() {
    let (mock, manager) = setup();
    manager.scan(1).await;
    let cube = manager.get(CUBE_B).unwrap();

    let levels = Arc::new(Mutex::new(Vec::new()));
    let l = levels.clone();
    cube.on_battery(move |level| l.lock().push(level));

    assert!(cube.connect().await);
    mock.notify(CUBE_B, Endpoint::Battery, &[42]);

    run_dispatch(&manager, Duration::from_millis(10), tokio::time::sleep(Duration::from_millis(100))).await;

    assert_eq!(*levels.lock(), vec![42]);
}
