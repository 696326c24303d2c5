//! Monitor integration tests with scripted room status and paused time.

mod common;

use std::sync::Arc;
use std::time::Duration;

use bili_stream::{Monitor, RoomEvent, RoomId, StreamError};
use common::{monitor_config, Probe, RecordingSink, ScriptedProber, INTERVAL};
use tokio_util::sync::CancellationToken;

fn monitor(prober: ScriptedProber, sink: Arc<RecordingSink>) -> Monitor {
    Monitor::new(monitor_config(), Arc::new(prober), sink)
}

fn event(room_id: i64, live: bool, title: &str) -> RoomEvent {
    RoomEvent {
        room_id: RoomId::new(room_id),
        live,
        title: title.to_string(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_first_live_observation_emits_immediately() {
    let sink = Arc::new(RecordingSink::default());
    let monitor = monitor(ScriptedProber::new().script(100, [Probe::Live("Demo")]), sink.clone());
    let scope = CancellationToken::new();

    let started = tokio::time::Instant::now();
    let mut events = monitor.watch(&scope, [RoomId::new(100)]).unwrap();

    assert_eq!(events.recv().await, Some(event(100, true, "Demo")));
    // The first probe does not wait for the first tick.
    assert!(started.elapsed() < INTERVAL);

    // Steady state produces nothing.
    tokio::time::sleep(INTERVAL * 3).await;
    assert_eq!(events.try_recv(), None);
    assert_eq!(sink.count("went_live"), 1);

    scope.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_offline_live_offline_emits_two_events() {
    let prober = ScriptedProber::new().script(200, [Probe::Offline, Probe::Live("Show"), Probe::Offline]);
    let monitor = monitor(prober, Arc::new(RecordingSink::default()));
    let scope = CancellationToken::new();

    let mut events = monitor.watch(&scope, [RoomId::new(200)]).unwrap();

    assert_eq!(events.recv().await, Some(event(200, true, "Show")));
    assert_eq!(events.recv().await, Some(event(200, false, "Show")));

    tokio::time::sleep(INTERVAL * 3).await;
    assert_eq!(events.try_recv(), None);

    scope.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_probe_failure_skips_tick() {
    let sink = Arc::new(RecordingSink::default());
    let prober = ScriptedProber::new().script(7, [Probe::Fail, Probe::Fail, Probe::Live("Back")]);
    let monitor = monitor(prober, sink.clone());
    let scope = CancellationToken::new();

    let started = tokio::time::Instant::now();
    let mut events = monitor.watch(&scope, [RoomId::new(7)]).unwrap();

    assert_eq!(events.recv().await, Some(event(7, true, "Back")));
    assert!(started.elapsed() >= INTERVAL * 2);
    assert_eq!(sink.count("probe_failed"), 2);
    assert!(monitor.is_watching(RoomId::new(7)));

    scope.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_failure_does_not_reset_baseline() {
    let prober = ScriptedProber::new().script(8, [Probe::Live("On"), Probe::Fail, Probe::Live("On")]);
    let monitor = monitor(prober, Arc::new(RecordingSink::default()));
    let scope = CancellationToken::new();

    let mut events = monitor.watch(&scope, [RoomId::new(8)]).unwrap();
    assert_eq!(events.recv().await, Some(event(8, true, "On")));

    tokio::time::sleep(INTERVAL * 3).await;
    assert_eq!(events.try_recv(), None);

    scope.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_remove_and_readd_resets_baseline() {
    let prober = ScriptedProber::new().script(
        5,
        [Probe::Live("First"), Probe::Offline, Probe::Live("Second")],
    );
    let monitor = monitor(prober, Arc::new(RecordingSink::default()));
    let scope = CancellationToken::new();

    let mut events = monitor.watch(&scope, [RoomId::new(5)]).unwrap();
    assert_eq!(events.recv().await, Some(event(5, true, "First")));

    monitor.remove_room(RoomId::new(5));
    assert!(!monitor.is_watching(RoomId::new(5)));

    monitor.add_room(RoomId::new(5));
    assert!(monitor.is_watching(RoomId::new(5)));

    // The fresh task sees offline first (no event), then live again.
    assert_eq!(events.recv().await, Some(event(5, true, "Second")));

    scope.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_add_room_after_watch_and_duplicates() {
    let prober = ScriptedProber::new()
        .script(1, [Probe::Offline])
        .script(2, [Probe::Live("Two")]);
    let monitor = monitor(prober, Arc::new(RecordingSink::default()));
    let scope = CancellationToken::new();

    let mut events = monitor.watch(&scope, [RoomId::new(1)]).unwrap();

    monitor.add_room(RoomId::new(2));
    monitor.add_room(RoomId::new(2));
    monitor.add_room(RoomId::new(1));
    assert_eq!(monitor.watched_rooms(), vec![RoomId::new(1), RoomId::new(2)]);

    assert_eq!(events.recv().await, Some(event(2, true, "Two")));

    tokio::time::sleep(INTERVAL * 2).await;
    assert_eq!(events.try_recv(), None);

    scope.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_remove_unknown_room_is_noop() {
    let monitor = monitor(ScriptedProber::new(), Arc::new(RecordingSink::default()));
    let scope = CancellationToken::new();
    let _events = monitor.watch(&scope, [RoomId::new(1)]).unwrap();

    monitor.remove_room(RoomId::new(99));
    assert_eq!(monitor.watched_rooms(), vec![RoomId::new(1)]);

    scope.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_streams_close_after_scope_ends() {
    let sink = Arc::new(RecordingSink::default());
    let monitor = monitor(ScriptedProber::new().script(3, [Probe::Live("Up")]), sink.clone());
    let scope = CancellationToken::new();

    let mut events = monitor.watch(&scope, [RoomId::new(3), RoomId::new(4)]).unwrap();
    let mut listener = monitor.listen().unwrap();

    assert_eq!(events.recv().await, Some(event(3, true, "Up")));
    assert_eq!(listener.recv().await, Some(event(3, true, "Up")));

    scope.cancel();
    assert_eq!(events.recv().await, None);
    assert_eq!(listener.recv().await, None);

    assert!(monitor.watched_rooms().is_empty());
    assert_eq!(sink.count("streams_closed"), 1);
    assert!(matches!(monitor.listen(), Err(StreamError::Closed)));

    // Adding after the scope ended starts nothing.
    monitor.add_room(RoomId::new(9));
    assert!(monitor.watched_rooms().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_watch_twice_is_rejected() {
    let monitor = monitor(ScriptedProber::new(), Arc::new(RecordingSink::default()));
    let scope = CancellationToken::new();

    let _events = monitor.watch(&scope, [RoomId::new(1)]).unwrap();
    let result = monitor.watch(&CancellationToken::new(), [RoomId::new(2)]);

    assert!(matches!(result, Err(StreamError::AlreadyStarted)));
    assert!(!monitor.is_watching(RoomId::new(2)));

    scope.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_full_subscribers_drop_without_stalling() {
    let sink = Arc::new(RecordingSink::default());
    let prober = ScriptedProber::new()
        .script(1, [Probe::Live("Live"), Probe::Offline])
        .script(2, [Probe::Live("Live")])
        .script(3, [Probe::Live("Live")])
        .script(4, [Probe::Live("Live")]);
    let monitor = Monitor::new(monitor_config().with_buffer_size(2), Arc::new(prober), sink.clone());
    let scope = CancellationToken::new();

    let mut first = monitor.watch(&scope, (1..=4).map(RoomId::new)).unwrap();
    let mut second = monitor.listen().unwrap();

    // Four rooms go live at once; each subscriber only has room for two.
    tokio::time::sleep(Duration::from_secs(1)).await;
    let drain = |stream: &mut bili_stream::EventStream<RoomEvent>| {
        let mut count = 0;
        while stream.try_recv().is_some() {
            count += 1;
        }
        count
    };
    assert_eq!(drain(&mut first), 2);
    assert_eq!(drain(&mut second), 2);
    assert_eq!(sink.count("event_dropped"), 4);

    // The monitor kept running: the next transition reaches both.
    assert_eq!(first.recv().await, Some(event(1, false, "Live")));
    assert_eq!(second.recv().await, Some(event(1, false, "Live")));

    scope.cancel();
}
