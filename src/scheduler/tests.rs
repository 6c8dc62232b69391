use super::*;
use crate::discovery::ENTITIES;
use crate::testing::{identity, MemoryStore, RecordingBus};
use crate::vehicle::{StateField, TeslaMateFeed, VehicleReading};
use std::sync::atomic::Ordering;

fn reading(geofence: &str, charging: bool) -> VehicleReading {
    VehicleReading {
        latitude: Some(52.52),
        longitude: Some(13.405),
        geofence: Some(geofence.to_string()),
        battery_level: Some(70),
        charge_limit_soc: Some(80),
        charging,
        ..Default::default()
    }
}

fn config() -> SyncConfig {
    SyncConfig {
        poll_interval_seconds: 3600,
        failure_threshold: 2,
        max_reconnect_attempts: 2,
        ..SyncConfig::default()
    }
}

fn scheduler(store: Arc<MemoryStore>, bus: Arc<RecordingBus>) -> SyncScheduler {
    let vehicle = identity();
    let topics = Topics::new("tesla/car", "homeassistant", &vehicle.vin);
    SyncScheduler::new(
        vehicle,
        store,
        bus,
        topics,
        UnitSettings::default(),
        "Home",
        &config(),
    )
}

fn is_discovery(topic: &str) -> bool {
    topic.starts_with("homeassistant/")
}

#[tokio::test]
async fn test_nothing_published_before_connect() {
    let store = Arc::new(MemoryStore::with_reading(reading("Home", false)));
    let bus = Arc::new(RecordingBus::default());
    let mut scheduler = scheduler(store, bus.clone());

    scheduler.poll_once().await.unwrap();

    assert_eq!(scheduler.state(), SchedulerState::Disconnected);
    assert!(bus.published().is_empty());
}

#[tokio::test]
async fn test_connect_runs_discovery_then_state() {
    let store = Arc::new(MemoryStore::with_reading(reading("Home", false)));
    let bus = Arc::new(RecordingBus::default());
    let mut scheduler = scheduler(store, bus.clone());

    scheduler
        .handle_event(ConnectionEvent::Connected)
        .await
        .unwrap();

    assert_eq!(scheduler.state(), SchedulerState::Polling);
    let topics = bus.topics();
    let discovery = ENTITIES.len();
    assert!(topics[..discovery].iter().all(|t| is_discovery(t)));
    assert!(topics[discovery..].iter().all(|t| !is_discovery(t)));
    assert!(topics.contains(&format!("tesla/car/{}/presence", identity().vin)));
}

#[tokio::test]
async fn test_reconnect_rediscovers_before_any_state() {
    let store = Arc::new(MemoryStore::with_reading(reading("Home", false)));
    let bus = Arc::new(RecordingBus::default());
    let mut scheduler = scheduler(store.clone(), bus.clone());

    scheduler
        .handle_event(ConnectionEvent::Connected)
        .await
        .unwrap();

    // Transport drop; the car starts charging meanwhile
    scheduler
        .handle_event(ConnectionEvent::Disconnected)
        .await
        .unwrap();
    store.set_reading(reading("Home", true));
    bus.clear();

    scheduler.poll_once().await.unwrap();
    assert!(bus.published().is_empty());

    scheduler
        .handle_event(ConnectionEvent::Connected)
        .await
        .unwrap();

    let topics = bus.topics();
    assert!(is_discovery(&topics[0]));
    let first_state = topics.iter().position(|t| !is_discovery(t)).unwrap();
    assert_eq!(first_state, ENTITIES.len());

    // Cache was cleared: unchanged fields are republished to the broker too
    assert!(topics.contains(&format!("tesla/car/{}/battery_level", identity().vin)));
    assert!(topics.contains(&format!("tesla/car/{}/charging", identity().vin)));
}

#[tokio::test]
async fn test_failed_discovery_blocks_state_until_retried() {
    let store = Arc::new(MemoryStore::with_reading(reading("Home", false)));
    let bus = Arc::new(RecordingBus::default());
    let mut scheduler = scheduler(store, bus.clone());

    bus.set_down(true);
    scheduler
        .handle_event(ConnectionEvent::Connected)
        .await
        .unwrap();
    assert_eq!(scheduler.state(), SchedulerState::Discovering);
    assert!(scheduler.cache().is_empty());

    bus.set_down(false);
    scheduler.poll_once().await.unwrap();

    assert_eq!(scheduler.state(), SchedulerState::Polling);
    assert!(is_discovery(&bus.topics()[0]));
    assert!(scheduler.cache().field_count(&identity().vin) > 0);
}

#[tokio::test]
async fn test_presence_change_published_on_next_tick() {
    let store = Arc::new(MemoryStore::with_reading(reading("Home", false)));
    let bus = Arc::new(RecordingBus::default());
    let mut scheduler = scheduler(store.clone(), bus.clone());

    scheduler
        .handle_event(ConnectionEvent::Connected)
        .await
        .unwrap();
    bus.clear();

    store.set_reading(reading("Work", false));
    scheduler.poll_once().await.unwrap();

    let published = bus.published();
    assert_eq!(published.len(), 2);
    assert!(published
        .iter()
        .any(|p| p.topic.ends_with("/presence") && p.payload == "not_home"));
    assert!(published
        .iter()
        .any(|p| p.topic.ends_with("/geofence") && p.payload == "Work"));
    assert_eq!(
        scheduler.cache().get(&identity().vin, StateField::Presence),
        Some(&crate::vehicle::FieldValue::Text("not_home".to_string()))
    );
}

#[tokio::test]
async fn test_teslamate_charge_limit_published_on_next_pass() {
    let mut without_limit = reading("Home", false);
    without_limit.charge_limit_soc = None;
    let store = Arc::new(MemoryStore::with_reading(without_limit));
    let bus = Arc::new(RecordingBus::default());
    let feed = TeslaMateFeed::new();
    let mut scheduler = scheduler(store, bus.clone()).with_feed(feed.clone());
    let limit_topic = format!("tesla/car/{}/charge_limit_soc", identity().vin);

    scheduler
        .handle_event(ConnectionEvent::Connected)
        .await
        .unwrap();
    assert!(!bus.topics().contains(&limit_topic));

    assert!(feed.record("charge_limit_soc", b"80"));
    bus.clear();
    scheduler.poll_once().await.unwrap();

    let published = bus.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, limit_topic);
    assert_eq!(published[0].payload, "80");
}

#[tokio::test]
async fn test_failures_trigger_reconnect_then_give_up() {
    let store = Arc::new(MemoryStore::with_reading(reading("Home", false)));
    let bus = Arc::new(RecordingBus::default());
    let mut scheduler = scheduler(store.clone(), bus.clone());

    scheduler
        .handle_event(ConnectionEvent::Connected)
        .await
        .unwrap();

    store.failing.store(true, Ordering::SeqCst);

    // Below the threshold: logged only
    scheduler.poll_once().await.unwrap();
    assert_eq!(store.reconnects.load(Ordering::SeqCst), 0);

    // Threshold reached: reconnect succeeds, counter resets
    scheduler.poll_once().await.unwrap();
    assert_eq!(store.reconnects.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.state(), SchedulerState::Polling);

    // Reconnects now fail; the second failure in a row is fatal
    store.reconnect_fails.store(true, Ordering::SeqCst);
    scheduler.poll_once().await.unwrap();
    scheduler.poll_once().await.unwrap();
    assert_eq!(store.reconnects.load(Ordering::SeqCst), 2);

    let result = scheduler.poll_once().await;
    assert_eq!(store.reconnects.load(Ordering::SeqCst), 3);
    assert!(matches!(result, Err(SyncError::Transient(_))));
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let store = Arc::new(MemoryStore::with_reading(reading("Home", false)));
    let bus = Arc::new(RecordingBus::default());
    let scheduler = scheduler(store, bus.clone());

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (refresh, refresh_rx) = refresh_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(scheduler.run(events_rx, refresh_rx, shutdown_rx));

    events_tx.send(ConnectionEvent::Connected).unwrap();
    for _ in 0..50 {
        if !bus.published().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(is_discovery(&bus.topics()[0]));

    bus.clear();
    assert!(refresh.request());
    tokio::time::sleep(Duration::from_millis(50)).await;
    // Nothing changed, so the refresh pass publishes nothing
    assert!(bus.published().is_empty());

    shutdown_tx.send(true).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}
