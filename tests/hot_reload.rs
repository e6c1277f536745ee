//! End-to-end hot reload: file edits flow through the watcher, the bus and
//! the Flock to broker subscriptions.

use std::sync::Arc;
use std::time::Duration;

use pigeon::bus::ChangeBus;
use pigeon::config::{ConfigStore, ConfigWatcher, Trigger};
use pigeon::flock::{Flock, FlockSettings};

mod common;

use common::{eventually, MockBroker, MockDatabase};

const LIMIT: Duration = Duration::from_secs(10);

#[tokio::test]
async fn test_file_edits_are_reconciled() {
    let dir = tempfile::tempdir().unwrap();
    let initial = common::config(&[("north", &["logger1"]), ("south", &["logger1"])]);
    let path = common::config_file(&dir, &initial);

    let store = Arc::new(ConfigStore::load(&path).unwrap());
    let broker = MockBroker::new();
    let database = MockDatabase::new();
    let flock = Flock::start(
        &store,
        Arc::new(broker.clone()),
        Arc::new(database.clone()),
        FlockSettings::default(),
    )
    .await
    .unwrap();

    let bus = Arc::new(ChangeBus::new());
    let watcher = ConfigWatcher::new(store.clone(), bus.clone(), Duration::from_millis(100));
    let trigger = watcher.trigger();
    let _guard = watcher.run().unwrap();
    tokio::spawn(flock.serve(bus));

    // Add a device and a site.
    let grown = common::config(&[
        ("north", &["logger1", "logger2"]),
        ("south", &["logger1"]),
        ("west", &["logger1"]),
    ]);
    common::write_config(&path, &grown);
    assert!(
        eventually(LIMIT, || broker.subscriptions().len() == 4).await,
        "subscriptions: {:?}",
        broker.subscriptions()
    );
    assert!(database.buckets().contains("west"));
    assert_eq!(*store.current(), grown);

    // An invalid edit is rejected and nothing changes.
    std::fs::write(&path, "[broker]\naddress = \"mqtt.example.com\"\nport = 0\n").unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    trigger.send(Trigger::Signal).unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(*store.current(), grown);
    assert_eq!(broker.subscriptions().len(), 4);

    // Removing a site retires it.
    let shrunk = common::config(&[("north", &["logger2"])]);
    common::write_config(&path, &shrunk);
    assert!(
        eventually(LIMIT, || broker.subscriptions().len() == 1).await,
        "subscriptions: {:?}",
        broker.subscriptions()
    );
    assert!(broker.subscriptions().contains("north/logger2"));
    assert!(eventually(LIMIT, || database.closed().len() == 2).await);
}

#[tokio::test]
async fn test_signal_trigger_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let initial = common::config(&[("north", &["logger1"])]);
    let path = common::config_file(&dir, &initial);

    let store = Arc::new(ConfigStore::load(&path).unwrap());
    let bus = Arc::new(ChangeBus::new());
    let watcher = ConfigWatcher::new(store.clone(), bus.clone(), Duration::from_millis(50));
    let trigger = watcher.trigger();
    let _guard = watcher.run().unwrap();

    let mut edited = initial.clone();
    edited.broker.port = 8883;
    common::write_config(&path, &edited);
    trigger.send(Trigger::Signal).unwrap();

    let (section, change) = tokio::time::timeout(LIMIT, bus.recv()).await.unwrap();
    assert_eq!(section, pigeon::bus::Section::Broker);
    assert_eq!(change.previous.broker.port, 1883);
    assert_eq!(change.current.broker.port, 8883);
}
