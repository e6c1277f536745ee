//! Shared utilities for integration testing.
//!
//! `MockBroker` and `MockDatabase` record every call made through the
//! collaborator traits so tests can assert on the reconciler's effects.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use pigeon::broker::{BrokerClient, BrokerConnector, BrokerError, Message, MessageHandler, QoS};
use pigeon::config::{BrokerConfig, DatabaseConfig, PigeonConfig, SiteConfig};
use pigeon::database::{BucketStatus, DatabaseClient, DatabaseConnector, DatabaseError, WriteHandle};

/// A valid configuration with the given `(site, devices)` entries.
pub fn config(sites: &[(&str, &[&str])]) -> PigeonConfig {
    PigeonConfig {
        broker: BrokerConfig {
            address: "mqtt.example.com".into(),
            port: 1883,
            ..Default::default()
        },
        database: DatabaseConfig {
            address: "influx.example.com".into(),
            org: "ops@example.com".into(),
            token: "write-token".into(),
            ..Default::default()
        },
        sites: sites
            .iter()
            .map(|(name, devices)| SiteConfig {
                name: name.to_string(),
                devices: devices.iter().map(|d| d.to_string()).collect(),
            })
            .collect(),
    }
}

/// Write `config` as TOML to `path`, replacing the file in one rename.
pub fn write_config(path: &Path, config: &PigeonConfig) {
    let staging = path.with_extension("toml.tmp");
    std::fs::write(&staging, toml::to_string(config).unwrap()).unwrap();
    std::fs::rename(&staging, path).unwrap();
}

/// Write `config` into `dir` and return the file path.
pub fn config_file(dir: &tempfile::TempDir, config: &PigeonConfig) -> PathBuf {
    let path = dir.path().join("pigeon.toml");
    write_config(&path, config);
    path
}

/// Poll `condition` every 10ms until it holds or `limit` elapses.
pub async fn eventually(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerCall {
    Connect(String),
    Subscribe(String),
    Unsubscribe(String),
    Disconnect,
}

#[derive(Default)]
struct BrokerState {
    calls: Mutex<Vec<BrokerCall>>,
    routes: Mutex<BTreeMap<String, MessageHandler>>,
    failing_topics: Mutex<BTreeSet<String>>,
    refuse: AtomicBool,
    connects: AtomicUsize,
}

/// Recording broker. Subscriptions live until unsubscribe or disconnect.
#[derive(Clone, Default)]
pub struct MockBroker {
    state: Arc<BrokerState>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every connect attempt fail.
    pub fn refuse_connections(&self, refuse: bool) {
        self.state.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Make subscribing to `topic` fail.
    pub fn fail_topic(&self, topic: &str) {
        self.state.failing_topics.lock().unwrap().insert(topic.to_string());
    }

    pub fn calls(&self) -> Vec<BrokerCall> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Topics with a live subscription.
    pub fn subscriptions(&self) -> BTreeSet<String> {
        self.state.routes.lock().unwrap().keys().cloned().collect()
    }

    /// Deliver a message. Returns false if nobody is subscribed to `topic`.
    pub fn publish(&self, topic: &str, payload: &[u8]) -> bool {
        let handler = self.state.routes.lock().unwrap().get(topic).cloned();
        match handler {
            Some(handler) => {
                handler(Message {
                    topic: topic.to_string(),
                    payload: payload.to_vec(),
                });
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl BrokerConnector for MockBroker {
    async fn connect(&self, config: &BrokerConfig) -> Result<Arc<dyn BrokerClient>, BrokerError> {
        let uri = config.uri();
        self.state.calls.lock().unwrap().push(BrokerCall::Connect(uri.clone()));
        if self.state.refuse.load(Ordering::SeqCst) {
            return Err(BrokerError::Connect {
                uri,
                reason: "connection refused".into(),
            });
        }
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockBrokerClient {
            state: self.state.clone(),
        }))
    }
}

struct MockBrokerClient {
    state: Arc<BrokerState>,
}

#[async_trait]
impl BrokerClient for MockBrokerClient {
    async fn subscribe(&self, topic: &str, _qos: QoS, handler: MessageHandler) -> Result<(), BrokerError> {
        self.state.calls.lock().unwrap().push(BrokerCall::Subscribe(topic.to_string()));
        if self.state.failing_topics.lock().unwrap().contains(topic) {
            return Err(BrokerError::Request(format!("subscribe {} rejected", topic)));
        }
        self.state.routes.lock().unwrap().insert(topic.to_string(), handler);
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), BrokerError> {
        self.state.calls.lock().unwrap().push(BrokerCall::Unsubscribe(topic.to_string()));
        self.state.routes.lock().unwrap().remove(topic);
        Ok(())
    }

    async fn disconnect(&self, _timeout: Duration) -> Result<(), BrokerError> {
        self.state.calls.lock().unwrap().push(BrokerCall::Disconnect);
        self.state.routes.lock().unwrap().clear();
        Ok(())
    }
}

/// One record seen by a writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Write {
    pub bucket: String,
    /// Which database connection (1-based) produced the writer.
    pub connection: usize,
    pub record: Vec<u8>,
}

#[derive(Default)]
struct DatabaseState {
    buckets: Mutex<BTreeSet<String>>,
    writes: Mutex<Vec<Write>>,
    closed: Mutex<Vec<(String, usize)>>,
    reject: AtomicBool,
    connects: AtomicUsize,
}

/// Recording database.
#[derive(Clone, Default)]
pub struct MockDatabase {
    state: Arc<DatabaseState>,
}

impl MockDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every connect attempt fail the credential check.
    pub fn reject_credential(&self, reject: bool) {
        self.state.reject.store(reject, Ordering::SeqCst);
    }

    pub fn buckets(&self) -> BTreeSet<String> {
        self.state.buckets.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<Write> {
        self.state.writes.lock().unwrap().clone()
    }

    /// `(bucket, connection)` of every closed writer.
    pub fn closed(&self) -> Vec<(String, usize)> {
        self.state.closed.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatabaseConnector for MockDatabase {
    async fn connect(&self, _config: &DatabaseConfig) -> Result<Arc<dyn DatabaseClient>, DatabaseError> {
        if self.state.reject.load(Ordering::SeqCst) {
            return Err(DatabaseError::Unauthorized(401));
        }
        let connection = self.state.connects.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Arc::new(MockDatabaseClient {
            state: self.state.clone(),
            connection,
        }))
    }
}

struct MockDatabaseClient {
    state: Arc<DatabaseState>,
    connection: usize,
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn create_bucket_if_absent(&self, name: &str, _org: &str) -> Result<BucketStatus, DatabaseError> {
        if self.state.buckets.lock().unwrap().insert(name.to_string()) {
            Ok(BucketStatus::Created)
        } else {
            Ok(BucketStatus::Existing)
        }
    }

    fn writer(&self, _org: &str, bucket: &str) -> Arc<dyn WriteHandle> {
        Arc::new(MockWriter {
            state: self.state.clone(),
            bucket: bucket.to_string(),
            connection: self.connection,
            closed: AtomicBool::new(false),
        })
    }
}

struct MockWriter {
    state: Arc<DatabaseState>,
    bucket: String,
    connection: usize,
    closed: AtomicBool,
}

impl WriteHandle for MockWriter {
    fn write(&self, record: Vec<u8>) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        self.state.writes.lock().unwrap().push(Write {
            bucket: self.bucket.clone(),
            connection: self.connection,
            record,
        });
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state
                .closed
                .lock()
                .unwrap()
                .push((self.bucket.clone(), self.connection));
        }
    }
}
