//! Reconciliation subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     BrokerConnector::connect   (failure → exit 1)
//!     DatabaseConnector::connect (failure → exit 2)
//!     audit(empty, current)
//!
//! ChangeBus::recv():
//!     Broker   → disconnect, reconnect, re-subscribe every active Pigeon
//!     Database → reconnect, swap every site's writer in place
//!     Sites    → audit(previous, current)
//!
//! audit:
//!     diff(previous.map(), current.map())
//!     → removals: unsubscribe, retire empty Pigeons and their writers
//!     → additions: bucket + writer + Pigeon for new sites, subscribe topics
//! ```
//!
//! # Design Decisions
//! - The Flock is owned by one task; only it mutates Pigeons and writer slots
//! - Teardown runs before rebuild within one audit
//! - Runtime rebuild failures are retried with backoff, then surfaced as fatal

pub mod pigeon;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::broker::{BrokerClient, BrokerConnector, BrokerError, Message, MessageHandler, QoS};
use crate::bus::{Change, ChangeBus, Section};
use crate::config::{BrokerConfig, ConfigStore, DatabaseConfig, PigeonConfig};
use crate::database::{DatabaseClient, DatabaseConnector, DatabaseError, WriteHandle};
use crate::diff::{diff, Projection};
use crate::lifecycle::startup::{EXIT_BROKER_UNREACHABLE, EXIT_DATABASE_UNREACHABLE};
use crate::observability::metrics;
use crate::resilience::backoff::RetryPolicy;

pub use pigeon::Pigeon;

/// Fatal reconciliation failures.
#[derive(Debug, Error)]
pub enum FlockError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl FlockError {
    /// Process exit status telling operators which dependency failed.
    pub fn exit_code(&self) -> i32 {
        match self {
            FlockError::Broker(_) => EXIT_BROKER_UNREACHABLE,
            FlockError::Database(_) => EXIT_DATABASE_UNREACHABLE,
        }
    }
}

/// Tunables for the reconciler.
#[derive(Debug, Clone, Copy)]
pub struct FlockSettings {
    /// How long a broker disconnect may take before the connection is dropped.
    pub disconnect_timeout: Duration,
    /// Retry policy for runtime reconnects.
    pub retry: RetryPolicy,
}

impl Default for FlockSettings {
    fn default() -> Self {
        Self {
            disconnect_timeout: Duration::from_millis(500),
            retry: RetryPolicy::default(),
        }
    }
}

/// The writer a site's messages currently go to.
struct SiteWriter(Arc<dyn WriteHandle>);

/// Shared between the Flock and a Pigeon's callback so the writer can be
/// replaced without touching the subscription.
type WriterSlot = Arc<ArcSwap<SiteWriter>>;

/// Owns the live broker connection, database client, Pigeons and writers.
pub struct Flock {
    brokers: Arc<dyn BrokerConnector>,
    databases: Arc<dyn DatabaseConnector>,
    settings: FlockSettings,
    broker: Arc<dyn BrokerClient>,
    broker_config: BrokerConfig,
    database: Arc<dyn DatabaseClient>,
    database_config: DatabaseConfig,
    active: BTreeMap<String, Pigeon>,
    writers: BTreeMap<String, WriterSlot>,
}

impl Flock {
    /// Connect both collaborators and subscribe every configured site.
    pub async fn start(
        store: &ConfigStore,
        brokers: Arc<dyn BrokerConnector>,
        databases: Arc<dyn DatabaseConnector>,
        settings: FlockSettings,
    ) -> Result<Self, FlockError> {
        let config = store.current();

        let broker = brokers.connect(&config.broker).await.map_err(|e| {
            tracing::error!(uri = %config.broker.uri(), error = %e, "pigeon cannot continue: broker unreachable");
            e
        })?;
        let database = databases.connect(&config.database).await.map_err(|e| {
            tracing::error!(uri = %config.database.uri(), error = %e, "pigeon cannot continue: database unreachable");
            e
        })?;

        let mut flock = Self {
            brokers,
            databases,
            settings,
            broker,
            broker_config: config.broker.clone(),
            database,
            database_config: config.database.clone(),
            active: BTreeMap::new(),
            writers: BTreeMap::new(),
        };
        flock.audit(&PigeonConfig::default(), &config).await;
        Ok(flock)
    }

    /// Apply changes from the bus for the lifetime of the process.
    pub async fn serve(mut self, bus: Arc<ChangeBus>) -> Result<(), FlockError> {
        tracing::info!(sites = self.active.len(), "Flock serving");
        loop {
            let (section, change) = bus.recv().await;
            self.apply(section, &change).await?;
        }
    }

    /// Apply one section change.
    pub async fn apply(&mut self, section: Section, change: &Change) -> Result<(), FlockError> {
        match section {
            Section::Broker => self.restart_broker(&change.current.broker).await,
            Section::Database => self.restart_database(&change.current.database).await,
            Section::Sites => {
                self.audit(&change.previous, &change.current).await;
                Ok(())
            }
        }
    }

    /// Converge Pigeons and writers from `previous`'s sites to `current`'s.
    pub async fn audit(&mut self, previous: &PigeonConfig, current: &PigeonConfig) {
        let delta = diff(&previous.map(), &current.map());
        if delta.is_empty() {
            tracing::debug!("Audit found no topic changes");
            return;
        }
        tracing::info!(
            add = delta.additions.values().map(|t| t.len()).sum::<usize>(),
            remove = delta.removals.values().map(|t| t.len()).sum::<usize>(),
            "Auditing sites"
        );

        for (site, topics) in &delta.removals {
            let Some(pigeon) = self.active.get_mut(site) else {
                continue;
            };
            pigeon.unsubscribe(topics).await;
            if pigeon.is_empty() {
                self.retire(site).await;
            }
        }

        for (site, topics) in &delta.additions {
            if !self.active.contains_key(site) {
                self.activate(site).await;
            }
            if let Some(pigeon) = self.active.get_mut(site) {
                pigeon.subscribe(topics).await;
                if pigeon.is_empty() {
                    self.retire(site).await;
                }
            }
        }

        self.record();
    }

    /// Live `site -> subscribed topics`.
    pub fn live_projection(&self) -> Projection {
        self.active
            .iter()
            .map(|(site, pigeon)| (site.clone(), pigeon.topics().clone()))
            .collect()
    }

    pub fn active_sites(&self) -> impl Iterator<Item = &str> {
        self.active.keys().map(String::as_str)
    }

    pub fn pigeon(&self, site: &str) -> Option<&Pigeon> {
        self.active.get(site)
    }

    /// Sites with a live writer.
    pub fn writer_sites(&self) -> impl Iterator<Item = &str> {
        self.writers.keys().map(String::as_str)
    }

    fn qos(&self) -> QoS {
        QoS::try_from(self.broker_config.qos).unwrap_or(QoS::AtLeastOnce)
    }

    async fn activate(&mut self, site: &str) {
        self.ensure_bucket(site).await;
        let slot: WriterSlot = Arc::new(ArcSwap::from_pointee(SiteWriter(
            self.database.writer(&self.database_config.org, site),
        )));
        let pigeon = Pigeon::new(site, self.broker.clone(), self.qos(), forward(site, slot.clone()));
        self.writers.insert(site.to_string(), slot);
        self.active.insert(site.to_string(), pigeon);
        tracing::info!(site = %site, "Site activated");
    }

    async fn retire(&mut self, site: &str) {
        if let Some(pigeon) = self.active.remove(site) {
            pigeon.retire().await;
        }
        if let Some(slot) = self.writers.remove(site) {
            slot.load().0.close();
        }
        tracing::info!(site = %site, "Site retired");
    }

    async fn ensure_bucket(&self, site: &str) {
        match self
            .database
            .create_bucket_if_absent(site, &self.database_config.org)
            .await
        {
            Ok(status) => tracing::debug!(site = %site, status = ?status, "Bucket ready"),
            Err(e) => tracing::error!(site = %site, error = %e, "Failed to create bucket, writes for this site will fail"),
        }
    }

    async fn restart_broker(&mut self, config: &BrokerConfig) -> Result<(), FlockError> {
        if *config == self.broker_config {
            tracing::debug!("Broker configuration unchanged, keeping connection");
            return Ok(());
        }
        tracing::info!(from = %self.broker_config.uri(), to = %config.uri(), "Broker configuration changed, restarting client");

        if let Err(e) = self.broker.disconnect(self.settings.disconnect_timeout).await {
            tracing::warn!(error = %e, "Broker disconnect failed");
        }

        let brokers = self.brokers.clone();
        let connector = &*brokers;
        let broker = self
            .settings
            .retry
            .retry("Broker reconnect", move || connector.connect(config))
            .await?;

        self.broker = broker;
        self.broker_config = config.clone();
        metrics::record_broker_restart();

        let qos = self.qos();
        for pigeon in self.active.values_mut() {
            pigeon.rebind(self.broker.clone(), qos).await;
        }
        self.record();
        Ok(())
    }

    async fn restart_database(&mut self, config: &DatabaseConfig) -> Result<(), FlockError> {
        if *config == self.database_config {
            tracing::debug!("Database configuration unchanged, keeping client");
            return Ok(());
        }
        tracing::info!(uri = %config.uri(), "Database configuration changed, rebuilding writers");

        let databases = self.databases.clone();
        let connector = &*databases;
        let database = self
            .settings
            .retry
            .retry("Database reconnect", move || connector.connect(config))
            .await?;

        self.database = database;
        self.database_config = config.clone();
        metrics::record_database_restart();

        for (site, slot) in &self.writers {
            self.ensure_bucket(site).await;
            let writer = self.database.writer(&self.database_config.org, site);
            let stale = slot.swap(Arc::new(SiteWriter(writer)));
            stale.0.close();
        }
        Ok(())
    }

    fn record(&self) {
        let subscriptions = self.active.values().map(|p| p.topics().len()).sum();
        metrics::record_flock(self.active.len(), subscriptions);
    }
}

/// Callback forwarding a site's messages, unchanged, to its current writer.
fn forward(site: &str, slot: WriterSlot) -> MessageHandler {
    let site = site.to_string();
    Arc::new(move |message: Message| {
        tracing::trace!(site = %site, topic = %message.topic, bytes = message.payload.len(), "Message received");
        metrics::record_message(&site);
        slot.load().0.write(message.payload);
    })
}
