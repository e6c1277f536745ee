//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Connect the broker, then the database, then subscribe every site
//! - Start the config watcher and the SIGHUP forwarder
//! - Serve configuration changes until shutdown or a fatal error
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The exit status tells operators which dependency failed

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::broker::BrokerConnector;
use crate::bus::ChangeBus;
use crate::config::{ConfigError, ConfigStore, ConfigWatcher};
use crate::database::DatabaseConnector;
use crate::flock::{Flock, FlockError, FlockSettings};
use crate::lifecycle::signals;
use crate::observability::metrics;

/// The broker could not be reached.
pub const EXIT_BROKER_UNREACHABLE: i32 = 1;
/// The database could not be reached or rejected the credential.
pub const EXIT_DATABASE_UNREACHABLE: i32 = 2;
/// The configuration file could not be loaded or watched.
pub const EXIT_CONFIG_INVALID: i32 = 3;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Flock(#[from] FlockError),

    #[error("failed to watch configuration: {0}")]
    Watch(#[from] notify::Error),
}

impl StartupError {
    pub fn exit_code(&self) -> i32 {
        match self {
            StartupError::Config(_) | StartupError::Watch(_) => EXIT_CONFIG_INVALID,
            StartupError::Flock(e) => e.exit_code(),
        }
    }
}

/// Process-level settings that do not live in the configuration file.
#[derive(Debug, Clone)]
pub struct Options {
    pub config_path: PathBuf,
    /// Cool-down window between reloads.
    pub debounce: Duration,
    /// Serve Prometheus metrics here when set.
    pub metrics_address: Option<SocketAddr>,
    pub flock: FlockSettings,
}

impl Options {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            debounce: Duration::from_millis(500),
            metrics_address: None,
            flock: FlockSettings::default(),
        }
    }
}

/// Run the service until Ctrl+C or a fatal error.
pub async fn run(
    options: Options,
    brokers: Arc<dyn BrokerConnector>,
    databases: Arc<dyn DatabaseConnector>,
) -> Result<(), StartupError> {
    let store = Arc::new(ConfigStore::load(&options.config_path)?);

    if let Some(addr) = options.metrics_address {
        metrics::init_metrics(addr);
    }

    let flock = Flock::start(&store, brokers, databases, options.flock).await?;

    let bus = Arc::new(ChangeBus::new());
    let watcher = ConfigWatcher::new(store.clone(), bus.clone(), options.debounce);
    let trigger = watcher.trigger();
    let _watcher = watcher.run()?;

    if let Err(e) = signals::forward_reloads(trigger) {
        tracing::warn!(error = %e, "SIGHUP reloads unavailable");
    }

    tokio::select! {
        result = flock.serve(bus) => result?,
        _ = signals::shutdown_signal() => {}
    }

    tracing::info!("pigeon stopped");
    Ok(())
}
