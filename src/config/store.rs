//! Current-configuration store.
//!
//! Holds the last configuration that passed validation behind an `ArcSwap`.
//! Readers take a snapshot (`Arc<PigeonConfig>`) and never observe a partial
//! update; writers validate a candidate before swapping it in.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::loader::{load_config, ConfigError};
use crate::config::schema::PigeonConfig;
use crate::config::validation::validate_config;

/// Result of a successful reload attempt.
#[derive(Debug)]
pub enum Reload {
    /// A new configuration is current; `previous` is the one it replaced.
    Applied {
        previous: Arc<PigeonConfig>,
        current: Arc<PigeonConfig>,
    },
    /// The source was momentarily unreadable; nothing changed.
    Skipped,
}

/// Atomically swappable, always-valid configuration.
pub struct ConfigStore {
    path: PathBuf,
    current: ArcSwap<PigeonConfig>,
}

impl ConfigStore {
    /// Load the initial configuration. Callers treat failure as fatal.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = load_config(path)?;
        tracing::info!(
            path = ?path,
            sites = config.sites.len(),
            broker = %config.broker.uri(),
            database = %config.database.uri(),
            "Configuration loaded"
        );
        Ok(Self {
            path: path.to_path_buf(),
            current: ArcSwap::from_pointee(config),
        })
    }

    /// Path of the configuration source.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the current configuration.
    pub fn current(&self) -> Arc<PigeonConfig> {
        self.current.load_full()
    }

    /// Validate `candidate` and make it current, returning the replaced snapshot.
    pub fn store(&self, candidate: PigeonConfig) -> Result<Arc<PigeonConfig>, ConfigError> {
        validate_config(&candidate).map_err(ConfigError::Validation)?;
        Ok(self.current.swap(Arc::new(candidate)))
    }

    /// Re-read the source and swap in the result if it is valid.
    ///
    /// Transient read failures yield `Reload::Skipped`; validation and parse
    /// failures are returned and leave the current configuration untouched.
    pub fn reload(&self) -> Result<Reload, ConfigError> {
        let candidate = match load_config(&self.path) {
            Ok(config) => config,
            Err(e) if e.is_transient() => {
                tracing::debug!(path = ?self.path, error = %e, "Configuration source not readable yet");
                return Ok(Reload::Skipped);
            }
            Err(e) => return Err(e),
        };
        let current = Arc::new(candidate);
        let previous = self.current.swap(current.clone());
        Ok(Reload::Applied { previous, current })
    }
}
