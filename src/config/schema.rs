//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! Every field decodes with a default so a partial document still produces a
//! value; required fields are enforced by `validation.rs`.

use serde::{Deserialize, Serialize};

use crate::diff::Projection;

/// Root configuration for the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PigeonConfig {
    /// Message broker the devices publish to.
    pub broker: BrokerConfig,

    /// Time-series database the telemetry is forwarded to.
    pub database: DatabaseConfig,

    /// Sites and their devices, in document order.
    pub sites: Vec<SiteConfig>,
}

impl PigeonConfig {
    /// Derive the `site -> topics` projection used for diffing.
    pub fn map(&self) -> Projection {
        self.sites
            .iter()
            .map(|site| (site.name.clone(), site.topics().collect()))
            .collect()
    }

    /// Look up a site by name.
    pub fn site(&self, name: &str) -> Option<&SiteConfig> {
        self.sites.iter().find(|s| s.name == name)
    }
}

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Hostname or IP address of the broker.
    pub address: String,

    /// Broker port (e.g. 1883).
    pub port: u16,

    /// Client identifier presented on connect.
    pub client_id: String,

    /// Delivery quality of service for every subscription (0, 1 or 2).
    pub qos: u8,

    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u64,
}

impl BrokerConfig {
    /// Broker URI, used for logging.
    pub fn uri(&self) -> String {
        format!("tcp://{}:{}", self.address, self.port)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            port: 0,
            client_id: "pigeon".to_string(),
            qos: 1,
            keep_alive_secs: 30,
        }
    }
}

/// Database connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Hostname or IP address of the database.
    pub address: String,

    /// HTTP API port.
    pub port: u16,

    /// Use HTTPS instead of HTTP.
    pub tls: bool,

    /// Organization owning the buckets.
    pub org: String,

    /// Write credential.
    pub token: String,
}

impl DatabaseConfig {
    /// Base URI of the database HTTP API.
    pub fn uri(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.address, self.port)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            port: 8086,
            tls: false,
            org: String::new(),
            token: String::new(),
        }
    }
}

/// A site groups devices that share one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SiteConfig {
    /// Unique site name; also the bucket name.
    pub name: String,

    /// Device identifiers publishing under this site.
    pub devices: Vec<String>,
}

impl SiteConfig {
    /// Broker topics for this site, one per device (`"{site}/{device}"`).
    pub fn topics(&self) -> impl Iterator<Item = String> + '_ {
        self.devices
            .iter()
            .map(move |device| format!("{}/{}", self.name, device))
    }
}
