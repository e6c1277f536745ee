//! MQTT to InfluxDB bridge with hot-reloadable site configuration.

pub mod broker;
pub mod bus;
pub mod config;
pub mod database;
pub mod debounce;
pub mod diff;
pub mod flock;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use bus::ChangeBus;
pub use config::{ConfigStore, PigeonConfig};
pub use flock::Flock;
