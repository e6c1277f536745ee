//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! pigeon.toml
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → store.rs (atomic swap of Arc<PigeonConfig>)
//!
//! On file change or SIGHUP:
//!     watcher.rs receives a Trigger
//!     → run_once_per_period (cool-down)
//!     → ConfigStore::reload
//!     → ChangeBus::publish(previous, current)
//! ```
//!
//! # Design Decisions
//! - Only validated configurations ever become current
//! - Fields default during deserialization so validation, not serde, reports
//!   what is missing
//! - Invalid edits are logged and discarded; the service keeps running

pub mod loader;
pub mod schema;
pub mod store;
pub mod validation;
pub mod watcher;

pub use loader::ConfigError;
pub use schema::BrokerConfig;
pub use schema::DatabaseConfig;
pub use schema::PigeonConfig;
pub use schema::SiteConfig;
pub use store::ConfigStore;
pub use watcher::{ConfigWatcher, Trigger};
