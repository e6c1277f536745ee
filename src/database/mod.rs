//! Time-series database collaborator.
//!
//! # Data Flow
//! ```text
//! Flock startup / database-section change:
//!     DatabaseConnector::connect(&DatabaseConfig)
//!     → credential check
//!     → Arc<dyn DatabaseClient>
//!
//! Site becomes active:
//!     DatabaseClient::create_bucket_if_absent(site, org)
//!     → DatabaseClient::writer(org, site)
//!     → Arc<dyn WriteHandle> (fed by the site's Pigeon)
//! ```
//!
//! # Design Decisions
//! - Bucket name = site name
//! - An existing bucket is success (`BucketStatus::Existing`)
//! - Writes are non-blocking; handles queue and flush in the background

pub mod influx;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::DatabaseConfig;

pub use types::{BucketStatus, DatabaseError};

/// Opens database clients and validates the write credential.
#[async_trait]
pub trait DatabaseConnector: Send + Sync {
    async fn connect(&self, config: &DatabaseConfig) -> Result<Arc<dyn DatabaseClient>, DatabaseError>;
}

/// A database client bound to one set of connection parameters.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    async fn create_bucket_if_absent(&self, name: &str, org: &str) -> Result<BucketStatus, DatabaseError>;

    fn writer(&self, org: &str, bucket: &str) -> Arc<dyn WriteHandle>;
}

/// Per-bucket write channel.
pub trait WriteHandle: Send + Sync {
    /// Queue a record for writing. Never blocks.
    fn write(&self, record: Vec<u8>);

    /// Stop accepting records; queued records are still flushed.
    fn close(&self);
}
