//! Message broker collaborator.
//!
//! # Data Flow
//! ```text
//! Flock startup / broker-section change:
//!     BrokerConnector::connect(&BrokerConfig)
//!     → Arc<dyn BrokerClient> (live connection)
//!
//! Pigeon:
//!     BrokerClient::subscribe(topic, qos, handler)
//!     → broker delivers publishes on topic
//!     → handler(Message)
//! ```
//!
//! # Design Decisions
//! - The rest of the crate only sees these traits; `mqtt.rs` is the single
//!   production adapter and tests inject a recording double
//! - Handlers are registered per topic so delivery needs no wildcard matching

pub mod mqtt;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::BrokerConfig;

pub use types::{BrokerError, Message, MessageHandler, QoS};

/// Opens broker connections.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self, config: &BrokerConfig) -> Result<Arc<dyn BrokerClient>, BrokerError>;
}

/// A live broker connection.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    async fn subscribe(&self, topic: &str, qos: QoS, handler: MessageHandler) -> Result<(), BrokerError>;

    async fn unsubscribe(&self, topic: &str) -> Result<(), BrokerError>;

    /// Close the connection, waiting at most `timeout` for in-flight work.
    async fn disconnect(&self, timeout: Duration) -> Result<(), BrokerError>;
}
