//! Broker-facing types and error definitions.

use std::sync::Arc;

use thiserror::Error;

/// Delivery quality of service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl TryFrom<u8> for QoS {
    type Error = BrokerError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(BrokerError::InvalidQoS(other)),
        }
    }
}

impl From<QoS> for rumqttc::QoS {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
            QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
            QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
        }
    }
}

/// A message delivered on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Callback invoked for every message on a subscribed topic.
pub type MessageHandler = Arc<dyn Fn(Message) + Send + Sync>;

/// Errors raised by broker operations.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Connection could not be established.
    #[error("broker unreachable at {uri}: {reason}")]
    Connect { uri: String, reason: String },

    /// Connection handshake did not finish in time.
    #[error("broker at {uri} did not acknowledge the connection within {secs} seconds")]
    Timeout { uri: String, secs: u64 },

    /// Subscribe/unsubscribe/disconnect request failed.
    #[error("broker request failed: {0}")]
    Request(String),

    #[error("invalid QoS level {0}")]
    InvalidQoS(u8),
}
