//! Per-site subscription handle.
//!
//! # Responsibilities
//! - Track the topics currently subscribed on the broker for one site
//! - Subscribe/unsubscribe topics, recording only those the broker accepted
//! - Re-subscribe everything on a fresh broker connection

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::broker::{BrokerClient, MessageHandler, QoS};

/// Carries messages from one site's topics to its writer.
pub struct Pigeon {
    site: String,
    client: Arc<dyn BrokerClient>,
    topics: BTreeSet<String>,
    qos: QoS,
    callback: MessageHandler,
}

impl Pigeon {
    pub fn new(site: impl Into<String>, client: Arc<dyn BrokerClient>, qos: QoS, callback: MessageHandler) -> Self {
        Self {
            site: site.into(),
            client,
            topics: BTreeSet::new(),
            qos,
            callback,
        }
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    /// Topics currently subscribed.
    pub fn topics(&self) -> &BTreeSet<String> {
        &self.topics
    }

    pub fn qos(&self) -> QoS {
        self.qos
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Subscribe to `topics`. Returns how many subscriptions succeeded.
    pub async fn subscribe<'a>(&mut self, topics: impl IntoIterator<Item = &'a String>) -> usize {
        let mut subscribed = 0;
        for topic in topics {
            match self.client.subscribe(topic, self.qos, self.callback.clone()).await {
                Ok(()) => {
                    tracing::debug!(site = %self.site, topic = %topic, "Subscribed");
                    self.topics.insert(topic.clone());
                    subscribed += 1;
                }
                Err(e) => {
                    tracing::error!(site = %self.site, topic = %topic, error = %e, "Subscribe failed");
                }
            }
        }
        subscribed
    }

    /// Unsubscribe from `topics`. The topics are forgotten even if the broker
    /// request fails, since a failed connection holds no subscriptions.
    pub async fn unsubscribe<'a>(&mut self, topics: impl IntoIterator<Item = &'a String>) {
        for topic in topics {
            if !self.topics.remove(topic) {
                continue;
            }
            match self.client.unsubscribe(topic).await {
                Ok(()) => tracing::debug!(site = %self.site, topic = %topic, "Unsubscribed"),
                Err(e) => {
                    tracing::warn!(site = %self.site, topic = %topic, error = %e, "Unsubscribe failed");
                }
            }
        }
    }

    /// Move every topic onto a new broker connection.
    pub async fn rebind(&mut self, client: Arc<dyn BrokerClient>, qos: QoS) {
        self.client = client;
        self.qos = qos;
        let topics = std::mem::take(&mut self.topics);
        let wanted = topics.len();
        let subscribed = self.subscribe(&topics).await;
        if subscribed < wanted {
            tracing::error!(site = %self.site, wanted, subscribed, "Site only partially re-subscribed");
        }
    }

    /// Unsubscribe every remaining topic.
    pub async fn retire(mut self) {
        let topics = std::mem::take(&mut self.topics);
        for topic in &topics {
            if let Err(e) = self.client.unsubscribe(topic).await {
                tracing::warn!(site = %self.site, topic = %topic, error = %e, "Unsubscribe failed");
            }
        }
        tracing::info!(site = %self.site, "Pigeon retired");
    }
}
