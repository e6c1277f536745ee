//! MQTT adapter backed by `rumqttc`.
//!
//! # Responsibilities
//! - Establish the connection and wait for the broker's CONNACK
//! - Drive the event loop in a background task
//! - Route incoming publishes to the handler registered for their topic
//! - Restore subscriptions after the event loop reconnects

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use crate::broker::{BrokerClient, BrokerConnector, BrokerError, Message, MessageHandler, QoS};
use crate::config::BrokerConfig;

/// Pause before polling again after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

type Routes = Arc<DashMap<String, (QoS, MessageHandler)>>;

/// Connects to an MQTT broker.
#[derive(Debug, Clone)]
pub struct MqttConnector {
    connect_timeout: Duration,
}

impl MqttConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for MqttConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl BrokerConnector for MqttConnector {
    async fn connect(&self, config: &BrokerConfig) -> Result<Arc<dyn BrokerClient>, BrokerError> {
        let uri = config.uri();
        let mut options = MqttOptions::new(&config.client_id, &config.address, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));

        let (client, mut eventloop) = AsyncClient::new(options, 64);

        let handshake = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
                    Ok(_) => continue,
                    Err(e) => {
                        return Err(BrokerError::Connect {
                            uri: uri.clone(),
                            reason: e.to_string(),
                        })
                    }
                }
            }
        };

        let outcome = timeout(self.connect_timeout, handshake).await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(BrokerError::Timeout {
                    uri,
                    secs: self.connect_timeout.as_secs(),
                })
            }
        }

        tracing::info!(uri = %uri, client_id = %config.client_id, "Connected to broker");

        let routes: Routes = Arc::new(DashMap::new());
        let task = tokio::spawn(drive(eventloop, client.clone(), routes.clone(), uri.clone()));

        Ok(Arc::new(MqttClient {
            client,
            routes,
            task: Mutex::new(Some(task)),
            uri,
        }))
    }
}

/// A live MQTT connection.
pub struct MqttClient {
    client: AsyncClient,
    routes: Routes,
    task: Mutex<Option<JoinHandle<()>>>,
    uri: String,
}

#[async_trait]
impl BrokerClient for MqttClient {
    async fn subscribe(&self, topic: &str, qos: QoS, handler: MessageHandler) -> Result<(), BrokerError> {
        self.routes.insert(topic.to_string(), (qos, handler));
        self.client
            .subscribe(topic, qos.into())
            .await
            .map_err(|e| BrokerError::Request(e.to_string()))
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), BrokerError> {
        self.routes.remove(topic);
        self.client
            .unsubscribe(topic)
            .await
            .map_err(|e| BrokerError::Request(e.to_string()))
    }

    async fn disconnect(&self, limit: Duration) -> Result<(), BrokerError> {
        self.routes.clear();
        let result = self
            .client
            .disconnect()
            .await
            .map_err(|e| BrokerError::Request(e.to_string()));

        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(mut task) = task {
            if timeout(limit, &mut task).await.is_err() {
                tracing::warn!(uri = %self.uri, "Broker event loop did not stop in time, aborting");
                task.abort();
            }
        }
        tracing::info!(uri = %self.uri, "Disconnected from broker");
        result
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
    }
}

async fn drive(mut eventloop: EventLoop, client: AsyncClient, routes: Routes, uri: String) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let handler = routes.get(&publish.topic).map(|entry| entry.value().1.clone());
                match handler {
                    Some(handler) => handler(Message {
                        topic: publish.topic,
                        payload: publish.payload.to_vec(),
                    }),
                    None => tracing::trace!(topic = %publish.topic, "Publish on unrouted topic"),
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                // A fresh session has no subscriptions.
                tracing::info!(uri = %uri, topics = routes.len(), "Reconnected to broker, restoring subscriptions");
                for entry in routes.iter() {
                    if let Err(e) = client.try_subscribe(entry.key().as_str(), entry.value().0.into()) {
                        tracing::warn!(topic = %entry.key(), error = %e, "Failed to restore subscription");
                    }
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(uri = %uri, error = %e, "Broker connection error");
                sleep(RECONNECT_DELAY).await;
            }
        }
    }
}
