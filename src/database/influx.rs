//! InfluxDB v2 adapter over the HTTP API.
//!
//! # Responsibilities
//! - Resolve the organization id and validate the write credential on connect
//! - Create buckets idempotently
//! - Provide non-blocking per-bucket writers that batch records in the background

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use url::Url;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::database::{BucketStatus, DatabaseClient, DatabaseConnector, DatabaseError, WriteHandle};
use crate::observability::metrics;

/// Records posted in one write request at most.
const MAX_BATCH: usize = 500;

#[derive(Debug, Deserialize)]
struct OrgList {
    #[serde(default)]
    orgs: Vec<Resource>,
}

#[derive(Debug, Deserialize)]
struct Resource {
    id: String,
}

/// Connects to InfluxDB and checks the credential can create buckets.
#[derive(Debug, Clone)]
pub struct InfluxConnector {
    request_timeout: Duration,
    queue_capacity: usize,
}

impl InfluxConnector {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            request_timeout,
            queue_capacity: 10_000,
        }
    }
}

impl Default for InfluxConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl DatabaseConnector for InfluxConnector {
    async fn connect(&self, config: &DatabaseConfig) -> Result<Arc<dyn DatabaseClient>, DatabaseError> {
        let base = Url::parse(&config.uri()).map_err(|e| DatabaseError::Address(e.to_string()))?;
        let http = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| DatabaseError::Unreachable(e.to_string()))?;

        let client = InfluxClient {
            http,
            base,
            token: config.token.clone(),
            org_ids: DashMap::new(),
            queue_capacity: self.queue_capacity,
        };

        let org_id = client.org_id(&config.org).await?;
        client.verify_write(&org_id).await?;

        tracing::info!(uri = %config.uri(), org = %config.org, "Connected to database");
        Ok(Arc::new(client))
    }
}

/// InfluxDB HTTP client bound to one address and credential.
pub struct InfluxClient {
    http: reqwest::Client,
    base: Url,
    token: String,
    org_ids: DashMap<String, String>,
    queue_capacity: usize,
}

impl InfluxClient {
    fn endpoint(&self, path: &str) -> Result<Url, DatabaseError> {
        self.base
            .join(path)
            .map_err(|e| DatabaseError::Address(e.to_string()))
    }

    fn auth(&self) -> String {
        format!("Token {}", self.token)
    }

    async fn org_id(&self, org: &str) -> Result<String, DatabaseError> {
        if let Some(id) = self.org_ids.get(org) {
            return Ok(id.clone());
        }

        let mut url = self.endpoint("api/v2/orgs")?;
        url.query_pairs_mut().append_pair("org", org);
        let response = self
            .http
            .get(url)
            .header(AUTHORIZATION, self.auth())
            .send()
            .await
            .map_err(|e| DatabaseError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(DatabaseError::UnknownOrganization(org.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DatabaseError::from_status(status.as_u16(), body));
        }

        let list: OrgList = response
            .json()
            .await
            .map_err(|e| DatabaseError::Decode(e.to_string()))?;
        let id = list
            .orgs
            .into_iter()
            .next()
            .map(|o| o.id)
            .ok_or_else(|| DatabaseError::UnknownOrganization(org.to_string()))?;

        self.org_ids.insert(org.to_string(), id.clone());
        Ok(id)
    }

    async fn create_bucket(&self, name: &str, org_id: &str) -> Result<String, DatabaseError> {
        let response = self
            .http
            .post(self.endpoint("api/v2/buckets")?)
            .header(AUTHORIZATION, self.auth())
            .json(&serde_json::json!({
                "orgID": org_id,
                "name": name,
                "retentionRules": [],
            }))
            .send()
            .await
            .map_err(|e| DatabaseError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::CONFLICT || status == StatusCode::UNPROCESSABLE_ENTITY {
            return Err(DatabaseError::AlreadyExists(name.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DatabaseError::from_status(status.as_u16(), body));
        }

        let bucket: Resource = response
            .json()
            .await
            .map_err(|e| DatabaseError::Decode(e.to_string()))?;
        Ok(bucket.id)
    }

    async fn delete_bucket(&self, id: &str) -> Result<(), DatabaseError> {
        let response = self
            .http
            .delete(self.endpoint(&format!("api/v2/buckets/{}", id))?)
            .header(AUTHORIZATION, self.auth())
            .send()
            .await
            .map_err(|e| DatabaseError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(DatabaseError::from_status(status.as_u16(), body))
        }
    }

    /// Create and delete a uniquely named bucket to prove write access.
    async fn verify_write(&self, org_id: &str) -> Result<(), DatabaseError> {
        let probe = format!("pigeon-auth-test-{}", Uuid::new_v4());
        let id = self.create_bucket(&probe, org_id).await?;
        if let Err(e) = self.delete_bucket(&id).await {
            tracing::warn!(bucket = %probe, error = %e, "Failed to delete credential probe bucket");
        }
        Ok(())
    }
}

#[async_trait]
impl DatabaseClient for InfluxClient {
    async fn create_bucket_if_absent(&self, name: &str, org: &str) -> Result<BucketStatus, DatabaseError> {
        let org_id = self.org_id(org).await?;
        match self.create_bucket(name, &org_id).await {
            Ok(_) => {
                tracing::info!(bucket = %name, "Bucket created");
                Ok(BucketStatus::Created)
            }
            Err(DatabaseError::AlreadyExists(_)) => {
                tracing::debug!(bucket = %name, "Bucket already exists");
                Ok(BucketStatus::Existing)
            }
            Err(e) => Err(e),
        }
    }

    fn writer(&self, org: &str, bucket: &str) -> Arc<dyn WriteHandle> {
        let mut url = self.base.clone();
        url.set_path("api/v2/write");
        url.query_pairs_mut()
            .append_pair("org", org)
            .append_pair("bucket", bucket)
            .append_pair("precision", "ns");

        let (tx, rx) = mpsc::channel(self.queue_capacity);
        tokio::spawn(flush(self.http.clone(), url, self.auth(), bucket.to_string(), rx));

        Arc::new(InfluxWriter {
            bucket: bucket.to_string(),
            tx: Mutex::new(Some(tx)),
        })
    }
}

/// Queue-backed writer for one bucket.
pub struct InfluxWriter {
    bucket: String,
    tx: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
}

impl WriteHandle for InfluxWriter {
    fn write(&self, record: Vec<u8>) {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = tx.as_ref() else {
            tracing::debug!(bucket = %self.bucket, "Write on closed writer dropped");
            return;
        };
        match tx.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!(bucket = %self.bucket, "Write queue full, record dropped");
                metrics::record_write_dropped(&self.bucket);
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(bucket = %self.bucket, "Writer task stopped, record dropped");
            }
        }
    }

    fn close(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

async fn flush(
    http: reqwest::Client,
    url: Url,
    auth: String,
    bucket: String,
    mut rx: mpsc::Receiver<Vec<u8>>,
) {
    while let Some(first) = rx.recv().await {
        let mut body = first;
        let mut count = 1;
        while count < MAX_BATCH {
            match rx.try_recv() {
                Ok(record) => {
                    body.push(b'\n');
                    body.extend_from_slice(&record);
                    count += 1;
                }
                Err(_) => break,
            }
        }

        let result = http
            .post(url.clone())
            .header(AUTHORIZATION, auth.as_str())
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                tracing::trace!(bucket = %bucket, records = count, "Records written");
            }
            Ok(response) => {
                tracing::warn!(bucket = %bucket, status = %response.status(), records = count, "Write rejected");
            }
            Err(e) => {
                tracing::warn!(bucket = %bucket, error = %e, records = count, "Write failed");
            }
        }
    }
    tracing::debug!(bucket = %bucket, "Writer closed");
}
