use std::time::Duration;

use reqwest::{Client, ClientBuilder};
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::response::{self, SendResult};
use crate::buffer::Payload;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("HTTP error: {status} - {body}")]
    HttpError { status: u16, body: String },
    #[error("Unreadable bulk response: {0}")]
    MalformedResponse(#[from] serde_json::Error),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    pub timeout: Duration,
    pub connection_timeout: Duration,
    pub max_connections: usize,
    pub keep_alive_timeout: Duration,
    pub user_agent: String,
    pub enable_compression: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9200".to_string(),
            timeout: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
            max_connections: 8,
            keep_alive_timeout: Duration::from_secs(60),
            user_agent: concat!("frakt-log-shipper/", env!("CARGO_PKG_VERSION")).to_string(),
            enable_compression: true,
        }
    }
}

/// Seam between the shipper and the remote endpoint, mockable in tests.
///
/// `ensure_template` is the one-time "register schema if needed" hook the
/// shipper invokes before its first real tick; backends that need no
/// provisioning keep the default no-op.
pub trait BulkSender: Send + Sync {
    fn send(
        &self,
        payload: &Payload,
    ) -> impl std::future::Future<Output = Result<SendResult, ClientError>> + Send;

    fn ensure_template(
        &self,
    ) -> impl std::future::Future<Output = Result<(), ClientError>> + Send {
        std::future::ready(Ok(()))
    }
}

/// reqwest-backed sender posting NDJSON batches to `{endpoint}/_bulk`.
#[derive(Debug, Clone)]
pub struct BulkClient {
    client: Client,
    config: ClientConfig,
    bulk_url: Url,
}

impl BulkClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let endpoint_url: Url = config.endpoint.parse().map_err(|e| {
            ClientError::InvalidConfiguration(format!("Invalid endpoint URL: {e}"))
        })?;

        let bulk_url = if config.endpoint.ends_with("/_bulk") {
            endpoint_url
        } else {
            let mut url = endpoint_url;
            if url.path().ends_with('/') {
                url.set_path(&format!("{}_bulk", url.path()));
            } else {
                url.set_path(&format!("{}/_bulk", url.path()));
            }
            url
        };

        let mut client_builder = ClientBuilder::new()
            .timeout(config.timeout)
            .connect_timeout(config.connection_timeout)
            .pool_max_idle_per_host(config.max_connections)
            .pool_idle_timeout(config.keep_alive_timeout)
            .user_agent(&config.user_agent);

        if config.enable_compression {
            client_builder = client_builder.gzip(true);
        }

        let client = client_builder.build().map_err(|e| {
            ClientError::InvalidConfiguration(format!("Failed to build HTTP client: {e}"))
        })?;

        Ok(Self {
            client,
            config,
            bulk_url,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    async fn post_bulk(&self, payload: &Payload) -> Result<SendResult, ClientError> {
        if payload.is_empty() {
            debug!("Nothing to send, skipping network call");
            return Ok(SendResult::empty());
        }

        let response = self
            .client
            .post(self.bulk_url.clone())
            .header("Content-Type", "application/x-ndjson")
            .body(payload.body())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::HttpError {
                status: status.as_u16(),
                body,
            });
        }

        let bulk: response::BulkResponse = serde_json::from_str(&body)?;
        if bulk.errors {
            debug!(items = bulk.items.len(), "Bulk response reported item errors");
        }
        let invalid = response::classify_items(payload, &bulk, &body);
        Ok(SendResult {
            status: Some(status.as_u16()),
            invalid,
            level_hint: response::level_hint(&bulk),
        })
    }
}

impl BulkSender for BulkClient {
    async fn send(&self, payload: &Payload) -> Result<SendResult, ClientError> {
        self.post_bulk(payload).await
    }
}
