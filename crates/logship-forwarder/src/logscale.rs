//! LogScale Unstructured Ingest Client
//!
//! Pushes raw text events to `POST {base_url}/api/v1/ingest/humio-unstructured`
//! with a bearer ingest token. Every push sends a single envelope:
//!
//! ```text
//! [{"messages": ["line 1", "line 2"], "fields": {"eventhub-timestamp": "14:03:07.215"}}]
//! ```
//!
//! Transient failures are retried per [`RetryPolicy`]; 401/403 surface
//! immediately as [`SinkError::Unauthorized`].

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::error::{SinkError, SinkResult};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::sink::IngestSink;

pub const UNSTRUCTURED_INGEST_PATH: &str = "/api/v1/ingest/humio-unstructured";

/// Field stamped on every envelope with the UTC push time.
pub const TIMESTAMP_FIELD: &str = "eventhub-timestamp";

/// Connection settings for a LogScale ingest endpoint.
#[derive(Clone)]
pub struct LogScaleConfig {
    /// Host, with or without scheme. `https://` is assumed when missing.
    pub base_url: String,
    pub ingest_token: String,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    /// Parser type LogScale should apply, sent as the envelope's `type`.
    pub event_type: Option<String>,
    /// Static tags attached to every envelope.
    pub tags: Option<BTreeMap<String, String>>,
}

impl LogScaleConfig {
    pub fn new(base_url: impl Into<String>, ingest_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ingest_token: ingest_token.into(),
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(30),
            event_type: None,
            tags: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Full ingest URL for this endpoint.
    pub fn ingest_url(&self) -> String {
        format!(
            "{}{}",
            normalize_base_url(&self.base_url),
            UNSTRUCTURED_INGEST_PATH
        )
    }
}

impl fmt::Debug for LogScaleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogScaleConfig")
            .field("base_url", &self.base_url)
            .field("ingest_token", &"<redacted>")
            .field("retry", &self.retry)
            .field("request_timeout", &self.request_timeout)
            .field("event_type", &self.event_type)
            .field("tags", &self.tags)
            .finish()
    }
}

/// One element of the unstructured ingest request body.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UnstructuredEnvelope {
    pub messages: Vec<String>,
    pub fields: BTreeMap<String, String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
}

impl UnstructuredEnvelope {
    pub fn new(messages: Vec<String>, pushed_at: DateTime<Utc>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(
            TIMESTAMP_FIELD.to_string(),
            pushed_at.format("%H:%M:%S%.3f").to_string(),
        );
        Self {
            messages,
            fields,
            event_type: None,
            tags: None,
        }
    }
}

/// [`IngestSink`] backed by the LogScale HTTP API.
#[derive(Debug, Clone)]
pub struct LogScaleClient {
    config: LogScaleConfig,
    url: String,
    client: reqwest::Client,
}

impl LogScaleClient {
    pub fn new(config: LogScaleConfig) -> SinkResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SinkError::Transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(config, client))
    }

    /// Create with an injected reqwest client (useful for testing).
    pub fn with_client(config: LogScaleConfig, client: reqwest::Client) -> Self {
        let url = config.ingest_url();
        Self {
            config,
            url,
            client,
        }
    }

    pub fn ingest_url(&self) -> &str {
        &self.url
    }

    async fn send(&self, body: &[UnstructuredEnvelope]) -> SinkResult<()> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.config.ingest_token)
            .json(body)
            .send()
            .await
            .map_err(|e| SinkError::Transport(format!("LogScale request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body_text = response.text().await.unwrap_or_default();
        Err(SinkError::from_status(status.as_u16(), body_text))
    }
}

#[async_trait]
impl IngestSink for LogScaleClient {
    async fn push(&self, events: Vec<String>) -> SinkResult<()> {
        let count = events.len();
        let mut envelope = UnstructuredEnvelope::new(events, Utc::now());
        envelope.event_type = self.config.event_type.clone();
        envelope.tags = self.config.tags.clone();
        let body = [envelope];

        retry_with_backoff(&self.config.retry, || self.send(&body)).await?;

        debug!(events = count, "Pushed batch to LogScale");
        Ok(())
    }
}

/// Prepend `https://` when no scheme is given and drop trailing slashes.
pub fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}
