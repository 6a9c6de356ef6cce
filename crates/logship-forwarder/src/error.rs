//! Error types for the forwarding path.
//!
//! `SinkError` keeps authorization failures apart from everything else so the
//! forwarder can tell an operator their ingest token is likely wrong.

use thiserror::Error;

/// Failure pushing a batch to the ingest sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink refused our credentials (HTTP 401 or 403).
    #[error("Unauthorized (HTTP {status})")]
    Unauthorized { status: u16 },

    /// The sink rejected the request for a non-auth reason.
    #[error("Rejected (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    /// The request never produced a response, or the retries ran out.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SinkError {
    /// True when retrying with the same credentials cannot succeed.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, SinkError::Unauthorized { .. })
    }

    /// Map a non-success HTTP status to the matching variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => SinkError::Unauthorized { status },
            _ => SinkError::Rejected { status, body },
        }
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(e: serde_json::Error) -> Self {
        SinkError::Serialization(e.to_string())
    }
}

/// Invalid or missing relay configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required '{0}'")]
    Missing(&'static str),

    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("Storage configuration error: {0}")]
    Storage(#[from] object_store::Error),
}

pub type SinkResult<T> = std::result::Result<T, SinkError>;

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
