//! logship Forwarder - Event Batches to LogScale
//!
//! Takes ordered event batches for one partition, pushes them to a LogScale
//! ingest endpoint, and records a checkpoint through
//! [`logship_coordination::PartitionCoordinator`] once the push succeeds.
//!
//! ## Components
//!
//! - **BatchForwarder**: decode, push, checkpoint; failures are logged and
//!   the batch dropped
//! - **IngestSink**: the one-method sink seam, implemented by `LogScaleClient`
//! - **RetryPolicy**: exponential backoff for transient ingest failures
//! - **RelayConfig**: environment-driven settings and derived clients
//!
//! ## Wiring
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use logship_coordination::{ObjectCoordinationStore, PartitionCoordinator};
//! use logship_forwarder::{BatchForwarder, LogScaleClient, RelayConfig};
//!
//! # fn wire() -> Result<BatchForwarder, Box<dyn std::error::Error>> {
//! let config = RelayConfig::from_env()?;
//! let store = Arc::new(ObjectCoordinationStore::new(config.build_object_store()?));
//! let coordinator = PartitionCoordinator::new(store, config.consumer_scope());
//! let sink = Arc::new(LogScaleClient::new(config.logscale_config())?);
//!
//! Ok(BatchForwarder::new(config.replica_name.clone(), sink, coordinator))
//! # }
//! ```

pub mod config;
pub mod error;
pub mod forwarder;
pub mod logscale;
pub mod retry;
pub mod sink;

pub use config::RelayConfig;
pub use error::{ConfigError, ConfigResult, SinkError, SinkResult};
pub use forwarder::{BatchForwarder, BatchOutcome, PartitionEvent};
pub use logscale::{LogScaleClient, LogScaleConfig, UnstructuredEnvelope};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use sink::IngestSink;
