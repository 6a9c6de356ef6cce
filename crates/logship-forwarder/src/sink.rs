//! Ingest sink seam.

use async_trait::async_trait;

use crate::error::SinkResult;

/// Destination for decoded event batches.
///
/// One call carries one whole batch. Implementations decide their own retry
/// behavior; the forwarder never retries a failed push.
#[async_trait]
pub trait IngestSink: Send + Sync {
    async fn push(&self, events: Vec<String>) -> SinkResult<()>;
}
