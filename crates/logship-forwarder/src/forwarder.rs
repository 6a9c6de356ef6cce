//! Batch Forwarder
//!
//! Bridges one partition's event batch to the ingest sink and records the
//! checkpoint once the sink has accepted it.
//!
//! ```text
//! events ──decode──▶ sink.push(batch) ──ok──▶ record_checkpoint(last.offset)
//!                          │
//!                          └──err──▶ log, drop batch, checkpoint untouched
//! ```
//!
//! A failed push is never retried here and never propagated: the batch is
//! dropped and the checkpoint stays where it was, so a restart re-delivers it.

use std::sync::Arc;

use bytes::Bytes;
use logship_coordination::{CheckpointRecord, CoordinationError, PartitionCoordinator};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::SinkError;
use crate::sink::IngestSink;

/// One event received from a partition.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionEvent {
    /// Position within the partition, used as the checkpoint value.
    pub offset: i64,
    pub body: Bytes,
}

impl PartitionEvent {
    pub fn new(offset: i64, body: impl Into<Bytes>) -> Self {
        Self {
            offset,
            body: body.into(),
        }
    }

    /// Payload as text; invalid UTF-8 is replaced rather than rejected.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// What happened to a batch.
#[derive(Debug)]
pub enum BatchOutcome {
    /// Nothing to forward.
    Empty,
    /// Pushed and checkpointed.
    Forwarded {
        events: usize,
        checkpoint: CheckpointRecord,
    },
    /// The sink refused the batch; no checkpoint was written.
    Dropped(SinkError),
    /// Pushed, but the checkpoint write failed. The batch will be re-delivered
    /// after a restart.
    CheckpointFailed(CoordinationError),
    Cancelled,
}

impl BatchOutcome {
    pub fn is_forwarded(&self) -> bool {
        matches!(self, BatchOutcome::Forwarded { .. })
    }
}

/// Forwards partition batches to an [`IngestSink`] and checkpoints on success.
#[derive(Clone)]
pub struct BatchForwarder {
    instance_id: String,
    sink: Arc<dyn IngestSink>,
    coordinator: PartitionCoordinator,
}

impl BatchForwarder {
    pub fn new(
        instance_id: impl Into<String>,
        sink: Arc<dyn IngestSink>,
        coordinator: PartitionCoordinator,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            sink,
            coordinator,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn coordinator(&self) -> &PartitionCoordinator {
        &self.coordinator
    }

    /// Forward `events` for `partition_id` and checkpoint the last offset.
    ///
    /// Never fails: every failure is logged and reported in the outcome.
    pub async fn process_batch(
        &self,
        partition_id: &str,
        events: &[PartitionEvent],
        cancel: &CancellationToken,
    ) -> BatchOutcome {
        let Some(last) = events.last() else {
            return BatchOutcome::Empty;
        };

        debug!(
            instance_id = %self.instance_id,
            partition_id = %partition_id,
            events = events.len(),
            "Received batch"
        );

        let messages = events.iter().map(PartitionEvent::body_text).collect();

        let pushed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return BatchOutcome::Cancelled,
            result = self.sink.push(messages) => result,
        };

        if let Err(e) = pushed {
            self.log_push_failure(partition_id, &e);
            return BatchOutcome::Dropped(e);
        }

        debug!(
            instance_id = %self.instance_id,
            partition_id = %partition_id,
            offset = last.offset,
            "Writing checkpoint"
        );

        match self
            .coordinator
            .record_checkpoint(partition_id, last.offset, cancel)
            .await
        {
            Ok(checkpoint) => BatchOutcome::Forwarded {
                events: events.len(),
                checkpoint,
            },
            Err(CoordinationError::Cancelled) => BatchOutcome::Cancelled,
            Err(e) => {
                self.report_processing_error(Some(partition_id), "checkpoint write", &e);
                BatchOutcome::CheckpointFailed(e)
            }
        }
    }

    /// Log a failure raised by the consumption engine outside of batch
    /// processing (load balancing, partition initialization, ...).
    pub fn report_processing_error(
        &self,
        partition_id: Option<&str>,
        operation: &str,
        err: &dyn std::error::Error,
    ) {
        match partition_id {
            Some(partition_id) => error!(
                instance_id = %self.instance_id,
                partition_id = %partition_id,
                operation = %operation,
                error = %err,
                "Processing error"
            ),
            None => error!(
                instance_id = %self.instance_id,
                operation = %operation,
                error = %err,
                "Processing error"
            ),
        }
    }

    fn log_push_failure(&self, partition_id: &str, err: &SinkError) {
        if err.is_auth_failure() {
            error!(
                instance_id = %self.instance_id,
                partition_id = %partition_id,
                operation = "ingest push",
                "Ingest call unauthorized, credentials may be invalid or outdated"
            );
        } else {
            error!(
                instance_id = %self.instance_id,
                partition_id = %partition_id,
                operation = "ingest push",
                error = %err,
                "Failed to forward batch, dropping"
            );
        }
    }
}

impl std::fmt::Debug for BatchForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchForwarder")
            .field("instance_id", &self.instance_id)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}
