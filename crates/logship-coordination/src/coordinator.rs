//! Partition Coordinator
//!
//! The façade a consumption engine binds to. The engine drives rebalancing on
//! its own schedule by calling the four [`PartitionStateProvider`] methods;
//! the forwarding path calls [`PartitionCoordinator::record_checkpoint`] after
//! each successful batch.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use logship_coordination::{
//!     ConsumerScope, ObjectCoordinationStore, OwnershipRecord, PartitionCoordinator,
//!     PartitionStateProvider,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(
//! #     object_store: Arc<dyn object_store::ObjectStore>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(ObjectCoordinationStore::new(object_store));
//! let scope = ConsumerScope::new("contoso.servicebus.windows.net", "telemetry", "$Default");
//! let coordinator = PartitionCoordinator::new(store, scope.clone());
//! let cancel = CancellationToken::new();
//!
//! // Rebalance: see who owns what, then try to claim partition 0
//! let owned = coordinator.list_ownership(&cancel).await?;
//! let desired = vec![OwnershipRecord::unclaimed(&scope, "0", "worker-a")];
//! let claimed = coordinator.claim_ownership(desired, &cancel).await?;
//!
//! // Resume from the last checkpoint
//! let start = coordinator.get_checkpoint("0", &cancel).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Cancellation
//!
//! Every operation takes a `CancellationToken`. When it fires the in-flight
//! store call is dropped and the operation returns
//! [`CoordinationError::Cancelled`]. Each store write is atomic, so a
//! cancelled checkpoint either landed or did not. A cancelled multi-partition
//! claim may have committed some partitions; list ownership to find out which.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::checkpoint::CheckpointStore;
use crate::error::{CoordinationError, Result, StoreResult};
use crate::keys::ConsumerScope;
use crate::ownership::OwnershipRegistry;
use crate::store::CoordinationStore;
use crate::types::{CheckpointRecord, ClaimResult, OwnershipRecord};

/// Storage-backed ownership and checkpoint provider a consumption engine
/// needs for load balancing and recovery.
#[async_trait]
pub trait PartitionStateProvider: Send + Sync {
    /// Every ownership record for the provider's consumer scope.
    async fn list_ownership(&self, cancel: &CancellationToken) -> Result<Vec<OwnershipRecord>>;

    /// Attempt the desired claims. Only successfully claimed records come back
    /// in `claimed`; contention is silent and store faults land in `failed`.
    ///
    /// On cancellation the whole call returns `Cancelled`, including claims
    /// that already committed before the token fired. Those partitions are
    /// owned by the caller in the store; the next `list_ownership` shows them.
    async fn claim_ownership(
        &self,
        desired: Vec<OwnershipRecord>,
        cancel: &CancellationToken,
    ) -> Result<ClaimResult>;

    /// Every readable checkpoint for the provider's consumer scope.
    async fn list_checkpoints(&self, cancel: &CancellationToken) -> Result<Vec<CheckpointRecord>>;

    /// The checkpoint for one partition, `None` to start from the default position.
    async fn get_checkpoint(
        &self,
        partition_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<CheckpointRecord>>;
}

/// Binds an [`OwnershipRegistry`] and a [`CheckpointStore`] to one consumer scope.
///
/// Holds no state between calls; every listing and claim re-reads the store.
#[derive(Debug, Clone)]
pub struct PartitionCoordinator {
    scope: ConsumerScope,
    ownership: OwnershipRegistry,
    checkpoints: CheckpointStore,
}

impl PartitionCoordinator {
    pub fn new(store: Arc<dyn CoordinationStore>, scope: ConsumerScope) -> Self {
        Self {
            scope,
            ownership: OwnershipRegistry::new(Arc::clone(&store)),
            checkpoints: CheckpointStore::new(store),
        }
    }

    pub fn scope(&self) -> &ConsumerScope {
        &self.scope
    }

    /// Durably record that `partition_id` was forwarded up to `offset`.
    pub async fn record_checkpoint(
        &self,
        partition_id: &str,
        offset: i64,
        cancel: &CancellationToken,
    ) -> Result<CheckpointRecord> {
        cancellable(
            cancel,
            self.checkpoints
                .write_checkpoint(&self.scope, partition_id, offset),
        )
        .await
    }
}

#[async_trait]
impl PartitionStateProvider for PartitionCoordinator {
    async fn list_ownership(&self, cancel: &CancellationToken) -> Result<Vec<OwnershipRecord>> {
        cancellable(cancel, self.ownership.list_ownership(&self.scope)).await
    }

    async fn claim_ownership(
        &self,
        desired: Vec<OwnershipRecord>,
        cancel: &CancellationToken,
    ) -> Result<ClaimResult> {
        let requested = desired.len();
        let result = cancellable(cancel, async {
            Ok(self.ownership.claim_ownership(desired).await)
        })
        .await?;

        debug!(
            requested = requested,
            claimed = result.claimed.len(),
            failed = result.failed.len(),
            "Ownership claim cycle complete"
        );

        Ok(result)
    }

    async fn list_checkpoints(&self, cancel: &CancellationToken) -> Result<Vec<CheckpointRecord>> {
        cancellable(cancel, self.checkpoints.list_checkpoints(&self.scope)).await
    }

    async fn get_checkpoint(
        &self,
        partition_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<CheckpointRecord>> {
        cancellable(
            cancel,
            self.checkpoints.get_checkpoint(&self.scope, partition_id),
        )
        .await
    }
}

/// Run a store operation until it finishes or `cancel` fires.
async fn cancellable<T, F>(cancel: &CancellationToken, operation: F) -> Result<T>
where
    F: Future<Output = StoreResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CoordinationError::Cancelled),
        result = operation => result.map_err(CoordinationError::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ObjectCoordinationStore;
    use object_store::memory::InMemory;

    fn make_coordinator() -> PartitionCoordinator {
        let store = ObjectCoordinationStore::new(Arc::new(InMemory::new()));
        PartitionCoordinator::new(Arc::new(store), ConsumerScope::new("ns", "hub", "$Default"))
    }

    #[tokio::test]
    async fn test_coordinator_round_trip() {
        let coordinator = make_coordinator();
        let cancel = CancellationToken::new();
        let scope = coordinator.scope().clone();

        let claimed = coordinator
            .claim_ownership(vec![OwnershipRecord::unclaimed(&scope, "0", "w")], &cancel)
            .await
            .unwrap();
        assert!(claimed.is_claimed("0"));

        coordinator.record_checkpoint("0", 9, &cancel).await.unwrap();

        let owned = coordinator.list_ownership(&cancel).await.unwrap();
        let checkpoints = coordinator.list_checkpoints(&cancel).await.unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(checkpoints.len(), 1);
        assert_eq!(checkpoints[0].offset, 9);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let coordinator = make_coordinator();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = coordinator.list_ownership(&cancel).await.unwrap_err();
        assert!(err.is_cancelled());

        let err = coordinator
            .record_checkpoint("0", 1, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());

        // Nothing was written
        let fresh = CancellationToken::new();
        assert!(coordinator.get_checkpoint("0", &fresh).await.unwrap().is_none());
    }
}
