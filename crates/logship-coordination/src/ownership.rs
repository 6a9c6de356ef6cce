//! Ownership Registry - Optimistic Partition Claims
//!
//! One object per partition under `{scope}/ownership/` records which worker
//! owns it. Workers never lock; they race on the store's conditional writes.
//!
//! ## How It Works
//!
//! 1. **List**: read every ownership object with its version token
//! 2. **Claim unowned** (no version): write-if-absent. Exactly one concurrent
//!    claimer succeeds, the rest see `AlreadyExists`.
//! 3. **Take over** (version known): write-if-version-matches. Fails with
//!    `PreconditionFailed` if anyone wrote the object since it was listed.
//!
//! Both failure modes mean "another worker got there first" and are skipped
//! silently. Records are never deleted; ownership moves by being re-claimed.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, warn};

use crate::error::StoreResult;
use crate::keys::{partition_id_from_key, validate_partition_id, ConsumerScope};
use crate::store::{CoordinationStore, Metadata};
use crate::types::{ClaimFailure, ClaimResult, OwnershipRecord};

/// Metadata key holding the owner's identifier.
pub const OWNER_ID_METADATA_KEY: &str = "ownerid";

/// Number of claim writes in flight at once within one batch claim.
const MAX_CONCURRENT_CLAIMS: usize = 8;

/// Storage-backed map of partition id to current owner.
#[derive(Debug, Clone)]
pub struct OwnershipRegistry {
    store: Arc<dyn CoordinationStore>,
}

impl OwnershipRegistry {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }

    /// List every ownership record in `scope`.
    ///
    /// A record with missing owner metadata is still returned (with an empty
    /// owner) so its version stays available for a takeover.
    pub async fn list_ownership(&self, scope: &ConsumerScope) -> StoreResult<Vec<OwnershipRecord>> {
        let prefix = scope.ownership_prefix();
        let objects = self.store.list_by_prefix(&prefix).await?;

        let records = objects
            .into_iter()
            .filter_map(|object| {
                let partition_id = partition_id_from_key(&prefix, &object.key)?.to_string();
                let owner_id = object
                    .metadata
                    .get(OWNER_ID_METADATA_KEY)
                    .cloned()
                    .unwrap_or_default();

                Some(OwnershipRecord {
                    namespace: scope.namespace.clone(),
                    stream_id: scope.stream_id.clone(),
                    consumer_group: scope.consumer_group.clone(),
                    partition_id,
                    owner_id,
                    version: Some(object.version),
                    last_modified: Some(object.last_modified),
                })
            })
            .collect::<Vec<_>>();

        debug!(
            prefix = %prefix,
            records = records.len(),
            "Listed partition ownership"
        );

        Ok(records)
    }

    /// Attempt every desired claim independently.
    ///
    /// Contention drops the partition from the result; store faults are
    /// collected per partition without affecting siblings.
    pub async fn claim_ownership(&self, desired: Vec<OwnershipRecord>) -> ClaimResult {
        let attempts: Vec<(String, StoreResult<Option<OwnershipRecord>>)> =
            futures::stream::iter(desired)
                .map(|record| async move {
                    let partition_id = record.partition_id.clone();
                    (partition_id, self.claim_one(record).await)
                })
                .buffered(MAX_CONCURRENT_CLAIMS)
                .collect()
                .await;

        let mut result = ClaimResult::default();
        for (partition_id, attempt) in attempts {
            match attempt {
                Ok(Some(record)) => result.claimed.push(record),
                Ok(None) => {}
                Err(error) => {
                    warn!(
                        partition_id = %partition_id,
                        error = %error,
                        "Failed to claim partition ownership"
                    );
                    result.failed.push(ClaimFailure {
                        partition_id,
                        error,
                    });
                }
            }
        }

        result
    }

    /// Claim a single partition.
    ///
    /// Returns `Ok(None)` when another worker won the race, and
    /// `InvalidPartitionId` without touching the store when the id cannot be
    /// a single key segment.
    pub async fn claim_one(&self, desired: OwnershipRecord) -> StoreResult<Option<OwnershipRecord>> {
        validate_partition_id(&desired.partition_id)?;
        let key = desired.scope().ownership_key(&desired.partition_id);

        let mut metadata = Metadata::new();
        metadata.insert(OWNER_ID_METADATA_KEY.to_string(), desired.owner_id.clone());

        let written = match desired.expected_version() {
            None => self.store.write_if_absent(&key, &metadata).await,
            Some(version) => {
                self.store
                    .write_if_version_matches(&key, &metadata, version)
                    .await
            }
        };

        match written {
            Ok(stored) => {
                debug!(
                    partition_id = %desired.partition_id,
                    owner_id = %desired.owner_id,
                    version = %stored.version,
                    "Claimed partition ownership"
                );
                Ok(Some(OwnershipRecord {
                    version: Some(stored.version),
                    last_modified: Some(stored.last_modified),
                    ..desired
                }))
            }
            Err(e) if e.is_conflict() => {
                debug!(
                    partition_id = %desired.partition_id,
                    owner_id = %desired.owner_id,
                    "Partition claimed by another owner"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
