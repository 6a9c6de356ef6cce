//! Coordination records exchanged with the consumption engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::keys::ConsumerScope;

/// Durable claim asserting which worker currently owns a partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipRecord {
    pub namespace: String,
    pub stream_id: String,
    pub consumer_group: String,
    pub partition_id: String,
    pub owner_id: String,
    /// Store version token. `None` (or empty) means no record exists yet.
    pub version: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl OwnershipRecord {
    /// A desired claim on a partition believed to be unowned.
    pub fn unclaimed(
        scope: &ConsumerScope,
        partition_id: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            namespace: scope.namespace.clone(),
            stream_id: scope.stream_id.clone(),
            consumer_group: scope.consumer_group.clone(),
            partition_id: partition_id.into(),
            owner_id: owner_id.into(),
            version: None,
            last_modified: None,
        }
    }

    /// Re-target this record at a new owner, keeping the observed version so
    /// the claim is conditional on nothing having changed since the listing.
    pub fn take_over(&self, owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            ..self.clone()
        }
    }

    pub fn scope(&self) -> ConsumerScope {
        ConsumerScope::new(&self.namespace, &self.stream_id, &self.consumer_group)
    }

    /// The version to match on a conditional update, if any.
    pub fn expected_version(&self) -> Option<&str> {
        self.version.as_deref().filter(|v| !v.is_empty())
    }
}

/// Durable marker of the last fully-forwarded position within a partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub namespace: String,
    pub stream_id: String,
    pub consumer_group: String,
    pub partition_id: String,
    pub offset: i64,
    pub last_modified: Option<DateTime<Utc>>,
}

impl CheckpointRecord {
    pub fn new(
        scope: &ConsumerScope,
        partition_id: impl Into<String>,
        offset: i64,
        last_modified: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            namespace: scope.namespace.clone(),
            stream_id: scope.stream_id.clone(),
            consumer_group: scope.consumer_group.clone(),
            partition_id: partition_id.into(),
            offset,
            last_modified,
        }
    }
}

/// A claim attempt that failed with a store fault (not contention).
#[derive(Debug)]
pub struct ClaimFailure {
    pub partition_id: String,
    pub error: StoreError,
}

/// Result of a batch claim.
///
/// Partitions lost to contention appear in neither list.
#[derive(Debug, Default)]
pub struct ClaimResult {
    pub claimed: Vec<OwnershipRecord>,
    pub failed: Vec<ClaimFailure>,
}

impl ClaimResult {
    pub fn into_claimed(self) -> Vec<OwnershipRecord> {
        self.claimed
    }

    pub fn is_claimed(&self, partition_id: &str) -> bool {
        self.claimed.iter().any(|r| r.partition_id == partition_id)
    }
}
