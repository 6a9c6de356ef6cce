//! Checkpoint Store
//!
//! One object per partition under `{scope}/checkpoint/` holds the offset of
//! the last event that was fully forwarded. Writes are unconditional: only the
//! current owner forwards a partition, and it writes only after a successful
//! forward, so last-writer-wins never moves a checkpoint past unforwarded data.
//!
//! Objects whose `offset` is missing or not a decimal integer are treated as
//! "not yet checkpointed" everywhere: `get_checkpoint` returns `None` and
//! `list_checkpoints` leaves them out.

use std::sync::Arc;

use tracing::debug;

use crate::error::StoreResult;
use crate::keys::{partition_id_from_key, validate_partition_id, ConsumerScope};
use crate::store::{CoordinationStore, Metadata};
use crate::types::CheckpointRecord;

/// Metadata key holding the checkpointed offset as decimal text.
pub const OFFSET_METADATA_KEY: &str = "offset";

/// Storage-backed map of partition id to last forwarded offset.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    store: Arc<dyn CoordinationStore>,
}

impl CheckpointStore {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }

    pub async fn get_checkpoint(
        &self,
        scope: &ConsumerScope,
        partition_id: &str,
    ) -> StoreResult<Option<CheckpointRecord>> {
        let key = scope.checkpoint_key(partition_id);
        let Some(object) = self.store.read_metadata(&key).await? else {
            debug!(partition_id = %partition_id, "No checkpoint found");
            return Ok(None);
        };

        Ok(parse_offset(&object.metadata).map(|offset| {
            CheckpointRecord::new(scope, partition_id, offset, Some(object.last_modified))
        }))
    }

    pub async fn list_checkpoints(&self, scope: &ConsumerScope) -> StoreResult<Vec<CheckpointRecord>> {
        let prefix = scope.checkpoint_prefix();
        let objects = self.store.list_by_prefix(&prefix).await?;

        let checkpoints = objects
            .into_iter()
            .filter_map(|object| {
                let partition_id = partition_id_from_key(&prefix, &object.key)?;
                let offset = parse_offset(&object.metadata)?;
                Some(CheckpointRecord::new(
                    scope,
                    partition_id,
                    offset,
                    Some(object.last_modified),
                ))
            })
            .collect::<Vec<_>>();

        debug!(
            prefix = %prefix,
            checkpoints = checkpoints.len(),
            "Listed checkpoints"
        );

        Ok(checkpoints)
    }

    /// Overwrite the checkpoint for `partition_id`.
    ///
    /// Callers must only pass offsets whose events were already forwarded.
    /// Ids that cannot be a single key segment are rejected.
    pub async fn write_checkpoint(
        &self,
        scope: &ConsumerScope,
        partition_id: &str,
        offset: i64,
    ) -> StoreResult<CheckpointRecord> {
        validate_partition_id(partition_id)?;
        let key = scope.checkpoint_key(partition_id);

        let mut metadata = Metadata::new();
        metadata.insert(OFFSET_METADATA_KEY.to_string(), offset.to_string());

        let stored = self.store.write(&key, &metadata).await?;

        debug!(
            partition_id = %partition_id,
            offset = offset,
            "Checkpoint written"
        );

        Ok(CheckpointRecord::new(
            scope,
            partition_id,
            offset,
            Some(stored.last_modified),
        ))
    }
}

fn parse_offset(metadata: &Metadata) -> Option<i64> {
    metadata.get(OFFSET_METADATA_KEY)?.trim().parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::ObjectCoordinationStore;
    use object_store::memory::InMemory;

    fn scope() -> ConsumerScope {
        ConsumerScope::new("ns", "hub", "$Default")
    }

    fn make_stores() -> (CheckpointStore, Arc<dyn CoordinationStore>) {
        let store: Arc<dyn CoordinationStore> =
            Arc::new(ObjectCoordinationStore::new(Arc::new(InMemory::new())));
        (CheckpointStore::new(Arc::clone(&store)), store)
    }

    fn raw(key: &str, value: &str) -> Metadata {
        let mut m = Metadata::new();
        m.insert(key.to_string(), value.to_string());
        m
    }

    // ----------------------------------------------------------------
    // Offset parsing
    // ----------------------------------------------------------------

    #[test]
    fn test_parse_offset() {
        assert_eq!(parse_offset(&raw("offset", "42")), Some(42));
        assert_eq!(parse_offset(&raw("offset", " 7 ")), Some(7));
        assert_eq!(parse_offset(&raw("offset", "-1")), Some(-1));
        assert_eq!(parse_offset(&raw("offset", "4x")), None);
        assert_eq!(parse_offset(&raw("offset", "")), None);
        assert_eq!(parse_offset(&raw("sequence", "42")), None);
    }

    // ----------------------------------------------------------------
    // Get / write
    // ----------------------------------------------------------------

    #[tokio::test]
    async fn test_get_missing_checkpoint() {
        let (checkpoints, _) = make_stores();
        assert!(checkpoints
            .get_checkpoint(&scope(), "0")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_write_then_get() {
        let (checkpoints, _) = make_stores();
        let written = checkpoints.write_checkpoint(&scope(), "0", 128).await.unwrap();
        assert_eq!(written.offset, 128);

        let read = checkpoints
            .get_checkpoint(&scope(), "0")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read.offset, 128);
        assert_eq!(read.partition_id, "0");
        assert_eq!(read.consumer_group, "$Default");
    }

    #[tokio::test]
    async fn test_write_is_last_writer_wins() {
        let (checkpoints, _) = make_stores();
        checkpoints.write_checkpoint(&scope(), "0", 500).await.unwrap();
        checkpoints.write_checkpoint(&scope(), "0", 200).await.unwrap();

        let read = checkpoints
            .get_checkpoint(&scope(), "0")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read.offset, 200);
    }

    #[tokio::test]
    async fn test_get_malformed_offset_is_absent() {
        let (checkpoints, store) = make_stores();
        store
            .write(&scope().checkpoint_key("1"), &raw("offset", "not-a-number"))
            .await
            .unwrap();

        assert!(checkpoints
            .get_checkpoint(&scope(), "1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_write_rejects_unstorable_partition_id() {
        let (checkpoints, store) = make_stores();
        for id in ["", "a/b", "50%"] {
            let err = checkpoints.write_checkpoint(&scope(), id, 1).await.unwrap_err();
            assert!(matches!(err, StoreError::InvalidPartitionId(_)));
        }
        assert!(store
            .list_by_prefix(&scope().checkpoint_prefix())
            .await
            .unwrap()
            .is_empty());
    }

    // ----------------------------------------------------------------
    // Listing
    // ----------------------------------------------------------------

    #[tokio::test]
    async fn test_list_excludes_records_without_offset() {
        let (checkpoints, store) = make_stores();
        checkpoints.write_checkpoint(&scope(), "0", 10).await.unwrap();
        store
            .write(&scope().checkpoint_key("1"), &Metadata::new())
            .await
            .unwrap();

        let listed = checkpoints.list_checkpoints(&scope()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].partition_id, "0");
        assert_eq!(listed[0].offset, 10);
    }

    #[tokio::test]
    async fn test_list_ignores_ownership_objects() {
        let (checkpoints, store) = make_stores();
        store
            .write(&scope().ownership_key("0"), &raw("ownerid", "worker-a"))
            .await
            .unwrap();

        assert!(checkpoints.list_checkpoints(&scope()).await.unwrap().is_empty());
    }
}
