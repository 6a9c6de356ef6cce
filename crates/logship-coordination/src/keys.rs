//! Key Layout
//!
//! Every piece of coordination state lives in the shared store under a key
//! derived from the consumer scope and the partition id:
//!
//! ```text
//! {namespace}/{stream}/{consumer_group}/ownership/{partition_id}
//! {namespace}/{stream}/{consumer_group}/checkpoint/{partition_id}
//! ```
//!
//! All segments are lowercased, so two workers that spell the same event hub
//! `Orders` and `orders` still contend for the same objects.

use object_store::path::PathPart;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

const OWNERSHIP_SEGMENT: &str = "ownership";
const CHECKPOINT_SEGMENT: &str = "checkpoint";

/// The `(namespace, stream_id, consumer_group)` triple that isolates one set
/// of workers' state from every other group reading the same stream.
///
/// Identifiers are kept exactly as supplied so they can be echoed back in
/// records; only the derived keys are normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConsumerScope {
    pub namespace: String,
    pub stream_id: String,
    pub consumer_group: String,
}

impl ConsumerScope {
    pub fn new(
        namespace: impl Into<String>,
        stream_id: impl Into<String>,
        consumer_group: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            stream_id: stream_id.into(),
            consumer_group: consumer_group.into(),
        }
    }

    /// Prefix under which all ownership objects for this scope live.
    pub fn ownership_prefix(&self) -> String {
        self.prefix(OWNERSHIP_SEGMENT)
    }

    /// Prefix under which all checkpoint objects for this scope live.
    pub fn checkpoint_prefix(&self) -> String {
        self.prefix(CHECKPOINT_SEGMENT)
    }

    pub fn ownership_key(&self, partition_id: &str) -> String {
        format!(
            "{}/{}",
            self.ownership_prefix(),
            partition_id.to_lowercase()
        )
    }

    pub fn checkpoint_key(&self, partition_id: &str) -> String {
        format!(
            "{}/{}",
            self.checkpoint_prefix(),
            partition_id.to_lowercase()
        )
    }

    /// True if both scopes address the same keys.
    pub fn same_keyspace(&self, other: &ConsumerScope) -> bool {
        self.prefix("") == other.prefix("")
    }

    fn prefix(&self, kind: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.namespace.to_lowercase(),
            self.stream_id.to_lowercase(),
            self.consumer_group.to_lowercase(),
            kind
        )
    }
}

/// Check that `partition_id` maps to exactly one key segment and reads back
/// unchanged from a listing.
///
/// Rejects empty ids, ids containing `/`, and ids the object store would
/// percent-encode (`%`, `#`, `.`, `..`, control characters and the like).
pub fn validate_partition_id(partition_id: &str) -> StoreResult<()> {
    let segment = partition_id.to_lowercase();
    let valid = !segment.is_empty()
        && !segment.contains('/')
        && PathPart::from(segment.as_str()).as_ref() == segment;

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidPartitionId(partition_id.to_string()))
    }
}

/// Extract the partition id from a key listed under `prefix`.
///
/// Returns `None` for keys outside the prefix or nested deeper than one
/// segment below it.
pub(crate) fn partition_id_from_key<'a>(prefix: &str, key: &'a str) -> Option<&'a str> {
    let rest = key.strip_prefix(prefix)?.strip_prefix('/')?;
    if rest.is_empty() || rest.contains('/') {
        return None;
    }
    Some(rest)
}
