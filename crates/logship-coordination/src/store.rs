//! Coordination Store
//!
//! The coordination layer needs exactly four things from shared storage:
//!
//! | Operation                  | Semantics                                        |
//! |----------------------------|--------------------------------------------------|
//! | `write_if_absent`          | create, fail with `AlreadyExists` if present     |
//! | `write_if_version_matches` | replace, fail with `PreconditionFailed` on drift |
//! | `read_metadata`            | metadata + version, `None` when missing          |
//! | `list_by_prefix`           | every object (key, metadata, version, timestamp) |
//!
//! plus an unconditional `write` for checkpoints. [`CoordinationStore`] is that
//! contract; [`ObjectCoordinationStore`] implements it over any
//! `object_store::ObjectStore` backend that supports conditional puts (Azure
//! Blob, S3 with conditional put enabled, and `InMemory` for tests).
//!
//! ## Object Layout
//!
//! Each object's body is a small JSON map holding its metadata:
//!
//! ```text
//! ns/hub/group/ownership/0   -> {"ownerid":"worker-a"}
//! ns/hub/group/checkpoint/0  -> {"offset":"4096"}
//! ```
//!
//! The version token is the backend's ETag. Unparseable bodies read back as
//! empty metadata, leaving interpretation to the caller.

use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use object_store::path::Path;
use object_store::{ObjectMeta, ObjectStore, PutMode, PutOptions, PutPayload, UpdateVersion};
use tracing::{trace, warn};

use crate::error::{StoreError, StoreResult};

/// Object metadata, stored as string key/value pairs.
pub type Metadata = BTreeMap<String, String>;

/// Number of object bodies fetched concurrently while listing a prefix.
const LIST_FETCH_CONCURRENCY: usize = 16;

/// Version and timestamp the store assigned to a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredVersion {
    pub version: String,
    pub last_modified: DateTime<Utc>,
}

/// An object as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub metadata: Metadata,
    pub version: String,
    pub last_modified: DateTime<Utc>,
}

/// Conditional key/metadata store the coordination layer runs on.
///
/// Implementations must be strongly consistent: a conflict from
/// `write_if_absent` means the object really existed at call time, and a
/// conflict from `write_if_version_matches` means the version really changed.
/// Each write is atomic, so dropping an in-flight call leaves the object
/// either fully written or untouched.
#[async_trait]
pub trait CoordinationStore: Send + Sync + Debug {
    /// Create `key` only if no object exists there.
    async fn write_if_absent(&self, key: &str, metadata: &Metadata) -> StoreResult<StoredVersion>;

    /// Replace `key` only if its current version equals `expected_version`.
    async fn write_if_version_matches(
        &self,
        key: &str,
        metadata: &Metadata,
        expected_version: &str,
    ) -> StoreResult<StoredVersion>;

    /// Create or replace `key` unconditionally.
    async fn write(&self, key: &str, metadata: &Metadata) -> StoreResult<StoredVersion>;

    /// Read one object. Missing objects are `Ok(None)`.
    async fn read_metadata(&self, key: &str) -> StoreResult<Option<StoredObject>>;

    /// List every object under `prefix`.
    ///
    /// A failed scan is an error. An object that was listed but cannot be
    /// read is left out, so one bad partition never hides the others.
    async fn list_by_prefix(&self, prefix: &str) -> StoreResult<Vec<StoredObject>>;
}

/// [`CoordinationStore`] backed by an `object_store::ObjectStore`.
pub struct ObjectCoordinationStore {
    inner: Arc<dyn ObjectStore>,
}

impl ObjectCoordinationStore {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self { inner }
    }

    /// Get the underlying object store.
    pub fn inner(&self) -> &Arc<dyn ObjectStore> {
        &self.inner
    }

    async fn put(&self, key: &str, metadata: &Metadata, mode: PutMode) -> StoreResult<StoredVersion> {
        let location = Path::from(key);
        let body = serde_json::to_vec(metadata).map_err(|source| StoreError::Encoding {
            key: key.to_string(),
            source,
        })?;

        let is_update = matches!(mode, PutMode::Update(_));
        let opts = PutOptions {
            mode,
            ..Default::default()
        };

        trace!(key = %key, "ObjectCoordinationStore::put");

        let result = match self
            .inner
            .put_opts(&location, PutPayload::from(Bytes::from(body)), opts)
            .await
        {
            Ok(result) => result,
            Err(object_store::Error::AlreadyExists { .. }) => {
                return Err(StoreError::AlreadyExists(key.to_string()))
            }
            Err(object_store::Error::Precondition { .. }) => {
                return Err(StoreError::PreconditionFailed(key.to_string()))
            }
            // The object vanished between list and claim: the version we hold is stale.
            Err(object_store::Error::NotFound { .. }) if is_update => {
                return Err(StoreError::PreconditionFailed(key.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let version = result
            .e_tag
            .or(result.version)
            .ok_or_else(|| StoreError::MissingVersion(key.to_string()))?;

        let last_modified = self.committed_timestamp(&location, &version).await;

        Ok(StoredVersion {
            version,
            last_modified,
        })
    }

    /// Timestamp the backend recorded for the write that produced `version`.
    ///
    /// `PutResult` carries no timestamp, so this costs one HEAD per write. In
    /// exchange a claimed record's `last_modified` matches what a later listing
    /// reports, with no local clock skew. Claims are infrequent (one per
    /// partition per rebalance) so the extra round trip is acceptable.
    ///
    /// The write has already committed, so a failed or raced lookup falls back
    /// to the local clock instead of failing the operation.
    async fn committed_timestamp(&self, location: &Path, version: &str) -> DateTime<Utc> {
        match self.inner.head(location).await {
            Ok(meta) if meta.e_tag.as_deref() == Some(version) => meta.last_modified,
            _ => Utc::now(),
        }
    }

    async fn fetch(&self, key: String, location: &Path) -> StoreResult<Option<StoredObject>> {
        let result = match self.inner.get(location).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let meta = result.meta.clone();
        let body = match result.bytes().await {
            Ok(body) => body,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let Some(version) = version_of(&meta) else {
            return Err(StoreError::MissingVersion(key));
        };

        Ok(Some(StoredObject {
            metadata: decode_metadata(&key, &body),
            key,
            version,
            last_modified: meta.last_modified,
        }))
    }
}

impl Debug for ObjectCoordinationStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectCoordinationStore")
            .field("inner", &self.inner)
            .finish()
    }
}

#[async_trait]
impl CoordinationStore for ObjectCoordinationStore {
    async fn write_if_absent(&self, key: &str, metadata: &Metadata) -> StoreResult<StoredVersion> {
        self.put(key, metadata, PutMode::Create).await
    }

    async fn write_if_version_matches(
        &self,
        key: &str,
        metadata: &Metadata,
        expected_version: &str,
    ) -> StoreResult<StoredVersion> {
        let expected = UpdateVersion {
            e_tag: Some(expected_version.to_string()),
            version: None,
        };
        self.put(key, metadata, PutMode::Update(expected)).await
    }

    async fn write(&self, key: &str, metadata: &Metadata) -> StoreResult<StoredVersion> {
        self.put(key, metadata, PutMode::Overwrite).await
    }

    async fn read_metadata(&self, key: &str) -> StoreResult<Option<StoredObject>> {
        trace!(key = %key, "ObjectCoordinationStore::read_metadata");
        self.fetch(key.to_string(), &Path::from(key)).await
    }

    async fn list_by_prefix(&self, prefix: &str) -> StoreResult<Vec<StoredObject>> {
        let prefix_path = Path::from(prefix);
        trace!(prefix = %prefix_path, "ObjectCoordinationStore::list_by_prefix");

        let listed: Vec<ObjectMeta> = self.inner.list(Some(&prefix_path)).try_collect().await?;

        let objects: Vec<Option<StoredObject>> = futures::stream::iter(listed)
            .map(|meta| {
                let key = relative_key(prefix, &prefix_path, &meta.location);
                async move {
                    match self.fetch(key.clone(), &meta.location).await {
                        Ok(object) => object,
                        Err(e) => {
                            warn!(key = %key, error = %e, "Skipping unreadable object in listing");
                            None
                        }
                    }
                }
            })
            .buffered(LIST_FETCH_CONCURRENCY)
            .collect()
            .await;

        // Objects deleted between list and fetch, or unreadable, drop out.
        Ok(objects.into_iter().flatten().collect())
    }
}

fn version_of(meta: &ObjectMeta) -> Option<String> {
    meta.e_tag.clone().or_else(|| meta.version.clone())
}

/// Rebuild a listed key in terms of the caller's prefix spelling, so callers
/// can strip the prefix they passed in.
fn relative_key(prefix: &str, prefix_path: &Path, location: &Path) -> String {
    match location.prefix_match(prefix_path) {
        Some(parts) => {
            let rest: Vec<String> = parts.map(|p| p.as_ref().to_string()).collect();
            format!("{}/{}", prefix.trim_end_matches('/'), rest.join("/"))
        }
        None => location.to_string(),
    }
}

fn decode_metadata(key: &str, body: &[u8]) -> Metadata {
    if body.is_empty() {
        return Metadata::new();
    }
    match serde_json::from_slice::<Metadata>(body) {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!(key = %key, error = %e, "Ignoring unreadable object metadata");
            Metadata::new()
        }
    }
}
