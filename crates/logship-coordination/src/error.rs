//! Error types for logship coordination
//!
//! ## Error Categories
//!
//! ### Store Errors (`StoreError`)
//! - `AlreadyExists`: write-if-absent lost the race, the object was already there
//! - `PreconditionFailed`: write-if-version-matches saw a different version
//! - `InvalidPartitionId`: the id cannot be stored as a single key segment
//! - `MissingVersion`: the backend accepted a write but returned no version token
//! - `Encoding`: metadata could not be serialized into an object body
//! - `ObjectStore`: any other backend fault (network, auth, unavailable)
//!
//! The first two are *contention* outcomes. Callers that implement optimistic
//! claims check [`StoreError::is_conflict`] and treat them as "someone else won".
//!
//! ### Coordination Errors (`CoordinationError`)
//! - `Store`: a store fault propagated to the engine
//! - `Cancelled`: the caller's cancellation token fired mid-operation

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoordinationError>;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    #[error("Version precondition failed for {0}")]
    PreconditionFailed(String),

    #[error("Invalid partition id {0:?}: must be one non-empty key segment")]
    InvalidPartitionId(String),

    #[error("Store returned no version token for {0}")]
    MissingVersion(String),

    #[error("Failed to encode metadata for {key}: {source}")]
    Encoding {
        key: String,
        source: serde_json::Error,
    },

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
}

impl StoreError {
    /// True when the error means another writer got there first.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::AlreadyExists(_) | StoreError::PreconditionFailed(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum CoordinationError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Operation cancelled")]
    Cancelled,
}

impl CoordinationError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CoordinationError::Cancelled)
    }
}
