//! logship Coordination - Partition Ownership and Checkpoints
//!
//! This crate lets independent worker processes divide a partitioned event
//! stream among themselves without a central coordinator, using nothing but
//! conditional writes to a shared object store.
//!
//! ## Architecture
//!
//! Workers are **stateless**. All coordination state lives in the store, one
//! object per partition:
//!
//! ```text
//! {namespace}/{stream}/{consumer_group}/ownership/{partition_id}   {"ownerid": ...}
//! {namespace}/{stream}/{consumer_group}/checkpoint/{partition_id}  {"offset": ...}
//! ```
//!
//! ## Components
//!
//! - **CoordinationStore**: the four conditional operations the layer needs,
//!   implemented over `object_store` by `ObjectCoordinationStore`
//! - **OwnershipRegistry**: optimistic claims via write-if-absent and
//!   write-if-version-matches
//! - **CheckpointStore**: last forwarded offset per partition
//! - **PartitionCoordinator**: the engine-facing façade
//!   (`PartitionStateProvider`)
//!
//! ## Guarantees
//!
//! - Two workers never both hold a committed ownership record for the same
//!   partition; the store's atomic conditional writes decide every race.
//! - A checkpoint only ever names an offset that was already forwarded, so a
//!   restart re-delivers at most the last unacknowledged batch.

pub mod checkpoint;
pub mod coordinator;
pub mod error;
pub mod keys;
pub mod ownership;
pub mod store;
pub mod types;

pub use checkpoint::{CheckpointStore, OFFSET_METADATA_KEY};
pub use coordinator::{PartitionCoordinator, PartitionStateProvider};
pub use error::{CoordinationError, Result, StoreError, StoreResult};
pub use keys::{validate_partition_id, ConsumerScope};
pub use ownership::{OwnershipRegistry, OWNER_ID_METADATA_KEY};
pub use store::{CoordinationStore, Metadata, ObjectCoordinationStore, StoredObject, StoredVersion};
pub use types::{CheckpointRecord, ClaimFailure, ClaimResult, OwnershipRecord};
