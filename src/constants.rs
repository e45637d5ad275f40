//! # Protocol Constants
//!
//! Fixed limits of the batch operation protocol. These values shape which items
//! end up in which EXECUTE round and how the read store is paged, so they are
//! deliberately constants rather than configuration: replayed behavior must be
//! identical to forward processing.

use crate::models::PartitionId;

/// Number of items consumed by a single EXECUTE invocation
pub const EXECUTE_SLICE_SIZE: usize = 10;

/// Page size used when paging the read store during initialization
pub const QUERY_PAGE_SIZE: usize = 10_000;

/// Maximum number of primary keys per secondary resolution query.
///
/// Matches the most restrictive downstream query-parameter limit.
pub const SECONDARY_QUERY_GROUP_SIZE: usize = 1_000;

/// Number of low bits of a key that hold the partition-local counter
pub const PARTITION_KEY_BITS: u32 = 51;

/// First partition id of a cluster; partitions are numbered `1..=partition_count`
pub const START_PARTITION_ID: PartitionId = 1;

/// Structured log event names
pub mod log_events {
    pub const BATCH_OPERATION_CREATED: &str = "batch_operation.created";
    pub const BATCH_OPERATION_INITIALIZED: &str = "batch_operation.initialized";
    pub const BATCH_OPERATION_EXECUTED: &str = "batch_operation.executed";
    pub const BATCH_OPERATION_PARTITION_REPORTED: &str = "batch_operation.partition_reported";
    pub const BATCH_OPERATION_COMPLETED: &str = "batch_operation.completed";
    pub const BATCH_OPERATION_FAILED: &str = "batch_operation.failed";
    pub const BATCH_OPERATION_CANCELED: &str = "batch_operation.canceled";
}
