//! # Data Model
//!
//! - [`key`] - Batch operation keys, partition identity, lead-partition decoding
//! - [`batch_operation`] - The per-partition aggregate and its value types
//! - [`item`] - Items and the chunks that persist them
//! - [`commands`] - Lifecycle/internal commands and per-item domain commands
//! - [`records`] - Log records, rejections, and client responses

pub mod batch_operation;
pub mod commands;
pub mod item;
pub mod key;
pub mod records;

pub use batch_operation::{
    BatchOperation, BatchOperationErrorType, BatchOperationFilter, BatchOperationParameters,
    BatchOperationType, ElementMapping, ErrorDescriptor, FollowUpCommand, PartitionOutcome,
};
pub use commands::{
    BatchOperationCommand, Command, CommandIntent, CreateBatchOperation, ItemCommand,
};
pub use item::{Chunk, Item};
pub use key::{lead_partition, BatchOperationKey, KeyGenerator, PartitionId};
pub use records::{
    CommandRecord, DistributionMetadata, EventRecord, LoggedRecord, RecordValue, Rejection,
    RejectionRecord, RejectionType, RequestMetadata, Response, ResponseValue,
};
