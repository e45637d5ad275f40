use super::states::BatchOperationStatus;
use crate::models::{
    BatchOperationFilter, BatchOperationParameters, BatchOperationType, Chunk, ErrorDescriptor,
    FollowUpCommand, PartitionId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Value of a CREATED event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedValue {
    pub operation_type: BatchOperationType,
    pub filter: BatchOperationFilter,
    pub parameters: Option<BatchOperationParameters>,
    pub partitions: Vec<PartitionId>,
    pub follow_up_command: Option<FollowUpCommand>,
}

/// Events that change batch operation state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchOperationEvent {
    Created(CreatedValue),
    Initializing,
    ChunkCreated(Chunk),
    Initialized { item_count: u64 },
    Started,
    /// A round began at `offset` and dispatched the listed item keys
    Executing { offset: u64, item_keys: Vec<i64> },
    /// A round finished; the cursor now stands at `offset`
    Executed { offset: u64 },
    Paused,
    Resumed,
    Suspended,
    Canceled,
    PartitionCompleted { partition_id: PartitionId },
    PartitionFailed {
        partition_id: PartitionId,
        error: ErrorDescriptor,
    },
    Completed {
        errors: BTreeMap<PartitionId, ErrorDescriptor>,
    },
    Failed {
        errors: BTreeMap<PartitionId, ErrorDescriptor>,
    },
}

impl BatchOperationEvent {
    /// Get a string representation of the event intent for logging
    pub fn intent(&self) -> &'static str {
        match self {
            Self::Created(_) => "CREATED",
            Self::Initializing => "INITIALIZING",
            Self::ChunkCreated(_) => "CHUNK_CREATED",
            Self::Initialized { .. } => "INITIALIZED",
            Self::Started => "STARTED",
            Self::Executing { .. } => "EXECUTING",
            Self::Executed { .. } => "EXECUTED",
            Self::Paused => "PAUSED",
            Self::Resumed => "RESUMED",
            Self::Suspended => "SUSPENDED",
            Self::Canceled => "CANCELED",
            Self::PartitionCompleted { .. } => "PARTITION_COMPLETED",
            Self::PartitionFailed { .. } => "PARTITION_FAILED",
            Self::Completed { .. } => "COMPLETED",
            Self::Failed { .. } => "FAILED",
        }
    }

    /// Status this event moves the batch operation to, if it moves it at all
    pub fn target_status(&self) -> Option<BatchOperationStatus> {
        match self {
            Self::Created(_) => Some(BatchOperationStatus::Created),
            Self::Initializing => Some(BatchOperationStatus::Initializing),
            Self::Initialized { .. } => Some(BatchOperationStatus::Initialized),
            Self::Started => Some(BatchOperationStatus::Started),
            Self::Executing { .. } => Some(BatchOperationStatus::Executing),
            Self::Executed { .. } => Some(BatchOperationStatus::Executed),
            Self::Paused => Some(BatchOperationStatus::Paused),
            Self::Resumed => Some(BatchOperationStatus::Resumed),
            Self::Suspended => Some(BatchOperationStatus::Suspended),
            Self::Canceled => Some(BatchOperationStatus::Canceled),
            Self::Completed { .. } => Some(BatchOperationStatus::Completed),
            Self::Failed { .. } => Some(BatchOperationStatus::Failed),
            Self::ChunkCreated(_)
            | Self::PartitionCompleted { .. }
            | Self::PartitionFailed { .. } => None,
        }
    }

    /// Check if this event ends the batch operation
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed { .. } | Self::Canceled
        )
    }
}

impl fmt::Display for BatchOperationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.intent())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_intents() {
        assert_eq!(
            BatchOperationEvent::Executed { offset: 10 }.intent(),
            "EXECUTED"
        );
        assert_eq!(
            BatchOperationEvent::PartitionCompleted { partition_id: 2 }.intent(),
            "PARTITION_COMPLETED"
        );
    }

    #[test]
    fn test_partition_reports_do_not_move_status() {
        assert_eq!(
            BatchOperationEvent::PartitionCompleted { partition_id: 1 }.target_status(),
            None
        );
        assert_eq!(
            BatchOperationEvent::Canceled.target_status(),
            Some(BatchOperationStatus::Canceled)
        );
        assert!(BatchOperationEvent::Canceled.is_terminal());
        assert!(!BatchOperationEvent::Paused.is_terminal());
    }
}
