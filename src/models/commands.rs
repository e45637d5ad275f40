//! Commands accepted by the batch operation processors, and the per-item
//! domain commands the executor hands off to the rest of the engine.

use super::batch_operation::{
    BatchOperationFilter, BatchOperationParameters, BatchOperationType, ElementMapping,
    ErrorDescriptor, FollowUpCommand,
};
use super::item::Chunk;
use super::key::{BatchOperationKey, PartitionId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload of a CREATE command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateBatchOperation {
    pub operation_type: BatchOperationType,
    pub filter: BatchOperationFilter,
    pub parameters: Option<BatchOperationParameters>,
    pub follow_up_command: Option<FollowUpCommand>,
    /// Filled in by the lead partition before the command is distributed
    #[serde(default)]
    pub partitions: Vec<PartitionId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchOperationCommand {
    Create(CreateBatchOperation),
    Cancel,
    Pause,
    Resume,
    Suspend,
    /// Run one round of the executor, starting at `offset`
    Execute { offset: u64 },
    Initialize,
    CreateChunk(Chunk),
    FinishInitialization,
    /// Fail the local partition's share
    Fail(ErrorDescriptor),
    CompletePartition { partition_id: PartitionId },
    FailPartition {
        partition_id: PartitionId,
        error: ErrorDescriptor,
    },
}

/// Discriminant used to look up processors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandIntent {
    Create,
    Cancel,
    Pause,
    Resume,
    Suspend,
    Execute,
    Initialize,
    CreateChunk,
    FinishInitialization,
    Fail,
    CompletePartition,
    FailPartition,
}

impl CommandIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Cancel => "CANCEL",
            Self::Pause => "PAUSE",
            Self::Resume => "RESUME",
            Self::Suspend => "SUSPEND",
            Self::Execute => "EXECUTE",
            Self::Initialize => "INITIALIZE",
            Self::CreateChunk => "CREATE_CHUNK",
            Self::FinishInitialization => "FINISH_INITIALIZATION",
            Self::Fail => "FAIL",
            Self::CompletePartition => "COMPLETE_PARTITION",
            Self::FailPartition => "FAIL_PARTITION",
        }
    }

    /// Lifecycle management intents requested by operators
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::Cancel | Self::Pause | Self::Resume | Self::Suspend
        )
    }
}

impl fmt::Display for CommandIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BatchOperationCommand {
    pub fn intent(&self) -> CommandIntent {
        match self {
            Self::Create(_) => CommandIntent::Create,
            Self::Cancel => CommandIntent::Cancel,
            Self::Pause => CommandIntent::Pause,
            Self::Resume => CommandIntent::Resume,
            Self::Suspend => CommandIntent::Suspend,
            Self::Execute { .. } => CommandIntent::Execute,
            Self::Initialize => CommandIntent::Initialize,
            Self::CreateChunk(_) => CommandIntent::CreateChunk,
            Self::FinishInitialization => CommandIntent::FinishInitialization,
            Self::Fail(_) => CommandIntent::Fail,
            Self::CompletePartition { .. } => CommandIntent::CompletePartition,
            Self::FailPartition { .. } => CommandIntent::FailPartition,
        }
    }
}

/// One domain command per item, issued by the executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemCommand {
    CancelProcessInstance {
        batch_operation_key: BatchOperationKey,
        process_instance_key: i64,
    },
    MigrateProcessInstance {
        batch_operation_key: BatchOperationKey,
        process_instance_key: i64,
        target_process_definition_key: i64,
        mapping_instructions: Vec<ElementMapping>,
    },
    ModifyProcessInstance {
        batch_operation_key: BatchOperationKey,
        process_instance_key: i64,
        move_instructions: Vec<ElementMapping>,
    },
    ResolveIncident {
        batch_operation_key: BatchOperationKey,
        incident_key: i64,
        process_instance_key: i64,
    },
    DeleteProcessInstance {
        batch_operation_key: BatchOperationKey,
        process_instance_key: i64,
    },
    DeleteDecisionInstance {
        batch_operation_key: BatchOperationKey,
        decision_instance_key: i64,
    },
}

impl ItemCommand {
    pub fn batch_operation_key(&self) -> BatchOperationKey {
        match self {
            Self::CancelProcessInstance {
                batch_operation_key,
                ..
            }
            | Self::MigrateProcessInstance {
                batch_operation_key,
                ..
            }
            | Self::ModifyProcessInstance {
                batch_operation_key,
                ..
            }
            | Self::ResolveIncident {
                batch_operation_key,
                ..
            }
            | Self::DeleteProcessInstance {
                batch_operation_key,
                ..
            }
            | Self::DeleteDecisionInstance {
                batch_operation_key,
                ..
            } => *batch_operation_key,
        }
    }

    /// Key of the entity the command acts upon
    pub fn target_key(&self) -> i64 {
        match self {
            Self::CancelProcessInstance {
                process_instance_key,
                ..
            }
            | Self::MigrateProcessInstance {
                process_instance_key,
                ..
            }
            | Self::ModifyProcessInstance {
                process_instance_key,
                ..
            }
            | Self::DeleteProcessInstance {
                process_instance_key,
                ..
            } => *process_instance_key,
            Self::ResolveIncident { incident_key, .. } => *incident_key,
            Self::DeleteDecisionInstance {
                decision_instance_key,
                ..
            } => *decision_instance_key,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CancelProcessInstance { .. } => "PROCESS_INSTANCE.CANCEL",
            Self::MigrateProcessInstance { .. } => "PROCESS_INSTANCE_MIGRATION.MIGRATE",
            Self::ModifyProcessInstance { .. } => "PROCESS_INSTANCE_MODIFICATION.MODIFY",
            Self::ResolveIncident { .. } => "INCIDENT.RESOLVE",
            Self::DeleteProcessInstance { .. } => "PROCESS_INSTANCE.DELETE",
            Self::DeleteDecisionInstance { .. } => "DECISION_INSTANCE.DELETE",
        }
    }
}

/// Any command that can appear in a partition's log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "value_type", content = "command", rename_all = "snake_case")]
pub enum Command {
    BatchOperation(BatchOperationCommand),
    Item(ItemCommand),
    /// Chained command registered at creation, emitted after COMPLETED
    FollowUp(FollowUpCommand),
}

impl Command {
    pub fn batch_operation_intent(&self) -> Option<CommandIntent> {
        match self {
            Self::BatchOperation(command) => Some(command.intent()),
            Self::Item(_) | Self::FollowUp(_) => None,
        }
    }

    /// Ordering rank inside one submitted batch: lifecycle commands first
    pub fn ordering_rank(&self) -> u8 {
        match self.batch_operation_intent() {
            Some(intent) if intent.is_lifecycle() => 0,
            _ => 1,
        }
    }
}

impl From<BatchOperationCommand> for Command {
    fn from(command: BatchOperationCommand) -> Self {
        Self::BatchOperation(command)
    }
}

impl From<ItemCommand> for Command {
    fn from(command: ItemCommand) -> Self {
        Self::Item(command)
    }
}

impl From<FollowUpCommand> for Command {
    fn from(command: FollowUpCommand) -> Self {
        Self::FollowUp(command)
    }
}
