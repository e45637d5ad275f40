//! Initialization commands written by the scheduler on the local partition:
//! INITIALIZE, one CREATE_CHUNK per chunk, FINISH_INITIALIZATION, or FAIL
//! when the item set could not be fetched.

use super::partition_report::report_local_outcome;
use super::{require_key, BatchOperationProcessor};
use crate::constants::log_events;
use crate::engine::ProcessingContext;
use crate::error::{BatchOperationError, Result};
use crate::logging::log_batch_operation;
use crate::models::{BatchOperationCommand, CommandIntent, PartitionOutcome};
use crate::state_machine::{BatchOperationEvent, BatchOperationStatus};
use tracing::debug;

fn unexpected(intent: CommandIntent, command: &BatchOperationCommand) -> BatchOperationError {
    BatchOperationError::Internal(format!(
        "{intent} processor received {}",
        command.intent()
    ))
}

pub struct InitializeProcessor;

impl BatchOperationProcessor for InitializeProcessor {
    fn intent(&self) -> CommandIntent {
        CommandIntent::Initialize
    }

    fn process_new_command(
        &self,
        ctx: &mut ProcessingContext<'_>,
        _command: &BatchOperationCommand,
    ) -> Result<()> {
        let Some(key) = require_key(ctx) else {
            return Ok(());
        };
        let Some(operation) = ctx.state().get(key) else {
            return Ok(());
        };

        if operation.initialized
            || !operation
                .status
                .can_transition_to(BatchOperationStatus::Initializing)
        {
            debug!(key = %key, status = %operation.status, "Batch operation not awaiting initialization");
            return Ok(());
        }

        ctx.append_event(key, BatchOperationEvent::Initializing);
        Ok(())
    }
}

pub struct CreateChunkProcessor;

impl BatchOperationProcessor for CreateChunkProcessor {
    fn intent(&self) -> CommandIntent {
        CommandIntent::CreateChunk
    }

    fn process_new_command(
        &self,
        ctx: &mut ProcessingContext<'_>,
        command: &BatchOperationCommand,
    ) -> Result<()> {
        let BatchOperationCommand::CreateChunk(chunk) = command else {
            return Err(unexpected(self.intent(), command));
        };
        let Some(key) = require_key(ctx) else {
            return Ok(());
        };
        let Some(operation) = ctx.state().get(key) else {
            return Ok(());
        };

        // Halted batch operations still persist their item set
        if operation.status.is_terminal() || operation.initialized {
            debug!(key = %key, sequence = chunk.sequence, "Chunk not persisted");
            return Ok(());
        }

        ctx.append_event(key, BatchOperationEvent::ChunkCreated(chunk.clone()));
        Ok(())
    }
}

pub struct FinishInitializationProcessor;

impl BatchOperationProcessor for FinishInitializationProcessor {
    fn intent(&self) -> CommandIntent {
        CommandIntent::FinishInitialization
    }

    fn process_new_command(
        &self,
        ctx: &mut ProcessingContext<'_>,
        _command: &BatchOperationCommand,
    ) -> Result<()> {
        let Some(key) = require_key(ctx) else {
            return Ok(());
        };
        let Some(operation) = ctx.state().get(key) else {
            return Ok(());
        };
        if operation.status.is_terminal() || operation.initialized {
            return Ok(());
        }

        let item_count = operation.item_count();
        ctx.append_event(key, BatchOperationEvent::Initialized { item_count });
        log_batch_operation(
            log_events::BATCH_OPERATION_INITIALIZED,
            key.value(),
            "INITIALIZED",
            Some(&format!("{item_count} items")),
        );
        Ok(())
    }
}

/// Fails the local partition's share
pub struct FailProcessor;

impl BatchOperationProcessor for FailProcessor {
    fn intent(&self) -> CommandIntent {
        CommandIntent::Fail
    }

    fn process_new_command(
        &self,
        ctx: &mut ProcessingContext<'_>,
        command: &BatchOperationCommand,
    ) -> Result<()> {
        let BatchOperationCommand::Fail(error) = command else {
            return Err(unexpected(self.intent(), command));
        };
        let Some(key) = require_key(ctx) else {
            return Ok(());
        };
        let Some(operation) = ctx.state().get(key) else {
            return Ok(());
        };
        if operation.status.is_terminal() || operation.has_partition_finished(ctx.partition_id())
        {
            return Ok(());
        }

        report_local_outcome(ctx, key, PartitionOutcome::Failed(error.clone()));
        Ok(())
    }
}
