//! # Executor
//!
//! One EXECUTE consumes at most [`EXECUTE_SLICE_SIZE`] items from the cursor,
//! writes one domain command per item and re-arms itself with the advanced
//! cursor. An empty slice finishes the local partition. Progress is committed
//! once per round through the EXECUTED event, so a crash never loses or
//! repeats more than the round in flight.

use super::partition_report::report_local_outcome;
use super::{require_key, BatchOperationProcessor};
use crate::constants::{log_events, EXECUTE_SLICE_SIZE};
use crate::engine::ProcessingContext;
use crate::error::{BatchOperationError, Result};
use crate::models::{
    BatchOperation, BatchOperationCommand, BatchOperationErrorType, BatchOperationParameters,
    BatchOperationType, CommandIntent, ErrorDescriptor, Item, ItemCommand, PartitionOutcome,
};
use crate::state_machine::BatchOperationEvent;
use tracing::debug;

pub struct ExecuteProcessor;

impl BatchOperationProcessor for ExecuteProcessor {
    fn intent(&self) -> CommandIntent {
        CommandIntent::Execute
    }

    fn process_new_command(
        &self,
        ctx: &mut ProcessingContext<'_>,
        command: &BatchOperationCommand,
    ) -> Result<()> {
        let BatchOperationCommand::Execute { offset } = command else {
            return Err(BatchOperationError::Internal(format!(
                "EXECUTE processor received {}",
                command.intent()
            )));
        };
        let offset = *offset;
        let Some(key) = require_key(ctx) else {
            return Ok(());
        };
        let Some(operation) = ctx.state().get(key) else {
            debug!(key = %key, "No batch operation to execute");
            return Ok(());
        };

        if operation.status.is_terminal() || operation.status.is_halted() {
            debug!(key = %key, status = %operation.status, "Batch operation not executable");
            return Ok(());
        }
        if !operation.initialized || operation.has_partition_finished(ctx.partition_id()) {
            return Ok(());
        }
        if operation.offset != offset {
            debug!(key = %key, offset, current = operation.offset, "Stale EXECUTE ignored");
            return Ok(());
        }

        let items = operation.next_items(EXECUTE_SLICE_SIZE);
        let commands: std::result::Result<Vec<ItemCommand>, ErrorDescriptor> = items
            .iter()
            .map(|item| build_item_command(operation, item))
            .collect();
        if !operation.started {
            ctx.append_event(key, BatchOperationEvent::Started);
        }

        if items.is_empty() {
            report_local_outcome(ctx, key, PartitionOutcome::Completed);
            return Ok(());
        }

        let commands = match commands {
            Ok(commands) => commands,
            Err(error) => {
                report_local_outcome(ctx, key, PartitionOutcome::Failed(error));
                return Ok(());
            }
        };

        let next_offset = offset + items.len() as u64;
        ctx.append_event(
            key,
            BatchOperationEvent::Executing {
                offset,
                item_keys: items.iter().map(|item| item.item_key).collect(),
            },
        );
        for command in commands {
            ctx.append_command(key, command);
        }
        ctx.append_event(key, BatchOperationEvent::Executed {
            offset: next_offset,
        });
        ctx.append_command(key, BatchOperationCommand::Execute {
            offset: next_offset,
        });

        debug!(
            key = %key,
            event = log_events::BATCH_OPERATION_EXECUTED,
            offset,
            next_offset,
            items = items.len(),
            "Execution round dispatched"
        );
        Ok(())
    }
}

/// Domain command for one item, per operation type
pub fn build_item_command(
    operation: &BatchOperation,
    item: &Item,
) -> std::result::Result<ItemCommand, ErrorDescriptor> {
    let batch_operation_key = operation.key;
    let missing_parameters = || {
        ErrorDescriptor::new(
            BatchOperationErrorType::ItemCommandFailed,
            format!(
                "Batch operation {} of type {} has no matching parameters",
                operation.key, operation.operation_type
            ),
        )
    };

    let command = match operation.operation_type {
        BatchOperationType::CancelProcessInstance => ItemCommand::CancelProcessInstance {
            batch_operation_key,
            process_instance_key: item.item_key,
        },
        BatchOperationType::MigrateProcessInstance => match &operation.parameters {
            Some(BatchOperationParameters::Migration {
                target_process_definition_key,
                mapping_instructions,
            }) => ItemCommand::MigrateProcessInstance {
                batch_operation_key,
                process_instance_key: item.item_key,
                target_process_definition_key: *target_process_definition_key,
                mapping_instructions: mapping_instructions.clone(),
            },
            _ => return Err(missing_parameters()),
        },
        BatchOperationType::ModifyProcessInstance => match &operation.parameters {
            Some(BatchOperationParameters::Modification { move_instructions }) => {
                ItemCommand::ModifyProcessInstance {
                    batch_operation_key,
                    process_instance_key: item.item_key,
                    move_instructions: move_instructions.clone(),
                }
            }
            _ => return Err(missing_parameters()),
        },
        BatchOperationType::ResolveIncident => ItemCommand::ResolveIncident {
            batch_operation_key,
            incident_key: item.item_key,
            process_instance_key: item.correlated_key,
        },
        BatchOperationType::DeleteProcessInstance => ItemCommand::DeleteProcessInstance {
            batch_operation_key,
            process_instance_key: item.item_key,
        },
        BatchOperationType::DeleteDecisionInstance => ItemCommand::DeleteDecisionInstance {
            batch_operation_key,
            decision_instance_key: item.item_key,
        },
    };
    Ok(command)
}
