//! Partition reports and lead-side aggregation.
//!
//! A partition that finished its share records the outcome locally. On the
//! lead that is enough; a follower also distributes the report to the lead.
//! Only the lead checks whether every expected partition finished, and only
//! the lead writes the terminal event.

use super::{require_key, BatchOperationProcessor};
use crate::constants::log_events;
use crate::engine::{DistributionTarget, ProcessingContext};
use crate::error::{BatchOperationError, Result};
use crate::logging::{log_batch_operation, log_partition_report};
use crate::models::{
    BatchOperationCommand, BatchOperationKey, CommandIntent, ErrorDescriptor, PartitionId,
    PartitionOutcome,
};
use crate::state_machine::BatchOperationEvent;
use tracing::debug;

/// Record the local partition's outcome and report it to the lead
pub(crate) fn report_local_outcome(
    ctx: &mut ProcessingContext<'_>,
    key: BatchOperationKey,
    outcome: PartitionOutcome,
) {
    let partition_id = ctx.partition_id();
    let lead = key.lead_partition();

    match &outcome {
        PartitionOutcome::Completed => {
            log_partition_report(key.value(), partition_id, "COMPLETED");
            ctx.append_event(key, BatchOperationEvent::PartitionCompleted { partition_id });
        }
        PartitionOutcome::Failed(error) => {
            log_partition_report(key.value(), partition_id, "FAILED");
            ctx.append_event(
                key,
                BatchOperationEvent::PartitionFailed {
                    partition_id,
                    error: error.clone(),
                },
            );
        }
    }

    if lead == partition_id {
        complete_if_all_finished(ctx, key);
    } else {
        let report = match outcome {
            PartitionOutcome::Completed => BatchOperationCommand::CompletePartition { partition_id },
            PartitionOutcome::Failed(error) => {
                BatchOperationCommand::FailPartition { partition_id, error }
            }
        };
        ctx.distribute(key, report, DistributionTarget::Partition(lead));
    }
}

/// On the lead: write COMPLETED or FAILED once every expected partition reported
pub(crate) fn complete_if_all_finished(ctx: &mut ProcessingContext<'_>, key: BatchOperationKey) {
    let Some(operation) = ctx.state().get(key) else {
        return;
    };
    if operation.status.is_terminal() || !operation.all_partitions_finished() {
        return;
    }

    let errors = operation.errors.clone();
    let all_failed = operation.all_partitions_failed();
    let follow_up = operation.follow_up_command.clone();

    if all_failed {
        let error_count = errors.len();
        ctx.append_event(key, BatchOperationEvent::Failed { errors });
        log_batch_operation(
            log_events::BATCH_OPERATION_FAILED,
            key.value(),
            "FAILED",
            Some(&format!("{error_count} partitions failed")),
        );
        return;
    }

    let error_count = errors.len();
    ctx.append_event(key, BatchOperationEvent::Completed { errors });
    if let Some(follow_up) = follow_up {
        ctx.append_command(key, follow_up);
    }
    log_batch_operation(
        log_events::BATCH_OPERATION_COMPLETED,
        key.value(),
        "COMPLETED",
        Some(&format!("{error_count} partitions failed")),
    );
}

/// Handles COMPLETE_PARTITION and FAIL_PARTITION arriving at the lead
pub struct PartitionReportProcessor {
    intent: CommandIntent,
}

impl PartitionReportProcessor {
    pub fn completed() -> Self {
        Self {
            intent: CommandIntent::CompletePartition,
        }
    }

    pub fn failed() -> Self {
        Self {
            intent: CommandIntent::FailPartition,
        }
    }

    fn apply_report(
        &self,
        ctx: &mut ProcessingContext<'_>,
        command: &BatchOperationCommand,
    ) -> Result<()> {
        let (partition_id, error): (PartitionId, Option<&ErrorDescriptor>) = match command {
            BatchOperationCommand::CompletePartition { partition_id } => (*partition_id, None),
            BatchOperationCommand::FailPartition {
                partition_id,
                error,
            } => (*partition_id, Some(error)),
            other => {
                return Err(BatchOperationError::Internal(format!(
                    "{} processor received {}",
                    self.intent,
                    other.intent()
                )))
            }
        };

        let Some(key) = require_key(ctx) else {
            return Ok(());
        };
        let Some(operation) = ctx.state().get(key) else {
            return Ok(());
        };

        if !operation.is_lead(ctx.partition_id()) {
            debug!(key = %key, partition_id, "Partition report received off the lead partition");
            return Ok(());
        }
        if operation.status.is_terminal() || operation.has_partition_finished(partition_id) {
            debug!(key = %key, partition_id, "Partition report already recorded");
            return Ok(());
        }

        log_partition_report(
            key.value(),
            partition_id,
            if error.is_some() { "FAILED" } else { "COMPLETED" },
        );
        log_batch_operation(
            log_events::BATCH_OPERATION_PARTITION_REPORTED,
            key.value(),
            &operation.status.to_string(),
            Some(&format!("partition {partition_id}")),
        );
        let event = match error {
            Some(error) => BatchOperationEvent::PartitionFailed {
                partition_id,
                error: error.clone(),
            },
            None => BatchOperationEvent::PartitionCompleted { partition_id },
        };
        ctx.append_event(key, event);
        complete_if_all_finished(ctx, key);
        Ok(())
    }
}

impl BatchOperationProcessor for PartitionReportProcessor {
    fn intent(&self) -> CommandIntent {
        self.intent
    }

    fn process_new_command(
        &self,
        ctx: &mut ProcessingContext<'_>,
        command: &BatchOperationCommand,
    ) -> Result<()> {
        self.apply_report(ctx, command)
    }

    fn process_distributed_command(
        &self,
        ctx: &mut ProcessingContext<'_>,
        command: &BatchOperationCommand,
    ) -> Result<()> {
        self.apply_report(ctx, command)?;
        ctx.acknowledge();
        Ok(())
    }
}
