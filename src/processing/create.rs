use super::{require_key, BatchOperationProcessor};
use crate::constants::log_events;
use crate::engine::{AuthorizationCheck, AuthorizationRequest, DistributionTarget, ProcessingContext};
use crate::error::{BatchOperationError, Result};
use crate::logging::log_batch_operation;
use crate::models::{
    BatchOperationCommand, BatchOperationParameters, BatchOperationType, CommandIntent,
    CreateBatchOperation, Rejection, RejectionType, ResponseValue,
};
use crate::state_machine::{BatchOperationEvent, CreatedValue};
use std::sync::Arc;
use tracing::debug;

/// Creates the batch operation on the lead partition and fans it out
pub struct CreateProcessor {
    authorization: Arc<dyn AuthorizationCheck>,
}

impl CreateProcessor {
    pub fn new(authorization: Arc<dyn AuthorizationCheck>) -> Self {
        Self { authorization }
    }

    fn validate(create: &CreateBatchOperation) -> std::result::Result<(), Rejection> {
        if create.filter.is_empty() {
            return Err(Rejection::new(
                RejectionType::InvalidArgument,
                "Expected a non-empty filter for the batch operation, but it was empty",
            ));
        }

        let parameters_match = match (create.operation_type, &create.parameters) {
            (
                BatchOperationType::MigrateProcessInstance,
                Some(BatchOperationParameters::Migration { .. }),
            ) => true,
            (
                BatchOperationType::ModifyProcessInstance,
                Some(BatchOperationParameters::Modification { .. }),
            ) => true,
            (operation_type, _) => !operation_type.requires_parameters(),
        };
        if !parameters_match {
            return Err(Rejection::new(
                RejectionType::InvalidArgument,
                format!(
                    "Expected {} parameters for a batch operation of type {}",
                    match create.operation_type {
                        BatchOperationType::MigrateProcessInstance => "migration plan",
                        _ => "modification plan",
                    },
                    create.operation_type
                ),
            ));
        }

        Ok(())
    }
}

fn expect_create(command: &BatchOperationCommand) -> Result<&CreateBatchOperation> {
    match command {
        BatchOperationCommand::Create(create) => Ok(create),
        other => Err(BatchOperationError::Internal(format!(
            "CREATE processor received {}",
            other.intent()
        ))),
    }
}

impl BatchOperationProcessor for CreateProcessor {
    fn intent(&self) -> CommandIntent {
        CommandIntent::Create
    }

    fn process_new_command(
        &self,
        ctx: &mut ProcessingContext<'_>,
        command: &BatchOperationCommand,
    ) -> Result<()> {
        let create = expect_create(command)?;

        if let Err(rejection) = Self::validate(create) {
            ctx.reject(rejection);
            return Ok(());
        }

        let request =
            AuthorizationRequest::for_create(ctx.record().username(), create.operation_type);
        if let Err(rejection) = self.authorization.is_authorized(&request) {
            ctx.reject(rejection);
            return Ok(());
        }

        let key = ctx.next_key();
        let partitions = ctx.partitions().to_vec();
        ctx.append_event(
            key,
            BatchOperationEvent::Created(CreatedValue {
                operation_type: create.operation_type,
                filter: create.filter.clone(),
                parameters: create.parameters.clone(),
                partitions: partitions.clone(),
                follow_up_command: create.follow_up_command.clone(),
            }),
        );
        ctx.respond(ResponseValue::Created {
            key,
            partitions: partitions.clone(),
        });
        ctx.distribute(
            key,
            BatchOperationCommand::Create(CreateBatchOperation {
                partitions,
                ..create.clone()
            }),
            DistributionTarget::AllOthers,
        );

        log_batch_operation(
            log_events::BATCH_OPERATION_CREATED,
            key.value(),
            "CREATED",
            Some(create.operation_type.as_str()),
        );
        Ok(())
    }

    fn process_distributed_command(
        &self,
        ctx: &mut ProcessingContext<'_>,
        command: &BatchOperationCommand,
    ) -> Result<()> {
        let create = expect_create(command)?;
        let Some(key) = require_key(ctx) else {
            return Ok(());
        };

        if ctx.state().is_known(key) {
            debug!(key = %key, partition_id = ctx.partition_id(), "Distributed CREATE redelivered");
            ctx.reject(Rejection::new(
                RejectionType::AlreadyExists,
                format!("Batch operation {key} already exists on this partition"),
            ));
            ctx.acknowledge();
            return Ok(());
        }

        ctx.append_event(
            key,
            BatchOperationEvent::Created(CreatedValue {
                operation_type: create.operation_type,
                filter: create.filter.clone(),
                parameters: create.parameters.clone(),
                partitions: create.partitions.clone(),
                follow_up_command: create.follow_up_command.clone(),
            }),
        );
        ctx.acknowledge();
        Ok(())
    }
}
