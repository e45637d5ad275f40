//! Writers available to a processor while it handles one command.
//!
//! Events are applied to state the moment they are appended, so a processor
//! always reads the state its own earlier events produced.

use super::distribution::{
    delivery, Acknowledgement, DistributionTarget, OutboundDistribution, PendingDistributions,
};
use crate::models::{
    BatchOperationKey, Command, CommandRecord, EventRecord, KeyGenerator, PartitionId, Rejection,
    Response, ResponseValue,
};
use crate::state::{BatchOperationState, EventApplier};
use crate::state_machine::BatchOperationEvent;

/// Everything one command produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessingResult {
    pub events: Vec<EventRecord>,
    /// Follow-up commands for the local log
    pub commands: Vec<CommandRecord>,
    pub rejections: Vec<Rejection>,
    pub responses: Vec<Response>,
    pub distributions: Vec<OutboundDistribution>,
    pub acknowledgements: Vec<Acknowledgement>,
}

pub struct ProcessingContext<'a> {
    partition_id: PartitionId,
    partitions: &'a [PartitionId],
    record: &'a CommandRecord,
    state: &'a mut BatchOperationState,
    applier: EventApplier,
    key_generator: &'a mut KeyGenerator,
    pending: &'a mut PendingDistributions,
    result: ProcessingResult,
}

impl<'a> ProcessingContext<'a> {
    pub fn new(
        partition_id: PartitionId,
        partitions: &'a [PartitionId],
        record: &'a CommandRecord,
        state: &'a mut BatchOperationState,
        key_generator: &'a mut KeyGenerator,
        pending: &'a mut PendingDistributions,
    ) -> Self {
        Self {
            partition_id,
            partitions,
            record,
            state,
            applier: EventApplier::new(partition_id),
            key_generator,
            pending,
            result: ProcessingResult::default(),
        }
    }

    pub fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    pub fn partitions(&self) -> &[PartitionId] {
        self.partitions
    }

    /// The command being processed
    pub fn record(&self) -> &CommandRecord {
        self.record
    }

    pub fn state(&self) -> &BatchOperationState {
        &*self.state
    }

    pub fn next_key(&mut self) -> BatchOperationKey {
        self.key_generator.next_key()
    }

    pub fn has_outstanding_distributions(&self, key: BatchOperationKey) -> bool {
        self.pending.has_outstanding(key)
    }

    pub fn append_event(&mut self, key: BatchOperationKey, event: BatchOperationEvent) {
        self.applier.apply(self.state, key, &event);
        self.result.events.push(EventRecord { key, event });
    }

    pub fn append_command(&mut self, key: BatchOperationKey, command: impl Into<Command>) {
        self.result
            .commands
            .push(CommandRecord::internal(key, command));
    }

    /// Reject the current command, answering the client if there is one
    pub fn reject(&mut self, rejection: Rejection) {
        self.respond(ResponseValue::Rejected(rejection.clone()));
        self.result.rejections.push(rejection);
    }

    /// Answer the client that submitted the current command; no-op for internal commands
    pub fn respond(&mut self, value: ResponseValue) {
        if let Some(request) = &self.record.request {
            self.result.responses.push(Response {
                request_id: request.request_id,
                value,
            });
        }
    }

    /// Distribute a command to other partitions. Targets still waiting for an
    /// earlier distribution of the same batch operation receive it later.
    pub fn distribute(
        &mut self,
        key: BatchOperationKey,
        command: impl Into<Command>,
        target: DistributionTarget,
    ) {
        let targets = target.resolve(self.partition_id, self.partitions);
        if targets.is_empty() {
            return;
        }

        let command = command.into();
        let distribution_key = self.key_generator.next_key().value();
        let ready = self
            .pending
            .register(distribution_key, key, command.clone(), targets);
        for target_partition in ready {
            self.result.distributions.push(delivery(
                distribution_key,
                self.partition_id,
                target_partition,
                key,
                command.clone(),
            ));
        }
    }

    /// Acknowledge the current command to its sender; no-op unless it was distributed
    pub fn acknowledge(&mut self) {
        if let Some(metadata) = self.record.distribution {
            self.result.acknowledgements.push(Acknowledgement {
                distribution_key: metadata.distribution_key,
                source_partition: metadata.source_partition,
                acknowledging_partition: self.partition_id,
            });
        }
    }

    pub fn into_result(self) -> ProcessingResult {
        self.result
    }
}
