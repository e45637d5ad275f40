//! # Partition Engine
//!
//! One partition's command log and state. Commands are processed strictly
//! one at a time in log order; every produced record is appended to the log
//! and follow-up commands are queued behind everything already submitted.

use super::context::{ProcessingContext, ProcessingResult};
use super::distribution::{Acknowledgement, OutboundDistribution, PendingDistributions};
use crate::error::{BatchOperationError, Result};
use crate::logging::log_error;
use crate::models::{
    BatchOperationKey, Command, CommandRecord, KeyGenerator, LoggedRecord, PartitionId,
    RecordValue, Rejection, RejectionRecord, RejectionType, Response,
};
use crate::processing::ProcessorRegistry;
use crate::state::{BatchOperationState, EventApplier};
use crate::state_machine::BatchOperationEvent;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Shared handle used by the cluster router and the scheduler
pub type PartitionHandle = Arc<Mutex<PartitionEngine>>;

#[derive(Debug)]
pub struct PartitionEngine {
    partition_id: PartitionId,
    partitions: Vec<PartitionId>,
    state: BatchOperationState,
    log: Vec<LoggedRecord>,
    queue: VecDeque<CommandRecord>,
    key_generator: KeyGenerator,
    pending: PendingDistributions,
    registry: Arc<ProcessorRegistry>,
    outbound: Vec<OutboundDistribution>,
    acknowledgements: Vec<Acknowledgement>,
    responses: Vec<Response>,
    handed_off: Vec<Command>,
}

impl PartitionEngine {
    pub fn new(
        partition_id: PartitionId,
        partitions: Vec<PartitionId>,
        registry: Arc<ProcessorRegistry>,
    ) -> Self {
        Self {
            partition_id,
            partitions,
            state: BatchOperationState::new(),
            log: Vec::new(),
            queue: VecDeque::new(),
            key_generator: KeyGenerator::new(partition_id),
            pending: PendingDistributions::new(),
            registry,
            outbound: Vec::new(),
            acknowledgements: Vec::new(),
            responses: Vec::new(),
            handed_off: Vec::new(),
        }
    }

    pub fn into_handle(self) -> PartitionHandle {
        Arc::new(Mutex::new(self))
    }

    pub fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    pub fn partitions(&self) -> &[PartitionId] {
        &self.partitions
    }

    pub fn state(&self) -> &BatchOperationState {
        &self.state
    }

    pub fn log(&self) -> &[LoggedRecord] {
        &self.log
    }

    pub fn has_queued_commands(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn has_outstanding_distributions(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn submit(&mut self, record: CommandRecord) {
        self.queue.push_back(record);
    }

    /// Submit commands written together. Lifecycle commands are moved ahead
    /// of the rest, keeping relative order, so a PAUSE in the same batch as an
    /// EXECUTE is always observed first.
    pub fn submit_batch(&mut self, mut records: Vec<CommandRecord>) {
        records.sort_by_key(|record| record.command.ordering_rank());
        self.queue.extend(records);
    }

    /// Accept a command distributed by another partition
    pub fn receive_distribution(&mut self, distribution: OutboundDistribution) {
        trace!(
            partition_id = self.partition_id,
            distribution = ?distribution.metadata(),
            "Distributed command received"
        );
        self.queue.push_back(distribution.record);
    }

    pub fn receive_acknowledgement(&mut self, acknowledgement: Acknowledgement) {
        let was_pending = self.pending.is_pending(acknowledgement.distribution_key);
        let released = self.pending.acknowledge(
            self.partition_id,
            acknowledgement.distribution_key,
            acknowledgement.acknowledging_partition,
        );
        if was_pending && !self.pending.is_pending(acknowledgement.distribution_key) {
            debug!(
                partition_id = self.partition_id,
                distribution_key = acknowledgement.distribution_key,
                "Distribution fully acknowledged"
            );
        }
        if let Some(next) = released {
            trace!(
                partition_id = self.partition_id,
                target_partition = next.target_partition,
                distribution = ?next.metadata(),
                "Releasing next distribution"
            );
            self.outbound.push(next);
        }
    }

    /// Process the next queued command; returns `false` when the queue is empty
    pub fn process_next(&mut self) -> bool {
        let Some(record) = self.queue.pop_front() else {
            return false;
        };

        self.append(RecordValue::Command(record.clone()));
        match &record.command {
            Command::BatchOperation(command) => {
                let result = self.dispatch(&record, command);
                self.write_result(&record, result);
            }
            Command::Item(_) | Command::FollowUp(_) => {
                self.handed_off.push(record.command.clone());
            }
        }
        true
    }

    /// Process until the queue is empty; returns the number of commands processed
    pub fn run_until_idle(&mut self) -> usize {
        let mut processed = 0;
        while self.process_next() {
            processed += 1;
        }
        processed
    }

    fn dispatch(
        &mut self,
        record: &CommandRecord,
        command: &crate::models::BatchOperationCommand,
    ) -> ProcessingResult {
        let intent = command.intent();
        let mut ctx = ProcessingContext::new(
            self.partition_id,
            &self.partitions,
            record,
            &mut self.state,
            &mut self.key_generator,
            &mut self.pending,
        );

        let outcome = match self.registry.get(intent) {
            Some(processor) if record.is_distributed() => {
                processor.process_distributed_command(&mut ctx, command)
            }
            Some(processor) => processor.process_new_command(&mut ctx, command),
            None => Err(BatchOperationError::ProcessorNotFound {
                intent: intent.to_string(),
            }),
        };

        if let Err(error) = outcome {
            log_error(
                "partition_engine",
                intent.as_str(),
                &error.to_string(),
                Some(&format!("partition {}", self.partition_id)),
            );
            ctx.reject(Rejection::new(
                RejectionType::ProcessingError,
                error.to_string(),
            ));
        }
        ctx.into_result()
    }

    fn write_result(&mut self, record: &CommandRecord, result: ProcessingResult) {
        for event in result.events {
            self.append(RecordValue::Event(event));
        }
        for rejection in result.rejections {
            self.append(RecordValue::Rejection(RejectionRecord {
                command: record.clone(),
                rejection,
            }));
        }
        self.queue.extend(result.commands);
        self.responses.extend(result.responses);
        self.outbound.extend(result.distributions);
        self.acknowledgements.extend(result.acknowledgements);
    }

    fn append(&mut self, value: RecordValue) {
        self.log.push(LoggedRecord {
            position: self.log.len() as u64 + 1,
            timestamp: Utc::now(),
            value,
        });
    }

    /// Take the distributions and acknowledgements produced since the last call
    pub fn drain_outbox(&mut self) -> (Vec<OutboundDistribution>, Vec<Acknowledgement>) {
        (
            std::mem::take(&mut self.outbound),
            std::mem::take(&mut self.acknowledgements),
        )
    }

    /// Distributions still unacknowledged after `retry_after`
    pub fn redeliveries(&mut self, retry_after: Duration) -> Vec<OutboundDistribution> {
        self.pending
            .due_for_redelivery(self.partition_id, retry_after)
    }

    pub fn take_responses(&mut self) -> Vec<Response> {
        std::mem::take(&mut self.responses)
    }

    /// Item and follow-up commands handed off to the rest of the engine
    pub fn handed_off_commands(&self) -> &[Command] {
        &self.handed_off
    }

    pub fn events_for(&self, key: BatchOperationKey) -> Vec<&BatchOperationEvent> {
        self.log
            .iter()
            .filter_map(LoggedRecord::as_event)
            .filter(|record| record.key == key)
            .map(|record| &record.event)
            .collect()
    }

    pub fn rejections_for(&self, key: BatchOperationKey) -> Vec<&RejectionRecord> {
        self.log
            .iter()
            .filter_map(LoggedRecord::as_rejection)
            .filter(|record| record.command.key == Some(key))
            .collect()
    }

    /// Rebuild state from the event log alone
    pub fn replay(&self) -> BatchOperationState {
        let applier = EventApplier::new(self.partition_id);
        let mut state = BatchOperationState::new();
        for record in self.log.iter().filter_map(LoggedRecord::as_event) {
            applier.apply(&mut state, record.key, &record.event);
        }
        state
    }

    /// Replace live state with the replayed one and move the key generator past replayed keys
    pub fn recover(&mut self) -> Result<()> {
        let replayed = self.replay();
        for record in self.log.iter().filter_map(LoggedRecord::as_event) {
            self.key_generator.observe(record.key);
        }
        if replayed != self.state {
            return Err(BatchOperationError::InvalidState(format!(
                "Replayed state of partition {} diverges from live state",
                self.partition_id
            )));
        }
        self.state = replayed;
        Ok(())
    }
}
