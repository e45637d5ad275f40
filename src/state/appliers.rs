//! # Event Appliers
//!
//! The only code that mutates [`BatchOperationState`]. Applying the event log
//! of a partition from the start reproduces its state exactly, which is what
//! makes replay after a restart safe.
//!
//! Partition reports are applied differently on the lead and on followers: the
//! lead records the reporting partition, a follower that reports its own share
//! as finished drops its local copy. A follower also drops its copy once the
//! batch operation is canceled. Only the lead keeps terminal aggregates.

use super::batch_operation_state::BatchOperationState;
use crate::models::{BatchOperation, BatchOperationKey, ErrorDescriptor, PartitionId};
use crate::state_machine::{BatchOperationEvent, BatchOperationStatus, CreatedValue};
use tracing::{debug, warn};

/// Applies events to the state of one partition
#[derive(Debug, Clone, Copy)]
pub struct EventApplier {
    partition_id: PartitionId,
}

impl EventApplier {
    pub fn new(partition_id: PartitionId) -> Self {
        Self { partition_id }
    }

    pub fn apply(
        &self,
        state: &mut BatchOperationState,
        key: BatchOperationKey,
        event: &BatchOperationEvent,
    ) {
        match event {
            BatchOperationEvent::Created(value) => self.apply_created(state, key, value),
            BatchOperationEvent::ChunkCreated(chunk) => {
                if let Some(operation) = state.get_mut(key) {
                    if !operation.insert_chunk(chunk.clone()) {
                        debug!(key = %key, sequence = chunk.sequence, "Chunk already applied");
                    }
                }
            }
            BatchOperationEvent::Initialized { .. } => {
                if let Some(operation) = state.get_mut(key) {
                    operation.initialized = true;
                    // A batch operation halted mid-initialization stays halted
                    transition(operation, BatchOperationStatus::Initialized, false);
                }
            }
            BatchOperationEvent::Started => {
                if let Some(operation) = state.get_mut(key) {
                    operation.started = true;
                    transition(operation, BatchOperationStatus::Started, true);
                }
            }
            BatchOperationEvent::Canceled => {
                if let Some(operation) = state.get_mut(key) {
                    transition(operation, BatchOperationStatus::Canceled, true);
                }
                if key.lead_partition() != self.partition_id {
                    // Nothing left for a follower to do; the lead keeps the record
                    state.remove(key);
                }
            }
            BatchOperationEvent::Executed { offset } => {
                if let Some(operation) = state.get_mut(key) {
                    operation.offset = operation.offset.max(*offset);
                    transition(operation, BatchOperationStatus::Executed, true);
                }
            }
            BatchOperationEvent::PartitionCompleted { partition_id } => {
                self.apply_partition_report(state, key, *partition_id, None);
            }
            BatchOperationEvent::PartitionFailed {
                partition_id,
                error,
            } => {
                self.apply_partition_report(state, key, *partition_id, Some(error));
            }
            BatchOperationEvent::Completed { errors } | BatchOperationEvent::Failed { errors } => {
                if let Some(operation) = state.get_mut(key) {
                    operation.errors = errors.clone();
                    if let Some(target) = event.target_status() {
                        transition(operation, target, true);
                    }
                }
            }
            other => {
                if let (Some(operation), Some(target)) = (state.get_mut(key), other.target_status())
                {
                    transition(operation, target, true);
                }
            }
        }
    }

    fn apply_created(
        &self,
        state: &mut BatchOperationState,
        key: BatchOperationKey,
        value: &CreatedValue,
    ) {
        if state.is_known(key) {
            debug!(key = %key, "Batch operation already known, CREATED not reapplied");
            return;
        }

        let mut operation = BatchOperation::new(
            key,
            value.operation_type,
            value.filter.clone(),
            value.partitions.iter().copied().collect(),
        );
        operation.parameters = value.parameters.clone();
        operation.follow_up_command = value.follow_up_command.clone();
        state.insert(operation);
    }

    fn apply_partition_report(
        &self,
        state: &mut BatchOperationState,
        key: BatchOperationKey,
        reporting_partition: PartitionId,
        error: Option<&ErrorDescriptor>,
    ) {
        if key.lead_partition() != self.partition_id {
            // Follower: its share is done, the lead owns the aggregate from here
            state.remove(key);
            return;
        }

        let Some(operation) = state.get_mut(key) else {
            return;
        };

        if operation.has_partition_finished(reporting_partition) {
            debug!(
                key = %key,
                partition_id = reporting_partition,
                "Partition already reported, ignoring duplicate"
            );
            return;
        }

        match error {
            Some(error) => {
                operation.failed_partitions.insert(reporting_partition);
                operation.errors.insert(reporting_partition, error.clone());
            }
            None => {
                operation.completed_partitions.insert(reporting_partition);
            }
        }
    }
}

fn transition(operation: &mut BatchOperation, target: BatchOperationStatus, warn_on_skip: bool) {
    if operation.status == target {
        return;
    }
    if operation.status.can_transition_to(target) {
        operation.status = target;
    } else if warn_on_skip {
        warn!(
            key = %operation.key,
            from = %operation.status,
            to = %target,
            "Ignoring status transition not allowed by the lifecycle"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        BatchOperationErrorType, BatchOperationFilter, BatchOperationType, Chunk, Item,
    };
    use serde_json::json;
    use std::collections::BTreeSet;

    const LEAD: PartitionId = 1;

    fn created(partitions: Vec<PartitionId>) -> BatchOperationEvent {
        BatchOperationEvent::Created(CreatedValue {
            operation_type: BatchOperationType::CancelProcessInstance,
            filter: BatchOperationFilter::new(json!({"state": "ACTIVE"})),
            parameters: None,
            partitions,
            follow_up_command: None,
        })
    }

    fn chunk(key: BatchOperationKey, sequence: u32, keys: &[i64]) -> BatchOperationEvent {
        BatchOperationEvent::ChunkCreated(Chunk {
            batch_operation_key: key,
            sequence,
            items: keys.iter().copied().map(Item::uncorrelated).collect(),
        })
    }

    #[test]
    fn test_created_is_not_reapplied() {
        let applier = EventApplier::new(LEAD);
        let mut state = BatchOperationState::new();
        let key = BatchOperationKey::encode(LEAD, 1);

        applier.apply(&mut state, key, &created(vec![1, 2]));
        applier.apply(&mut state, key, &BatchOperationEvent::Paused);
        applier.apply(&mut state, key, &created(vec![1, 2]));

        assert_eq!(state.status(key), Some(BatchOperationStatus::Paused));
    }

    #[test]
    fn test_chunks_are_ordered_and_deduplicated() {
        let applier = EventApplier::new(LEAD);
        let mut state = BatchOperationState::new();
        let key = BatchOperationKey::encode(LEAD, 1);

        applier.apply(&mut state, key, &created(vec![1]));
        applier.apply(&mut state, key, &chunk(key, 1, &[3, 4]));
        applier.apply(&mut state, key, &chunk(key, 0, &[1, 2]));
        applier.apply(&mut state, key, &chunk(key, 1, &[3, 4]));

        let keys: Vec<i64> = state.get(key).unwrap().items().map(|i| i.item_key).collect();
        assert_eq!(keys, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_cursor_never_decreases() {
        let applier = EventApplier::new(LEAD);
        let mut state = BatchOperationState::new();
        let key = BatchOperationKey::encode(LEAD, 1);

        applier.apply(&mut state, key, &created(vec![1]));
        applier.apply(&mut state, key, &BatchOperationEvent::Initializing);
        applier.apply(&mut state, key, &BatchOperationEvent::Initialized { item_count: 0 });
        applier.apply(
            &mut state,
            key,
            &BatchOperationEvent::Executing {
                offset: 0,
                item_keys: vec![],
            },
        );
        applier.apply(&mut state, key, &BatchOperationEvent::Executed { offset: 10 });
        applier.apply(&mut state, key, &BatchOperationEvent::Executed { offset: 5 });

        assert_eq!(state.get(key).unwrap().offset, 10);
    }

    #[test]
    fn test_lead_records_partition_reports_once() {
        let applier = EventApplier::new(LEAD);
        let mut state = BatchOperationState::new();
        let key = BatchOperationKey::encode(LEAD, 1);
        let error = ErrorDescriptor::new(BatchOperationErrorType::QueryFailed, "boom");

        applier.apply(&mut state, key, &created(vec![1, 2, 3]));
        applier.apply(
            &mut state,
            key,
            &BatchOperationEvent::PartitionCompleted { partition_id: 2 },
        );
        applier.apply(
            &mut state,
            key,
            &BatchOperationEvent::PartitionFailed {
                partition_id: 2,
                error: error.clone(),
            },
        );
        applier.apply(
            &mut state,
            key,
            &BatchOperationEvent::PartitionFailed {
                partition_id: 3,
                error,
            },
        );

        let operation = state.get(key).unwrap();
        assert_eq!(operation.completed_partitions, BTreeSet::from([2]));
        assert_eq!(operation.failed_partitions, BTreeSet::from([3]));
        assert!(operation
            .completed_partitions
            .is_disjoint(&operation.failed_partitions));
        assert_eq!(operation.errors.len(), 1);
    }

    #[test]
    fn test_follower_drops_operation_after_own_report() {
        let applier = EventApplier::new(2);
        let mut state = BatchOperationState::new();
        let key = BatchOperationKey::encode(LEAD, 1);

        applier.apply(&mut state, key, &created(vec![1, 2]));
        applier.apply(
            &mut state,
            key,
            &BatchOperationEvent::PartitionCompleted { partition_id: 2 },
        );

        assert!(!state.contains(key));
        assert!(state.has_finished(key));

        applier.apply(&mut state, key, &created(vec![1, 2]));
        assert!(!state.contains(key));
    }

    #[test]
    fn test_halted_operation_stays_halted_when_initialized() {
        let applier = EventApplier::new(LEAD);
        let mut state = BatchOperationState::new();
        let key = BatchOperationKey::encode(LEAD, 1);

        applier.apply(&mut state, key, &created(vec![1]));
        applier.apply(&mut state, key, &BatchOperationEvent::Initializing);
        applier.apply(&mut state, key, &BatchOperationEvent::Paused);
        applier.apply(&mut state, key, &BatchOperationEvent::Initialized { item_count: 0 });

        let operation = state.get(key).unwrap();
        assert!(operation.initialized);
        assert_eq!(operation.status, BatchOperationStatus::Paused);
    }

    #[test]
    fn test_started_is_recorded_after_resume_before_first_round() {
        let applier = EventApplier::new(LEAD);
        let mut state = BatchOperationState::new();
        let key = BatchOperationKey::encode(LEAD, 1);

        applier.apply(&mut state, key, &created(vec![1]));
        applier.apply(&mut state, key, &BatchOperationEvent::Initializing);
        applier.apply(&mut state, key, &BatchOperationEvent::Initialized { item_count: 0 });
        applier.apply(&mut state, key, &BatchOperationEvent::Paused);
        applier.apply(&mut state, key, &BatchOperationEvent::Resumed);
        assert!(!state.get(key).unwrap().started);

        applier.apply(&mut state, key, &BatchOperationEvent::Started);
        let operation = state.get(key).unwrap();
        assert!(operation.started);
        assert_eq!(operation.status, BatchOperationStatus::Started);
    }

    #[test]
    fn test_follower_drops_canceled_operation_and_lead_keeps_it() {
        let key = BatchOperationKey::encode(LEAD, 1);
        let lead = EventApplier::new(LEAD);
        let follower = EventApplier::new(2);
        let mut lead_state = BatchOperationState::new();
        let mut follower_state = BatchOperationState::new();

        for (applier, state) in [(lead, &mut lead_state), (follower, &mut follower_state)] {
            applier.apply(state, key, &created(vec![1, 2]));
            applier.apply(state, key, &BatchOperationEvent::Canceled);
        }

        assert_eq!(lead_state.status(key), Some(BatchOperationStatus::Canceled));
        assert!(!follower_state.contains(key));
        assert!(follower_state.has_finished(key));

        follower.apply(&mut follower_state, key, &created(vec![1, 2]));
        assert!(!follower_state.contains(key));
    }
}
