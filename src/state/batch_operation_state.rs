use crate::models::{BatchOperation, BatchOperationKey, PartitionId};
use crate::state_machine::BatchOperationStatus;
use std::collections::{BTreeMap, BTreeSet};

/// Durable batch operation state of one partition.
///
/// Reads are public; mutation is reserved to the event appliers so every change
/// is backed by an event in the log.
///
/// Retention: the lead keeps every aggregate, terminal ones included, as the
/// record operators query. A follower drops its aggregate, with its chunks,
/// once it reported its own share or the batch operation was canceled, and
/// keeps only the key. That key is what answers a late redelivered CREATE
/// with ALREADY_EXISTS, so it lives as long as the partition's log does.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOperationState {
    operations: BTreeMap<BatchOperationKey, BatchOperation>,
    /// Batch operations this follower finished or saw canceled, then dropped
    finished: BTreeSet<BatchOperationKey>,
}

impl BatchOperationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: BatchOperationKey) -> Option<&BatchOperation> {
        self.operations.get(&key)
    }

    pub fn contains(&self, key: BatchOperationKey) -> bool {
        self.operations.contains_key(&key)
    }

    /// Whether this partition already finished its share and dropped the aggregate
    pub fn has_finished(&self, key: BatchOperationKey) -> bool {
        self.finished.contains(&key)
    }

    /// Present now or present before and finished
    pub fn is_known(&self, key: BatchOperationKey) -> bool {
        self.contains(key) || self.has_finished(key)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BatchOperation> {
        self.operations.values()
    }

    pub fn status(&self, key: BatchOperationKey) -> Option<BatchOperationStatus> {
        self.get(key).map(|operation| operation.status)
    }

    /// Batch operations whose item set still has to be fetched and chunked
    pub fn pending_initialization(&self, partition_id: PartitionId) -> Vec<&BatchOperation> {
        self.iter()
            .filter(|op| {
                !op.initialized
                    && !op.has_partition_finished(partition_id)
                    && matches!(
                        op.status,
                        BatchOperationStatus::Created | BatchOperationStatus::Resumed
                    )
            })
            .collect()
    }

    /// Batch operations ready for an EXECUTE round that nothing has armed yet.
    ///
    /// Once a round ran, the executor re-arms itself, so only freshly
    /// initialized or resumed batch operations are returned.
    pub fn pending_execution(&self, partition_id: PartitionId) -> Vec<&BatchOperation> {
        self.iter()
            .filter(|op| {
                op.initialized
                    && !op.has_partition_finished(partition_id)
                    && matches!(
                        op.status,
                        BatchOperationStatus::Initialized | BatchOperationStatus::Resumed
                    )
            })
            .collect()
    }

    pub(crate) fn get_mut(&mut self, key: BatchOperationKey) -> Option<&mut BatchOperation> {
        self.operations.get_mut(&key)
    }

    pub(crate) fn insert(&mut self, operation: BatchOperation) {
        self.operations.insert(operation.key, operation);
    }

    pub(crate) fn remove(&mut self, key: BatchOperationKey) -> Option<BatchOperation> {
        self.finished.insert(key);
        self.operations.remove(&key)
    }
}
