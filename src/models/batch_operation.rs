//! # Batch Operation Aggregate
//!
//! The durable, per-partition view of one batch operation. It is only ever
//! mutated by event appliers (see [`crate::state::appliers`]), so rebuilding it
//! from the event log yields the same value as forward processing.

use super::item::{Chunk, Item};
use super::key::{BatchOperationKey, PartitionId};
use crate::state_machine::BatchOperationStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Closed set of operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchOperationType {
    CancelProcessInstance,
    MigrateProcessInstance,
    ModifyProcessInstance,
    ResolveIncident,
    DeleteProcessInstance,
    DeleteDecisionInstance,
}

impl BatchOperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CancelProcessInstance => "CANCEL_PROCESS_INSTANCE",
            Self::MigrateProcessInstance => "MIGRATE_PROCESS_INSTANCE",
            Self::ModifyProcessInstance => "MODIFY_PROCESS_INSTANCE",
            Self::ResolveIncident => "RESOLVE_INCIDENT",
            Self::DeleteProcessInstance => "DELETE_PROCESS_INSTANCE",
            Self::DeleteDecisionInstance => "DELETE_DECISION_INSTANCE",
        }
    }

    /// Whether CREATE must carry operation parameters for this type
    pub fn requires_parameters(&self) -> bool {
        matches!(
            self,
            Self::MigrateProcessInstance | Self::ModifyProcessInstance
        )
    }
}

impl fmt::Display for BatchOperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BatchOperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CANCEL_PROCESS_INSTANCE" => Ok(Self::CancelProcessInstance),
            "MIGRATE_PROCESS_INSTANCE" => Ok(Self::MigrateProcessInstance),
            "MODIFY_PROCESS_INSTANCE" => Ok(Self::ModifyProcessInstance),
            "RESOLVE_INCIDENT" => Ok(Self::ResolveIncident),
            "DELETE_PROCESS_INSTANCE" => Ok(Self::DeleteProcessInstance),
            "DELETE_DECISION_INSTANCE" => Ok(Self::DeleteDecisionInstance),
            _ => Err(format!("Invalid batch operation type: {s}")),
        }
    }
}

/// Opaque serialized query used to resolve items.
///
/// Never interpreted by this crate; handed through to the item provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchOperationFilter(pub Value);

impl BatchOperationFilter {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// A filter is empty when it is null or an empty object/array/string
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            Value::Array(values) => values.is_empty(),
            Value::String(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// A source → target element id pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementMapping {
    pub source_element_id: String,
    pub target_element_id: String,
}

/// Type-specific parameters required to build per-item commands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BatchOperationParameters {
    Migration {
        target_process_definition_key: i64,
        mapping_instructions: Vec<ElementMapping>,
    },
    Modification {
        move_instructions: Vec<ElementMapping>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchOperationErrorType {
    QueryFailed,
    ResultBufferSizeExceeded,
    ItemCommandFailed,
    Unknown,
}

/// Why a partition failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub error_type: BatchOperationErrorType,
    pub message: String,
}

impl ErrorDescriptor {
    pub fn new(error_type: BatchOperationErrorType, message: impl Into<String>) -> Self {
        Self {
            error_type,
            message: message.into(),
        }
    }
}

/// Command appended automatically once a batch operation reaches COMPLETED
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUpCommand {
    pub intent: String,
    pub payload: Value,
}

/// Outcome a partition reports to the lead partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionOutcome {
    Completed,
    Failed(ErrorDescriptor),
}

/// The aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOperation {
    pub key: BatchOperationKey,
    pub operation_type: BatchOperationType,
    pub status: BatchOperationStatus,
    pub filter: BatchOperationFilter,
    pub parameters: Option<BatchOperationParameters>,
    pub expected_partitions: BTreeSet<PartitionId>,
    pub completed_partitions: BTreeSet<PartitionId>,
    pub failed_partitions: BTreeSet<PartitionId>,
    pub errors: BTreeMap<PartitionId, ErrorDescriptor>,
    pub follow_up_command: Option<FollowUpCommand>,
    /// Cursor into the concatenation of all chunks
    pub offset: u64,
    /// Set once every chunk of the item set has been persisted
    pub initialized: bool,
    /// Set by the first execution round, also when it follows a RESUME
    pub started: bool,
    chunks: Vec<Chunk>,
    /// Item count up to and including each chunk, in step with `chunks`
    chunk_ends: Vec<u64>,
}

impl BatchOperation {
    pub fn new(
        key: BatchOperationKey,
        operation_type: BatchOperationType,
        filter: BatchOperationFilter,
        expected_partitions: BTreeSet<PartitionId>,
    ) -> Self {
        Self {
            key,
            operation_type,
            status: BatchOperationStatus::Created,
            filter,
            parameters: None,
            expected_partitions,
            completed_partitions: BTreeSet::new(),
            failed_partitions: BTreeSet::new(),
            errors: BTreeMap::new(),
            follow_up_command: None,
            offset: 0,
            initialized: false,
            started: false,
            chunks: Vec::new(),
            chunk_ends: Vec::new(),
        }
    }

    pub fn lead_partition(&self) -> PartitionId {
        self.key.lead_partition()
    }

    pub fn is_lead(&self, partition_id: PartitionId) -> bool {
        self.lead_partition() == partition_id
    }

    pub fn finished_partitions(&self) -> BTreeSet<PartitionId> {
        self.completed_partitions
            .union(&self.failed_partitions)
            .copied()
            .collect()
    }

    pub fn has_partition_finished(&self, partition_id: PartitionId) -> bool {
        self.completed_partitions.contains(&partition_id)
            || self.failed_partitions.contains(&partition_id)
    }

    pub fn all_partitions_finished(&self) -> bool {
        self.finished_partitions() == self.expected_partitions
    }

    pub fn all_partitions_failed(&self) -> bool {
        self.failed_partitions == self.expected_partitions
    }

    /// Persisted chunks in sequence order
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Insert a chunk at its sequence position; `false` if the sequence is already present
    pub fn insert_chunk(&mut self, chunk: Chunk) -> bool {
        let position = self
            .chunks
            .partition_point(|existing| existing.sequence < chunk.sequence);
        if self
            .chunks
            .get(position)
            .is_some_and(|existing| existing.sequence == chunk.sequence)
        {
            return false;
        }

        self.chunks.insert(position, chunk);
        self.chunk_ends.truncate(position);
        let mut end = self.chunk_ends.last().copied().unwrap_or(0);
        for chunk in &self.chunks[position..] {
            end += chunk.len() as u64;
            self.chunk_ends.push(end);
        }
        true
    }

    pub fn item_count(&self) -> u64 {
        self.chunk_ends.last().copied().unwrap_or(0)
    }

    /// All items in chunk order
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.chunks.iter().flat_map(|chunk| chunk.items.iter())
    }

    /// Next `limit` items starting at the cursor.
    ///
    /// The chunk holding the cursor is found by binary search, so a round
    /// costs the same at the end of a large item set as at its start.
    pub fn next_items(&self, limit: usize) -> Vec<Item> {
        let first = self.chunk_ends.partition_point(|end| *end <= self.offset);
        let chunk_start = first
            .checked_sub(1)
            .and_then(|previous| self.chunk_ends.get(previous))
            .copied()
            .unwrap_or(0);
        let Ok(skip) = usize::try_from(self.offset.saturating_sub(chunk_start)) else {
            return Vec::new();
        };

        self.chunks[first..]
            .iter()
            .flat_map(|chunk| chunk.items.iter())
            .skip(skip)
            .take(limit)
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn operation() -> BatchOperation {
        BatchOperation::new(
            BatchOperationKey::encode(1, 1),
            BatchOperationType::CancelProcessInstance,
            BatchOperationFilter::new(json!({"state": "ACTIVE"})),
            [1, 2, 3].into_iter().collect(),
        )
    }

    fn chunk(key: BatchOperationKey, sequence: u32, keys: std::ops::RangeInclusive<i64>) -> Chunk {
        Chunk {
            batch_operation_key: key,
            sequence,
            items: keys.map(Item::uncorrelated).collect(),
        }
    }

    #[test]
    fn test_filter_emptiness() {
        assert!(BatchOperationFilter::new(json!(null)).is_empty());
        assert!(BatchOperationFilter::new(json!({})).is_empty());
        assert!(BatchOperationFilter::new(json!("")).is_empty());
        assert!(!BatchOperationFilter::new(json!({"processDefinitionKey": 5})).is_empty());
    }

    #[test]
    fn test_type_string_conversion() {
        assert_eq!(
            "RESOLVE_INCIDENT".parse::<BatchOperationType>().unwrap(),
            BatchOperationType::ResolveIncident
        );
        assert_eq!(
            BatchOperationType::DeleteDecisionInstance.to_string(),
            "DELETE_DECISION_INSTANCE"
        );
        assert!("CANCEL".parse::<BatchOperationType>().is_err());
        assert!(BatchOperationType::MigrateProcessInstance.requires_parameters());
        assert!(!BatchOperationType::CancelProcessInstance.requires_parameters());
    }

    #[test]
    fn test_partition_bookkeeping() {
        let mut op = operation();
        assert!(op.is_lead(1));
        assert!(!op.all_partitions_finished());

        op.completed_partitions.insert(1);
        op.failed_partitions.insert(2);
        assert!(op.has_partition_finished(2));
        assert!(!op.has_partition_finished(3));
        assert!(!op.all_partitions_finished());

        op.completed_partitions.insert(3);
        assert!(op.all_partitions_finished());
        assert!(!op.all_partitions_failed());
    }

    #[test]
    fn test_next_items_reads_across_chunks() {
        let mut op = operation();
        assert!(op.insert_chunk(chunk(op.key, 0, 1..=3)));
        assert!(op.insert_chunk(chunk(op.key, 1, 4..=6)));
        op.offset = 2;

        let keys: Vec<i64> = op.next_items(3).iter().map(|i| i.item_key).collect();
        assert_eq!(keys, vec![3, 4, 5]);
        assert_eq!(op.item_count(), 6);

        op.offset = 6;
        assert!(op.next_items(3).is_empty());
    }

    #[test]
    fn test_chunks_inserted_out_of_order_keep_cursor_positions() {
        let mut op = operation();
        assert!(op.insert_chunk(chunk(op.key, 2, 8..=9)));
        assert!(op.insert_chunk(chunk(op.key, 0, 1..=4)));
        assert!(op.insert_chunk(chunk(op.key, 1, 5..=7)));
        assert!(!op.insert_chunk(chunk(op.key, 1, 5..=7)));

        assert_eq!(
            op.chunks().iter().map(|c| c.sequence).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(op.item_count(), 9);

        // Cursor exactly on a chunk boundary starts the next chunk
        op.offset = 4;
        let keys: Vec<i64> = op.next_items(10).iter().map(|i| i.item_key).collect();
        assert_eq!(keys, vec![5, 6, 7, 8, 9]);

        op.offset = 8;
        let keys: Vec<i64> = op.next_items(10).iter().map(|i| i.item_key).collect();
        assert_eq!(keys, vec![9]);
    }
}
