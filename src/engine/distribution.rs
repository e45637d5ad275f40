//! Outgoing command distribution bookkeeping.
//!
//! Distribution is at-least-once: a distributed command stays pending for a
//! target partition until that partition acknowledges it, and pending
//! deliveries are sent again until then. Distributions of one batch operation
//! reach a partition in the order they were made.

use crate::models::{
    BatchOperationKey, Command, CommandRecord, DistributionMetadata, PartitionId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistributionTarget {
    /// Every partition except the sending one
    AllOthers,
    Partition(PartitionId),
}

impl DistributionTarget {
    pub fn resolve(&self, source: PartitionId, partitions: &[PartitionId]) -> BTreeSet<PartitionId> {
        match self {
            Self::AllOthers => partitions
                .iter()
                .copied()
                .filter(|partition| *partition != source)
                .collect(),
            Self::Partition(target) if *target != source => BTreeSet::from([*target]),
            Self::Partition(_) => BTreeSet::new(),
        }
    }
}

/// One delivery of a distributed command to one partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundDistribution {
    pub target_partition: PartitionId,
    pub record: CommandRecord,
}

impl OutboundDistribution {
    pub fn metadata(&self) -> Option<DistributionMetadata> {
        self.record.distribution
    }
}

/// Acknowledgement sent back to the partition that distributed a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub distribution_key: i64,
    /// Partition that distributed the command and awaits the acknowledgement
    pub source_partition: PartitionId,
    /// Partition that processed the distributed command
    pub acknowledging_partition: PartitionId,
}

#[derive(Debug, Clone)]
struct PendingDistribution {
    key: BatchOperationKey,
    command: Command,
    remaining: BTreeSet<PartitionId>,
}

/// Distributions of one batch operation to one partition, oldest first.
/// Only the head is in flight.
#[derive(Debug, Clone)]
struct DistributionQueue {
    distribution_keys: VecDeque<i64>,
    last_sent: Instant,
}

/// Unacknowledged distributions of one partition.
///
/// Delivery is ordered per batch operation and target partition: a
/// distribution is only sent once the previous one for the same target was
/// acknowledged. A redelivered PAUSE can therefore never overtake the RESUME
/// that followed it.
#[derive(Debug, Clone, Default)]
pub struct PendingDistributions {
    entries: BTreeMap<i64, PendingDistribution>,
    queues: BTreeMap<(BatchOperationKey, PartitionId), DistributionQueue>,
}

impl PendingDistributions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new distribution; returns the targets it may be sent to now.
    /// The other targets still wait for an earlier distribution.
    pub fn register(
        &mut self,
        distribution_key: i64,
        key: BatchOperationKey,
        command: Command,
        targets: BTreeSet<PartitionId>,
    ) -> BTreeSet<PartitionId> {
        let mut ready = BTreeSet::new();
        if targets.is_empty() {
            return ready;
        }

        for target in &targets {
            let queue = self
                .queues
                .entry((key, *target))
                .or_insert_with(|| DistributionQueue {
                    distribution_keys: VecDeque::new(),
                    last_sent: Instant::now(),
                });
            if queue.distribution_keys.is_empty() {
                queue.last_sent = Instant::now();
                ready.insert(*target);
            }
            queue.distribution_keys.push_back(distribution_key);
        }

        self.entries.insert(
            distribution_key,
            PendingDistribution {
                key,
                command,
                remaining: targets,
            },
        );
        ready
    }

    /// Record an acknowledgement from `partition_id`. Returns the next
    /// distribution for that partition, which may be sent now.
    pub fn acknowledge(
        &mut self,
        source_partition: PartitionId,
        distribution_key: i64,
        partition_id: PartitionId,
    ) -> Option<OutboundDistribution> {
        let entry = self.entries.get_mut(&distribution_key)?;
        if !entry.remaining.remove(&partition_id) {
            return None;
        }
        let key = entry.key;
        if entry.remaining.is_empty() {
            self.entries.remove(&distribution_key);
        }

        let queue_key = (key, partition_id);
        let queue = self.queues.get_mut(&queue_key)?;
        let was_head = queue.distribution_keys.front() == Some(&distribution_key);
        queue.distribution_keys.retain(|queued| *queued != distribution_key);

        let Some(next) = queue.distribution_keys.front().copied() else {
            self.queues.remove(&queue_key);
            return None;
        };
        if !was_head {
            return None;
        }
        queue.last_sent = Instant::now();
        let command = self.entries.get(&next)?.command.clone();
        Some(delivery(next, source_partition, partition_id, key, command))
    }

    /// Whether a distribution of `distribution_key` is still waiting for any partition
    pub fn is_pending(&self, distribution_key: i64) -> bool {
        self.entries.contains_key(&distribution_key)
    }

    pub fn has_outstanding(&self, key: BatchOperationKey) -> bool {
        self.entries.values().any(|entry| entry.key == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// In-flight deliveries not acknowledged within `retry_after`; marks them as sent again
    pub fn due_for_redelivery(
        &mut self,
        source_partition: PartitionId,
        retry_after: Duration,
    ) -> Vec<OutboundDistribution> {
        let now = Instant::now();
        let mut deliveries = Vec::new();

        for ((key, target), queue) in self.queues.iter_mut() {
            if now.duration_since(queue.last_sent) < retry_after {
                continue;
            }
            let Some(head) = queue.distribution_keys.front() else {
                continue;
            };
            let Some(entry) = self.entries.get(head) else {
                continue;
            };
            queue.last_sent = now;
            deliveries.push(delivery(
                *head,
                source_partition,
                *target,
                *key,
                entry.command.clone(),
            ));
        }

        deliveries
    }
}

pub(crate) fn delivery(
    distribution_key: i64,
    source_partition: PartitionId,
    target_partition: PartitionId,
    key: BatchOperationKey,
    command: Command,
) -> OutboundDistribution {
    OutboundDistribution {
        target_partition,
        record: CommandRecord {
            key: Some(key),
            command,
            request: None,
            distribution: Some(DistributionMetadata {
                source_partition,
                distribution_key,
            }),
        },
    }
}
