//! In-process cluster of partition engines.
//!
//! Routes distributed commands and acknowledgements between partitions.
//! Acknowledgements can be dropped on purpose to exercise redelivery; a
//! redelivered command must leave the receiving partition unchanged.

use super::authorization::AuthorizationCheck;
use super::distribution::OutboundDistribution;
use super::partition_engine::{PartitionEngine, PartitionHandle};
use crate::config::BatchOperationConfig;
use crate::constants::START_PARTITION_ID;
use crate::error::{BatchOperationError, Result};
use crate::models::{CommandRecord, PartitionId};
use crate::processing::ProcessorRegistry;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug)]
pub struct InMemoryCluster {
    partitions: BTreeMap<PartitionId, PartitionHandle>,
    retry_interval: Duration,
    drop_acknowledgements: AtomicBool,
}

impl InMemoryCluster {
    pub fn new(config: &BatchOperationConfig, authorization: Arc<dyn AuthorizationCheck>) -> Self {
        let registry = Arc::new(ProcessorRegistry::with_defaults(authorization));
        let ids: Vec<PartitionId> =
            (START_PARTITION_ID..START_PARTITION_ID + config.partition_count).collect();

        let partitions = ids
            .iter()
            .map(|id| {
                (
                    *id,
                    PartitionEngine::new(*id, ids.clone(), registry.clone()).into_handle(),
                )
            })
            .collect();

        info!(partition_count = config.partition_count, "In-memory cluster started");
        Self {
            partitions,
            retry_interval: config.distribution_retry_interval(),
            drop_acknowledgements: AtomicBool::new(false),
        }
    }

    pub fn partition_ids(&self) -> Vec<PartitionId> {
        self.partitions.keys().copied().collect()
    }

    pub fn partition(&self, partition_id: PartitionId) -> Result<PartitionHandle> {
        self.partitions
            .get(&partition_id)
            .cloned()
            .ok_or(BatchOperationError::UnknownPartition { partition_id })
    }

    pub fn submit(&self, partition_id: PartitionId, record: CommandRecord) -> Result<()> {
        self.partition(partition_id)?.lock().submit(record);
        Ok(())
    }

    pub fn submit_batch(&self, partition_id: PartitionId, records: Vec<CommandRecord>) -> Result<()> {
        self.partition(partition_id)?.lock().submit_batch(records);
        Ok(())
    }

    /// Lose every acknowledgement until switched off again
    pub fn set_drop_acknowledgements(&self, drop: bool) {
        self.drop_acknowledgements.store(drop, Ordering::SeqCst);
    }

    /// Process every queued command on every partition once
    pub fn process_all(&self) -> usize {
        self.partitions
            .values()
            .map(|partition| partition.lock().run_until_idle())
            .sum()
    }

    /// Deliver produced distributions and acknowledgements; returns the number routed
    pub fn route(&self) -> Result<usize> {
        let mut distributions = Vec::new();
        let mut acknowledgements = Vec::new();
        for partition in self.partitions.values() {
            let (outbound, acks) = partition.lock().drain_outbox();
            distributions.extend(outbound);
            acknowledgements.extend(acks);
        }

        let routed = distributions.len() + acknowledgements.len();
        self.deliver(distributions)?;

        if self.drop_acknowledgements.load(Ordering::SeqCst) {
            debug!(dropped = acknowledgements.len(), "Dropping acknowledgements");
        } else {
            for ack in acknowledgements {
                self.partition(ack.source_partition)?
                    .lock()
                    .receive_acknowledgement(ack);
            }
        }
        Ok(routed)
    }

    /// Send every unacknowledged distribution again, regardless of its age
    pub fn redeliver_pending(&self) -> Result<usize> {
        self.redeliver_older_than(Duration::ZERO)
    }

    /// Send again the distributions not acknowledged within the retry interval
    pub fn redeliver_overdue(&self) -> Result<usize> {
        self.redeliver_older_than(self.retry_interval)
    }

    fn redeliver_older_than(&self, retry_after: Duration) -> Result<usize> {
        let mut deliveries = Vec::new();
        for partition in self.partitions.values() {
            deliveries.extend(partition.lock().redeliveries(retry_after));
        }
        let count = deliveries.len();
        if count > 0 {
            debug!(count, "Redelivering unacknowledged distributions");
        }
        self.deliver(deliveries)?;
        Ok(count)
    }

    /// Deliver one distribution directly, e.g. a duplicate
    pub fn inject(&self, distribution: OutboundDistribution) -> Result<()> {
        self.deliver(vec![distribution])
    }

    fn deliver(&self, distributions: Vec<OutboundDistribution>) -> Result<()> {
        for distribution in distributions {
            self.partition(distribution.target_partition)?
                .lock()
                .receive_distribution(distribution);
        }
        Ok(())
    }

    /// Process and route until nothing moves; returns the number of commands processed
    pub fn run_until_idle(&self) -> Result<usize> {
        let mut total = 0;
        loop {
            let processed = self.process_all();
            let routed = self.route()?;
            total += processed;
            if processed == 0 && routed == 0 {
                return Ok(total);
            }
        }
    }

    /// Whether any partition still waits for an acknowledgement
    pub fn has_outstanding_distributions(&self) -> bool {
        self.partitions
            .values()
            .any(|partition| partition.lock().has_outstanding_distributions())
    }
}
