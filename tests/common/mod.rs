//! Shared harness for the cluster-level tests: an in-process cluster, a seeded
//! in-memory read store and one scheduler per partition.

#![allow(dead_code)]

pub mod strategies;

use batchop_core::config::BatchOperationConfig;
use batchop_core::engine::{AllowAll, AuthorizationCheck, InMemoryCluster, OutboundDistribution};
use batchop_core::item_provider::{
    InMemorySearchClient, ItemProvider, SearchItemProvider, StoredDocument,
};
use batchop_core::models::{
    BatchOperation, BatchOperationCommand, BatchOperationFilter, BatchOperationKey,
    BatchOperationType, Command, CommandRecord, CreateBatchOperation, DistributionMetadata,
    ItemCommand, PartitionId, RejectionRecord, Response, ResponseValue,
};
use batchop_core::scheduler::{BatchOperationScheduler, SchedulerHost};
use batchop_core::state_machine::BatchOperationEvent;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const OPERATOR: &str = "operator";
const MAX_DRIVE_ROUNDS: usize = 200;

pub fn active_filter() -> BatchOperationFilter {
    BatchOperationFilter::new(json!({"state": "ACTIVE"}))
}

pub fn create_command(operation_type: BatchOperationType) -> CreateBatchOperation {
    CreateBatchOperation {
        operation_type,
        filter: active_filter(),
        parameters: None,
        follow_up_command: None,
        partitions: Vec::new(),
    }
}

pub fn test_config(partition_count: u32) -> BatchOperationConfig {
    BatchOperationConfig {
        partition_count,
        ..Default::default()
    }
}

pub struct TestCluster {
    pub cluster: Arc<InMemoryCluster>,
    pub store: Arc<InMemorySearchClient>,
    pub schedulers: BTreeMap<PartitionId, BatchOperationScheduler>,
}

impl TestCluster {
    pub fn new(partition_count: u32) -> Self {
        Self::with_config(test_config(partition_count))
    }

    pub fn with_config(config: BatchOperationConfig) -> Self {
        Self::build(config, Arc::new(AllowAll), None)
    }

    pub fn with_authorization(
        partition_count: u32,
        authorization: Arc<dyn AuthorizationCheck>,
    ) -> Self {
        Self::build(test_config(partition_count), authorization, None)
    }

    /// Cluster whose schedulers fetch through `provider` instead of the store
    pub fn with_provider(partition_count: u32, provider: Arc<dyn ItemProvider>) -> Self {
        Self::build(test_config(partition_count), Arc::new(AllowAll), Some(provider))
    }

    fn build(
        config: BatchOperationConfig,
        authorization: Arc<dyn AuthorizationCheck>,
        provider: Option<Arc<dyn ItemProvider>>,
    ) -> Self {
        let cluster = Arc::new(InMemoryCluster::new(&config, authorization));
        let store = Arc::new(InMemorySearchClient::new());
        let provider: Arc<dyn ItemProvider> =
            provider.unwrap_or_else(|| Arc::new(SearchItemProvider::new(store.clone())));

        let schedulers = cluster
            .partition_ids()
            .into_iter()
            .map(|partition_id| {
                let host: Arc<dyn SchedulerHost> =
                    Arc::new(cluster.partition(partition_id).unwrap());
                (
                    partition_id,
                    BatchOperationScheduler::new(host, provider.clone(), &config),
                )
            })
            .collect();

        Self {
            cluster,
            store,
            schedulers,
        }
    }

    /// Add `count` ACTIVE process instances living on `partition_id`
    pub fn seed(&self, partition_id: PartitionId, count: i64) {
        for local in 1..=count {
            self.store.add_process_instance(StoredDocument::new(
                i64::from(partition_id) * 100_000 + local,
                partition_id,
                json!({"state": "ACTIVE"}),
            ));
        }
    }

    pub fn submit_client(
        &self,
        partition_id: PartitionId,
        key: Option<BatchOperationKey>,
        command: BatchOperationCommand,
    ) -> Vec<Response> {
        self.cluster
            .submit(
                partition_id,
                CommandRecord::client(key, command, Some(OPERATOR.to_string())),
            )
            .unwrap();
        self.cluster.run_until_idle().unwrap();
        self.cluster
            .partition(partition_id)
            .unwrap()
            .lock()
            .take_responses()
    }

    pub fn create(&self, partition_id: PartitionId) -> BatchOperationKey {
        self.create_with(
            partition_id,
            create_command(BatchOperationType::CancelProcessInstance),
        )
    }

    pub fn create_with(
        &self,
        partition_id: PartitionId,
        create: CreateBatchOperation,
    ) -> BatchOperationKey {
        let responses =
            self.submit_client(partition_id, None, BatchOperationCommand::Create(create));
        match responses.first().map(|response| &response.value) {
            Some(ResponseValue::Created { key, .. }) => *key,
            other => panic!("expected the batch operation to be created, got {other:?}"),
        }
    }

    /// Deliver a copy of a distributed `command` to `target`, as a
    /// redelivery from `source` would, and process it
    pub fn deliver_again(
        &self,
        source: PartitionId,
        target: PartitionId,
        key: BatchOperationKey,
        command: BatchOperationCommand,
    ) {
        self.cluster
            .inject(OutboundDistribution {
                target_partition: target,
                record: CommandRecord {
                    key: Some(key),
                    command: command.into(),
                    request: None,
                    distribution: Some(DistributionMetadata {
                        source_partition: source,
                        distribution_key: BatchOperationKey::encode(source, 90_000).value(),
                    }),
                },
            })
            .unwrap();
        self.cluster.run_until_idle().unwrap();
    }

    pub async fn tick(&self, partition_id: PartitionId) {
        self.schedulers[&partition_id].tick().await.unwrap();
    }

    pub async fn tick_all(&self) {
        for scheduler in self.schedulers.values() {
            scheduler.tick().await.unwrap();
        }
    }

    /// Tick every scheduler and process until the lead partition reached a terminal status
    pub async fn drive_to_terminal(&self, key: BatchOperationKey) -> BatchOperation {
        for _ in 0..MAX_DRIVE_ROUNDS {
            self.tick_all().await;
            self.cluster.run_until_idle().unwrap();
            self.cluster.redeliver_pending().unwrap();
            self.cluster.run_until_idle().unwrap();

            if let Some(operation) = self.lead_operation(key) {
                if operation.status.is_terminal() {
                    return operation;
                }
            }
        }
        panic!(
            "batch operation {key} did not reach a terminal status: {:?}",
            self.lead_operation(key)
        );
    }

    /// Tick and process a fixed number of rounds, whatever the outcome
    pub async fn drive_rounds(&self, rounds: usize) {
        for _ in 0..rounds {
            self.tick_all().await;
            self.cluster.run_until_idle().unwrap();
        }
    }

    pub fn lead_operation(&self, key: BatchOperationKey) -> Option<BatchOperation> {
        self.operation_on(key.lead_partition(), key)
    }

    pub fn operation_on(
        &self,
        partition_id: PartitionId,
        key: BatchOperationKey,
    ) -> Option<BatchOperation> {
        self.cluster
            .partition(partition_id)
            .unwrap()
            .lock()
            .state()
            .get(key)
            .cloned()
    }

    pub fn events(&self, partition_id: PartitionId, key: BatchOperationKey) -> Vec<BatchOperationEvent> {
        self.cluster
            .partition(partition_id)
            .unwrap()
            .lock()
            .events_for(key)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn rejections(&self, partition_id: PartitionId, key: BatchOperationKey) -> Vec<RejectionRecord> {
        self.cluster
            .partition(partition_id)
            .unwrap()
            .lock()
            .rejections_for(key)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn item_commands(&self, partition_id: PartitionId) -> Vec<ItemCommand> {
        self.cluster
            .partition(partition_id)
            .unwrap()
            .lock()
            .handed_off_commands()
            .iter()
            .filter_map(|command| match command {
                Command::Item(item) => Some(item.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn follow_up_commands(&self, partition_id: PartitionId) -> Vec<Command> {
        self.cluster
            .partition(partition_id)
            .unwrap()
            .lock()
            .handed_off_commands()
            .iter()
            .filter(|command| matches!(command, Command::FollowUp(_)))
            .cloned()
            .collect()
    }

    /// Replayed state of every partition equals its live state
    pub fn assert_replay_matches(&self) {
        for partition_id in self.cluster.partition_ids() {
            let partition = self.cluster.partition(partition_id).unwrap();
            let engine = partition.lock();
            assert_eq!(
                engine.replay(),
                *engine.state(),
                "replayed state of partition {partition_id} diverges"
            );
        }
    }
}

/// Intents of a list of events, for compact assertions
pub fn intents(events: &[BatchOperationEvent]) -> Vec<&'static str> {
    events.iter().map(BatchOperationEvent::intent).collect()
}
