//! # Batch Operation Simulator
//!
//! Runs one batch operation end to end on an in-process cluster: seeds the
//! in-memory read store with process instances spread over all partitions,
//! submits CREATE to the first partition and drives every partition's
//! scheduler until the lead partition writes the terminal outcome.
//!
//! Configuration comes from `config/batchop.toml` and `BATCHOP__*` variables.
//! `BATCHOP_SIM_INSTANCES` sets the number of seeded process instances.

use anyhow::{bail, Context};
use batchop_core::config::BatchOperationConfig;
use batchop_core::constants::START_PARTITION_ID;
use batchop_core::engine::{AllowAll, InMemoryCluster};
use batchop_core::item_provider::{InMemorySearchClient, SearchItemProvider, StoredDocument};
use batchop_core::logging::{init_structured_logging, log_batch_operation};
use batchop_core::models::{
    BatchOperationCommand, BatchOperationFilter, BatchOperationType, Command, CommandRecord,
    CreateBatchOperation, ResponseValue,
};
use batchop_core::scheduler::{BatchOperationScheduler, SchedulerHost};
use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

const DEFAULT_INSTANCES: i64 = 250;
const MAX_ROUNDS: usize = 10_000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_structured_logging();

    let config = BatchOperationConfig::load().context("loading configuration")?;
    let instances = std::env::var("BATCHOP_SIM_INSTANCES")
        .ok()
        .map(|value| value.parse::<i64>())
        .transpose()
        .context("BATCHOP_SIM_INSTANCES must be an integer")?
        .unwrap_or(DEFAULT_INSTANCES);

    let cluster = InMemoryCluster::new(&config, Arc::new(AllowAll));
    let partition_ids = cluster.partition_ids();

    let store = Arc::new(InMemorySearchClient::new());
    for key in 0..instances {
        let partition_id = partition_ids[(key as usize) % partition_ids.len()];
        let state = if key % 5 == 0 { "COMPLETED" } else { "ACTIVE" };
        store.add_process_instance(StoredDocument::new(
            key + 1,
            partition_id,
            json!({"bpmnProcessId": "order-fulfillment", "state": state}),
        ));
    }
    let provider = Arc::new(SearchItemProvider::new(store));

    let mut schedulers = Vec::with_capacity(partition_ids.len());
    for partition_id in &partition_ids {
        let host: Arc<dyn SchedulerHost> = Arc::new(cluster.partition(*partition_id)?);
        schedulers.push(BatchOperationScheduler::new(host, provider.clone(), &config));
    }

    let lead = cluster.partition(START_PARTITION_ID)?;
    cluster.submit(
        START_PARTITION_ID,
        CommandRecord::client(
            None,
            BatchOperationCommand::Create(CreateBatchOperation {
                operation_type: BatchOperationType::CancelProcessInstance,
                filter: BatchOperationFilter::new(
                    json!({"bpmnProcessId": "order-fulfillment", "state": "ACTIVE"}),
                ),
                parameters: None,
                follow_up_command: None,
                partitions: Vec::new(),
            }),
            Some("simulator".to_string()),
        ),
    )?;
    cluster.run_until_idle()?;

    let responses = lead.lock().take_responses();
    let key = match responses.first().map(|response| &response.value) {
        Some(ResponseValue::Created { key, partitions }) => {
            info!(key = %key, partitions = ?partitions, "Batch operation created");
            *key
        }
        other => bail!("batch operation was not created: {other:?}"),
    };

    for round in 0..MAX_ROUNDS {
        let ticks = join_all(schedulers.iter().map(|scheduler| scheduler.tick())).await;
        for tick in ticks {
            tick?;
        }
        cluster.run_until_idle()?;
        cluster.redeliver_overdue()?;

        let Some(operation) = lead.lock().state().get(key).cloned() else {
            bail!("lead partition lost batch operation {key}");
        };
        if operation.status.is_terminal() && !cluster.has_outstanding_distributions() {
            let dispatched: usize = partition_ids
                .iter()
                .map(|id| -> anyhow::Result<usize> {
                    Ok(cluster
                        .partition(*id)?
                        .lock()
                        .handed_off_commands()
                        .iter()
                        .filter(|command| matches!(command, Command::Item(_)))
                        .count())
                })
                .sum::<anyhow::Result<usize>>()?;

            log_batch_operation(
                "simulation",
                key.value(),
                &operation.status.to_string(),
                Some(&format!("rounds={round} item_commands={dispatched}")),
            );
            println!(
                "batch operation {key} finished as {} after {round} rounds: {dispatched} item commands, {} partition errors",
                operation.status,
                operation.errors.len()
            );
            return Ok(());
        }
    }

    bail!("batch operation {key} did not finish within {MAX_ROUNDS} rounds")
}
