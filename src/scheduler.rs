//! # Batch Operation Scheduler
//!
//! Periodic control loop of one partition. Each tick it
//!
//! 1. initializes batch operations whose item set was not fetched yet: it
//!    fetches the items through the [`ItemProvider`], chunks them and submits
//!    INITIALIZE, the CREATE_CHUNK commands and FINISH_INITIALIZATION as one
//!    batch (or FAIL when the fetch failed);
//! 2. arms the first EXECUTE of initialized or resumed batch operations.
//!
//! Later rounds re-arm themselves through the executor. The scheduler never
//! holds the partition lock across an await point.

use crate::chunking::Chunker;
use crate::config::BatchOperationConfig;
use crate::engine::PartitionHandle;
use crate::error::Result;
use crate::item_provider::{ItemProvider, ItemProviderError};
use crate::logging::log_error;
use crate::models::{
    BatchOperation, BatchOperationCommand, BatchOperationKey, CommandRecord, PartitionId,
};
use crate::state_machine::BatchOperationStatus;
use dashmap::DashSet;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info, instrument};

/// Snapshot of the work a partition has for the scheduler
#[derive(Debug, Clone, Default)]
pub struct PendingWork {
    pub initialization: Vec<BatchOperation>,
    /// Key and persisted cursor of each batch operation awaiting its first EXECUTE
    pub execution: Vec<(BatchOperationKey, u64)>,
}

/// Kind of work submitted for a batch operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum WorkKind {
    Initialization,
    Execution,
}

impl PendingWork {
    fn keys(&self) -> HashSet<(BatchOperationKey, WorkKind)> {
        self.initialization
            .iter()
            .map(|operation| (operation.key, WorkKind::Initialization))
            .chain(
                self.execution
                    .iter()
                    .map(|(key, _)| (*key, WorkKind::Execution)),
            )
            .collect()
    }
}

/// The partition as seen by the scheduler
pub trait SchedulerHost: Send + Sync {
    fn partition_id(&self) -> PartitionId;

    fn pending_work(&self) -> PendingWork;

    fn status(&self, key: BatchOperationKey) -> Option<BatchOperationStatus>;

    /// Whether every command submitted so far has been processed
    fn is_idle(&self) -> bool;

    fn submit_batch(&self, records: Vec<CommandRecord>);
}

impl SchedulerHost for PartitionHandle {
    fn partition_id(&self) -> PartitionId {
        self.lock().partition_id()
    }

    fn pending_work(&self) -> PendingWork {
        let engine = self.lock();
        let partition_id = engine.partition_id();
        let state = engine.state();
        PendingWork {
            initialization: state
                .pending_initialization(partition_id)
                .into_iter()
                .cloned()
                .collect(),
            execution: state
                .pending_execution(partition_id)
                .into_iter()
                .map(|operation| (operation.key, operation.offset))
                .collect(),
        }
    }

    fn status(&self, key: BatchOperationKey) -> Option<BatchOperationStatus> {
        self.lock().state().status(key)
    }

    fn is_idle(&self) -> bool {
        !self.lock().has_queued_commands()
    }

    fn submit_batch(&self, records: Vec<CommandRecord>) {
        self.lock().submit_batch(records);
    }
}

/// What one tick submitted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerTickResult {
    pub initialized: usize,
    pub failed: usize,
    pub aborted: usize,
    pub executed: usize,
}

/// Drives initialization and the first execution round of one partition.
///
/// ```rust,no_run
/// use batchop_core::engine::{AllowAll, InMemoryCluster};
/// use batchop_core::item_provider::{InMemorySearchClient, SearchItemProvider};
/// use batchop_core::scheduler::{BatchOperationScheduler, SchedulerHost};
/// use batchop_core::BatchOperationConfig;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let config = BatchOperationConfig::default();
/// let cluster = InMemoryCluster::new(&config, Arc::new(AllowAll));
/// let host: Arc<dyn SchedulerHost> = Arc::new(cluster.partition(1)?);
/// let provider = Arc::new(SearchItemProvider::new(Arc::new(InMemorySearchClient::new())));
///
/// let scheduler = BatchOperationScheduler::new(host, provider, &config);
/// let result = scheduler.tick().await?;
/// assert_eq!(result.initialized, 0);
/// # Ok::<(), batchop_core::BatchOperationError>(())
/// # }).unwrap();
/// ```
pub struct BatchOperationScheduler {
    host: Arc<dyn SchedulerHost>,
    item_provider: Arc<dyn ItemProvider>,
    chunker: Chunker,
    interval: Duration,
    in_flight: DashSet<(BatchOperationKey, WorkKind)>,
}

impl std::fmt::Debug for BatchOperationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOperationScheduler")
            .field("chunker", &self.chunker)
            .field("interval", &self.interval)
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl BatchOperationScheduler {
    pub fn new(
        host: Arc<dyn SchedulerHost>,
        item_provider: Arc<dyn ItemProvider>,
        config: &BatchOperationConfig,
    ) -> Self {
        Self {
            host,
            item_provider,
            chunker: Chunker::from_config(config),
            interval: config.scheduler_interval(),
            in_flight: DashSet::new(),
        }
    }

    /// Run the scheduling loop until the task is cancelled.
    ///
    /// A failed tick is logged and does not stop the loop.
    pub async fn run(&self) -> Result<()> {
        let mut interval_timer = interval(self.interval);
        info!(
            partition_id = self.host.partition_id(),
            interval_ms = self.interval.as_millis() as u64,
            "Starting batch operation scheduler"
        );

        loop {
            interval_timer.tick().await;

            match self.tick().await {
                Ok(result) if result != SchedulerTickResult::default() => {
                    debug!(
                        initialized = result.initialized,
                        failed = result.failed,
                        aborted = result.aborted,
                        executed = result.executed,
                        "Scheduler tick submitted work"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "Scheduler tick failed");
                    continue;
                }
            }
        }
    }

    /// One scan of the partition
    #[instrument(skip(self), fields(partition_id = self.host.partition_id()))]
    pub async fn tick(&self) -> Result<SchedulerTickResult> {
        let pending = self.host.pending_work();
        if self.host.is_idle() {
            // Everything submitted earlier was processed; what is still pending needs new commands
            self.in_flight.clear();
        } else {
            let pending_keys = pending.keys();
            self.in_flight.retain(|entry| pending_keys.contains(entry));
        }

        let mut result = SchedulerTickResult::default();

        for operation in &pending.initialization {
            if !self
                .in_flight
                .insert((operation.key, WorkKind::Initialization))
            {
                continue;
            }
            match self.initialize(operation).await {
                InitializationOutcome::Submitted => result.initialized += 1,
                InitializationOutcome::Failed => result.failed += 1,
                InitializationOutcome::Aborted => {
                    self.in_flight
                        .remove(&(operation.key, WorkKind::Initialization));
                    result.aborted += 1;
                }
            }
        }

        for (key, offset) in &pending.execution {
            if !self.in_flight.insert((*key, WorkKind::Execution)) {
                continue;
            }
            self.host.submit_batch(vec![CommandRecord::internal(
                *key,
                BatchOperationCommand::Execute { offset: *offset },
            )]);
            result.executed += 1;
        }

        Ok(result)
    }

    async fn initialize(&self, operation: &BatchOperation) -> InitializationOutcome {
        let key = operation.key;
        let host = self.host.clone();
        let should_abort = move || {
            host.status(key).map_or(true, |status| {
                status == BatchOperationStatus::Canceled || status.is_halted()
            })
        };

        let fetched = self
            .item_provider
            .fetch_items(
                self.host.partition_id(),
                operation.operation_type,
                &operation.filter,
                &should_abort,
            )
            .await;

        let chunks = fetched.and_then(|items| self.chunker.chunk(key, &items));
        match chunks {
            Ok(chunks) => {
                let mut records = Vec::with_capacity(chunks.len() + 2);
                records.push(CommandRecord::internal(
                    key,
                    BatchOperationCommand::Initialize,
                ));
                records.extend(chunks.into_iter().map(|chunk| {
                    CommandRecord::internal(key, BatchOperationCommand::CreateChunk(chunk))
                }));
                records.push(CommandRecord::internal(
                    key,
                    BatchOperationCommand::FinishInitialization,
                ));
                self.host.submit_batch(records);
                InitializationOutcome::Submitted
            }
            Err(ItemProviderError::Aborted) => {
                debug!(key = %key, "Initialization aborted");
                InitializationOutcome::Aborted
            }
            Err(e) => {
                log_error(
                    "scheduler",
                    "initialize",
                    &e.to_string(),
                    Some(&format!("batch operation {key}")),
                );
                self.host.submit_batch(vec![CommandRecord::internal(
                    key,
                    BatchOperationCommand::Fail(e.to_error_descriptor()),
                )]);
                InitializationOutcome::Failed
            }
        }
    }
}

enum InitializationOutcome {
    Submitted,
    Failed,
    Aborted,
}
