//! # Command Processors
//!
//! One processor per command intent. Every processor has two entry points:
//!
//! - `process_new_command` runs once, on the partition that first receives the
//!   command: it authorizes, validates against the lifecycle, writes the
//!   events and distributes the command to the other partitions.
//! - `process_distributed_command` runs on every receiving partition, once per
//!   delivery attempt. It re-validates locally, applies the change at most once
//!   and always acknowledges the delivery.
//!
//! Processors must not return `Err` after appending events; every fallible
//! step happens before the first write.

pub mod create;
pub mod execute;
pub mod initialize;
pub mod lifecycle;
pub mod partition_report;

pub use create::CreateProcessor;
pub use execute::ExecuteProcessor;
pub use initialize::{
    CreateChunkProcessor, FailProcessor, FinishInitializationProcessor, InitializeProcessor,
};
pub use lifecycle::{LifecycleAction, LifecycleProcessor};
pub use partition_report::PartitionReportProcessor;

use crate::engine::{AuthorizationCheck, ProcessingContext};
use crate::error::Result;
use crate::models::{
    BatchOperationCommand, BatchOperationKey, CommandIntent, Rejection, RejectionType,
};
use std::collections::HashMap;
use std::sync::Arc;

pub trait BatchOperationProcessor: Send + Sync {
    fn intent(&self) -> CommandIntent;

    fn process_new_command(
        &self,
        ctx: &mut ProcessingContext<'_>,
        command: &BatchOperationCommand,
    ) -> Result<()>;

    fn process_distributed_command(
        &self,
        ctx: &mut ProcessingContext<'_>,
        _command: &BatchOperationCommand,
    ) -> Result<()> {
        ctx.acknowledge();
        Ok(())
    }
}

/// Intent → processor lookup, built once at startup
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: HashMap<CommandIntent, Arc<dyn BatchOperationProcessor>>,
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut intents: Vec<&str> = self.processors.keys().map(CommandIntent::as_str).collect();
        intents.sort_unstable();
        f.debug_struct("ProcessorRegistry")
            .field("intents", &intents)
            .finish()
    }
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a processor for every batch operation intent
    pub fn with_defaults(authorization: Arc<dyn AuthorizationCheck>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CreateProcessor::new(authorization.clone())));
        for action in LifecycleAction::ALL {
            registry.register(Arc::new(LifecycleProcessor::new(
                action,
                authorization.clone(),
            )));
        }
        registry.register(Arc::new(InitializeProcessor));
        registry.register(Arc::new(CreateChunkProcessor));
        registry.register(Arc::new(FinishInitializationProcessor));
        registry.register(Arc::new(FailProcessor));
        registry.register(Arc::new(ExecuteProcessor));
        registry.register(Arc::new(PartitionReportProcessor::completed()));
        registry.register(Arc::new(PartitionReportProcessor::failed()));
        registry
    }

    pub fn register(&mut self, processor: Arc<dyn BatchOperationProcessor>) {
        self.processors.insert(processor.intent(), processor);
    }

    pub fn get(&self, intent: CommandIntent) -> Option<Arc<dyn BatchOperationProcessor>> {
        self.processors.get(&intent).cloned()
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

/// Key of the command's batch operation, rejecting the command if it has none
pub(crate) fn require_key(ctx: &mut ProcessingContext<'_>) -> Option<BatchOperationKey> {
    let key = ctx.record().key;
    if key.is_none() {
        ctx.reject(Rejection::new(
            RejectionType::InvalidArgument,
            "Expected a batch operation key, but none was provided",
        ));
        ctx.acknowledge();
    }
    key
}
