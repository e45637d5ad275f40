#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Batch Operation Core
//!
//! Lifecycle and cross-partition execution protocol for batch operations of a
//! partitioned, log-replicated workflow engine.
//!
//! ## Overview
//!
//! A batch operation is one logical action ("cancel every process instance
//! matching this filter") fanned out to every partition. The partition that
//! creates it is its **lead**: the lead partition is decoded from the batch
//! operation key, never configured or elected. Every partition resolves its own
//! share of items, executes them a few at a time and reports back to the lead,
//! which writes the single terminal outcome.
//!
//! ## Architecture
//!
//! - Each partition processes its command log strictly sequentially. All state
//!   changes are events, applied by the [`state::EventApplier`], so replaying
//!   the log rebuilds the same state.
//! - Commands reach other partitions through at-least-once distribution with
//!   acknowledgements. Every distributed handler tolerates redelivery.
//! - Item sets are fetched once, chunked and persisted before execution starts.
//! - The executor re-arms itself with an advanced cursor after each round.
//!
//! ## Module Organization
//!
//! - [`models`] - Keys, the batch operation aggregate, commands and records
//! - [`state_machine`] - Statuses, events and lifecycle guards
//! - [`state`] - Per-partition state and event appliers
//! - [`processing`] - One processor per command intent
//! - [`engine`] - Partition engine, distribution, authorization, in-memory cluster
//! - [`item_provider`] - Paged item fetch from the read store
//! - [`chunking`] - Size-bounded chunking of item sets
//! - [`scheduler`] - Periodic initialization and execution trigger
//! - [`config`] - Configuration loading
//! - [`logging`] - Structured logging setup
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use batchop_core::config::BatchOperationConfig;
//! use batchop_core::engine::{AllowAll, InMemoryCluster};
//! use batchop_core::models::{
//!     BatchOperationCommand, BatchOperationFilter, BatchOperationType, CommandRecord,
//!     CreateBatchOperation,
//! };
//! use std::sync::Arc;
//!
//! # fn example() -> batchop_core::Result<()> {
//! let config = BatchOperationConfig::default();
//! let cluster = InMemoryCluster::new(&config, Arc::new(AllowAll));
//!
//! cluster.submit(
//!     1,
//!     CommandRecord::client(
//!         None,
//!         BatchOperationCommand::Create(CreateBatchOperation {
//!             operation_type: BatchOperationType::CancelProcessInstance,
//!             filter: BatchOperationFilter::new(serde_json::json!({"bpmnProcessId": "order"})),
//!             parameters: None,
//!             follow_up_command: None,
//!             partitions: Vec::new(),
//!         }),
//!         Some("operator".to_string()),
//!     ),
//! )?;
//! cluster.run_until_idle()?;
//! # Ok(())
//! # }
//! ```

pub mod chunking;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod item_provider;
pub mod logging;
pub mod models;
pub mod processing;
pub mod scheduler;
pub mod state;
pub mod state_machine;

pub use config::BatchOperationConfig;
pub use engine::{InMemoryCluster, PartitionEngine, PartitionHandle};
pub use error::{BatchOperationError, Result};
pub use models::{BatchOperation, BatchOperationKey, BatchOperationType, PartitionId};
pub use scheduler::BatchOperationScheduler;
pub use state_machine::BatchOperationStatus;
