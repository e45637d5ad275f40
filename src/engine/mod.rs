//! # Partition Engine
//!
//! In-process stand-ins for the record processing engine the batch operation
//! processors run on:
//!
//! - [`context`] - writers handed to processors for one command
//! - [`distribution`] - at-least-once command distribution bookkeeping
//! - [`authorization`] - permission checks for client commands
//! - [`partition_engine`] - one partition's sequential command log and state
//! - [`cluster`] - routing between partitions

pub mod authorization;
pub mod cluster;
pub mod context;
pub mod distribution;
pub mod partition_engine;

pub use authorization::{
    AllowAll, AuthorizationCheck, AuthorizationRequest, PermissionType, ResourceType,
    StaticAuthorizations,
};
pub use cluster::InMemoryCluster;
pub use context::{ProcessingContext, ProcessingResult};
pub use distribution::{
    Acknowledgement, DistributionTarget, OutboundDistribution, PendingDistributions,
};
pub use partition_engine::{PartitionEngine, PartitionHandle};
