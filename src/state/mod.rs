//! Per-partition batch operation state and the event appliers that mutate it.

pub mod appliers;
pub mod batch_operation_state;

pub use appliers::EventApplier;
pub use batch_operation_state::BatchOperationState;
