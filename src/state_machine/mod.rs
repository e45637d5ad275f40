// State machine module for batch operation lifecycle management
//
// Statuses, the events that move between them, and the guard predicates that
// decide whether a lifecycle command may be applied.

pub mod errors;
pub mod events;
pub mod guards;
pub mod states;

// Re-export main types for convenient access
pub use errors::{GuardError, GuardResult};
pub use events::{BatchOperationEvent, CreatedValue};
pub use guards::{
    can_cancel, can_pause, can_resume, can_suspend, CancelGuard, PauseGuard, ResumeGuard,
    StateGuard, SuspendGuard,
};
pub use states::BatchOperationStatus;
