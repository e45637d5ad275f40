//! Lifecycle guard predicates.
//!
//! The plain `can_*` functions are the transition rules; the guard structs wrap
//! them with the absent-aggregate check and produce the diagnostic error that
//! becomes a NOT_FOUND or INVALID_STATE rejection.

use super::errors::{business_rule_violation, invalid_state, GuardError, GuardResult};
use super::states::BatchOperationStatus;
use crate::models::{BatchOperation, BatchOperationKey};

pub fn can_cancel(status: BatchOperationStatus) -> bool {
    !status.is_terminal()
}

pub fn can_pause(status: BatchOperationStatus) -> bool {
    status.is_active()
}

pub fn can_resume(status: BatchOperationStatus) -> bool {
    status.is_halted()
}

/// Suspension is only admitted while no distributed work of this batch
/// operation is still awaiting acknowledgement
pub fn can_suspend(status: BatchOperationStatus, outstanding_distributions: bool) -> bool {
    status.is_active() && !outstanding_distributions
}

/// Trait for implementing lifecycle guards
pub trait StateGuard {
    /// Check whether the guarded transition is allowed for the given aggregate
    fn check(&self, key: BatchOperationKey, operation: Option<&BatchOperation>)
        -> GuardResult<()>;

    /// Get a description of this guard for logging
    fn description(&self) -> &'static str;
}

fn require(
    key: BatchOperationKey,
    operation: Option<&BatchOperation>,
) -> GuardResult<&BatchOperation> {
    operation.ok_or(GuardError::NotFound { key })
}

/// Guard for CANCEL
pub struct CancelGuard;

impl StateGuard for CancelGuard {
    fn check(
        &self,
        key: BatchOperationKey,
        operation: Option<&BatchOperation>,
    ) -> GuardResult<()> {
        let operation = require(key, operation)?;
        if can_cancel(operation.status) {
            Ok(())
        } else {
            Err(invalid_state(key, "cancel", operation.status))
        }
    }

    fn description(&self) -> &'static str {
        "Batch operation must not be terminal"
    }
}

/// Guard for PAUSE
pub struct PauseGuard;

impl StateGuard for PauseGuard {
    fn check(
        &self,
        key: BatchOperationKey,
        operation: Option<&BatchOperation>,
    ) -> GuardResult<()> {
        let operation = require(key, operation)?;
        if can_pause(operation.status) {
            Ok(())
        } else {
            Err(invalid_state(key, "pause", operation.status))
        }
    }

    fn description(&self) -> &'static str {
        "Batch operation must be active"
    }
}

/// Guard for RESUME
pub struct ResumeGuard;

impl StateGuard for ResumeGuard {
    fn check(
        &self,
        key: BatchOperationKey,
        operation: Option<&BatchOperation>,
    ) -> GuardResult<()> {
        let operation = require(key, operation)?;
        if can_resume(operation.status) {
            Ok(())
        } else {
            Err(invalid_state(key, "resume", operation.status))
        }
    }

    fn description(&self) -> &'static str {
        "Batch operation must be paused or suspended"
    }
}

/// Guard for SUSPEND
pub struct SuspendGuard {
    pub outstanding_distributions: bool,
}

impl StateGuard for SuspendGuard {
    fn check(
        &self,
        key: BatchOperationKey,
        operation: Option<&BatchOperation>,
    ) -> GuardResult<()> {
        let operation = require(key, operation)?;
        if !operation.status.is_active() {
            return Err(invalid_state(key, "suspend", operation.status));
        }
        if !can_suspend(operation.status, self.outstanding_distributions) {
            return Err(business_rule_violation(
                key,
                "suspend",
                format!(
                    "distributed work is still outstanding (status {})",
                    operation.status
                ),
            ));
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Batch operation must be active with no outstanding distributions"
    }
}
