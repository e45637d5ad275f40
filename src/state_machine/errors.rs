use super::states::BatchOperationStatus;
use crate::error::BatchOperationError;
use crate::models::{BatchOperationKey, Rejection, RejectionType};
use thiserror::Error;

/// Specific error type for lifecycle guard failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GuardError {
    #[error("Batch operation {key} not found")]
    NotFound { key: BatchOperationKey },

    #[error("Cannot {action} batch operation {key} in status {current}")]
    InvalidState {
        key: BatchOperationKey,
        action: &'static str,
        current: BatchOperationStatus,
    },

    #[error("Cannot {action} batch operation {key}: {reason}")]
    BusinessRuleViolation {
        key: BatchOperationKey,
        action: &'static str,
        reason: String,
    },
}

pub type GuardResult<T> = Result<T, GuardError>;

impl GuardError {
    pub fn rejection_type(&self) -> RejectionType {
        match self {
            Self::NotFound { .. } => RejectionType::NotFound,
            Self::InvalidState { .. } | Self::BusinessRuleViolation { .. } => {
                RejectionType::InvalidState
            }
        }
    }
}

impl From<GuardError> for Rejection {
    fn from(err: GuardError) -> Self {
        Rejection::new(err.rejection_type(), err.to_string())
    }
}

impl From<GuardError> for BatchOperationError {
    fn from(err: GuardError) -> Self {
        BatchOperationError::StateMachineGuardError(format!("{err}"))
    }
}

/// Helper function to create invalid-state guard errors
pub fn invalid_state(
    key: BatchOperationKey,
    action: &'static str,
    current: BatchOperationStatus,
) -> GuardError {
    GuardError::InvalidState {
        key,
        action,
        current,
    }
}

/// Helper function to create business rule violations
pub fn business_rule_violation(
    key: BatchOperationKey,
    action: &'static str,
    reason: impl Into<String>,
) -> GuardError {
    GuardError::BusinessRuleViolation {
        key,
        action,
        reason: reason.into(),
    }
}
