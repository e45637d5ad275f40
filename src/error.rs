//! Error types for the batch operation core.
//!
//! Command rejections are not errors: a rejected command is a regular outcome
//! written to the log as a [`Rejection`](crate::models::Rejection). The types here
//! cover failures of the machinery itself.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BatchOperationError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Item provider error: {0}")]
    ItemProviderError(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("No processor registered for {intent}")]
    ProcessorNotFound { intent: String },
    #[error("Unknown partition {partition_id}")]
    UnknownPartition { partition_id: u32 },
    #[error("State machine guard error: {0}")]
    StateMachineGuardError(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for BatchOperationError {
    fn from(error: serde_json::Error) -> Self {
        BatchOperationError::SerializationError(format!("JSON serialization error: {error}"))
    }
}

impl From<config::ConfigError> for BatchOperationError {
    fn from(error: config::ConfigError) -> Self {
        BatchOperationError::ConfigurationError(error.to_string())
    }
}

impl From<crate::item_provider::ItemProviderError> for BatchOperationError {
    fn from(error: crate::item_provider::ItemProviderError) -> Self {
        BatchOperationError::ItemProviderError(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BatchOperationError>;
