//! Log records: commands, events, rejections, and client responses.

use super::commands::Command;
use super::key::{BatchOperationKey, PartitionId};
use crate::state_machine::BatchOperationEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionType {
    InvalidArgument,
    NotFound,
    InvalidState,
    AlreadyExists,
    Forbidden,
    ProcessingError,
}

impl fmt::Display for RejectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::NotFound => "NOT_FOUND",
            Self::InvalidState => "INVALID_STATE",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::Forbidden => "FORBIDDEN",
            Self::ProcessingError => "PROCESSING_ERROR",
        };
        f.write_str(s)
    }
}

/// A command rejection: terminal for the command instance, never retried
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub rejection_type: RejectionType,
    pub reason: String,
}

impl Rejection {
    pub fn new(rejection_type: RejectionType, reason: impl Into<String>) -> Self {
        Self {
            rejection_type,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.rejection_type, self.reason)
    }
}

/// Present on commands submitted by a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMetadata {
    pub request_id: Uuid,
    pub username: Option<String>,
}

impl RequestMetadata {
    pub fn new(username: Option<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            username,
        }
    }
}

/// Present on commands that arrived through command distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DistributionMetadata {
    pub source_partition: PartitionId,
    pub distribution_key: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    /// Key of the batch operation; `None` only for CREATE before a key is assigned
    pub key: Option<BatchOperationKey>,
    pub command: Command,
    pub request: Option<RequestMetadata>,
    pub distribution: Option<DistributionMetadata>,
}

impl CommandRecord {
    /// Internal command, not tied to any client request
    pub fn internal(key: BatchOperationKey, command: impl Into<Command>) -> Self {
        Self {
            key: Some(key),
            command: command.into(),
            request: None,
            distribution: None,
        }
    }

    /// Command submitted by a client
    pub fn client(
        key: Option<BatchOperationKey>,
        command: impl Into<Command>,
        username: Option<String>,
    ) -> Self {
        Self {
            key,
            command: command.into(),
            request: Some(RequestMetadata::new(username)),
            distribution: None,
        }
    }

    pub fn is_distributed(&self) -> bool {
        self.distribution.is_some()
    }

    pub fn username(&self) -> Option<&str> {
        self.request
            .as_ref()
            .and_then(|request| request.username.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub key: BatchOperationKey,
    pub event: BatchOperationEvent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionRecord {
    pub command: CommandRecord,
    pub rejection: Rejection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record_type", rename_all = "snake_case")]
pub enum RecordValue {
    Command(CommandRecord),
    Event(EventRecord),
    Rejection(RejectionRecord),
}

/// An entry of a partition's log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedRecord {
    pub position: u64,
    pub timestamp: DateTime<Utc>,
    pub value: RecordValue,
}

impl LoggedRecord {
    pub fn as_event(&self) -> Option<&EventRecord> {
        match &self.value {
            RecordValue::Event(event) => Some(event),
            _ => None,
        }
    }

    pub fn as_rejection(&self) -> Option<&RejectionRecord> {
        match &self.value {
            RecordValue::Rejection(rejection) => Some(rejection),
            _ => None,
        }
    }

    pub fn as_command(&self) -> Option<&CommandRecord> {
        match &self.value {
            RecordValue::Command(command) => Some(command),
            _ => None,
        }
    }
}

/// Response sent back to the client that submitted a command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponseValue {
    Created {
        key: BatchOperationKey,
        partitions: Vec<PartitionId>,
    },
    Accepted {
        key: BatchOperationKey,
        intent: String,
    },
    Rejected(Rejection),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub request_id: Uuid,
    pub value: ResponseValue,
}
