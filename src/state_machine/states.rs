use serde::{Deserialize, Serialize};
use std::fmt;

/// Batch operation status.
///
/// ```text
/// CREATED → INITIALIZING → INITIALIZED → STARTED → { EXECUTING ⇄ EXECUTED } → COMPLETED | FAILED
/// ```
///
/// PAUSED and SUSPENDED are reachable from any active status, RESUMED returns
/// to active execution, CANCELED is reachable from any non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchOperationStatus {
    Created,
    Initializing,
    Initialized,
    Started,
    Executing,
    Executed,
    Paused,
    Suspended,
    Resumed,
    Completed,
    Failed,
    Canceled,
}

impl BatchOperationStatus {
    /// Check if this is a terminal status (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }

    /// Check if the batch operation is progressing (neither halted nor terminal)
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Created
                | Self::Initializing
                | Self::Initialized
                | Self::Started
                | Self::Executing
                | Self::Executed
                | Self::Resumed
        )
    }

    /// Check if the batch operation is halted and waiting for RESUME
    pub fn is_halted(&self) -> bool {
        matches!(self, Self::Paused | Self::Suspended)
    }

    /// Whether an event may move the status from `self` to `target`.
    ///
    /// Transitions never leave a terminal status and never move backward in
    /// the lifecycle; the only cycles are EXECUTING ⇄ EXECUTED and
    /// halt → RESUMED → active.
    pub fn can_transition_to(&self, target: BatchOperationStatus) -> bool {
        if self.is_terminal() {
            return false;
        }

        match target {
            Self::Created => false,
            Self::Initializing => matches!(self, Self::Created | Self::Resumed),
            Self::Initialized => matches!(self, Self::Initializing),
            Self::Started => matches!(self, Self::Initialized | Self::Resumed),
            Self::Executing => matches!(
                self,
                Self::Initialized | Self::Started | Self::Executed | Self::Resumed
            ),
            Self::Executed => matches!(self, Self::Executing),
            Self::Paused | Self::Suspended => self.is_active(),
            Self::Resumed => self.is_halted(),
            Self::Completed | Self::Failed | Self::Canceled => true,
        }
    }
}

impl fmt::Display for BatchOperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "CREATED",
            Self::Initializing => "INITIALIZING",
            Self::Initialized => "INITIALIZED",
            Self::Started => "STARTED",
            Self::Executing => "EXECUTING",
            Self::Executed => "EXECUTED",
            Self::Paused => "PAUSED",
            Self::Suspended => "SUSPENDED",
            Self::Resumed => "RESUMED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for BatchOperationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(Self::Created),
            "INITIALIZING" => Ok(Self::Initializing),
            "INITIALIZED" => Ok(Self::Initialized),
            "STARTED" => Ok(Self::Started),
            "EXECUTING" => Ok(Self::Executing),
            "EXECUTED" => Ok(Self::Executed),
            "PAUSED" => Ok(Self::Paused),
            "SUSPENDED" => Ok(Self::Suspended),
            "RESUMED" => Ok(Self::Resumed),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            "CANCELED" => Ok(Self::Canceled),
            _ => Err(format!("Invalid batch operation status: {s}")),
        }
    }
}

impl Default for BatchOperationStatus {
    fn default() -> Self {
        Self::Created
    }
}

/// All statuses, for exhaustive checks
pub const ALL_STATUSES: [BatchOperationStatus; 12] = [
    BatchOperationStatus::Created,
    BatchOperationStatus::Initializing,
    BatchOperationStatus::Initialized,
    BatchOperationStatus::Started,
    BatchOperationStatus::Executing,
    BatchOperationStatus::Executed,
    BatchOperationStatus::Paused,
    BatchOperationStatus::Suspended,
    BatchOperationStatus::Resumed,
    BatchOperationStatus::Completed,
    BatchOperationStatus::Failed,
    BatchOperationStatus::Canceled,
];
