//! Read-store contract consumed by the item provider.

use super::ItemProviderError;
use crate::models::{BatchOperationFilter, PartitionId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Query against the read store; always restricted to one partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "index", rename_all = "snake_case")]
pub enum SearchQuery {
    ProcessInstances {
        filter: BatchOperationFilter,
        partition_id: PartitionId,
    },
    DecisionInstances {
        filter: BatchOperationFilter,
        partition_id: PartitionId,
    },
    /// All incidents of a bounded group of process instances
    Incidents {
        process_instance_keys: Vec<i64>,
        partition_id: PartitionId,
    },
}

impl SearchQuery {
    pub fn partition_id(&self) -> PartitionId {
        match self {
            Self::ProcessInstances { partition_id, .. }
            | Self::DecisionInstances { partition_id, .. }
            | Self::Incidents { partition_id, .. } => *partition_id,
        }
    }

    pub fn index_name(&self) -> &'static str {
        match self {
            Self::ProcessInstances { .. } => "process_instances",
            Self::DecisionInstances { .. } => "decision_instances",
            Self::Incidents { .. } => "incidents",
        }
    }
}

/// Cursor-based page request; `search_after` is the previous page's last sort values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageRequest {
    pub size: usize,
    pub search_after: Option<Vec<Value>>,
}

/// A matched entity. For incidents `correlated_key` is the owning process
/// instance; for every other index it equals `key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub key: i64,
    pub correlated_key: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    pub hits: Vec<SearchHit>,
    pub last_sort_values: Option<Vec<Value>>,
    /// Total number of matches as reported by the store
    pub total: u64,
}

#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn search(
        &self,
        query: &SearchQuery,
        page: &PageRequest,
    ) -> Result<SearchPage, ItemProviderError>;
}
