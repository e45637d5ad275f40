//! # Item Provider
//!
//! Resolves the filter of a batch operation into its complete, deduplicated
//! item set by paging the read store with a sort cursor. The abort predicate
//! is polled before every page so a concurrent cancel stops a large fetch
//! early. Partial results are discarded on any failure; fetching is a pure
//! read and is simply repeated on the next attempt.

pub mod in_memory;
pub mod search;

pub use in_memory::{InMemorySearchClient, StoredDocument, StoredIncident};
pub use search::{PageRequest, SearchClient, SearchHit, SearchPage, SearchQuery};

use crate::constants::{QUERY_PAGE_SIZE, SECONDARY_QUERY_GROUP_SIZE};
use crate::models::{
    BatchOperationErrorType, BatchOperationFilter, BatchOperationType, ErrorDescriptor, Item,
    PartitionId,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ItemProviderError {
    #[error("Item fetch aborted")]
    Aborted,
    #[error("Search failed: {message}")]
    Search { message: String },
    #[error("Item of {item_bytes} bytes exceeds the chunk limit of {max_bytes} bytes")]
    ResultBufferSizeExceeded { item_bytes: usize, max_bytes: usize },
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ItemProviderError {
    pub fn search(message: impl Into<String>) -> Self {
        Self::Search {
            message: message.into(),
        }
    }

    /// Error descriptor recorded when this failure fails a partition
    pub fn to_error_descriptor(&self) -> ErrorDescriptor {
        let error_type = match self {
            Self::Search { .. } => BatchOperationErrorType::QueryFailed,
            Self::ResultBufferSizeExceeded { .. } => {
                BatchOperationErrorType::ResultBufferSizeExceeded
            }
            Self::Aborted | Self::Serialization(_) => BatchOperationErrorType::Unknown,
        };
        ErrorDescriptor::new(error_type, self.to_string())
    }
}

/// Polled before each page fetch; returning `true` aborts the fetch
pub type AbortPredicate = dyn Fn() -> bool + Send + Sync;

#[async_trait]
pub trait ItemProvider: Send + Sync {
    /// Fetch every item of the batch operation that lives on `partition_id`
    async fn fetch_items(
        &self,
        partition_id: PartitionId,
        operation_type: BatchOperationType,
        filter: &BatchOperationFilter,
        should_abort: &AbortPredicate,
    ) -> Result<Vec<Item>, ItemProviderError>;
}

/// Item provider backed by a [`SearchClient`]
#[derive(Clone)]
pub struct SearchItemProvider {
    client: Arc<dyn SearchClient>,
}

impl std::fmt::Debug for SearchItemProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchItemProvider").finish_non_exhaustive()
    }
}

impl SearchItemProvider {
    pub fn new(client: Arc<dyn SearchClient>) -> Self {
        Self { client }
    }

    /// Page through all matches of `query`, cursor by cursor
    async fn fetch_all(
        &self,
        query: &SearchQuery,
        should_abort: &AbortPredicate,
    ) -> Result<Vec<SearchHit>, ItemProviderError> {
        let mut hits: Vec<SearchHit> = Vec::new();
        let mut search_after = None;

        loop {
            if should_abort() {
                debug!(index = query.index_name(), fetched = hits.len(), "Item fetch aborted");
                return Err(ItemProviderError::Aborted);
            }

            let page = self
                .client
                .search(
                    query,
                    &PageRequest {
                        size: QUERY_PAGE_SIZE,
                        search_after: search_after.take(),
                    },
                )
                .await?;

            if page.hits.is_empty() {
                break;
            }
            hits.extend(page.hits);

            if hits.len() as u64 >= page.total {
                break;
            }
            match page.last_sort_values {
                Some(values) => search_after = Some(values),
                // Without a cursor there is no next page to ask for
                None => break,
            }
        }

        Ok(hits)
    }

    async fn fetch_incident_items(
        &self,
        partition_id: PartitionId,
        filter: &BatchOperationFilter,
        should_abort: &AbortPredicate,
    ) -> Result<Vec<Item>, ItemProviderError> {
        let process_instances = self
            .fetch_all(
                &SearchQuery::ProcessInstances {
                    filter: filter.clone(),
                    partition_id,
                },
                should_abort,
            )
            .await?;
        let process_instance_keys = dedup_keys(process_instances.iter().map(|hit| hit.key));

        let mut items = Vec::new();
        for group in process_instance_keys.chunks(SECONDARY_QUERY_GROUP_SIZE) {
            let incidents = self
                .fetch_all(
                    &SearchQuery::Incidents {
                        process_instance_keys: group.to_vec(),
                        partition_id,
                    },
                    should_abort,
                )
                .await?;
            items.extend(
                incidents
                    .into_iter()
                    .map(|hit| Item::new(hit.key, hit.correlated_key)),
            );
        }
        Ok(items)
    }
}

#[async_trait]
impl ItemProvider for SearchItemProvider {
    #[instrument(skip(self, filter, should_abort), fields(operation_type = %operation_type))]
    async fn fetch_items(
        &self,
        partition_id: PartitionId,
        operation_type: BatchOperationType,
        filter: &BatchOperationFilter,
        should_abort: &AbortPredicate,
    ) -> Result<Vec<Item>, ItemProviderError> {
        let items = match operation_type {
            BatchOperationType::ResolveIncident => {
                self.fetch_incident_items(partition_id, filter, should_abort)
                    .await?
            }
            BatchOperationType::DeleteDecisionInstance => self
                .fetch_all(
                    &SearchQuery::DecisionInstances {
                        filter: filter.clone(),
                        partition_id,
                    },
                    should_abort,
                )
                .await?
                .into_iter()
                .map(|hit| Item::uncorrelated(hit.key))
                .collect(),
            BatchOperationType::CancelProcessInstance
            | BatchOperationType::MigrateProcessInstance
            | BatchOperationType::ModifyProcessInstance
            | BatchOperationType::DeleteProcessInstance => self
                .fetch_all(
                    &SearchQuery::ProcessInstances {
                        filter: filter.clone(),
                        partition_id,
                    },
                    should_abort,
                )
                .await?
                .into_iter()
                .map(|hit| Item::uncorrelated(hit.key))
                .collect(),
        };

        let items = dedup_items(items);
        debug!(partition_id, item_count = items.len(), "Items fetched");
        Ok(items)
    }
}

fn dedup_keys(keys: impl Iterator<Item = i64>) -> Vec<i64> {
    let mut seen = HashSet::new();
    keys.filter(|key| seen.insert(*key)).collect()
}

/// Remove duplicate items, keeping the first occurrence in fetch order
fn dedup_items(items: Vec<Item>) -> Vec<Item> {
    let mut seen = HashSet::new();
    items.into_iter().filter(|item| seen.insert(*item)).collect()
}
