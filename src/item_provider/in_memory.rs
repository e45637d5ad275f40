//! In-memory read store for tests and the simulator.
//!
//! Filters are matched as JSON subsets: a document matches when every field
//! of the filter object is present in its attributes with an equal value.

use super::search::{PageRequest, SearchClient, SearchHit, SearchPage, SearchQuery};
use super::ItemProviderError;
use crate::models::{BatchOperationFilter, PartitionId};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A process or decision instance document
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub key: i64,
    pub partition_id: PartitionId,
    pub attributes: Value,
}

impl StoredDocument {
    pub fn new(key: i64, partition_id: PartitionId, attributes: Value) -> Self {
        Self {
            key,
            partition_id,
            attributes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredIncident {
    pub key: i64,
    pub process_instance_key: i64,
    pub partition_id: PartitionId,
}

impl StoredIncident {
    pub fn new(key: i64, process_instance_key: i64, partition_id: PartitionId) -> Self {
        Self {
            key,
            process_instance_key,
            partition_id,
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemorySearchClient {
    process_instances: RwLock<Vec<StoredDocument>>,
    decision_instances: RwLock<Vec<StoredDocument>>,
    incidents: RwLock<Vec<StoredIncident>>,
    page_size_limit: RwLock<Option<usize>>,
    failures_remaining: AtomicUsize,
    queries_served: AtomicUsize,
}

impl InMemorySearchClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_process_instance(&self, document: StoredDocument) {
        self.process_instances.write().push(document);
    }

    pub fn add_decision_instance(&self, document: StoredDocument) {
        self.decision_instances.write().push(document);
    }

    pub fn add_incident(&self, incident: StoredIncident) {
        self.incidents.write().push(incident);
    }

    /// Cap page sizes below what callers request, to exercise paging
    pub fn set_page_size_limit(&self, limit: Option<usize>) {
        *self.page_size_limit.write() = limit;
    }

    /// Make the next `count` searches fail
    pub fn fail_next_searches(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Number of successful searches served so far
    pub fn queries_served(&self) -> usize {
        self.queries_served.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        self.failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }

    fn matching_hits(&self, query: &SearchQuery) -> Vec<SearchHit> {
        let mut hits: Vec<SearchHit> = match query {
            SearchQuery::ProcessInstances {
                filter,
                partition_id,
            } => matching_documents(&self.process_instances.read(), filter, *partition_id),
            SearchQuery::DecisionInstances {
                filter,
                partition_id,
            } => matching_documents(&self.decision_instances.read(), filter, *partition_id),
            SearchQuery::Incidents {
                process_instance_keys,
                partition_id,
            } => self
                .incidents
                .read()
                .iter()
                .filter(|incident| {
                    incident.partition_id == *partition_id
                        && process_instance_keys.contains(&incident.process_instance_key)
                })
                .map(|incident| SearchHit {
                    key: incident.key,
                    correlated_key: incident.process_instance_key,
                })
                .collect(),
        };
        hits.sort_by_key(|hit| hit.key);
        hits
    }
}

fn matching_documents(
    documents: &[StoredDocument],
    filter: &BatchOperationFilter,
    partition_id: PartitionId,
) -> Vec<SearchHit> {
    documents
        .iter()
        .filter(|doc| doc.partition_id == partition_id && matches_filter(&doc.attributes, filter))
        .map(|doc| SearchHit {
            key: doc.key,
            correlated_key: doc.key,
        })
        .collect()
}

fn matches_filter(attributes: &Value, filter: &BatchOperationFilter) -> bool {
    match filter.as_value() {
        Value::Object(criteria) => criteria
            .iter()
            .all(|(field, expected)| attributes.get(field) == Some(expected)),
        _ => false,
    }
}

#[async_trait]
impl SearchClient for InMemorySearchClient {
    async fn search(
        &self,
        query: &SearchQuery,
        page: &PageRequest,
    ) -> Result<SearchPage, ItemProviderError> {
        if self.take_failure() {
            return Err(ItemProviderError::search(format!(
                "injected failure querying {}",
                query.index_name()
            )));
        }

        let hits = self.matching_hits(query);
        let total = hits.len() as u64;
        let after = page
            .search_after
            .as_ref()
            .and_then(|values| values.first())
            .and_then(Value::as_i64);
        let size = match *self.page_size_limit.read() {
            Some(limit) => page.size.min(limit),
            None => page.size,
        };

        let hits: Vec<SearchHit> = hits
            .into_iter()
            .filter(|hit| after.map_or(true, |after| hit.key > after))
            .take(size)
            .collect();
        let last_sort_values = hits.last().map(|hit| vec![json!(hit.key)]);

        self.queries_served.fetch_add(1, Ordering::SeqCst);
        Ok(SearchPage {
            hits,
            last_sort_values,
            total,
        })
    }
}
