use super::key::BatchOperationKey;
use serde::{Deserialize, Serialize};

/// A unit of work: the entity the per-item command targets, paired with the
/// entity it is correlated to (e.g. an incident and its process instance).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Item {
    pub item_key: i64,
    pub correlated_key: i64,
}

impl Item {
    pub fn new(item_key: i64, correlated_key: i64) -> Self {
        Self {
            item_key,
            correlated_key,
        }
    }

    /// Item whose key is its own correlation (e.g. a matched process instance)
    pub fn uncorrelated(item_key: i64) -> Self {
        Self::new(item_key, item_key)
    }
}

/// An immutable, ordered slice of a batch operation's item set, sized to fit
/// in a single log record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub batch_operation_key: BatchOperationKey,
    pub sequence: u32,
    pub items: Vec<Item>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
