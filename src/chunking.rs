//! # Chunking Pipeline
//!
//! Splits a fetched item set into ordered chunks that each fit in one log
//! record. Chunks are persisted before execution starts; replaying their
//! CHUNK_CREATED events reconstructs the same ordered item list without
//! consulting the read store again.

use crate::config::BatchOperationConfig;
use crate::item_provider::ItemProviderError;
use crate::models::{BatchOperationKey, Chunk, Item};

/// Greedy chunker bounded by item count and serialized size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    max_items: usize,
    max_bytes: usize,
}

impl Chunker {
    pub fn new(max_items: usize, max_bytes: usize) -> Self {
        Self {
            max_items: max_items.max(1),
            max_bytes,
        }
    }

    pub fn from_config(config: &BatchOperationConfig) -> Self {
        Self::new(config.max_chunk_items, config.max_chunk_bytes)
    }

    /// Split `items` into chunks numbered from 0, preserving order.
    ///
    /// An item whose serialized form alone exceeds the byte limit cannot be
    /// persisted at all and fails the whole item set.
    pub fn chunk(
        &self,
        batch_operation_key: BatchOperationKey,
        items: &[Item],
    ) -> Result<Vec<Chunk>, ItemProviderError> {
        let overhead = serialized_len(&Chunk {
            batch_operation_key,
            sequence: u32::MAX,
            items: Vec::new(),
        })?;

        let mut chunks = Vec::new();
        let mut current: Vec<Item> = Vec::new();
        let mut current_bytes = overhead;

        for item in items {
            // +1 for the separator between array elements
            let item_bytes = serialized_len(item)? + 1;
            if overhead + item_bytes > self.max_bytes {
                return Err(ItemProviderError::ResultBufferSizeExceeded {
                    item_bytes,
                    max_bytes: self.max_bytes,
                });
            }

            if current.len() == self.max_items || current_bytes + item_bytes > self.max_bytes {
                chunks.push(Chunk {
                    batch_operation_key,
                    sequence: chunks.len() as u32,
                    items: std::mem::take(&mut current),
                });
                current_bytes = overhead;
            }

            current.push(*item);
            current_bytes += item_bytes;
        }

        if !current.is_empty() {
            chunks.push(Chunk {
                batch_operation_key,
                sequence: chunks.len() as u32,
                items: current,
            });
        }

        Ok(chunks)
    }
}

fn serialized_len<T: serde::Serialize>(value: &T) -> Result<usize, ItemProviderError> {
    serde_json::to_vec(value)
        .map(|bytes| bytes.len())
        .map_err(|e| ItemProviderError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(count: i64) -> Vec<Item> {
        (1..=count).map(Item::uncorrelated).collect()
    }

    #[test]
    fn test_chunks_respect_item_limit() {
        let key = BatchOperationKey::encode(1, 1);
        let chunks = Chunker::new(4, 1024 * 1024).chunk(key, &items(10)).unwrap();

        assert_eq!(
            chunks.iter().map(Chunk::len).collect::<Vec<_>>(),
            vec![4, 4, 2]
        );
        assert_eq!(
            chunks.iter().map(|c| c.sequence).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_chunks_respect_byte_limit() {
        let key = BatchOperationKey::encode(1, 1);
        let chunker = Chunker::new(1_000, 300);
        let chunks = chunker.chunk(key, &items(50)).unwrap();

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(serde_json::to_vec(chunk).unwrap().len() <= 300);
        }
        let flattened: Vec<Item> = chunks.into_iter().flat_map(|c| c.items).collect();
        assert_eq!(flattened, items(50));
    }

    #[test]
    fn test_oversized_item_is_rejected() {
        let key = BatchOperationKey::encode(1, 1);
        let err = Chunker::new(10, 60).chunk(key, &items(1)).unwrap_err();
        assert!(matches!(
            err,
            ItemProviderError::ResultBufferSizeExceeded { max_bytes: 60, .. }
        ));
    }

    #[test]
    fn test_empty_item_set_yields_no_chunks() {
        let key = BatchOperationKey::encode(1, 1);
        assert!(Chunker::new(10, 1024).chunk(key, &[]).unwrap().is_empty());
    }
}
