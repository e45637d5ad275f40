//! Keys and partition identity.
//!
//! Every key generated by a partition carries that partition's id in its high
//! bits. For a batch operation this is how the *lead partition* is known on
//! every partition without any configuration or election: it is decoded from
//! the key.

use crate::constants::PARTITION_KEY_BITS;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a log-replicated partition
pub type PartitionId = u32;

/// Globally unique batch operation key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchOperationKey(pub i64);

impl BatchOperationKey {
    /// Encode a partition id and partition-local counter into a key
    pub fn encode(partition_id: PartitionId, local_key: i64) -> Self {
        Self(((partition_id as i64) << PARTITION_KEY_BITS) + local_key)
    }

    /// Partition that created the batch operation and owns final aggregation
    pub fn lead_partition(&self) -> PartitionId {
        lead_partition(*self)
    }

    /// Partition-local part of the key
    pub fn local_key(&self) -> i64 {
        self.0 & ((1_i64 << PARTITION_KEY_BITS) - 1)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for BatchOperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for BatchOperationKey {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Decode the lead partition of a batch operation from its key
pub fn lead_partition(key: BatchOperationKey) -> PartitionId {
    (key.0 >> PARTITION_KEY_BITS) as PartitionId
}

/// Partition-local key generator
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    partition_id: PartitionId,
    next_local_key: i64,
}

impl KeyGenerator {
    pub fn new(partition_id: PartitionId) -> Self {
        Self {
            partition_id,
            next_local_key: 1,
        }
    }

    pub fn next_key(&mut self) -> BatchOperationKey {
        let key = BatchOperationKey::encode(self.partition_id, self.next_local_key);
        self.next_local_key += 1;
        key
    }

    /// Move the counter past a key observed during replay
    pub fn observe(&mut self, key: BatchOperationKey) {
        if key.lead_partition() == self.partition_id && key.local_key() >= self.next_local_key {
            self.next_local_key = key.local_key() + 1;
        }
    }

    pub fn partition_id(&self) -> PartitionId {
        self.partition_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lead_partition_is_decoded_from_key() {
        let key = BatchOperationKey::encode(3, 17);
        assert_eq!(key.lead_partition(), 3);
        assert_eq!(lead_partition(key), 3);
        assert_eq!(key.local_key(), 17);
    }

    #[test]
    fn test_key_generator_is_partition_scoped() {
        let mut first = KeyGenerator::new(1);
        let mut second = KeyGenerator::new(2);

        let a = first.next_key();
        let b = first.next_key();
        let c = second.next_key();

        assert_ne!(a, b);
        assert_eq!(a.lead_partition(), 1);
        assert_eq!(b.lead_partition(), 1);
        assert_eq!(c.lead_partition(), 2);
        assert_eq!(b.local_key(), a.local_key() + 1);
    }

    #[test]
    fn test_key_generator_observes_replayed_keys() {
        let mut generator = KeyGenerator::new(1);
        generator.observe(BatchOperationKey::encode(1, 40));
        generator.observe(BatchOperationKey::encode(2, 90));

        assert_eq!(generator.next_key().local_key(), 41);
    }
}
