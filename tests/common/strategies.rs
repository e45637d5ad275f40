use batchop_core::models::Item;
use batchop_core::state_machine::BatchOperationStatus;
use proptest::prelude::*;
use proptest::sample::select;

/// Items with unique keys, in fetch order
pub fn item_set_strategy(max_len: usize) -> impl Strategy<Value = Vec<Item>> {
    prop::collection::btree_set(1i64..i64::MAX / 2, 0..max_len).prop_flat_map(|keys| {
        let keys: Vec<i64> = keys.into_iter().collect();
        let len = keys.len();
        (Just(keys), prop::collection::vec(any::<i64>(), len)).prop_map(|(keys, correlated)| {
            keys.into_iter()
                .zip(correlated)
                .map(|(key, correlated)| Item::new(key, correlated))
                .collect()
        })
    })
}

/// Chunk limits from tight to generous
pub fn chunk_limits_strategy() -> impl Strategy<Value = (usize, usize)> {
    (1usize..50, 200usize..4_096)
}

pub fn status_strategy() -> impl Strategy<Value = BatchOperationStatus> {
    select(batchop_core::state_machine::states::ALL_STATUSES.to_vec())
}
