mod common;

use batchop_core::chunking::Chunker;
use batchop_core::engine::{AllowAll, PartitionEngine};
use batchop_core::models::{
    BatchOperationCommand, BatchOperationKey, BatchOperationType, CommandRecord, Item,
};
use batchop_core::processing::ProcessorRegistry;
use batchop_core::state_machine::states::ALL_STATUSES;
use batchop_core::state_machine::{
    can_cancel, can_pause, can_resume, can_suspend, BatchOperationEvent, BatchOperationStatus,
};
use std::sync::Arc;
use common::strategies::*;
use proptest::prelude::*;

proptest! {
    /// Property: Chunking keeps every item, in order, within both limits
    #[test]
    fn chunks_preserve_items_and_respect_limits(
        items in item_set_strategy(300),
        (max_items, max_bytes) in chunk_limits_strategy(),
    ) {
        let key = BatchOperationKey::encode(1, 1);
        let chunks = Chunker::new(max_items, max_bytes).chunk(key, &items).unwrap();

        let flattened: Vec<Item> = chunks.iter().flat_map(|chunk| chunk.items.clone()).collect();
        prop_assert_eq!(&flattened, &items);

        for (index, chunk) in chunks.iter().enumerate() {
            prop_assert_eq!(chunk.sequence as usize, index);
            prop_assert!(!chunk.is_empty());
            prop_assert!(chunk.len() <= max_items);
            prop_assert!(serde_json::to_vec(chunk).unwrap().len() <= max_bytes);
        }
    }

    /// Property: The executor advances the persisted cursor by exactly the
    /// items it consumed, never backward, and reads every item once in order
    #[test]
    fn executor_cursor_tracks_consumed_items(
        items in item_set_strategy(120),
        max_chunk_items in 1usize..15,
    ) {
        let mut engine = PartitionEngine::new(
            1,
            vec![1],
            Arc::new(ProcessorRegistry::with_defaults(Arc::new(AllowAll))),
        );
        engine.submit(CommandRecord::client(
            None,
            BatchOperationCommand::Create(common::create_command(
                BatchOperationType::CancelProcessInstance,
            )),
            None,
        ));
        engine.run_until_idle();
        let key = engine.state().iter().map(|operation| operation.key).next().unwrap();

        let chunks = Chunker::new(max_chunk_items, 1024 * 1024).chunk(key, &items).unwrap();
        engine.submit(CommandRecord::internal(key, BatchOperationCommand::Initialize));
        for chunk in chunks {
            engine.submit(CommandRecord::internal(key, BatchOperationCommand::CreateChunk(chunk)));
        }
        engine.submit(CommandRecord::internal(key, BatchOperationCommand::FinishInitialization));
        engine.run_until_idle();
        prop_assert_eq!(engine.state().get(key).unwrap().item_count(), items.len() as u64);

        engine.submit(CommandRecord::internal(key, BatchOperationCommand::Execute { offset: 0 }));
        let mut previous = 0u64;
        while engine.process_next() {
            let consumed: u64 = engine
                .events_for(key)
                .into_iter()
                .filter_map(|event| match event {
                    BatchOperationEvent::Executing { item_keys, .. } => {
                        Some(item_keys.len() as u64)
                    }
                    _ => None,
                })
                .sum();
            let offset = engine.state().get(key).unwrap().offset;
            prop_assert!(offset >= previous);
            prop_assert_eq!(offset, consumed);
            previous = offset;
        }

        let operation = engine.state().get(key).unwrap();
        prop_assert_eq!(operation.status, BatchOperationStatus::Completed);
        prop_assert_eq!(operation.offset, items.len() as u64);

        let executed: Vec<i64> = engine
            .events_for(key)
            .into_iter()
            .filter_map(|event| match event {
                BatchOperationEvent::Executing { item_keys, .. } => Some(item_keys.clone()),
                _ => None,
            })
            .flatten()
            .collect();
        let expected: Vec<i64> = items.iter().map(|item| item.item_key).collect();
        prop_assert_eq!(executed, expected);
    }

    /// Property: Guards agree with the transition table
    #[test]
    fn guards_match_transition_table(status in status_strategy(), outstanding in any::<bool>()) {
        use batchop_core::BatchOperationStatus as S;

        prop_assert_eq!(can_cancel(status), status.can_transition_to(S::Canceled));
        prop_assert_eq!(can_pause(status), status.can_transition_to(S::Paused));
        prop_assert_eq!(can_resume(status), status.can_transition_to(S::Resumed));
        prop_assert_eq!(
            can_suspend(status, outstanding),
            status.can_transition_to(S::Suspended) && !outstanding
        );
        if status.is_terminal() {
            prop_assert!(ALL_STATUSES.iter().all(|target| !status.can_transition_to(*target)));
        }
    }
}
