//! End-to-end coordination between a lead partition and its followers.

mod common;

use batchop_core::models::{
    BatchOperationCommand, BatchOperationErrorType, BatchOperationKey, BatchOperationType,
    Command, CommandRecord, DistributionMetadata, FollowUpCommand, RejectionType, ResponseValue,
};
use batchop_core::engine::OutboundDistribution;
use batchop_core::state_machine::{BatchOperationEvent, BatchOperationStatus};
use common::{create_command, intents, TestCluster};
use serde_json::json;

fn executing_rounds(events: &[BatchOperationEvent]) -> Vec<(u64, usize)> {
    events
        .iter()
        .filter_map(|event| match event {
            BatchOperationEvent::Executing { offset, item_keys } => Some((*offset, item_keys.len())),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_items_are_executed_in_slices_on_every_partition() {
    let tc = TestCluster::new(3);
    tc.seed(1, 25);
    tc.seed(2, 3);
    let key = tc.create(1);

    let operation = tc.drive_to_terminal(key).await;

    assert_eq!(operation.status, BatchOperationStatus::Completed);
    assert!(operation.errors.is_empty());
    assert_eq!(
        operation.completed_partitions.iter().copied().collect::<Vec<_>>(),
        vec![1, 2, 3]
    );

    assert_eq!(
        executing_rounds(&tc.events(1, key)),
        vec![(0, 10), (10, 10), (20, 5)]
    );
    assert_eq!(executing_rounds(&tc.events(2, key)), vec![(0, 3)]);
    assert!(executing_rounds(&tc.events(3, key)).is_empty());

    assert_eq!(tc.item_commands(1).len(), 25);
    assert_eq!(tc.item_commands(2).len(), 3);
    assert!(tc.item_commands(3).is_empty());
    assert!(tc
        .item_commands(1)
        .iter()
        .all(|command| command.batch_operation_key() == key));

    // Followers dropped their copy once their share was reported
    for follower in [2, 3] {
        let partition = tc.cluster.partition(follower).unwrap();
        let engine = partition.lock();
        assert!(!engine.state().contains(key));
        assert!(engine.state().has_finished(key));
    }
    assert!(!tc.cluster.has_outstanding_distributions());
    tc.assert_replay_matches();
}

#[tokio::test]
async fn test_lead_event_sequence() {
    let tc = TestCluster::new(1);
    tc.seed(1, 12);
    let key = tc.create(1);

    tc.drive_to_terminal(key).await;

    assert_eq!(
        intents(&tc.events(1, key)),
        vec![
            "CREATED",
            "INITIALIZING",
            "CHUNK_CREATED",
            "INITIALIZED",
            "STARTED",
            "EXECUTING",
            "EXECUTED",
            "EXECUTING",
            "EXECUTED",
            "PARTITION_COMPLETED",
            "COMPLETED",
        ]
    );
}

#[tokio::test]
async fn test_lead_is_decoded_from_key_of_any_partition() {
    let tc = TestCluster::new(3);
    tc.seed(1, 4);
    tc.seed(3, 4);
    let key = tc.create(2);
    assert_eq!(key.lead_partition(), 2);

    let operation = tc.drive_to_terminal(key).await;

    assert_eq!(operation.status, BatchOperationStatus::Completed);
    assert!(tc.operation_on(1, key).is_none());
    assert!(tc.operation_on(3, key).is_none());
    assert_eq!(tc.item_commands(1).len() + tc.item_commands(3).len(), 8);
}

#[tokio::test]
async fn test_partial_failure_completes_with_errors() {
    let tc = TestCluster::new(3);
    for partition_id in 1..=3 {
        tc.seed(partition_id, 2);
    }
    let key = tc.create(1);

    // Only partition 3's item query fails
    tc.store.fail_next_searches(1);
    tc.tick(3).await;
    tc.cluster.run_until_idle().unwrap();

    let lead = tc.lead_operation(key).unwrap();
    assert!(lead.failed_partitions.contains(&3));
    assert!(!lead.status.is_terminal());

    let operation = tc.drive_to_terminal(key).await;
    assert_eq!(operation.status, BatchOperationStatus::Completed);
    assert_eq!(operation.errors.len(), 1);
    assert_eq!(
        operation.errors[&3].error_type,
        BatchOperationErrorType::QueryFailed
    );
    assert_eq!(tc.item_commands(1).len(), 2);
    assert_eq!(tc.item_commands(2).len(), 2);
    assert!(tc.item_commands(3).is_empty());
}

#[tokio::test]
async fn test_every_partition_failing_fails_the_operation() {
    let tc = TestCluster::new(3);
    let key = tc.create(1);

    tc.store.fail_next_searches(3);
    let operation = tc.drive_to_terminal(key).await;

    assert_eq!(operation.status, BatchOperationStatus::Failed);
    assert_eq!(operation.errors.len(), 3);
    assert!(operation
        .errors
        .values()
        .all(|error| error.error_type == BatchOperationErrorType::QueryFailed));
    assert!(tc.follow_up_commands(1).is_empty());
}

#[tokio::test]
async fn test_follow_up_command_after_completion() {
    let tc = TestCluster::new(2);
    tc.seed(1, 1);
    tc.seed(2, 1);
    let mut create = create_command(BatchOperationType::CancelProcessInstance);
    create.follow_up_command = Some(FollowUpCommand {
        intent: "ARCHIVE_INSTANCES".to_string(),
        payload: json!({"retentionDays": 30}),
    });
    let key = tc.create_with(1, create);

    tc.drive_to_terminal(key).await;

    let follow_ups = tc.follow_up_commands(1);
    assert_eq!(follow_ups.len(), 1);
    let Command::FollowUp(follow_up) = &follow_ups[0] else {
        panic!("expected a follow-up command");
    };
    assert_eq!(follow_up.intent, "ARCHIVE_INSTANCES");
    assert!(tc.follow_up_commands(2).is_empty());
}

#[tokio::test]
async fn test_redelivered_create_is_rejected_and_acknowledged() {
    let tc = TestCluster::new(3);
    tc.cluster.set_drop_acknowledgements(true);
    let key = tc.create(1);
    assert!(tc.cluster.has_outstanding_distributions());

    assert_eq!(tc.cluster.redeliver_pending().unwrap(), 2);
    tc.cluster.run_until_idle().unwrap();

    for follower in [2, 3] {
        let created = tc
            .events(follower, key)
            .into_iter()
            .filter(|event| matches!(event, BatchOperationEvent::Created(_)))
            .count();
        assert_eq!(created, 1);
        let rejections = tc.rejections(follower, key);
        assert_eq!(rejections.len(), 1);
        assert_eq!(
            rejections[0].rejection.rejection_type,
            RejectionType::AlreadyExists
        );
    }

    tc.cluster.set_drop_acknowledgements(false);
    tc.cluster.redeliver_pending().unwrap();
    tc.cluster.run_until_idle().unwrap();
    assert!(!tc.cluster.has_outstanding_distributions());
    tc.assert_replay_matches();
}

#[tokio::test]
async fn test_redelivered_create_after_follower_finished_is_not_recreated() {
    let tc = TestCluster::new(2);
    tc.seed(1, 30);
    let key = tc.create(1);

    tc.cluster.set_drop_acknowledgements(true);
    tc.drive_rounds(3).await;
    tc.cluster.set_drop_acknowledgements(false);
    assert!(tc.operation_on(2, key).is_none());

    // The CREATE that partition 2 never acknowledged arrives again
    tc.cluster.redeliver_pending().unwrap();
    tc.cluster.run_until_idle().unwrap();
    assert!(tc.operation_on(2, key).is_none());

    let operation = tc.drive_to_terminal(key).await;
    assert_eq!(operation.status, BatchOperationStatus::Completed);
    assert_eq!(tc.item_commands(1).len(), 30);
    tc.assert_replay_matches();
}

#[tokio::test]
async fn test_duplicate_partition_report_is_recorded_once() {
    let tc = TestCluster::new(3);
    tc.seed(1, 2);
    tc.seed(2, 2);
    let key = tc.create(1);

    for _ in 0..2 {
        tc.tick(1).await;
        tc.tick(2).await;
        tc.cluster.run_until_idle().unwrap();
    }
    let lead = tc.lead_operation(key).unwrap();
    assert_eq!(
        lead.completed_partitions.iter().copied().collect::<Vec<_>>(),
        vec![1, 2]
    );

    let duplicate = OutboundDistribution {
        target_partition: 1,
        record: CommandRecord {
            key: Some(key),
            command: Command::BatchOperation(BatchOperationCommand::CompletePartition {
                partition_id: 2,
            }),
            request: None,
            distribution: Some(DistributionMetadata {
                source_partition: 2,
                distribution_key: BatchOperationKey::encode(2, 999).value(),
            }),
        },
    };
    tc.cluster.inject(duplicate.clone()).unwrap();
    tc.cluster.inject(duplicate).unwrap();
    tc.cluster.run_until_idle().unwrap();

    let reports_from_two = tc
        .events(1, key)
        .into_iter()
        .filter(|event| {
            matches!(event, BatchOperationEvent::PartitionCompleted { partition_id: 2 })
        })
        .count();
    assert_eq!(reports_from_two, 1);
    assert!(!tc.lead_operation(key).unwrap().status.is_terminal());

    let operation = tc.drive_to_terminal(key).await;
    assert_eq!(operation.status, BatchOperationStatus::Completed);
}

#[tokio::test]
async fn test_suspend_waits_for_outstanding_distributions() {
    let tc = TestCluster::new(3);
    tc.cluster.set_drop_acknowledgements(true);
    let key = tc.create(1);

    let responses = tc.submit_client(1, Some(key), BatchOperationCommand::Suspend);
    let ResponseValue::Rejected(rejection) = &responses[0].value else {
        panic!("expected SUSPEND to be rejected, got {responses:?}");
    };
    assert_eq!(rejection.rejection_type, RejectionType::InvalidState);
    assert!(rejection.reason.contains("outstanding"));

    tc.cluster.set_drop_acknowledgements(false);
    tc.cluster.redeliver_pending().unwrap();
    tc.cluster.run_until_idle().unwrap();

    let responses = tc.submit_client(1, Some(key), BatchOperationCommand::Suspend);
    assert!(matches!(
        responses[0].value,
        ResponseValue::Accepted { .. }
    ));
    for partition_id in 1..=3 {
        assert_eq!(
            tc.operation_on(partition_id, key).unwrap().status,
            BatchOperationStatus::Suspended
        );
    }
}

#[tokio::test]
async fn test_recovered_partition_continues_with_fresh_keys() {
    let tc = TestCluster::new(2);
    tc.seed(1, 5);
    let first = tc.create(1);
    tc.drive_to_terminal(first).await;

    tc.cluster.partition(1).unwrap().lock().recover().unwrap();
    let second = tc.create(1);
    assert_ne!(first, second);

    let operation = tc.drive_to_terminal(second).await;
    assert_eq!(operation.status, BatchOperationStatus::Completed);
    tc.assert_replay_matches();
}
