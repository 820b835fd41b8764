//! End-to-end execution-engine scenarios over the in-memory stack.

mod support;

use dca_core::events::PlanNotification;
use dca_core::execution::failure_reasons;
use dca_core::models::{ExecutionStatus, PlanStatus};
use dca_core::repository::{InMemoryPlanRepository, PlanRepository};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use support::*;
use uuid::Uuid;

#[tokio::test]
async fn test_happy_path_executes_next_slot() {
    let repository = Arc::new(InMemoryPlanRepository::new());
    let plan = seed_plan(&repository, 3, 12).await;
    let (engine, mut notifications) = build_engine(
        Arc::clone(&repository),
        in_memory_locks(),
        Arc::new(StaticPriceFeed {
            price: decimal("65000.00"),
        }),
        Arc::new(RecordingLedger::default()),
    );

    let outcome = engine
        .execute_plan(plan.plan_id)
        .await
        .unwrap()
        .expect("lock was free");

    assert_eq!(outcome.status, ExecutionStatus::Success);
    assert_eq!(outcome.execution_number, 4);
    assert_eq!(outcome.amount_in, 100_000_000);
    assert_eq!(outcome.amount_out.as_ref().unwrap().to_string(), "0.00153846");
    assert_eq!(outcome.price.as_ref().unwrap(), &decimal("65000.00"));
    assert!(!outcome.replayed);

    let updated = repository.find_plan(plan.plan_id).await.unwrap().unwrap();
    assert_eq!(updated.executions_completed, 4);
    assert_eq!(updated.status, PlanStatus::Active);
    assert!(updated.next_execution_at > Utc::now());

    let delivered = notifications.recv().await.unwrap();
    assert!(matches!(
        delivered,
        PlanNotification::PlanExecuted {
            execution_number: 4,
            ..
        }
    ));
}

#[tokio::test]
async fn test_final_execution_completes_plan() {
    let repository = Arc::new(InMemoryPlanRepository::new());
    let plan = seed_plan(&repository, 11, 12).await;
    let (engine, mut notifications) = build_engine(
        Arc::clone(&repository),
        in_memory_locks(),
        Arc::new(StaticPriceFeed {
            price: decimal("65000.00"),
        }),
        Arc::new(RecordingLedger::default()),
    );

    let outcome = engine.execute_plan(plan.plan_id).await.unwrap().unwrap();
    assert_eq!(outcome.status, ExecutionStatus::Success);
    assert_eq!(outcome.execution_number, 12);

    let updated = repository.find_plan(plan.plan_id).await.unwrap().unwrap();
    assert_eq!(updated.executions_completed, 12);
    assert_eq!(updated.status, PlanStatus::Completed);

    // A completed plan never satisfies the due predicate again.
    let due = repository.find_due_plans(Utc::now(), 100).await.unwrap();
    assert!(due.iter().all(|r| r.plan_id != plan.plan_id));

    let first = notifications.recv().await.unwrap();
    let second = notifications.recv().await.unwrap();
    assert!(matches!(first, PlanNotification::PlanExecuted { .. }));
    assert!(matches!(
        second,
        PlanNotification::PlanCompleted {
            total_executions: 12,
            ..
        }
    ));
}

#[tokio::test]
async fn test_duplicate_invocation_replays_stored_outcome() {
    let repository = Arc::new(InMemoryPlanRepository::new());
    let plan = seed_plan(&repository, 3, 12).await;
    let (engine, _notifications) = build_engine(
        Arc::clone(&repository),
        in_memory_locks(),
        Arc::new(StaticPriceFeed {
            price: decimal("65000.00"),
        }),
        Arc::new(RecordingLedger::default()),
    );

    let first = engine.execute_plan(plan.plan_id).await.unwrap().unwrap();
    let second = engine.execute_plan(plan.plan_id).await.unwrap().unwrap();

    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(second.execution_number, first.execution_number);
    assert_eq!(second.status, first.status);
    assert_eq!(second.amount_out, first.amount_out);
    assert_eq!(second.ledger_tx_id, first.ledger_tx_id);

    // Exactly one record, counters advanced exactly once.
    assert_eq!(repository.records_for_plan(plan.plan_id).await.len(), 1);
    let updated = repository.find_plan(plan.plan_id).await.unwrap().unwrap();
    assert_eq!(updated.executions_completed, 4);
}

#[tokio::test]
async fn test_contended_plan_returns_none() {
    let repository = Arc::new(InMemoryPlanRepository::new());
    let plan = seed_plan(&repository, 3, 12).await;
    let locks = in_memory_locks();
    let (engine, _notifications) = build_engine(
        Arc::clone(&repository),
        locks.clone(),
        Arc::new(StaticPriceFeed {
            price: decimal("65000.00"),
        }),
        Arc::new(RecordingLedger::default()),
    );

    // Another instance already holds this plan's lock.
    let held = locks
        .acquire(
            &dca_core::constants::lock_keys::plan_lock(plan.plan_id),
            Duration::from_secs(30),
        )
        .await
        .unwrap();

    let skipped = engine.execute_plan(plan.plan_id).await.unwrap();
    assert!(skipped.is_none());
    assert_eq!(repository.records_for_plan(plan.plan_id).await.len(), 0);

    // Once released, the same call proceeds.
    assert!(held.release().await);
    let outcome = engine.execute_plan(plan.plan_id).await.unwrap().unwrap();
    assert_eq!(outcome.status, ExecutionStatus::Success);
}

#[tokio::test]
async fn test_cancelled_plan_short_circuits_without_record() {
    let repository = Arc::new(InMemoryPlanRepository::new());
    let plan = seed_plan(&repository, 3, 12).await;
    // Owner cancels between scan and execution attempt.
    set_progress(&repository, plan.plan_id, 3, PlanStatus::Cancelled).await;

    let (engine, _notifications) = build_engine(
        Arc::clone(&repository),
        in_memory_locks(),
        Arc::new(StaticPriceFeed {
            price: decimal("65000.00"),
        }),
        Arc::new(RecordingLedger::default()),
    );

    let outcome = engine.execute_plan(plan.plan_id).await.unwrap().unwrap();
    assert_eq!(outcome.status, ExecutionStatus::Failed);
    assert_eq!(
        outcome.error_message.as_deref(),
        Some(failure_reasons::NOT_ACTIVE)
    );

    assert_eq!(repository.records_for_plan(plan.plan_id).await.len(), 0);
    let unchanged = repository.find_plan(plan.plan_id).await.unwrap().unwrap();
    assert_eq!(unchanged.executions_completed, 3);
    assert_eq!(unchanged.status, PlanStatus::Cancelled);
}

#[tokio::test]
async fn test_pricing_failure_keeps_slot_and_retries() {
    let repository = Arc::new(InMemoryPlanRepository::new());
    let plan = seed_plan(&repository, 3, 12).await;
    let (engine, _notifications) = build_engine(
        Arc::clone(&repository),
        in_memory_locks(),
        Arc::new(FlakyPriceFeed::new(1, decimal("65000.00"))),
        Arc::new(RecordingLedger::default()),
    );

    let failed = engine.execute_plan(plan.plan_id).await.unwrap().unwrap();
    assert_eq!(failed.status, ExecutionStatus::Failed);
    assert_eq!(failed.execution_number, 4);
    assert!(failed.amount_out.is_none());

    // Counters and due time untouched: the plan stays eligible.
    let after_failure = repository.find_plan(plan.plan_id).await.unwrap().unwrap();
    assert_eq!(after_failure.executions_completed, 3);
    assert_eq!(after_failure.next_execution_at, plan.next_execution_at);
    assert!(repository
        .find_due_plans(Utc::now(), 100)
        .await
        .unwrap()
        .iter()
        .any(|r| r.plan_id == plan.plan_id));

    // Next tick retries the same slot and succeeds.
    let retried = engine.execute_plan(plan.plan_id).await.unwrap().unwrap();
    assert_eq!(retried.status, ExecutionStatus::Success);
    assert_eq!(retried.execution_number, 4);

    let records = repository.records_for_plan(plan.plan_id).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].attempt_count, 2);
    assert_eq!(records[0].status, ExecutionStatus::Success);

    let after_retry = repository.find_plan(plan.plan_id).await.unwrap().unwrap();
    assert_eq!(after_retry.executions_completed, 4);
}

#[tokio::test]
async fn test_ledger_failure_records_known_price_and_retries() {
    let repository = Arc::new(InMemoryPlanRepository::new());
    let plan = seed_plan(&repository, 3, 12).await;
    let locks = in_memory_locks();
    let (engine, _notifications) = build_engine(
        Arc::clone(&repository),
        locks.clone(),
        Arc::new(StaticPriceFeed {
            price: decimal("65000.00"),
        }),
        Arc::new(FailingLedger),
    );

    let failed = engine.execute_plan(plan.plan_id).await.unwrap().unwrap();
    assert_eq!(failed.status, ExecutionStatus::Failed);
    assert_eq!(failed.execution_number, 4);
    // Amount and price were already known when the ledger rejected.
    assert_eq!(failed.amount_out.as_ref().unwrap().to_string(), "0.00153846");
    assert!(failed.price.is_some());
    assert!(failed.ledger_tx_id.is_none());

    let unchanged = repository.find_plan(plan.plan_id).await.unwrap().unwrap();
    assert_eq!(unchanged.executions_completed, 3);

    // The ledger recovers; the same slot completes.
    let (recovered_engine, _n) = build_engine(
        Arc::clone(&repository),
        locks,
        Arc::new(StaticPriceFeed {
            price: decimal("65000.00"),
        }),
        Arc::new(RecordingLedger::default()),
    );
    let retried = recovered_engine
        .execute_plan(plan.plan_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(retried.status, ExecutionStatus::Success);
    assert_eq!(retried.execution_number, 4);
}

#[tokio::test]
async fn test_monotonic_progress_to_completion() {
    let repository = Arc::new(InMemoryPlanRepository::new());
    let plan = seed_plan(&repository, 0, 3).await;
    let (engine, _notifications) = build_engine(
        Arc::clone(&repository),
        in_memory_locks(),
        Arc::new(StaticPriceFeed {
            price: decimal("65000.00"),
        }),
        Arc::new(RecordingLedger::default()),
    );

    for expected in 1..=3 {
        let outcome = engine.execute_plan(plan.plan_id).await.unwrap().unwrap();
        assert_eq!(outcome.status, ExecutionStatus::Success);
        assert_eq!(outcome.execution_number, expected);

        let current = repository.find_plan(plan.plan_id).await.unwrap().unwrap();
        assert_eq!(current.executions_completed, expected);

        if expected < 3 {
            // Simulate the next interval elapsing.
            set_progress(&repository, plan.plan_id, expected, PlanStatus::Active).await;
        }
    }

    let finished = repository.find_plan(plan.plan_id).await.unwrap().unwrap();
    assert_eq!(finished.executions_completed, 3);
    assert_eq!(finished.status, PlanStatus::Completed);
    assert_eq!(repository.records_for_plan(plan.plan_id).await.len(), 3);

    // No scan ever selects it again.
    let due = repository.find_due_plans(Utc::now(), 100).await.unwrap();
    assert!(due.iter().all(|r| r.plan_id != plan.plan_id));

    // A defensive re-invocation short-circuits on the terminal status.
    let replay = engine.execute_plan(plan.plan_id).await.unwrap().unwrap();
    assert_eq!(replay.status, ExecutionStatus::Failed);
    assert_eq!(
        replay.error_message.as_deref(),
        Some(failure_reasons::NOT_ACTIVE)
    );
}

#[tokio::test]
async fn test_unknown_plan_is_an_error() {
    let repository = Arc::new(InMemoryPlanRepository::new());
    let (engine, _notifications) = build_engine(
        Arc::clone(&repository),
        in_memory_locks(),
        Arc::new(StaticPriceFeed {
            price: decimal("65000.00"),
        }),
        Arc::new(RecordingLedger::default()),
    );

    let missing = Uuid::new_v4();
    let result = engine.execute_plan(missing).await;
    assert!(matches!(result, Err(dca_core::DcaError::PlanNotFound(id)) if id == missing));
}

#[tokio::test]
async fn test_failure_notification_published() {
    let repository = Arc::new(InMemoryPlanRepository::new());
    let plan = seed_plan(&repository, 0, 12).await;
    let (engine, mut notifications) = build_engine(
        Arc::clone(&repository),
        in_memory_locks(),
        Arc::new(FlakyPriceFeed::new(10, decimal("65000.00"))),
        Arc::new(RecordingLedger::default()),
    );

    engine.execute_plan(plan.plan_id).await.unwrap().unwrap();

    let delivered = notifications.recv().await.unwrap();
    assert!(matches!(
        delivered,
        PlanNotification::PlanExecutionFailed {
            execution_number: 1,
            ..
        }
    ));
}
