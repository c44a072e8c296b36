//! Task processor outcomes, directly and through the consumer runtime.

mod common;

use chrono::Utc;
use common::{test_config, user, TaskBuilder, TestHarness};
use serde_json::json;
use std::time::Duration;
use task_pipeline::constants::jobs;
use task_pipeline::messaging::{Job, JobQueue, JobRequest};
use task_pipeline::models::{TaskChanges, TaskStatus};
use task_pipeline::{JobResult, TaskJob, TaskProcessor};
use uuid::Uuid;

fn processor(harness: &TestHarness) -> TaskProcessor {
    TaskProcessor::new(harness.commands().clone(), harness.notifier.clone())
}

fn job(job_name: &str, payload: serde_json::Value) -> Job {
    Job {
        id: 42,
        job_name: job_name.to_string(),
        payload,
        attempts: 0,
        enqueued_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_status_update_job_applies_status() {
    let harness = TestHarness::new();
    let task = TaskBuilder::new().create(&harness, user()).await;
    let request = TaskJob::status_update(task.id, TaskStatus::InProgress).to_request();

    let result = processor(&harness)
        .process(&job(&request.job_name, request.payload))
        .await
        .expect("processing succeeds");

    assert_eq!(result, JobResult::status_updated(task.id, TaskStatus::InProgress));
    let stored = harness.queries().get_by_id(task.id).await.expect("exists");
    assert_eq!(stored.status, TaskStatus::InProgress);
}

#[tokio::test]
async fn test_reapplying_current_status_does_not_stage_another_job() {
    let harness = TestHarness::new();
    let task = TaskBuilder::new().create(&harness, user()).await;
    let staged = harness.staged_jobs_for(task.id).await;
    assert_eq!(staged.len(), 1);

    let result = processor(&harness)
        .process(&job(&staged[0].job_name, staged[0].payload.clone()))
        .await
        .expect("processing succeeds");

    assert!(result.success);
    assert_eq!(harness.staged_jobs_for(task.id).await.len(), 1);
}

#[tokio::test]
async fn test_status_jobs_settle_after_rapid_changes() {
    let mut config = test_config();
    config.worker.batch_size = 1;
    let harness = TestHarness::with_config(config);
    let task = TaskBuilder::new().create(&harness, user()).await;
    for status in [TaskStatus::InProgress, TaskStatus::Completed] {
        harness
            .commands()
            .update(task.id, TaskChanges::status(status))
            .await
            .expect("update succeeds");
    }
    let consumer = harness.pipeline.consumer();

    let mut processed = 0;
    for _ in 0..10 {
        harness.relay().await;
        processed += consumer.poll_once().await.expect("poll succeeds");
    }

    assert_eq!(processed, 3);
    assert_eq!(harness.staged_jobs_for(task.id).await.len(), 3);
    assert!(harness.queue.is_empty());
    assert_eq!(consumer.stats().snapshot().succeeded, 3);
    let stored = harness.queries().get_by_id(task.id).await.expect("exists");
    assert_eq!(stored.status, TaskStatus::Completed);
}

#[tokio::test]
async fn test_applied_status_differing_from_stored_stages_nothing() {
    let harness = TestHarness::new();
    let task = TaskBuilder::new().create(&harness, user()).await;

    let updated = harness
        .commands()
        .apply_status(task.id, TaskStatus::Completed)
        .await
        .expect("apply succeeds");

    assert_eq!(updated.status, TaskStatus::Completed);
    assert_eq!(harness.staged_jobs_for(task.id).await.len(), 1);
}

#[tokio::test]
async fn test_missing_status_is_structured_failure() {
    let harness = TestHarness::new();
    let task_id = Uuid::new_v4();

    let result = processor(&harness)
        .process(&job(
            jobs::TASK_STATUS_UPDATE,
            json!({ "taskId": task_id.to_string() }),
        ))
        .await
        .expect("malformed payloads are not errors");

    assert!(!result.success);
    assert!(result
        .error
        .as_deref()
        .is_some_and(|e| e.contains("status")));
}

#[tokio::test]
async fn test_unknown_job_type_is_structured_failure() {
    let harness = TestHarness::new();

    let result = processor(&harness)
        .process(&job("send-newsletter", json!({})))
        .await
        .expect("unknown jobs are not errors");

    assert_eq!(
        result.error.as_deref(),
        Some("Unknown job type: send-newsletter")
    );
    assert!(!result.success);
}

#[tokio::test]
async fn test_status_update_for_deleted_task_is_structured_failure() {
    let harness = TestHarness::new();
    let task = TaskBuilder::new().create(&harness, user()).await;
    harness.commands().delete(task.id).await.expect("delete succeeds");
    let request = TaskJob::status_update(task.id, TaskStatus::Completed).to_request();

    let result = processor(&harness)
        .process(&job(&request.job_name, request.payload))
        .await
        .expect("missing task is not retried");

    assert!(!result.success);
    assert!(result.error.is_some());
}

#[tokio::test]
async fn test_store_outage_propagates_for_retry() {
    let harness = TestHarness::new();
    let task = TaskBuilder::new().create(&harness, user()).await;
    harness.store.set_unavailable(true);
    let request = TaskJob::status_update(task.id, TaskStatus::Completed).to_request();

    let result = processor(&harness)
        .process(&job(&request.job_name, request.payload))
        .await;

    let err = result.expect_err("outage must surface as an error");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_overdue_notification_reaches_notifier() {
    let harness = TestHarness::new();
    let task_id = Uuid::new_v4();
    let request = TaskJob::overdue_notification(task_id).to_request();

    let result = processor(&harness)
        .process(&job(&request.job_name, request.payload))
        .await
        .expect("notification succeeds");

    assert!(result.success);
    assert_eq!(harness.notifier.notified(), vec![task_id]);
}

#[tokio::test]
async fn test_consumer_acks_structured_failures() {
    let harness = TestHarness::new();
    harness
        .queue
        .enqueue(&JobRequest::new("send-newsletter", json!({})))
        .await
        .expect("enqueue succeeds");

    let processed = harness
        .pipeline
        .consumer()
        .poll_once()
        .await
        .expect("poll succeeds");

    assert_eq!(processed, 1);
    assert!(harness.queue.is_empty(), "structured failure is acked");
    let stats = harness.pipeline.consumer().stats().snapshot();
    assert_eq!(stats.structured_failures, 1);
    assert_eq!(stats.retried, 0);
}

#[tokio::test]
async fn test_consumer_retries_after_store_outage() {
    let harness = TestHarness::new();
    let task = TaskBuilder::new().create(&harness, user()).await;
    harness
        .queue
        .enqueue(&TaskJob::status_update(task.id, TaskStatus::Completed).to_request())
        .await
        .expect("enqueue succeeds");
    let consumer = harness.pipeline.consumer();

    harness.store.set_unavailable(true);
    consumer.poll_once().await.expect("poll succeeds");

    let queued = harness.queued_jobs();
    assert_eq!(queued.len(), 1, "failed job stays queued for retry");
    assert_eq!(queued[0].attempts, 1);
    assert_eq!(consumer.stats().snapshot().retried, 1);

    harness.store.set_unavailable(false);
    tokio::time::sleep(Duration::from_millis(60)).await;
    consumer.poll_once().await.expect("poll succeeds");

    assert!(harness.queue.is_empty());
    assert_eq!(consumer.stats().snapshot().succeeded, 1);
    let stored = harness.queries().get_by_id(task.id).await.expect("exists");
    assert_eq!(stored.status, TaskStatus::Completed);
}

#[tokio::test]
async fn test_consumer_dead_letters_after_max_attempts() {
    let harness = TestHarness::new();
    let task = TaskBuilder::new().create(&harness, user()).await;
    harness
        .queue
        .enqueue(&TaskJob::status_update(task.id, TaskStatus::Completed).to_request())
        .await
        .expect("enqueue succeeds");
    let consumer = harness.pipeline.consumer();
    let max_attempts = harness.pipeline.config().queue.max_attempts;

    harness.store.set_unavailable(true);
    for _ in 0..max_attempts {
        consumer.poll_once().await.expect("poll succeeds");
        tokio::time::sleep(Duration::from_millis(60)).await;
    }

    assert!(harness.queue.is_empty());
    let dead = harness.queue.dead_letters(10).await.expect("dead letters readable");
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].attempts, max_attempts);
    assert_eq!(consumer.stats().snapshot().dead_lettered, 1);
}
