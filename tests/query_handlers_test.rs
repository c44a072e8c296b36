//! Listing, overdue and stats queries over the in-memory store.

mod common;

use chrono::Duration;
use common::{admin, user, TaskBuilder, TestHarness};
use task_pipeline::models::{TaskFilter, TaskPriority, TaskStatus};
use task_pipeline::{PipelineError, QueryOutcome, TaskQuery};
use uuid::Uuid;

#[tokio::test]
async fn test_get_by_id_missing_is_not_found() {
    let harness = TestHarness::new();

    let result = harness.queries().get_by_id(Uuid::new_v4()).await;

    assert!(matches!(result, Err(PipelineError::NotFound(_))));
}

#[tokio::test]
async fn test_get_all_scopes_to_owner() {
    let harness = TestHarness::new();
    let alice = user();
    let bob = user();
    for _ in 0..3 {
        TaskBuilder::new().create(&harness, alice).await;
    }
    TaskBuilder::new().create(&harness, bob).await;

    let page = harness
        .queries()
        .get_all(TaskFilter::default(), bob)
        .await
        .expect("listing succeeds");

    assert_eq!(page.meta.total, 1);
    assert!(page.data.iter().all(|task| task.user_id == bob.id));
}

#[tokio::test]
async fn test_get_all_admin_sees_everything() {
    let harness = TestHarness::new();
    TaskBuilder::new().create(&harness, user()).await;
    TaskBuilder::new().create(&harness, user()).await;

    let page = harness
        .queries()
        .get_all(TaskFilter::default(), admin())
        .await
        .expect("listing succeeds");

    assert_eq!(page.meta.total, 2);
    assert_eq!(page.data.len(), 2);
}

#[tokio::test]
async fn test_get_all_second_page() {
    let harness = TestHarness::new();
    let actor = user();
    let mut created = Vec::new();
    for title in ["first", "second", "third"] {
        created.push(TaskBuilder::new().with_title(title).create(&harness, actor).await.id);
    }

    let page = harness
        .queries()
        .get_all(
            TaskFilter {
                page: Some(2),
                limit: Some(2),
                ..TaskFilter::default()
            },
            actor,
        )
        .await
        .expect("listing succeeds");

    assert_eq!(page.data.len(), 1);
    assert_eq!(page.meta.total, 3);
    assert_eq!(page.meta.page, 2);
    assert_eq!(page.meta.limit, 2);
    assert_eq!(page.meta.total_pages, 2);

    let first = harness
        .queries()
        .get_all(
            TaskFilter {
                page: Some(1),
                limit: Some(2),
                ..TaskFilter::default()
            },
            actor,
        )
        .await
        .expect("listing succeeds");
    let mut seen: Vec<Uuid> = first.data.iter().chain(&page.data).map(|t| t.id).collect();
    seen.sort();
    created.sort();
    assert_eq!(seen, created, "pages are disjoint and cover every task");
}

#[tokio::test]
async fn test_get_all_filters_by_status_and_priority() {
    let harness = TestHarness::new();
    let actor = user();
    let wanted = TaskBuilder::new()
        .with_status(TaskStatus::InProgress)
        .with_priority(TaskPriority::High)
        .create(&harness, actor)
        .await;
    TaskBuilder::new()
        .with_status(TaskStatus::InProgress)
        .with_priority(TaskPriority::Low)
        .create(&harness, actor)
        .await;
    TaskBuilder::new()
        .with_priority(TaskPriority::High)
        .create(&harness, actor)
        .await;

    let page = harness
        .queries()
        .get_all(
            TaskFilter {
                status: Some(TaskStatus::InProgress),
                priority: Some(TaskPriority::High),
                ..TaskFilter::default()
            },
            actor,
        )
        .await
        .expect("listing succeeds");

    assert_eq!(page.meta.total, 1);
    assert_eq!(page.data[0].id, wanted.id);
}

#[tokio::test]
async fn test_get_all_clamps_oversized_limit() {
    let harness = TestHarness::new();
    let actor = user();
    TaskBuilder::new().create(&harness, actor).await;

    let page = harness
        .queries()
        .get_all(
            TaskFilter {
                limit: Some(10_000),
                ..TaskFilter::default()
            },
            actor,
        )
        .await
        .expect("listing succeeds");

    assert_eq!(page.meta.limit, 100);
}

#[tokio::test]
async fn test_get_overdue_excludes_completed_and_future() {
    let harness = TestHarness::new();
    let actor = user();
    let late = TaskBuilder::new().overdue().create(&harness, actor).await;
    TaskBuilder::new()
        .overdue()
        .with_status(TaskStatus::Completed)
        .create(&harness, actor)
        .await;
    TaskBuilder::new()
        .overdue()
        .with_status(TaskStatus::InProgress)
        .create(&harness, actor)
        .await;
    TaskBuilder::new()
        .due_in(Duration::days(1))
        .create(&harness, actor)
        .await;
    TaskBuilder::new().create(&harness, actor).await;

    let overdue = harness.queries().get_overdue().await.expect("query succeeds");

    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].id, late.id);
}

#[tokio::test]
async fn test_get_stats_empty_store() {
    let harness = TestHarness::new();

    let stats = harness.queries().get_stats().await.expect("stats succeed");

    assert_eq!(stats.total, 0);
    assert!(stats.by_status.is_empty());
    assert!(stats.by_priority.is_empty());
}

#[tokio::test]
async fn test_get_stats_counts_each_dimension() {
    let harness = TestHarness::new();
    let actor = user();
    TaskBuilder::new()
        .with_priority(TaskPriority::Low)
        .create(&harness, actor)
        .await;
    TaskBuilder::new()
        .with_status(TaskStatus::Completed)
        .with_priority(TaskPriority::Low)
        .create(&harness, actor)
        .await;

    let stats = harness.queries().get_stats().await.expect("stats succeed");

    assert_eq!(stats.total, 2);
    assert_eq!(stats.by_status.get(&TaskStatus::Pending), Some(&1));
    assert_eq!(stats.by_status.get(&TaskStatus::Completed), Some(&1));
    assert_eq!(stats.by_status.get(&TaskStatus::InProgress), None);
    assert_eq!(stats.by_priority.get(&TaskPriority::Low), Some(&2));

    let json = serde_json::to_value(&stats).expect("stats serialize");
    assert_eq!(json["byStatus"]["PENDING"], 1);
    assert_eq!(json["byPriority"]["LOW"], 2);
}

#[tokio::test]
async fn test_execute_dispatches_query_enum() {
    let harness = TestHarness::new();
    let task = TaskBuilder::new().create(&harness, user()).await;

    let outcome = harness
        .queries()
        .execute(TaskQuery::GetById { id: task.id })
        .await
        .expect("query runs");

    assert_eq!(outcome, QueryOutcome::Task(task));
}
