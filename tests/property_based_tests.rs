mod common;

use common::strategies::*;
use common::{TaskBuilder, TestHarness};
use proptest::prelude::*;
use std::collections::HashSet;
use task_pipeline::models::{Actor, PageMeta, PageRequest, TaskFilter, TaskPriority, TaskStatus};
use task_pipeline::BatchOperation;
use uuid::Uuid;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("test runtime")
}

async fn populate(
    harness: &TestHarness,
    owners: &[Actor],
    population: &[(usize, TaskStatus, TaskPriority)],
) {
    for (owner, status, priority) in population {
        TaskBuilder::new()
            .with_status(*status)
            .with_priority(*priority)
            .create(harness, owners[*owner])
            .await;
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Property: a non-elevated caller only ever sees their own tasks, and the
    /// reported total matches the population they own under the filter
    #[test]
    fn listings_are_scoped_to_the_caller(
        population in population_strategy(3),
        filter in filter_strategy(),
        caller in 0usize..3,
    ) {
        let owners: Vec<Actor> = (0..3).map(|_| Actor::user(Uuid::new_v4())).collect();
        let (page, expected_total) = runtime().block_on(async {
            let harness = TestHarness::new();
            populate(&harness, &owners, &population).await;
            let page = harness
                .queries()
                .get_all(filter.clone(), owners[caller])
                .await
                .expect("listing succeeds");
            let expected = population
                .iter()
                .filter(|(owner, status, priority)| {
                    *owner == caller
                        && filter.status.map_or(true, |s| s == *status)
                        && filter.priority.map_or(true, |p| p == *priority)
                })
                .count() as u64;
            (page, expected)
        });

        prop_assert!(page.data.iter().all(|task| task.user_id == owners[caller].id));
        prop_assert_eq!(page.meta.total, expected_total);
        prop_assert!(page.data.len() as u64 <= u64::from(page.meta.limit));
        prop_assert!(page.meta.limit >= 1 && page.meta.limit <= 100);
    }

    /// Property: stats dimensions each sum to the total task count
    #[test]
    fn stats_dimensions_sum_to_total(population in population_strategy(2)) {
        let owners: Vec<Actor> = (0..2).map(|_| Actor::user(Uuid::new_v4())).collect();
        let stats = runtime().block_on(async {
            let harness = TestHarness::new();
            populate(&harness, &owners, &population).await;
            harness.queries().get_stats().await.expect("stats succeed")
        });

        prop_assert_eq!(stats.total, population.len() as u64);
        prop_assert_eq!(stats.by_status.values().sum::<u64>(), stats.total);
        prop_assert_eq!(stats.by_priority.values().sum::<u64>(), stats.total);
        prop_assert!(stats.by_status.values().all(|count| *count > 0));
    }

    /// Property: every distinct batch id lands in exactly one of success/failed,
    /// and the failed ones are exactly the ids whose writes were made to fail
    #[test]
    fn batch_partitions_ids(
        size in 1usize..8,
        failing in prop::collection::vec(any::<bool>(), 8),
        duplicate_first in any::<bool>(),
    ) {
        let actor = Actor::user(Uuid::new_v4());
        let (result, ids, expected_failed) = runtime().block_on(async {
            let harness = TestHarness::new();
            let mut ids = Vec::new();
            let mut expected_failed = HashSet::new();
            for index in 0..size {
                let task = TaskBuilder::new().create(&harness, actor).await;
                if failing[index] {
                    harness.store.inject_write_failure(task.id);
                    expected_failed.insert(task.id);
                }
                ids.push(task.id);
            }
            let mut operations: Vec<BatchOperation> =
                ids.iter().copied().map(BatchOperation::id).collect();
            if duplicate_first {
                operations.push(BatchOperation::id(ids[0]));
            }
            let result = harness
                .commands()
                .batch_process(operations, "complete", actor)
                .await
                .expect("batch commits");
            (result, ids, expected_failed)
        });

        prop_assert_eq!(result.success.len() + result.failed.len(), ids.len());
        let failed: HashSet<Uuid> = result.failed.iter().copied().collect();
        prop_assert_eq!(failed, expected_failed);
        prop_assert!(result.success.iter().all(|id| !result.failed.contains(id)));
    }

    /// Property: paging never skips or repeats, since total pages cover the total
    #[test]
    fn total_pages_cover_total(total in 0u64..10_000, page in 1u32..50, limit in 1u32..=100) {
        let meta = PageMeta::new(total, PageRequest { page, limit });
        prop_assert!(meta.total_pages * u64::from(limit) >= total);
        if total > 0 {
            prop_assert!((meta.total_pages - 1) * u64::from(limit) < total);
        } else {
            prop_assert_eq!(meta.total_pages, 0);
        }
    }
}

#[test]
fn default_filter_resolves_to_first_page() {
    // a filter with nothing set still resolves to a usable page window
    let request = PageRequest::resolve(
        TaskFilter::default().page,
        TaskFilter::default().limit,
        &Default::default(),
    );
    assert_eq!(request.page, 1);
    assert_eq!(request.limit, 10);
}
