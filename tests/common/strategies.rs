//! Proptest strategies for task populations and listing filters.

use proptest::prelude::*;
use task_pipeline::models::{TaskFilter, TaskPriority, TaskStatus};

pub fn status_strategy() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::Pending),
        Just(TaskStatus::InProgress),
        Just(TaskStatus::Completed),
    ]
}

pub fn priority_strategy() -> impl Strategy<Value = TaskPriority> {
    prop_oneof![
        Just(TaskPriority::Low),
        Just(TaskPriority::Medium),
        Just(TaskPriority::High),
    ]
}

/// (owner index, status, priority) for a population spread over `owners` users
pub fn population_strategy(owners: usize) -> impl Strategy<Value = Vec<(usize, TaskStatus, TaskPriority)>> {
    prop::collection::vec((0..owners, status_strategy(), priority_strategy()), 0..24)
}

pub fn filter_strategy() -> impl Strategy<Value = TaskFilter> {
    (
        prop::option::of(status_strategy()),
        prop::option::of(priority_strategy()),
        prop::option::of(0u32..5),
        prop::option::of(0u32..150),
    )
        .prop_map(|(status, priority, page, limit)| TaskFilter {
            status,
            priority,
            page,
            limit,
        })
}
