//! Aggregate counts over all tasks.

use super::task::{TaskPriority, TaskStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One grouped row: how many tasks share a (status, priority) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPriorityCount {
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    pub by_status: BTreeMap<TaskStatus, u64>,
    pub by_priority: BTreeMap<TaskPriority, u64>,
    pub total: u64,
}

impl TaskStats {
    /// Each grouped row contributes its count once to each dimension and once to the total.
    pub fn from_grouped_counts(rows: &[StatusPriorityCount]) -> Self {
        rows.iter().fold(TaskStats::default(), |mut stats, row| {
            *stats.by_status.entry(row.status).or_insert(0) += row.count;
            *stats.by_priority.entry(row.priority).or_insert(0) += row.count;
            stats.total += row.count;
            stats
        })
    }
}
