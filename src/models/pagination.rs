//! Filter and pagination value types for task listings.

use super::task::{Task, TaskPriority, TaskStatus};
use crate::config::PaginationConfig;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caller-supplied listing filter. Missing page/limit fall back to configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFilter {
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Store-level predicate built from a filter plus the caller's ownership scope
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPredicate {
    pub owner: Option<Uuid>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
}

impl TaskPredicate {
    pub fn matches(&self, task: &Task) -> bool {
        self.owner.map_or(true, |owner| task.user_id == owner)
            && self.status.map_or(true, |status| task.status == status)
            && self.priority.map_or(true, |priority| task.priority == priority)
    }
}

/// Normalized 1-based page window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    /// Page 0 is raised to 1; the limit is clamped into `1..=max_limit`.
    pub fn resolve(page: Option<u32>, limit: Option<u32>, config: &PaginationConfig) -> Self {
        let page = page.unwrap_or(1).max(1);
        let limit = limit
            .unwrap_or(config.default_limit)
            .clamp(1, config.max_limit.max(1));
        Self { page, limit }
    }

    pub fn skip(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }

    pub fn take(&self) -> u64 {
        u64::from(self.limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

impl PageMeta {
    pub fn new(total: u64, request: PageRequest) -> Self {
        Self {
            total,
            page: request.page,
            limit: request.limit,
            total_pages: total.div_ceil(u64::from(request.limit)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_defaults_and_clamping() {
        let config = PaginationConfig::default();

        let default = PageRequest::resolve(None, None, &config);
        assert_eq!(default, PageRequest { page: 1, limit: 10 });

        let capped = PageRequest::resolve(Some(0), Some(500), &config);
        assert_eq!(capped, PageRequest { page: 1, limit: 100 });

        let zero_limit = PageRequest::resolve(Some(3), Some(0), &config);
        assert_eq!(zero_limit.limit, 1);
        assert_eq!(zero_limit.skip(), 2);
    }

    #[test]
    fn test_total_pages_rounds_up() {
        let request = PageRequest { page: 2, limit: 2 };
        assert_eq!(PageMeta::new(3, request).total_pages, 2);
        assert_eq!(PageMeta::new(4, request).total_pages, 2);
        assert_eq!(PageMeta::new(0, request).total_pages, 0);
    }
}
