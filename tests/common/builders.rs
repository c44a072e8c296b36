//! Task and actor fixtures.

use super::TestHarness;
use chrono::{DateTime, Duration, Utc};
use task_pipeline::models::{Actor, NewTask, Task, TaskPriority, TaskStatus};
use uuid::Uuid;

pub fn user() -> Actor {
    Actor::user(Uuid::new_v4())
}

pub fn admin() -> Actor {
    Actor::admin(Uuid::new_v4())
}

/// Builder for tasks created through the command bus
pub struct TaskBuilder {
    title: String,
    description: Option<String>,
    status: Option<TaskStatus>,
    priority: Option<TaskPriority>,
    due_date: Option<DateTime<Utc>>,
}

impl TaskBuilder {
    pub fn new() -> Self {
        Self {
            title: format!("task-{}", &Uuid::new_v4().to_string()[..8]),
            description: None,
            status: None,
            priority: None,
            due_date: None,
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn due_in(mut self, offset: Duration) -> Self {
        self.due_date = Some(Utc::now() + offset);
        self
    }

    pub fn overdue(self) -> Self {
        self.due_in(-Duration::hours(2))
    }

    pub fn new_task(&self) -> NewTask {
        NewTask {
            title: self.title.clone(),
            description: self.description.clone(),
            status: self.status,
            priority: self.priority,
            due_date: self.due_date,
        }
    }

    pub async fn create(self, harness: &TestHarness, actor: Actor) -> Task {
        harness
            .commands()
            .create(self.new_task(), actor)
            .await
            .expect("Failed to create test task")
    }
}
