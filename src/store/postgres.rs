//! PostgreSQL task store.
//!
//! Rows are read into [`TaskRow`] with textual status/priority columns and
//! converted through `FromStr`, so an out-of-range value in the table surfaces as
//! an error instead of a silently coerced enum.

use super::{validate_savepoint_name, OutboxEntry, TaskStore, TaskTransaction};
use crate::error::{PipelineError, PipelineResult};
use crate::messaging::JobRequest;
use crate::models::{StatusPriorityCount, Task, TaskPredicate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, QueryBuilder, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

/// Embedded migrations for the task, outbox and job tables
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const TASK_COLUMNS: &str =
    "id, title, description, status, priority, due_date, user_id, created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
struct TaskRow {
    id: Uuid,
    title: String,
    description: Option<String>,
    status: String,
    priority: String,
    due_date: Option<DateTime<Utc>>,
    user_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TaskRow> for Task {
    type Error = PipelineError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(Task {
            id: row.id,
            title: row.title,
            description: row.description,
            status: row
                .status
                .parse()
                .map_err(|e| PipelineError::Database(format!("Corrupt task row {}: {e}", row.id)))?,
            priority: row
                .priority
                .parse()
                .map_err(|e| PipelineError::Database(format!("Corrupt task row {}: {e}", row.id)))?,
            due_date: row.due_date,
            user_id: row.user_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_tasks(rows: Vec<TaskRow>) -> PipelineResult<Vec<Task>> {
    rows.into_iter().map(Task::try_from).collect()
}

#[derive(Debug, FromRow)]
struct OutboxRow {
    id: i64,
    job_name: String,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl From<OutboxRow> for OutboxEntry {
    fn from(row: OutboxRow) -> Self {
        OutboxEntry {
            id: row.id,
            job: JobRequest::new(row.job_name, row.payload),
            created_at: row.created_at,
        }
    }
}

fn push_predicate(builder: &mut QueryBuilder<'_, Postgres>, predicate: &TaskPredicate) {
    builder.push(" WHERE TRUE");
    if let Some(owner) = predicate.owner {
        builder.push(" AND user_id = ").push_bind(owner);
    }
    if let Some(status) = predicate.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(priority) = predicate.priority {
        builder.push(" AND priority = ").push_bind(priority.as_str());
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[derive(Debug, Clone)]
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> PipelineResult<Self> {
        info!(max_connections, "🚀 Connecting task store to PostgreSQL");
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        info!("✅ Task store connected");
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> PipelineResult<()> {
        info!("Running task pipeline migrations");
        MIGRATOR.run(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn begin(&self) -> PipelineResult<Box<dyn TaskTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTaskTransaction { tx }))
    }

    async fn find_by_id(&self, id: Uuid) -> PipelineResult<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Task::try_from).transpose()
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> PipelineResult<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        into_tasks(rows)
    }

    async fn delete(&self, id: Uuid) -> PipelineResult<u64> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn query_filtered(
        &self,
        predicate: &TaskPredicate,
        skip: u64,
        take: u64,
    ) -> PipelineResult<(Vec<Task>, u64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM tasks");
        push_predicate(&mut count, predicate);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut page = QueryBuilder::<Postgres>::new(format!("SELECT {TASK_COLUMNS} FROM tasks"));
        push_predicate(&mut page, predicate);
        page.push(" ORDER BY created_at, id LIMIT ")
            .push_bind(to_i64(take))
            .push(" OFFSET ")
            .push_bind(to_i64(skip));
        let rows: Vec<TaskRow> = page.build_query_as().fetch_all(&self.pool).await?;

        debug!(total, returned = rows.len(), "Filtered task query");
        Ok((into_tasks(rows)?, u64::try_from(total).unwrap_or(0)))
    }

    async fn find_overdue(&self, now: DateTime<Utc>) -> PipelineResult<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE status = 'PENDING' AND due_date < $1 \
             ORDER BY due_date, id"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        into_tasks(rows)
    }

    async fn aggregate_counts(&self) -> PipelineResult<Vec<StatusPriorityCount>> {
        let rows = sqlx::query_as::<_, (String, String, i64)>(
            "SELECT status, priority, COUNT(*) FROM tasks GROUP BY status, priority",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(status, priority, count)| -> PipelineResult<StatusPriorityCount> {
                Ok(StatusPriorityCount {
                    status: status.parse()?,
                    priority: priority.parse()?,
                    count: u64::try_from(count).unwrap_or(0),
                })
            })
            .collect()
    }

    async fn pending_outbox(&self, limit: usize) -> PipelineResult<Vec<OutboxEntry>> {
        let rows = sqlx::query_as::<_, OutboxRow>(
            "SELECT id, job_name, payload, created_at FROM task_job_outbox ORDER BY id LIMIT $1",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(OutboxEntry::from).collect())
    }

    async fn remove_relayed_outbox(&self, ids: &[i64]) -> PipelineResult<()> {
        sqlx::query("DELETE FROM task_job_outbox WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

struct PgTaskTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PgTaskTransaction {
    async fn execute_savepoint_command(&mut self, command: &str, name: &str) -> PipelineResult<()> {
        validate_savepoint_name(name)?;
        let sql = format!("{command} {name}");
        sqlx::query(&sql).execute(&mut *self.tx).await?;
        Ok(())
    }
}

#[async_trait]
impl TaskTransaction for PgTaskTransaction {
    async fn insert(&mut self, task: &Task) -> PipelineResult<Task> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "INSERT INTO tasks ({TASK_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(task.id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(task.priority.as_str())
        .bind(task.due_date)
        .bind(task.user_id)
        .bind(task.created_at)
        .bind(task.updated_at)
        .fetch_one(&mut *self.tx)
        .await?;
        Task::try_from(row)
    }

    async fn find_by_id(&mut self, id: Uuid) -> PipelineResult<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(Task::try_from).transpose()
    }

    async fn find_by_ids(&mut self, ids: &[Uuid]) -> PipelineResult<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = ANY($1) ORDER BY id FOR UPDATE"
        ))
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await?;
        into_tasks(rows)
    }

    async fn update(&mut self, task: &Task) -> PipelineResult<u64> {
        let result = sqlx::query(
            "UPDATE tasks SET title = $2, description = $3, status = $4, priority = $5, \
             due_date = $6, updated_at = $7 WHERE id = $1",
        )
        .bind(task.id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(task.priority.as_str())
        .bind(task.due_date)
        .bind(task.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete(&mut self, id: Uuid) -> PipelineResult<u64> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn stage_job(&mut self, job: &JobRequest) -> PipelineResult<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO task_job_outbox (job_name, payload) VALUES ($1, $2) RETURNING id",
        )
        .bind(&job.job_name)
        .bind(&job.payload)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(id)
    }

    async fn savepoint(&mut self, name: &str) -> PipelineResult<()> {
        self.execute_savepoint_command("SAVEPOINT", name).await
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> PipelineResult<()> {
        self.execute_savepoint_command("ROLLBACK TO SAVEPOINT", name)
            .await
    }

    async fn release_savepoint(&mut self, name: &str) -> PipelineResult<()> {
        self.execute_savepoint_command("RELEASE SAVEPOINT", name).await
    }

    async fn commit(self: Box<Self>) -> PipelineResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> PipelineResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
