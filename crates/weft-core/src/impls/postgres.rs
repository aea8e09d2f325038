//! PostgreSQL task store.
//!
//! The claim primitive is `SELECT ... FOR UPDATE SKIP LOCKED LIMIT 1` inside a
//! transaction. Guarded writes are `UPDATE ... WHERE id = $1 AND status = <from>
//! RETURNING ...`, so a write against a row in the wrong status changes nothing.
//! Terminal writes also match `worker_id = $2`, which keeps a worker whose claim
//! was reset and reclaimed from overwriting the new owner's result.
//!
//! Timestamps come from the database (`NOW()`), which keeps every worker on the
//! same clock regardless of host skew.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, QueryBuilder, Transaction};
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::domain::{NewTask, StoreError, Task, TaskId, TaskQuery, TaskStatus, WorkerId};
use crate::observability::StatusCounts;
use crate::ports::{StoreTransaction, TaskStore};

const TASK_COLUMNS: &str =
    "id, payload, processing_time, status, worker_id, created_at, updated_at, processed_at";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Corrupt(err.to_string())
            }
            other => StoreError::Query(other.to_string()),
        }
    }
}

#[derive(Debug, FromRow)]
struct TaskRow {
    id: i64,
    payload: serde_json::Value,
    processing_time: i32,
    status: String,
    worker_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<TaskStatus>()
            .map_err(|e| StoreError::Corrupt(format!("task {}: {e}", row.id)))?;
        let processing_time = u32::try_from(row.processing_time).map_err(|_| {
            StoreError::Corrupt(format!(
                "task {}: negative processing_time {}",
                row.id, row.processing_time
            ))
        })?;

        Ok(Task {
            id: TaskId::new(row.id),
            payload: row.payload,
            processing_time,
            status,
            worker_id: row.worker_id.map(WorkerId::from),
            created_at: row.created_at,
            updated_at: row.updated_at,
            processed_at: row.processed_at,
        })
    }
}

/// `TaskStore` backed by the `tasks` table.
#[derive(Debug, Clone)]
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;
        debug!(max_connections = config.max_connections, "connected to task store");
        Ok(Self::new(pool))
    }

    /// Apply the bundled schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::migrate::MigrateError::Execute(inner) => StoreError::from(inner),
                other => StoreError::Query(other.to_string()),
            })?;
        info!("task store schema is up to date");
        Ok(())
    }
}

async fn insert_task(conn: &mut PgConnection, task: NewTask) -> Result<Task, StoreError> {
    let processing_time = i32::try_from(task.processing_time).map_err(|_| {
        StoreError::Query(format!(
            "processing_time {} does not fit the column",
            task.processing_time
        ))
    })?;

    let row: TaskRow = sqlx::query_as(&format!(
        "INSERT INTO tasks (payload, processing_time) VALUES ($1, $2) RETURNING {TASK_COLUMNS}"
    ))
    .bind(task.payload)
    .bind(processing_time)
    .fetch_one(conn)
    .await?;
    row.try_into()
}

/// Explain why a guarded update matched no row.
async fn transition_error(
    conn: &mut PgConnection,
    id: TaskId,
    to: TaskStatus,
    owner: Option<&WorkerId>,
) -> StoreError {
    let current: Result<Option<(String, Option<String>)>, sqlx::Error> =
        sqlx::query_as("SELECT status, worker_id FROM tasks WHERE id = $1")
            .bind(id.get())
            .fetch_optional(conn)
            .await;

    let (status, worker_id) = match current {
        Ok(Some(row)) => row,
        Ok(None) => return StoreError::NotFound(id),
        Err(e) => return e.into(),
    };
    let from = match status.parse::<TaskStatus>() {
        Ok(from) => from,
        Err(e) => return StoreError::Corrupt(format!("task {}: {e}", id.get())),
    };

    let worker_id = worker_id.map(WorkerId::from);
    match owner {
        Some(owner) if from.can_transition_to(to) && worker_id.as_ref() != Some(owner) => {
            StoreError::NotOwner {
                id,
                owner: worker_id,
            }
        }
        _ => StoreError::InvalidTransition { id, from, to },
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn enqueue_many(&self, tasks: Vec<NewTask>) -> Result<Vec<Task>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::with_capacity(tasks.len());
        for task in tasks {
            inserted.push(insert_task(&mut tx, task).await?);
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTransaction { tx }))
    }

    async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        let row: Option<TaskRow> =
            sqlx::query_as(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"))
                .bind(id.get())
                .fetch_optional(&self.pool)
                .await?;
        row.map(Task::try_from).transpose()
    }

    async fn find(&self, query: &TaskQuery) -> Result<Vec<Task>, StoreError> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {TASK_COLUMNS} FROM tasks WHERE TRUE"));
        if let Some(id) = query.id {
            qb.push(" AND id = ").push_bind(id.get());
        }
        if let Some(status) = query.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(worker_id) = &query.worker_id {
            qb.push(" AND worker_id = ")
                .push_bind(worker_id.as_str().to_owned());
        }
        qb.push(" ORDER BY created_at, id");
        if let Some(limit) = query.limit {
            qb.push(" LIMIT ")
                .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows: Vec<TaskRow> = qb.build_query_as::<TaskRow>().fetch_all(&self.pool).await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn counts_by_status(&self) -> Result<StatusCounts, StoreError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM tasks GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = StatusCounts::default();
        for (status, n) in rows {
            let status = status
                .parse::<TaskStatus>()
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;
            counts.record(status, usize::try_from(n).unwrap_or(0));
        }
        Ok(counts)
    }

    async fn reset_stale_claims(&self, stale_after: Duration) -> Result<Vec<TaskId>, StoreError> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            UPDATE tasks
            SET status = 'pending',
                worker_id = NULL,
                updated_at = NOW()
            WHERE id IN (
                SELECT id
                FROM tasks
                WHERE status = 'processing'
                  AND updated_at < NOW() - make_interval(secs => $1)
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id
            "#,
        )
        .bind(stale_after.as_secs_f64())
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(TaskId::new).collect())
    }
}

/// One open PostgreSQL transaction. Dropping it rolls back (sqlx behaviour).
struct PgStoreTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PgStoreTransaction {
    /// Run a guarded `UPDATE ... RETURNING` with `$1 = id` and `$2 = worker_id`.
    ///
    /// `owner` is the worker that must already hold the row; `None` for the
    /// claim itself, where `$2` is the new owner.
    async fn guarded_update(
        &mut self,
        id: TaskId,
        to: TaskStatus,
        sql: &str,
        worker_id: &WorkerId,
        owner: Option<&WorkerId>,
    ) -> Result<Task, StoreError> {
        let row: Option<TaskRow> = sqlx::query_as(sql)
            .bind(id.get())
            .bind(worker_id.as_str().to_owned())
            .fetch_optional(&mut *self.tx)
            .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(transition_error(&mut self.tx, id, to, owner).await),
        }
    }
}

#[async_trait]
impl StoreTransaction for PgStoreTransaction {
    async fn select_one_skip_locked(&mut self) -> Result<Option<Task>, StoreError> {
        let row: Option<TaskRow> = sqlx::query_as(&format!(
            r#"
            SELECT {TASK_COLUMNS}
            FROM tasks
            WHERE status = 'pending'
            ORDER BY created_at, id
            FOR UPDATE SKIP LOCKED
            LIMIT 1
            "#
        ))
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(Task::try_from).transpose()
    }

    async fn mark_processing(
        &mut self,
        id: TaskId,
        worker_id: &WorkerId,
    ) -> Result<Task, StoreError> {
        let sql = format!(
            r#"
            UPDATE tasks
            SET status = 'processing',
                worker_id = $2,
                updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {TASK_COLUMNS}
            "#
        );
        self.guarded_update(id, TaskStatus::Processing, &sql, worker_id, None)
            .await
    }

    async fn mark_completed(
        &mut self,
        id: TaskId,
        worker_id: &WorkerId,
    ) -> Result<Task, StoreError> {
        let sql = format!(
            r#"
            UPDATE tasks
            SET status = 'completed',
                processed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status = 'processing' AND worker_id = $2
            RETURNING {TASK_COLUMNS}
            "#
        );
        self.guarded_update(id, TaskStatus::Completed, &sql, worker_id, Some(worker_id))
            .await
    }

    async fn mark_failed(&mut self, id: TaskId, worker_id: &WorkerId) -> Result<Task, StoreError> {
        let sql = format!(
            r#"
            UPDATE tasks
            SET status = 'failed',
                updated_at = NOW()
            WHERE id = $1 AND status = 'processing' AND worker_id = $2
            RETURNING {TASK_COLUMNS}
            "#
        );
        self.guarded_update(id, TaskStatus::Failed, &sql, worker_id, Some(worker_id))
            .await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        this.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        this.tx.rollback().await?;
        Ok(())
    }
}
