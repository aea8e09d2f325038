//! TaskStore port - the durable task table (source of truth).
//!
//! The store owns every task row. Workers never mutate a row directly; they go
//! through a `StoreTransaction`, and every write becomes visible only on commit.
//!
//! # The claim primitive
//! `StoreTransaction::select_one_skip_locked` is the one operation the whole
//! protocol depends on: pick the oldest `pending` row, skip rows another
//! in-flight transaction holds, lock the chosen row for this transaction and
//! return without blocking. On PostgreSQL that is `FOR UPDATE SKIP LOCKED`; any
//! other transactional store with row-level locks can implement it.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{NewTask, StoreError, Task, TaskId, TaskQuery, WorkerId};
use crate::observability::StatusCounts;

/// One open transaction against the store.
///
/// Dropping a transaction without calling `commit` rolls it back and releases
/// every row lock it took.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Select the oldest `pending` task (by `created_at`, then `id`), skipping
    /// rows locked by other transactions, and lock it for this transaction.
    ///
    /// Returns `None` when no unlocked pending row exists. Never waits on locks
    /// held by others.
    async fn select_one_skip_locked(&mut self) -> Result<Option<Task>, StoreError>;

    /// `pending -> processing`, recording the owner and `updated_at = now`.
    async fn mark_processing(
        &mut self,
        id: TaskId,
        worker_id: &WorkerId,
    ) -> Result<Task, StoreError>;

    /// `processing -> completed`, setting `processed_at = updated_at = now`.
    ///
    /// Refused with `StoreError::NotOwner` unless `worker_id` still holds the
    /// claim.
    async fn mark_completed(
        &mut self,
        id: TaskId,
        worker_id: &WorkerId,
    ) -> Result<Task, StoreError>;

    /// `processing -> failed`, setting `updated_at = now`. Same owner guard as
    /// `mark_completed`.
    async fn mark_failed(&mut self, id: TaskId, worker_id: &WorkerId) -> Result<Task, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// The task table.
///
/// The guarded writes (`mark_*`) return `StoreError::InvalidTransition` when the
/// row is not in the expected source status, and leave it untouched.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a batch of `pending` tasks atomically (all rows or none).
    async fn enqueue_many(&self, tasks: Vec<NewTask>) -> Result<Vec<Task>, StoreError>;

    /// Insert one `pending` task.
    async fn enqueue(&self, task: NewTask) -> Result<Task, StoreError> {
        self.enqueue_many(vec![task])
            .await?
            .pop()
            .ok_or_else(|| StoreError::Query("insert returned no row".to_string()))
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;

    async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError>;

    /// Read-only scan, ordered by `created_at` then `id`.
    async fn find(&self, query: &TaskQuery) -> Result<Vec<Task>, StoreError>;

    async fn counts_by_status(&self) -> Result<StatusCounts, StoreError>;

    /// Return `processing` tasks whose `updated_at` is older than `stale_after`
    /// (measured on the store's clock) to `pending`, clearing `worker_id`.
    ///
    /// Rows currently locked by a transaction are skipped.
    async fn reset_stale_claims(&self, stale_after: Duration) -> Result<Vec<TaskId>, StoreError>;
}
