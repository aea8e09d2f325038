//! Outcome finalizer: records the result of an execution as a terminal status.
//!
//! Success is written as `completed`. If that write cannot be committed for a
//! store reason, the task is marked `failed` instead. The failure write is best
//! effort: when it fails too, the task is left `processing` and the error is
//! reported as `FinalizeError::WriteFailed`.
//!
//! # Flow
//!
//! ```text
//! success ──► completed ──ok──► Completed
//!                 │
//!                 └─store error──► failed ──ok──► Failed
//! failure ──────────────────────► failed ──err─► WriteFailed (row stays processing)
//! ```
//!
//! # Ownership
//!
//! Both terminal writes are guarded by status *and* owner. A worker whose claim
//! was reset by the reaper and handed to someone else gets
//! `FinalizeError::Rejected` and writes nothing; the new owner's result stands.

use tracing::{error, info, instrument, warn};

use crate::domain::{FinalizeError, Outcome, StoreError, TaskId, TaskStatus, WorkerId};
use crate::ports::TaskStore;

/// Record `outcome` for a task `worker_id` holds in `processing`.
///
/// Returns the terminal status that was committed.
#[instrument(
    skip_all,
    fields(task_id = %task_id, worker_id = %worker_id, success = outcome.is_success())
)]
pub async fn finalize(
    store: &dyn TaskStore,
    task_id: TaskId,
    worker_id: &WorkerId,
    outcome: &Outcome,
) -> Result<TaskStatus, FinalizeError> {
    if outcome.is_success() {
        match write_terminal(store, task_id, worker_id, TaskStatus::Completed).await {
            Ok(()) => {
                info!(status = %TaskStatus::Completed, "task finalized");
                return Ok(TaskStatus::Completed);
            }
            Err(err) => {
                rejection(err)?;
                warn!("could not record success, marking task failed");
            }
        }
    } else {
        warn!(error = outcome.error().unwrap_or("unknown"), "task execution failed");
    }

    match write_terminal(store, task_id, worker_id, TaskStatus::Failed).await {
        Ok(()) => {
            info!(status = %TaskStatus::Failed, "task finalized");
            Ok(TaskStatus::Failed)
        }
        Err(err) => {
            let source = rejection(err)?;
            error!(error = %source, "could not mark task failed, leaving it processing");
            Err(FinalizeError::WriteFailed { id: task_id, source })
        }
    }
}

/// Split state-machine violations (nothing written, nothing to retry) from
/// store failures.
fn rejection(err: StoreError) -> Result<StoreError, FinalizeError> {
    match err {
        StoreError::InvalidTransition { id, from, .. } => {
            Err(FinalizeError::Rejected { id, status: from })
        }
        StoreError::NotOwner { id, .. } => Err(FinalizeError::Rejected {
            id,
            status: TaskStatus::Processing,
        }),
        StoreError::NotFound(id) => Err(FinalizeError::NotFound(id)),
        other => Ok(other),
    }
}

async fn write_terminal(
    store: &dyn TaskStore,
    task_id: TaskId,
    worker_id: &WorkerId,
    status: TaskStatus,
) -> Result<(), StoreError> {
    let mut tx = store.begin().await?;
    match status {
        TaskStatus::Completed => tx.mark_completed(task_id, worker_id).await?,
        _ => tx.mark_failed(task_id, worker_id).await?,
    };
    tx.commit().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{ReaperLoop, claim};
    use crate::domain::{NewTask, Task};
    use crate::impls::InMemoryTaskStore;
    use crate::ports::FixedClock;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;
    use std::time::Duration;

    fn w1() -> WorkerId {
        WorkerId::new("w1")
    }

    async fn claimed_task(store: &InMemoryTaskStore) -> Task {
        store
            .enqueue(NewTask::new(serde_json::json!({ "task_number": 1 }), 1))
            .await
            .unwrap();
        claim(store, &w1()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn success_marks_completed_with_processed_at() {
        let store = InMemoryTaskStore::new();
        let task = claimed_task(&store).await;

        let status = finalize(&store, task.id, &w1(), &Outcome::success()).await.unwrap();
        assert_eq!(status, TaskStatus::Completed);

        let stored = store.get(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Completed);
        assert_eq!(stored.processed_at, Some(stored.updated_at));
        assert_eq!(stored.worker_id, task.worker_id);
    }

    #[tokio::test]
    async fn failure_marks_failed_without_processed_at() {
        let store = InMemoryTaskStore::new();
        let task = claimed_task(&store).await;

        let status = finalize(&store, task.id, &w1(), &Outcome::failure("boom"))
            .await
            .unwrap();
        assert_eq!(status, TaskStatus::Failed);

        let stored = store.get(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert_eq!(stored.processed_at, None);
    }

    #[tokio::test]
    async fn second_finalize_is_rejected_and_row_unchanged() {
        let store = InMemoryTaskStore::new();
        let task = claimed_task(&store).await;

        finalize(&store, task.id, &w1(), &Outcome::success()).await.unwrap();
        let before = store.get(task.id).await.unwrap().unwrap();

        let err = finalize(&store, task.id, &w1(), &Outcome::failure("late"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FinalizeError::Rejected {
                status: TaskStatus::Completed,
                ..
            }
        ));
        assert_eq!(store.get(task.id).await.unwrap().unwrap(), before);
    }

    #[tokio::test]
    async fn finalize_of_pending_task_is_rejected() {
        let store = InMemoryTaskStore::new();
        let task = store
            .enqueue(NewTask::new(serde_json::json!({}), 1))
            .await
            .unwrap();

        let err = finalize(&store, task.id, &w1(), &Outcome::success()).await.unwrap_err();
        assert!(matches!(
            err,
            FinalizeError::Rejected {
                status: TaskStatus::Pending,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let store = InMemoryTaskStore::new();
        let err = finalize(&store, TaskId::new(99), &w1(), &Outcome::success())
            .await
            .unwrap_err();
        assert!(matches!(err, FinalizeError::NotFound(id) if id == TaskId::new(99)));
    }

    #[tokio::test]
    async fn failed_success_write_falls_back_to_failed() {
        let store = InMemoryTaskStore::new();
        let task = claimed_task(&store).await;
        store.fail_next_commits(1);

        let status = finalize(&store, task.id, &w1(), &Outcome::success()).await.unwrap();
        assert_eq!(status, TaskStatus::Failed);

        let stored = store.get(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn unavailable_store_leaves_task_processing() {
        let store = InMemoryTaskStore::new();
        let task = claimed_task(&store).await;
        store.set_available(false);

        let err = finalize(&store, task.id, &w1(), &Outcome::success()).await.unwrap_err();
        assert!(matches!(
            err,
            FinalizeError::WriteFailed { id, ref source } if id == task.id && source.is_unavailable()
        ));

        store.set_available(true);
        let stored = store.get(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Processing);
        assert_eq!(store.locked_rows(), 0);
    }

    #[tokio::test]
    async fn reclaimed_task_rejects_previous_owner() {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
        ));
        let store = Arc::new(InMemoryTaskStore::with_clock(clock.clone()));
        let task = store
            .enqueue(NewTask::new(serde_json::json!({ "task_number": 1 }), 1))
            .await
            .unwrap();
        let slow = WorkerId::new("slow");
        let w2 = WorkerId::new("w2");

        claim(&*store, &slow).await.unwrap().unwrap();
        clock.advance(chrono::Duration::seconds(120));
        let reaper = ReaperLoop::new(store.clone(), Duration::from_secs(60));
        assert_eq!(reaper.sweep_once().await.unwrap(), vec![task.id]);
        let reclaimed = claim(&*store, &w2).await.unwrap().unwrap();
        assert_eq!(reclaimed.id, task.id);

        let err = finalize(&*store, task.id, &slow, &Outcome::success())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FinalizeError::Rejected {
                id,
                status: TaskStatus::Processing,
            } if id == task.id
        ));
        assert_eq!(store.get(task.id).await.unwrap().unwrap(), reclaimed);

        let status = finalize(&*store, task.id, &w2, &Outcome::success())
            .await
            .unwrap();
        assert_eq!(status, TaskStatus::Completed);
        let stored = store.get(task.id).await.unwrap().unwrap();
        assert_eq!(stored.worker_id, Some(w2));
        assert_eq!(store.locked_rows(), 0);
    }
}
