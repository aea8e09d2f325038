//! Claim protocol.
//!
//! A claim is a short transaction: select one pending row with skip-locked
//! semantics, mark it `processing` for this worker, commit. The row lock lives
//! only for that transaction; afterwards ownership is the pair
//! `status = processing` + `worker_id`.

use tracing::{debug, instrument};

use crate::domain::{QueueError, Task, WorkerId};
use crate::ports::TaskStore;

/// Claim the oldest available pending task for `worker_id`.
///
/// `Ok(None)` means no unlocked pending task exists right now.
#[instrument(skip(store, worker_id), fields(worker_id = %worker_id))]
pub async fn claim(store: &dyn TaskStore, worker_id: &WorkerId) -> Result<Option<Task>, QueueError> {
    let mut tx = store.begin().await?;

    let Some(candidate) = tx.select_one_skip_locked().await? else {
        tx.rollback().await?;
        debug!("no pending task available");
        return Ok(None);
    };

    let claimed = tx.mark_processing(candidate.id, worker_id).await?;
    tx.commit().await?;

    debug!(task_id = %claimed.id, "claimed task");
    Ok(Some(claimed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewTask, TaskStatus};
    use crate::impls::InMemoryTaskStore;
    use crate::ports::FixedClock;
    use chrono::{TimeZone, Utc};
    use std::collections::HashSet;
    use std::sync::Arc;

    fn new_task(n: u32) -> NewTask {
        NewTask::new(serde_json::json!({ "task_number": n }), n)
    }

    #[tokio::test]
    async fn claim_on_empty_store_returns_none() {
        let store = InMemoryTaskStore::new();
        let claimed = claim(&store, &WorkerId::new("w1")).await.unwrap();
        assert!(claimed.is_none());
        assert_eq!(store.locked_rows(), 0);
    }

    #[tokio::test]
    async fn claim_marks_processing_and_records_owner() {
        let store = InMemoryTaskStore::new();
        let task = store.enqueue(new_task(1)).await.unwrap();
        let worker = WorkerId::new("w1");

        let claimed = claim(&store, &worker).await.unwrap().unwrap();
        assert_eq!(claimed.id, task.id);
        assert_eq!(claimed.status, TaskStatus::Processing);
        assert!(claimed.is_owned_by(&worker));

        let stored = store.get(task.id).await.unwrap().unwrap();
        assert_eq!(stored, claimed);
        assert_eq!(store.locked_rows(), 0);
    }

    #[tokio::test]
    async fn claims_oldest_first_without_contention() {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
        ));
        let store = InMemoryTaskStore::with_clock(clock.clone());
        for n in 1..=3 {
            store.enqueue(new_task(n)).await.unwrap();
            clock.advance(chrono::Duration::seconds(1));
        }

        let worker = WorkerId::new("w1");
        let mut order = Vec::new();
        while let Some(task) = claim(&store, &worker).await.unwrap() {
            order.push(task.payload["task_number"].as_u64().unwrap());
        }
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_claims_never_share_a_task() {
        let store = Arc::new(InMemoryTaskStore::new());
        store
            .enqueue_many((1..=20).map(new_task).collect())
            .await
            .unwrap();

        let mut handles = Vec::new();
        for w in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let worker = WorkerId::new(format!("w{w}"));
                let mut mine = Vec::new();
                while let Some(task) = claim(&*store, &worker).await.unwrap() {
                    mine.push(task.id);
                    tokio::task::yield_now().await;
                }
                mine
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.await.unwrap() {
                assert!(seen.insert(id), "{id} claimed twice");
            }
        }
        assert_eq!(seen.len(), 20);
    }

    #[tokio::test]
    async fn unavailable_store_surfaces_as_queue_error() {
        let store = InMemoryTaskStore::new();
        store.enqueue(new_task(1)).await.unwrap();
        store.set_available(false);

        let err = claim(&store, &WorkerId::new("w1")).await.unwrap_err();
        assert!(matches!(err, QueueError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn failed_commit_leaves_task_pending() {
        let store = InMemoryTaskStore::new();
        let task = store.enqueue(new_task(1)).await.unwrap();
        store.fail_next_commits(1);

        let err = claim(&store, &WorkerId::new("w1")).await.unwrap_err();
        assert!(matches!(err, QueueError::StoreUnavailable(_)));

        let stored = store.get(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Pending);
        assert_eq!(stored.worker_id, None);
    }
}
