//! Task record, enqueue input and status queries.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{TaskId, TaskStatus, WorkerId};

/// One row of the task table.
///
/// Stores own these rows; workers only ever see snapshots returned by a store
/// operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,

    /// Opaque structured data interpreted by the task handler.
    pub payload: serde_json::Value,

    /// Declared execution budget in whole seconds.
    pub processing_time: u32,

    pub status: TaskStatus,

    /// Worker currently or last holding the claim. `None` while pending.
    pub worker_id: Option<WorkerId>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Set only on transition to `Completed`.
    pub processed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn processing_budget(&self) -> Duration {
        Duration::from_secs(u64::from(self.processing_time))
    }

    pub fn is_owned_by(&self, worker_id: &WorkerId) -> bool {
        self.worker_id.as_ref() == Some(worker_id)
    }
}

/// Enqueue input. The store assigns `id` and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub payload: serde_json::Value,
    pub processing_time: u32,
}

impl NewTask {
    pub fn new(payload: serde_json::Value, processing_time: u32) -> Self {
        Self {
            payload,
            processing_time,
        }
    }
}

/// Read-only filter for the status query interface.
///
/// Every set field must match; an empty query matches every task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskQuery {
    pub id: Option<TaskId>,
    pub status: Option<TaskStatus>,
    pub worker_id: Option<WorkerId>,
    pub limit: Option<usize>,
}

impl TaskQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: TaskId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn by_status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn by_worker(worker_id: WorkerId) -> Self {
        Self {
            worker_id: Some(worker_id),
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.id.is_none_or(|id| task.id == id)
            && self.status.is_none_or(|status| task.status == status)
            && self
                .worker_id
                .as_ref()
                .is_none_or(|worker_id| task.worker_id.as_ref() == Some(worker_id))
    }
}
