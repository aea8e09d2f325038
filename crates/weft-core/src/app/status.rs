//! Status view over the task table.

use serde::Serialize;

use crate::domain::{QueueError, Task, TaskQuery};
use crate::observability::StatusCounts;
use crate::ports::TaskStore;

/// Per-status totals plus the tasks matching a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStatus {
    pub counts: StatusCounts,
    pub tasks: Vec<Task>,
}

pub async fn query_status(
    store: &dyn TaskStore,
    query: &TaskQuery,
) -> Result<QueueStatus, QueueError> {
    let counts = store.counts_by_status().await?;
    let tasks = store.find(query).await?;
    Ok(QueueStatus { counts, tasks })
}
