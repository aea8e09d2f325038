//! Built-in task handlers.

use async_trait::async_trait;
use tracing::debug;

use crate::app::TaskHandler;
use crate::domain::{HandlerError, Task};

/// Simulated work: sleeps for the task's declared `processing_time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SleepHandler;

#[async_trait]
impl TaskHandler for SleepHandler {
    async fn handle(&self, task: &Task) -> Result<(), HandlerError> {
        debug!(task_id = %task.id, secs = task.processing_time, "simulating work");
        tokio::time::sleep(task.processing_budget()).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewTask, TaskStatus};
    use crate::impls::InMemoryTaskStore;
    use crate::ports::TaskStore;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn sleeps_for_processing_time() {
        let store = InMemoryTaskStore::new();
        let task = store
            .enqueue(NewTask::new(serde_json::json!({}), 3))
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Pending);

        let started = tokio::time::Instant::now();
        SleepHandler.handle(&task).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(3));
    }
}
