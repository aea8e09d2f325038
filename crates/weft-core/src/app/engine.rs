//! Execution engine: runs a claimed task's handler and reduces the result to an
//! `Outcome`.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::domain::{HandlerError, Outcome, Task};

/// Business logic for a claimed task.
///
/// Takes the whole `Task` so the handler can decode the payload as it likes.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &Task) -> Result<(), HandlerError>;
}

/// Whether `processing_time` is enforced as a deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeadlinePolicy {
    /// `processing_time` is informational; the handler runs to completion.
    #[default]
    Advisory,

    /// Abort the handler after `processing_time + grace`.
    FromProcessingTime { grace: Duration },
}

impl DeadlinePolicy {
    pub fn deadline_for(&self, task: &Task) -> Option<Duration> {
        match self {
            DeadlinePolicy::Advisory => None,
            DeadlinePolicy::FromProcessingTime { grace } => {
                Some(task.processing_budget().saturating_add(*grace))
            }
        }
    }
}

/// Executes a task by dispatching to its handler on a separate tokio task, so
/// a panicking handler yields a failed outcome instead of taking the worker
/// down with it.
pub struct ExecutionEngine {
    handler: Arc<dyn TaskHandler>,
    deadline: DeadlinePolicy,
}

impl ExecutionEngine {
    pub fn new(handler: Arc<dyn TaskHandler>) -> Self {
        Self {
            handler,
            deadline: DeadlinePolicy::default(),
        }
    }

    pub fn with_deadline(mut self, deadline: DeadlinePolicy) -> Self {
        self.deadline = deadline;
        self
    }

    /// Execute one task. Never fails: every error becomes `Outcome::failure`.
    pub async fn execute(&self, task: &Task) -> Outcome {
        let handler = Arc::clone(&self.handler);
        let owned = task.clone();
        let mut join = tokio::spawn(async move { handler.handle(&owned).await });

        let joined = match self.deadline.deadline_for(task) {
            None => join.await,
            Some(limit) => match tokio::time::timeout(limit, &mut join).await {
                Ok(joined) => joined,
                Err(_) => {
                    join.abort();
                    warn!(task_id = %task.id, limit_secs = limit.as_secs(), "deadline exceeded");
                    return Outcome::failure(format!(
                        "deadline exceeded after {}s",
                        limit.as_secs()
                    ));
                }
            },
        };

        match joined {
            Ok(Ok(())) => {
                debug!(task_id = %task.id, "handler succeeded");
                Outcome::success()
            }
            Ok(Err(err)) => {
                debug!(task_id = %task.id, error = %err, "handler failed");
                Outcome::failure(err.to_string())
            }
            Err(join_err) if join_err.is_panic() => {
                let reason = panic_message(join_err.into_panic());
                warn!(task_id = %task.id, %reason, "handler panicked");
                Outcome::failure(format!("handler panicked: {reason}"))
            }
            Err(join_err) => Outcome::failure(format!("handler cancelled: {join_err}")),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
