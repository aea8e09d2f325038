//! Worker loop: claim, execute, finalize, pause, repeat.
//!
//! Workers coordinate only through the store. A worker stops when the queue
//! is exhausted (claim returns `None`) or when the store can no longer be
//! trusted (claim error, or the outcome could not be recorded at all).
//!
//! # Flow
//!
//! ```text
//! claim ──None──► Exhausted
//!   │ └─Err────► Aborted
//!   ▼
//! execute (never fails, yields an Outcome)
//!   ▼
//! finalize ──WriteFailed──► Aborted (task stays processing for the reaper)
//!   │ └─Rejected/NotFound─► warn, nothing counted
//!   ▼
//! pause, loop
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::app::claim::claim;
use crate::app::engine::ExecutionEngine;
use crate::app::finalize::finalize;
use crate::domain::{FinalizeError, TaskStatus, WorkerId};
use crate::ports::{IdGenerator, TaskStore};

pub const DEFAULT_INTER_TASK_PAUSE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Fixed sleep after each processed task. Throttles store load only.
    pub inter_task_pause: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            inter_task_pause: DEFAULT_INTER_TASK_PAUSE,
        }
    }
}

/// Why a worker loop ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum WorkerExit {
    /// No pending task was left to claim.
    Exhausted,
    /// The loop stopped on a store error.
    Aborted(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    pub worker_id: WorkerId,
    /// Tasks driven to a terminal status (`completed + failed`).
    pub processed: usize,
    pub completed: usize,
    pub failed: usize,
    pub exit: WorkerExit,
}

impl WorkerReport {
    fn new(worker_id: WorkerId) -> Self {
        Self {
            worker_id,
            processed: 0,
            completed: 0,
            failed: 0,
            exit: WorkerExit::Exhausted,
        }
    }

    fn record(&mut self, status: TaskStatus) {
        self.processed += 1;
        match status {
            TaskStatus::Completed => self.completed += 1,
            _ => self.failed += 1,
        }
    }
}

pub struct Worker {
    id: WorkerId,
    store: Arc<dyn TaskStore>,
    engine: Arc<ExecutionEngine>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        id: WorkerId,
        store: Arc<dyn TaskStore>,
        engine: Arc<ExecutionEngine>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            id,
            store,
            engine,
            config,
        }
    }

    /// Run until the queue is exhausted or the store fails.
    #[instrument(skip_all, fields(worker_id = %self.id))]
    pub async fn run(self) -> WorkerReport {
        info!("worker started");
        let mut report = WorkerReport::new(self.id.clone());

        report.exit = loop {
            let task = match claim(&*self.store, &self.id).await {
                Ok(Some(task)) => task,
                Ok(None) => break WorkerExit::Exhausted,
                Err(err) => {
                    error!(error = %err, "claim failed, stopping worker");
                    break WorkerExit::Aborted(err.to_string());
                }
            };

            info!(
                task_id = %task.id,
                processing_time = task.processing_time,
                "processing task"
            );
            let outcome = self.engine.execute(&task).await;

            match finalize(&*self.store, task.id, &self.id, &outcome).await {
                Ok(status) => report.record(status),
                Err(err @ FinalizeError::WriteFailed { .. }) => {
                    break WorkerExit::Aborted(err.to_string());
                }
                Err(err) => {
                    warn!(task_id = %task.id, error = %err, "outcome not recorded");
                }
            }

            tokio::time::sleep(self.config.inter_task_pause).await;
        };

        match &report.exit {
            WorkerExit::Exhausted => info!(
                processed = report.processed,
                completed = report.completed,
                failed = report.failed,
                "no more pending tasks, worker exiting"
            ),
            WorkerExit::Aborted(reason) => error!(
                processed = report.processed,
                %reason,
                "worker aborted"
            ),
        }
        report
    }
}

/// Handle to a set of workers running on the tokio runtime.
pub struct WorkerGroup {
    workers: Vec<(WorkerId, JoinHandle<WorkerReport>)>,
}

impl WorkerGroup {
    /// Spawn `n` workers, each with a fresh identity from `ids`.
    pub fn spawn(
        n: usize,
        store: Arc<dyn TaskStore>,
        engine: Arc<ExecutionEngine>,
        config: WorkerConfig,
        ids: &dyn IdGenerator,
    ) -> Self {
        let mut workers = Vec::with_capacity(n);
        for _ in 0..n {
            let id = ids.generate_worker_id();
            let worker = Worker::new(id.clone(), Arc::clone(&store), Arc::clone(&engine), config);
            workers.push((id, tokio::spawn(worker.run())));
        }
        Self { workers }
    }

    pub fn worker_ids(&self) -> Vec<WorkerId> {
        self.workers.iter().map(|(id, _)| id.clone()).collect()
    }

    /// Wait for every worker and collect the reports, in spawn order.
    pub async fn join(self) -> Vec<WorkerReport> {
        let mut reports = Vec::with_capacity(self.workers.len());
        for (id, handle) in self.workers {
            let report = match handle.await {
                Ok(report) => report,
                Err(err) => {
                    error!(worker_id = %id, error = %err, "worker task did not complete");
                    WorkerReport {
                        exit: WorkerExit::Aborted(format!("worker task failed: {err}")),
                        ..WorkerReport::new(id)
                    }
                }
            };
            reports.push(report);
        }
        reports
    }
}
