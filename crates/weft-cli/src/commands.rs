//! Subcommand implementations.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::sync::watch;
use tracing::info;
use weft_core::app::{
    DeadlinePolicy, ExecutionEngine, QueueStatus, ReaperLoop, WorkerConfig, WorkerExit,
    WorkerGroup, query_status,
};
use weft_core::domain::TaskQuery;
use weft_core::impls::{PgTaskStore, SleepHandler};
use weft_core::ports::{SystemClock, TaskStore, UlidGenerator};

use crate::producer;

pub async fn migrate(store: &PgTaskStore) -> Result<()> {
    store.migrate().await.context("running migrations")?;
    println!("schema is up to date");
    Ok(())
}

pub async fn enqueue(store: &dyn TaskStore, num_tasks: usize) -> Result<()> {
    let batch = producer::random_batch(&mut rand::thread_rng(), num_tasks);
    let inserted = store
        .enqueue_many(batch)
        .await
        .context("inserting tasks")?;

    for task in &inserted {
        info!(task_id = %task.id, processing_time = task.processing_time, "added task");
    }
    println!("inserted {} tasks", inserted.len());
    Ok(())
}

pub async fn work(
    store: Arc<dyn TaskStore>,
    workers: usize,
    config: WorkerConfig,
    deadline_grace: Option<Duration>,
) -> Result<()> {
    let mut engine = ExecutionEngine::new(Arc::new(SleepHandler));
    if let Some(grace) = deadline_grace {
        engine = engine.with_deadline(DeadlinePolicy::FromProcessingTime { grace });
    }

    let group = WorkerGroup::spawn(
        workers,
        store,
        Arc::new(engine),
        config,
        &UlidGenerator::new(SystemClock),
    );
    let reports = group.join().await;

    let mut aborted = 0;
    for report in &reports {
        let exit = match &report.exit {
            WorkerExit::Exhausted => "exhausted".to_string(),
            WorkerExit::Aborted(reason) => {
                aborted += 1;
                format!("aborted: {reason}")
            }
        };
        println!(
            "{}: processed {} ({} completed, {} failed), {exit}",
            report.worker_id, report.processed, report.completed, report.failed
        );
    }
    let total: usize = reports.iter().map(|r| r.processed).sum();
    println!("processed {total} tasks in total");

    if aborted > 0 {
        bail!("{aborted} of {} workers aborted", reports.len());
    }
    Ok(())
}

pub async fn status(store: &dyn TaskStore, query: &TaskQuery, json: bool) -> Result<()> {
    let status = query_status(store, query).await.context("querying status")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print_table(&status);
    }
    Ok(())
}

fn print_table(status: &QueueStatus) {
    let c = status.counts;
    println!(
        "pending: {}  processing: {}  completed: {}  failed: {}  total: {}",
        c.pending,
        c.processing,
        c.completed,
        c.failed,
        c.total()
    );
    if status.tasks.is_empty() {
        return;
    }

    println!();
    println!(
        "{:<10} {:<11} {:<34} {:>5}  {}",
        "ID", "STATUS", "WORKER", "TIME", "UPDATED"
    );
    for task in &status.tasks {
        let worker = task.worker_id.as_ref().map_or("-", |w| w.as_str());
        println!(
            "{:<10} {:<11} {:<34} {:>4}s  {}",
            task.id.get(),
            task.status,
            worker,
            task.processing_time,
            task.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
}

pub async fn reap(
    store: Arc<dyn TaskStore>,
    stale_after: Duration,
    watch_interval: Option<Duration>,
) -> Result<()> {
    let reaper = ReaperLoop::new(store, stale_after);

    let Some(interval) = watch_interval else {
        let reset = reaper.sweep_once().await.context("resetting stale claims")?;
        println!("reset {} stale claims", reset.len());
        return Ok(());
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping reaper");
        }
        // a dropped receiver just means the reaper already stopped
        let _ = shutdown_tx.send(true);
    });

    let total = reaper.with_interval(interval).run(shutdown_rx).await;
    println!("reset {total} stale claims");
    Ok(())
}
