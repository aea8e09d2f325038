//! weft - command-line entry point.

mod cli;
mod commands;
mod producer;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use weft_core::config::WeftConfig;
use weft_core::domain::{TaskId, TaskQuery, WorkerId};
use weft_core::impls::PgTaskStore;
use weft_core::observability::init_tracing;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // clap already folded DATABASE_URL into the flag
    let config = WeftConfig::from_lookup(|key| match key {
        "DATABASE_URL" => cli.database_url.clone(),
        _ => std::env::var(key).ok(),
    })
    .context("loading configuration")?;
    init_tracing(&config.log).context("initialising logging")?;

    let store = PgTaskStore::connect(&config.database)
        .await
        .context("connecting to the task store")?;

    match cli.command {
        Commands::Migrate => commands::migrate(&store).await,

        Commands::Enqueue { num_tasks } => commands::enqueue(&store, num_tasks).await,

        Commands::Work {
            workers,
            pause_ms,
            deadline_grace_secs,
        } => {
            let mut worker_config = config.worker.worker_config();
            if let Some(ms) = pause_ms {
                worker_config.inter_task_pause = Duration::from_millis(ms);
            }
            commands::work(
                Arc::new(store),
                workers,
                worker_config,
                deadline_grace_secs.map(Duration::from_secs),
            )
            .await
        }

        Commands::Status {
            status,
            worker_id,
            id,
            limit,
            json,
        } => {
            let query = TaskQuery {
                id: id.map(TaskId::new),
                status,
                worker_id: worker_id.map(WorkerId::new),
                limit: Some(limit),
            };
            commands::status(&store, &query, json).await
        }

        Commands::Reap {
            stale_after_secs,
            watch,
            interval_secs,
        } => {
            let stale_after = stale_after_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.worker.stale_after());
            let interval = watch.then(|| Duration::from_secs(interval_secs));
            commands::reap(Arc::new(store), stale_after, interval).await
        }
    }
}
