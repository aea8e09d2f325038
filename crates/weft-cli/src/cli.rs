//! Command-line definition.

use clap::{Parser, Subcommand};
use weft_core::app::reaper::DEFAULT_REAP_INTERVAL;
use weft_core::domain::TaskStatus;

use crate::producer::DEFAULT_NUM_TASKS;

#[derive(Debug, Parser)]
#[command(name = "weft", version, about = "Work-queue consumption on a PostgreSQL task table")]
pub struct Cli {
    /// PostgreSQL connection URL. Falls back to DB_* parts when neither the
    /// flag nor DATABASE_URL is set.
    #[arg(long, env = "DATABASE_URL", global = true)]
    pub database_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create or update the task table.
    Migrate,

    /// Insert simulated tasks.
    Enqueue {
        #[arg(long, default_value_t = DEFAULT_NUM_TASKS)]
        num_tasks: usize,
    },

    /// Run workers until no pending task is left.
    Work {
        #[arg(long, default_value_t = 1)]
        workers: usize,

        /// Pause between tasks (overrides WEFT_INTER_TASK_PAUSE_MS).
        #[arg(long)]
        pause_ms: Option<u64>,

        /// Abort a task after processing_time plus this many seconds.
        #[arg(long)]
        deadline_grace_secs: Option<u64>,
    },

    /// Show task counts and matching tasks.
    Status {
        #[arg(long)]
        status: Option<TaskStatus>,

        #[arg(long)]
        worker_id: Option<String>,

        #[arg(long)]
        id: Option<i64>,

        #[arg(long, default_value_t = 50)]
        limit: usize,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Return abandoned `processing` tasks to `pending`.
    Reap {
        /// Age after which a claim is considered abandoned (overrides WEFT_STALE_AFTER_SECS).
        #[arg(long)]
        stale_after_secs: Option<u64>,

        /// Keep sweeping until interrupted.
        #[arg(long)]
        watch: bool,

        #[arg(long, default_value_t = DEFAULT_REAP_INTERVAL.as_secs(), requires = "watch")]
        interval_secs: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_work_flags() {
        let cli = Cli::try_parse_from(["weft", "work", "--workers", "4", "--pause-ms", "0"]).unwrap();
        match cli.command {
            Commands::Work {
                workers,
                pause_ms,
                deadline_grace_secs,
            } => {
                assert_eq!(workers, 4);
                assert_eq!(pause_ms, Some(0));
                assert_eq!(deadline_grace_secs, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_status_filter() {
        let cli = Cli::try_parse_from(["weft", "status", "--status", "failed", "--json"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Status {
                status: Some(TaskStatus::Failed),
                json: true,
                ..
            }
        ));
    }

    #[test]
    fn enqueue_defaults_to_thirty_tasks() {
        let cli = Cli::try_parse_from(["weft", "enqueue"]).unwrap();
        assert!(matches!(cli.command, Commands::Enqueue { num_tasks: 30 }));
    }

    #[test]
    fn database_url_reads_the_environment() {
        let command = Cli::command();
        let arg = command
            .get_arguments()
            .find(|a| a.get_id() == "database_url")
            .unwrap();
        assert_eq!(arg.get_env(), Some(std::ffi::OsStr::new("DATABASE_URL")));
    }

    #[test]
    fn reap_interval_defaults_to_library_interval() {
        let cli = Cli::try_parse_from(["weft", "reap", "--watch"]).unwrap();
        match cli.command {
            Commands::Reap { interval_secs, .. } => {
                assert_eq!(interval_secs, DEFAULT_REAP_INTERVAL.as_secs());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
