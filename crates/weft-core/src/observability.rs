//! Observability: status counts for monitoring and `tracing` initialisation.
//!
//! All diagnostics go through `tracing` macros with structured fields
//! (`worker_id`, `task_id`, `status`). Binaries call [`init_tracing`] once at
//! startup; libraries never install a subscriber themselves.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::domain::TaskStatus;

/// Number of tasks in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: TaskStatus, n: usize) {
        match status {
            TaskStatus::Pending => self.pending += n,
            TaskStatus::Processing => self.processing += n,
            TaskStatus::Completed => self.completed += n,
            TaskStatus::Failed => self.failed += n,
        }
    }

    pub fn get(&self, status: TaskStatus) -> usize {
        match status {
            TaskStatus::Pending => self.pending,
            TaskStatus::Processing => self.processing,
            TaskStatus::Completed => self.completed,
            TaskStatus::Failed => self.failed,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed
    }

    pub fn terminal(&self) -> usize {
        self.completed + self.failed
    }
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(TelemetryError::Format(other.to_string())),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => f.write_str("text"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log format `{0}` (expected text or json)")]
    Format(String),

    #[error("invalid log filter `{directives}`: {reason}")]
    Filter { directives: String, reason: String },

    #[error("failed to install tracing subscriber: {0}")]
    Init(String),
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Base level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,

    /// Extra filter directives, e.g. `sqlx=warn,weft_core=debug`.
    pub filter_directives: Option<String>,

    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            filter_directives: None,
            format: LogFormat::Text,
        }
    }
}

impl LogConfig {
    /// Read `LOG_LEVEL`, `LOG_FILTER` and `LOG_FORMAT` through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, TelemetryError> {
        let mut config = Self::default();
        if let Some(level) = lookup("LOG_LEVEL") {
            config.level = level;
        }
        if let Some(filter) = lookup("LOG_FILTER") {
            config.filter_directives = Some(filter);
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            config.format = format.parse()?;
        }
        Ok(config)
    }

    pub fn from_env() -> Result<Self, TelemetryError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn directives(&self) -> String {
        match &self.filter_directives {
            Some(extra) if !extra.trim().is_empty() => format!("{},{}", self.level, extra),
            _ => self.level.clone(),
        }
    }

    pub fn env_filter(&self) -> Result<EnvFilter, TelemetryError> {
        let directives = self.directives();
        EnvFilter::try_new(&directives).map_err(|e| TelemetryError::Filter {
            directives,
            reason: e.to_string(),
        })
    }
}

/// Install the global subscriber.
pub fn init_tracing(config: &LogConfig) -> Result<(), TelemetryError> {
    let filter = config.env_filter()?;
    let result = match config.format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .try_init(),
    };
    result.map_err(|e| TelemetryError::Init(e.to_string()))
}
