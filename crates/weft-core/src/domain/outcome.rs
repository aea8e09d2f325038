//! Outcome model: the result of executing one claimed task.
//!
//! This module does not assume a store or a worker loop. It only defines the
//! shape of results the finalizer turns into a terminal status.

use serde::{Deserialize, Serialize};

/// Classification of an execution result.
///
/// Serialized as SCREAMING_SNAKE_CASE (SUCCESS / FAILURE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Success,
    Failure,
}

/// Result of one execution.
///
/// - `SUCCESS`: the handler finished; the task should become `completed`.
/// - `FAILURE`: the handler returned an error, panicked, or ran past its
///   deadline; the task should become `failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub kind: OutcomeKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Outcome {
    pub fn success() -> Self {
        Self {
            kind: OutcomeKind::Success,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::Failure,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}
