//! Task status state machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a task row.
///
/// State transitions:
/// - Pending -> Processing (claim)
/// - Processing -> Completed (execution succeeded and the finalize write committed)
/// - Processing -> Failed (execution failed, or recording success failed)
///
/// `Completed` and `Failed` are terminal. The stale-claim reaper may move a
/// `Processing` row back to `Pending`, but that is a recovery write outside this
/// state machine (see `TaskStore::reset_stale_claims`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting to be claimed.
    Pending,

    /// Claimed by a worker (see `Task::worker_id`).
    Processing,

    /// Executed successfully.
    Completed,

    /// Execution failed; no automatic retry.
    Failed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Pending,
        TaskStatus::Processing,
        TaskStatus::Completed,
        TaskStatus::Failed,
    ];

    /// Column value used by the stores.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Is this task eligible for claim?
    pub fn is_claimable(self) -> bool {
        matches!(self, TaskStatus::Pending)
    }

    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Processing)
                | (TaskStatus::Processing, TaskStatus::Completed)
                | (TaskStatus::Processing, TaskStatus::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown task status `{0}` (expected pending, processing, completed or failed)")]
pub struct ParseStatusError(pub String);

impl FromStr for TaskStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "processing" => Ok(TaskStatus::Processing),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::claim(TaskStatus::Pending, TaskStatus::Processing)]
    #[case::complete(TaskStatus::Processing, TaskStatus::Completed)]
    #[case::fail(TaskStatus::Processing, TaskStatus::Failed)]
    fn allowed_transitions(#[case] from: TaskStatus, #[case] to: TaskStatus) {
        assert!(from.can_transition_to(to));
    }

    #[rstest]
    #[case::completed_is_final(TaskStatus::Completed, TaskStatus::Pending)]
    #[case::completed_twice(TaskStatus::Completed, TaskStatus::Completed)]
    #[case::failed_is_final(TaskStatus::Failed, TaskStatus::Pending)]
    #[case::no_skip_claim(TaskStatus::Pending, TaskStatus::Completed)]
    #[case::no_release(TaskStatus::Processing, TaskStatus::Pending)]
    fn rejected_transitions(#[case] from: TaskStatus, #[case] to: TaskStatus) {
        assert!(!from.can_transition_to(to));
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        let terminal: Vec<_> = TaskStatus::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(terminal, vec![TaskStatus::Completed, TaskStatus::Failed]);
    }

    #[test]
    fn parses_column_values() {
        for status in TaskStatus::ALL {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert_eq!(" Pending ".parse::<TaskStatus>().unwrap(), TaskStatus::Pending);
        assert!("queued".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn serializes_lowercase() {
        let s = serde_json::to_string(&TaskStatus::Processing).unwrap();
        assert_eq!(s, "\"processing\"");
    }
}
