//! Error taxonomy for the store, the claim protocol and the finalizer.
//!
//! "No task available" is deliberately not here: claim reports it as `Ok(None)`.
//! Execution failures are not errors either; they become `Outcome::failure`.

use thiserror::Error;

use super::{TaskId, TaskStatus, WorkerId};

/// Errors raised by a `TaskStore` implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport or connection failure talking to the store.
    #[error("task store unavailable: {0}")]
    Unavailable(String),

    #[error("{0} not found")]
    NotFound(TaskId),

    /// A guarded write found the row in an unexpected status.
    #[error("invalid transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    /// A terminal write came from a worker that no longer owns the claim.
    #[error("{id} is claimed by {}", .owner.as_ref().map_or("nobody", |w| w.as_str()))]
    NotOwner {
        id: TaskId,
        owner: Option<WorkerId>,
    },

    /// The row is locked by another in-flight transaction.
    #[error("{0} is locked by another transaction")]
    Locked(TaskId),

    #[error("task store query failed: {0}")]
    Query(String),

    /// A row read back from the store could not be mapped to a `Task`.
    #[error("corrupt task row: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Errors surfaced by the claim protocol and other queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Fatal for the current worker cycle; the loop aborts.
    #[error("task store unavailable: {0}")]
    StoreUnavailable(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for QueueError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(reason) => QueueError::StoreUnavailable(reason),
            other => QueueError::Store(other),
        }
    }
}

/// Errors from recording an execution outcome.
#[derive(Debug, Error)]
pub enum FinalizeError {
    /// The task is not `processing` (already finalized, or reset by the reaper).
    /// Nothing was written.
    #[error("finalize rejected for {id}: task is {status}")]
    Rejected { id: TaskId, status: TaskStatus },

    #[error("{0} not found")]
    NotFound(TaskId),

    /// Even the failure-marking write could not be committed; the task is left
    /// `processing` until reconciled.
    #[error("could not record outcome for {id}: {source}")]
    WriteFailed {
        id: TaskId,
        #[source]
        source: StoreError,
    },
}

/// Errors returned by a task handler. Always mapped to `Outcome::failure`.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("{0}")]
    Failed(String),
}
