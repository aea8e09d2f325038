//! Domain identifiers (strongly-typed IDs).
//!
//! - `TaskId` is assigned by the task store (monotonic, `BIGSERIAL` on PostgreSQL).
//! - `WorkerId` is minted by the worker itself and is opaque to the store.
//!
//! Keeping them as distinct newtypes means a worker identity can never be passed
//! where a task id is expected (and vice versa).

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Identifier of a task row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(i64);

impl TaskId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for TaskId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Identity of one worker instance, owned by that worker for its lifetime.
///
/// Generated workers use a ULID (`worker-<ulid>`), but any string read back from
/// the store is accepted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    /// Prefix used by generated identities.
    pub const PREFIX: &'static str = "worker-";

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(format!("{}{}", Self::PREFIX, ulid.to_string().to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for WorkerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
