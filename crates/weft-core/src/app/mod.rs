//! App - claim, execute, finalize and the loops built on them.
//!
//! Everything here works against the ports only; the same code drives the
//! PostgreSQL store in production and the in-memory store in tests.

pub mod claim;
pub mod engine;
pub mod finalize;
pub mod reaper;
pub mod status;
pub mod worker;

pub use self::claim::claim;
pub use self::engine::{DeadlinePolicy, ExecutionEngine, TaskHandler};
pub use self::finalize::finalize;
pub use self::reaper::ReaperLoop;
pub use self::status::{QueueStatus, query_status};
pub use self::worker::{Worker, WorkerConfig, WorkerExit, WorkerGroup, WorkerReport};
