//! Domain model (ids, task record, status state machine, outcomes, errors).

pub mod errors;
pub mod ids;
pub mod outcome;
pub mod status;
pub mod task;

pub use self::errors::{FinalizeError, HandlerError, QueueError, StoreError};
pub use self::ids::{TaskId, WorkerId};
pub use self::outcome::{Outcome, OutcomeKind};
pub use self::status::{ParseStatusError, TaskStatus};
pub use self::task::{NewTask, Task, TaskQuery};
