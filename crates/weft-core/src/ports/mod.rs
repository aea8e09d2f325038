//! Ports - abstraction layer over external systems.
//!
//! Each trait here is a seam: the durable task table, the time source and the
//! identity generator can all be swapped (PostgreSQL vs in-memory, system clock
//! vs fixed clock) without touching the claim/execute/finalize logic.

pub mod clock;
pub mod id_generator;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::task_store::{StoreTransaction, TaskStore};
