//! Implementations of the ports: PostgreSQL and in-memory stores, built-in
//! handlers.

pub mod handlers;
pub mod memory;
pub mod postgres;

pub use self::handlers::SleepHandler;
pub use self::memory::InMemoryTaskStore;
pub use self::postgres::PgTaskStore;
