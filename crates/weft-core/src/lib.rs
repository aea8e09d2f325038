//! weft-core
//!
//! Contended work-queue consumption on a transactional task table.
//!
//! # Modules
//! - **domain**: task record, status state machine, ids, outcomes, errors
//! - **ports**: `TaskStore` / `StoreTransaction`, `Clock`, `IdGenerator`
//! - **app**: claim, execution engine, finalizer, worker loop, reaper, status
//! - **impls**: PostgreSQL and in-memory stores, built-in handlers
//! - **config**: environment-driven configuration
//! - **observability**: status counts and `tracing` setup

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
