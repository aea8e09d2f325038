//! IdGenerator port - mints worker identities.
//!
//! Task ids come from the store; worker ids are generated locally so that each
//! worker instance owns an identity no other worker can collide with.

use crate::domain::WorkerId;
use crate::ports::Clock;
use ulid::Ulid;

/// Generates identities that are unique without coordination.
pub trait IdGenerator: Send + Sync {
    fn generate_worker_id(&self) -> WorkerId;
}

/// ULID-based generator. The timestamp part comes from the injected `Clock`,
/// the random part from `rand`.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_worker_id(&self) -> WorkerId {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        WorkerId::from_ulid(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}
