//! In-memory task store.
//!
//! Emulates the parts of a transactional relational store the claim protocol
//! relies on:
//! - row-level locks held by a transaction until commit/rollback/drop
//! - `select_one_skip_locked` that never waits on another transaction's lock
//! - writes staged per transaction and applied atomically on commit
//!
//! The shared state sits behind a `std::sync::Mutex` that is never held across
//! an `.await`, so every operation is a short critical section.
//!
//! Fault injection (`set_available`, `fail_next_commits`) lets tests simulate a
//! lost connection at any point of the protocol.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{NewTask, StoreError, Task, TaskId, TaskQuery, TaskStatus, WorkerId};
use crate::observability::StatusCounts;
use crate::ports::{Clock, StoreTransaction, SystemClock, TaskStore};

/// Shared store state.
struct StoreState {
    /// All task rows (single source of truth).
    rows: BTreeMap<TaskId, Task>,

    /// Rows locked by an open transaction.
    locked: HashSet<TaskId>,

    /// Next id to assign.
    next_id: i64,
}

impl StoreState {
    fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            locked: HashSet::new(),
            next_id: 1,
        }
    }

    fn allocate_id(&mut self) -> TaskId {
        let id = TaskId::new(self.next_id);
        self.next_id += 1;
        id
    }

    /// Tasks matching `query`, ordered by claim priority.
    fn ordered(&self, query: &TaskQuery) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .rows
            .values()
            .filter(|task| query.matches(task))
            .cloned()
            .collect();
        tasks.sort_by_key(|task| (task.created_at, task.id));
        if let Some(limit) = query.limit {
            tasks.truncate(limit);
        }
        tasks
    }
}

/// Connection-level fault switches shared by the store and its transactions.
#[derive(Default)]
struct Faults {
    unavailable: AtomicBool,
    failing_commits: AtomicUsize,
}

impl Faults {
    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }

    fn take_commit_failure(&self) -> bool {
        self.failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// In-process `TaskStore` for tests and local development.
#[derive(Clone)]
pub struct InMemoryTaskStore {
    state: Arc<Mutex<StoreState>>,
    clock: Arc<dyn Clock>,
    faults: Arc<Faults>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::new())),
            clock,
            faults: Arc::new(Faults::default()),
        }
    }

    /// Simulate losing (or regaining) the connection to the store.
    pub fn set_available(&self, available: bool) {
        self.faults.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Make the next `n` commits fail with `StoreError::Unavailable`.
    pub fn fail_next_commits(&self, n: usize) {
        self.faults.failing_commits.store(n, Ordering::SeqCst);
    }

    /// Number of rows currently locked by open transactions.
    pub fn locked_rows(&self) -> usize {
        lock(&self.state).locked.len()
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

fn lock(state: &Mutex<StoreState>) -> MutexGuard<'_, StoreState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn enqueue_many(&self, tasks: Vec<NewTask>) -> Result<Vec<Task>, StoreError> {
        self.faults.check()?;
        let now = self.clock.now();
        let mut state = lock(&self.state);

        let mut inserted = Vec::with_capacity(tasks.len());
        for new_task in tasks {
            let task = Task {
                id: state.allocate_id(),
                payload: new_task.payload,
                processing_time: new_task.processing_time,
                status: TaskStatus::Pending,
                worker_id: None,
                created_at: now,
                updated_at: now,
                processed_at: None,
            };
            state.rows.insert(task.id, task.clone());
            inserted.push(task);
        }
        Ok(inserted)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        self.faults.check()?;
        Ok(Box::new(InMemoryTransaction {
            state: Arc::clone(&self.state),
            clock: Arc::clone(&self.clock),
            faults: Arc::clone(&self.faults),
            held: Vec::new(),
            staged: BTreeMap::new(),
            finished: false,
        }))
    }

    async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        self.faults.check()?;
        Ok(lock(&self.state).rows.get(&id).cloned())
    }

    async fn find(&self, query: &TaskQuery) -> Result<Vec<Task>, StoreError> {
        self.faults.check()?;
        Ok(lock(&self.state).ordered(query))
    }

    async fn counts_by_status(&self) -> Result<StatusCounts, StoreError> {
        self.faults.check()?;
        let state = lock(&self.state);
        let mut counts = StatusCounts::default();
        for task in state.rows.values() {
            counts.record(task.status, 1);
        }
        Ok(counts)
    }

    async fn reset_stale_claims(&self, stale_after: Duration) -> Result<Vec<TaskId>, StoreError> {
        self.faults.check()?;
        let now = self.clock.now();
        let Some(cutoff) = chrono::Duration::from_std(stale_after)
            .ok()
            .and_then(|age| now.checked_sub_signed(age))
        else {
            return Ok(Vec::new());
        };

        let mut state = lock(&self.state);
        let StoreState { rows, locked, .. } = &mut *state;
        let mut reset = Vec::new();
        for task in rows.values_mut() {
            if task.status == TaskStatus::Processing
                && task.updated_at < cutoff
                && !locked.contains(&task.id)
            {
                task.status = TaskStatus::Pending;
                task.worker_id = None;
                task.updated_at = now;
                reset.push(task.id);
            }
        }
        Ok(reset)
    }
}

/// Transaction over `InMemoryTaskStore`.
struct InMemoryTransaction {
    state: Arc<Mutex<StoreState>>,
    clock: Arc<dyn Clock>,
    faults: Arc<Faults>,

    /// Row locks taken by this transaction.
    held: Vec<TaskId>,

    /// Row images written by this transaction, applied on commit.
    staged: BTreeMap<TaskId, Task>,

    finished: bool,
}

impl InMemoryTransaction {
    fn release(&mut self, state: &mut StoreState) {
        for id in self.held.drain(..) {
            state.locked.remove(&id);
        }
        self.staged.clear();
        self.finished = true;
    }

    /// Guarded write: lock the row, check its status (and owner, when given),
    /// stage the new image.
    fn transition(
        &mut self,
        id: TaskId,
        to: TaskStatus,
        owner: Option<&WorkerId>,
        apply: impl FnOnce(&mut Task),
    ) -> Result<Task, StoreError> {
        self.faults.check()?;
        let now = self.clock.now();
        let mut state = lock(&self.state);

        let current = match self.staged.get(&id) {
            Some(task) => task.clone(),
            None => state.rows.get(&id).cloned().ok_or(StoreError::NotFound(id))?,
        };
        if !self.held.contains(&id) {
            if state.locked.contains(&id) {
                return Err(StoreError::Locked(id));
            }
            state.locked.insert(id);
            self.held.push(id);
        }
        if !current.status.can_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                id,
                from: current.status,
                to,
            });
        }
        if owner.is_some_and(|owner| !current.is_owned_by(owner)) {
            return Err(StoreError::NotOwner {
                id,
                owner: current.worker_id,
            });
        }

        let mut next = current;
        next.status = to;
        next.updated_at = now;
        apply(&mut next);
        self.staged.insert(id, next.clone());
        Ok(next)
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn select_one_skip_locked(&mut self) -> Result<Option<Task>, StoreError> {
        self.faults.check()?;
        let mut state = lock(&self.state);

        let candidate = state
            .rows
            .values()
            .filter(|task| task.status.is_claimable())
            .filter(|task| self.held.contains(&task.id) || !state.locked.contains(&task.id))
            .min_by_key(|task| (task.created_at, task.id))
            .cloned();

        if let Some(task) = &candidate
            && !self.held.contains(&task.id)
        {
            state.locked.insert(task.id);
            self.held.push(task.id);
        }
        Ok(candidate)
    }

    async fn mark_processing(
        &mut self,
        id: TaskId,
        worker_id: &WorkerId,
    ) -> Result<Task, StoreError> {
        let owner = worker_id.clone();
        self.transition(id, TaskStatus::Processing, None, move |task| {
            task.worker_id = Some(owner);
        })
    }

    async fn mark_completed(
        &mut self,
        id: TaskId,
        worker_id: &WorkerId,
    ) -> Result<Task, StoreError> {
        self.transition(id, TaskStatus::Completed, Some(worker_id), |task| {
            task.processed_at = Some(task.updated_at);
        })
    }

    async fn mark_failed(&mut self, id: TaskId, worker_id: &WorkerId) -> Result<Task, StoreError> {
        self.transition(id, TaskStatus::Failed, Some(worker_id), |_| {})
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut this = self;
        let state_handle = Arc::clone(&this.state);
        let mut state = lock(&state_handle);

        if let Err(err) = this.faults.check() {
            this.release(&mut state);
            return Err(err);
        }
        if this.faults.take_commit_failure() {
            this.release(&mut state);
            return Err(StoreError::Unavailable(
                "connection lost during commit".to_string(),
            ));
        }

        let staged = std::mem::take(&mut this.staged);
        for (id, task) in staged {
            state.rows.insert(id, task);
        }
        this.release(&mut state);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let mut this = self;
        let state_handle = Arc::clone(&this.state);
        let mut state = lock(&state_handle);
        this.release(&mut state);
        Ok(())
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let state_handle = Arc::clone(&self.state);
        let mut state = lock(&state_handle);
        self.release(&mut state);
    }
}
