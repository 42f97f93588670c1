//! In-memory `Repository` reference implementation: `DashMap`-backed
//! storage (teacher's `agenticlaw-tools::registry` convention) with
//! per-parent `tokio::sync::Mutex` row locks simulating pessimistic
//! locking over a real table.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use rand::Rng;
use task_core::{Error, ProgressInfo, State, Status, TaskExecId, TaskId};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::warn;

use crate::repository::Repository;
use crate::transaction::Transaction;

const LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const LOCK_RETRY_CAP: Duration = Duration::from_millis(500);

struct Inner {
    states: DashMap<TaskExecId, State>,
    children: DashMap<TaskExecId, Vec<TaskExecId>>,
    locks: DashMap<TaskExecId, Arc<Mutex<()>>>,
}

#[derive(Clone, Default)]
pub struct InMemoryRepository {
    inner: Arc<Inner>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            states: DashMap::new(),
            children: DashMap::new(),
            locks: DashMap::new(),
        }
    }
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    fn record_child(&self, state: &State) {
        if let Some(parent) = &state.parent_state_id {
            let mut entry = self.children.entry(parent.clone()).or_default();
            if !entry.contains(&state.task_exec_id) {
                entry.push(state.task_exec_id.clone());
            }
        }
    }

    fn get_state(&self, id: &TaskExecId) -> Result<State, Error> {
        self.states
            .get(id)
            .map(|r| r.clone())
            .ok_or_else(|| Error::not_found(format!("state {id}")))
    }

    fn list_children(&self, parent: &TaskExecId) -> Vec<State> {
        self.children
            .get(parent)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.states.get(id).map(|r| r.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn lock_for(&self, key: &TaskExecId) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn acquire_lock(&self, key: &TaskExecId) -> Result<OwnedMutexGuard<()>, Error> {
        let mutex = self.lock_for(key);
        let deadline = Instant::now() + LOCK_TIMEOUT;
        let mut attempts = 0u32;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::LockTimeout { attempts });
            }
            let slice = remaining.min(LOCK_RETRY_CAP);
            match tokio::time::timeout(slice, mutex.clone().lock_owned()).await {
                Ok(guard) => return Ok(guard),
                Err(_) => {
                    attempts += 1;
                    let jitter = rand::thread_rng().gen_range(0..50);
                    warn!(task_exec_id = %key, attempts, "parent row lock contended, retrying");
                    tokio::time::sleep(Duration::from_millis(jitter)).await;
                }
            }
        }
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_state(&self, task_exec_id: &TaskExecId) -> Result<State, Error> {
        self.inner.get_state(task_exec_id)
    }

    async fn upsert_state(&self, state: &State) -> Result<(), Error> {
        self.inner.record_child(state);
        self.inner
            .states
            .insert(state.task_exec_id.clone(), state.clone());
        Ok(())
    }

    async fn list_children(&self, parent_id: &TaskExecId) -> Result<Vec<State>, Error> {
        Ok(self.inner.list_children(parent_id))
    }

    async fn get_child_by_task_id(
        &self,
        parent_id: &TaskExecId,
        task_id: &TaskId,
    ) -> Result<State, Error> {
        self.inner
            .list_children(parent_id)
            .into_iter()
            .find(|c| &c.task_id == task_id)
            .ok_or_else(|| Error::not_found(format!("child {task_id} under {parent_id}")))
    }

    async fn get_progress_info(&self, parent_id: &TaskExecId) -> Result<ProgressInfo, Error> {
        let children = self.inner.list_children(parent_id);
        let total = children.len() as u32;
        let completed = children.iter().filter(|c| c.status == Status::Success).count() as u32;
        let failed = children
            .iter()
            .filter(|c| matches!(c.status, Status::Failed | Status::TimedOut | Status::Canceled))
            .count() as u32;
        let running = children.iter().filter(|c| c.status == Status::Running).count() as u32;
        let pending = children.iter().filter(|c| c.status == Status::Pending).count() as u32;
        Ok(ProgressInfo::new(total, completed, failed, running, pending))
    }

    async fn begin_tx(&self) -> Result<Box<dyn Transaction>, Error> {
        Ok(Box::new(InMemoryTransaction {
            inner: self.inner.clone(),
            held_locks: Vec::new(),
        }))
    }
}

struct InMemoryTransaction {
    inner: Arc<Inner>,
    held_locks: Vec<(TaskExecId, OwnedMutexGuard<()>)>,
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn get_state_for_update(&mut self, task_exec_id: &TaskExecId) -> Result<State, Error> {
        if !self.held_locks.iter().any(|(id, _)| id == task_exec_id) {
            let guard = self.inner.acquire_lock(task_exec_id).await?;
            self.held_locks.push((task_exec_id.clone(), guard));
        }
        self.inner.get_state(task_exec_id)
    }

    async fn upsert_state_with_tx(&mut self, state: &State) -> Result<(), Error> {
        self.inner.record_child(state);
        self.inner
            .states
            .insert(state.task_exec_id.clone(), state.clone());
        Ok(())
    }

    async fn create_child_states(
        &mut self,
        parent_id: &TaskExecId,
        children: &[State],
    ) -> Result<(), Error> {
        for child in children {
            child.validate_parent_child(&self.inner.get_state(parent_id)?)?;
            self.inner.record_child(child);
            self.inner
                .states
                .insert(child.task_exec_id.clone(), child.clone());
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), Error> {
        // Locks release as `held_locks` drops with `self`.
        Ok(())
    }
}
