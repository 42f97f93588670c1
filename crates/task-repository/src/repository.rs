//! §6.1's `Repository` operations.
//!
//! `WithTx` is expressed as an explicit `begin_tx`/`commit` handle rather
//! than a callback taking a closure: Rust's async trait objects can't carry
//! a generic `FnOnce(tx) -> Future` parameter without boxing the closure's
//! own future, so the handle form is the idiomatic equivalent — the caller
//! still can't observe a transaction's writes without calling `commit`.

use async_trait::async_trait;
use task_core::{Error, ProgressInfo, State, TaskExecId, TaskId};

use crate::transaction::Transaction;

#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_state(&self, task_exec_id: &TaskExecId) -> Result<State, Error>;

    /// Write-through; idempotent on `(task_exec_id, status, updated_at)`.
    async fn upsert_state(&self, state: &State) -> Result<(), Error>;

    /// Ordered by creation.
    async fn list_children(&self, parent_id: &TaskExecId) -> Result<Vec<State>, Error>;

    async fn get_child_by_task_id(
        &self,
        parent_id: &TaskExecId,
        task_id: &TaskId,
    ) -> Result<State, Error>;

    /// Server-computed counts, independent of any bookkeeping the parent's
    /// own `State.parallel` sub-state may carry.
    async fn get_progress_info(&self, parent_id: &TaskExecId) -> Result<ProgressInfo, Error>;

    async fn begin_tx(&self) -> Result<Box<dyn Transaction>, Error>;
}
