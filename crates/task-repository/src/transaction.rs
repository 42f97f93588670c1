//! The transaction handle returned by `Repository::begin_tx`: §5's
//! per-parent row lock (`GetStateForUpdate`), writes scoped to the
//! transaction, and batch child creation.

use async_trait::async_trait;
use task_core::{Error, State, TaskExecId};

#[async_trait]
pub trait Transaction: Send + Sync {
    /// Pessimistic row lock keyed by `task_exec_id`. §4.5: 5s timeout,
    /// jittered retry capped at 500ms per attempt.
    async fn get_state_for_update(&mut self, task_exec_id: &TaskExecId) -> Result<State, Error>;

    async fn upsert_state_with_tx(&mut self, state: &State) -> Result<(), Error>;

    /// Batch insert; the dispatcher never persists children itself.
    async fn create_child_states(
        &mut self,
        parent_id: &TaskExecId,
        children: &[State],
    ) -> Result<(), Error>;

    /// Releases every lock this transaction acquired.
    async fn commit(self: Box<Self>) -> Result<(), Error>;
}
