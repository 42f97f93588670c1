//! C5 — Parent Status Updater: §4.5's transactional reconciliation,
//! generalized from the teacher's adaptive-backoff poll loop
//! (`agenticlaw::supervisor::poll`, `SupervisorState::current_backoff_ms`)
//! — a capped multiplicative backoff slept between retries of a
//! transient failure, here bounding `LockTimeout` retries instead of
//! poll intervals.

use std::time::Duration;

use task_core::{Error, State, Status};
use task_repository::Repository;
use tracing::{info, warn};

use crate::aggregator;

#[derive(Clone, Copy, Debug)]
pub struct UpdaterConfig {
    pub max_attempts: u32,
    pub backoff_initial: Duration,
    pub backoff_cap: Duration,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_initial: Duration::from_millis(50),
            backoff_cap: Duration::from_millis(500),
        }
    }
}

/// Entry point: given a child that just transitioned to a terminal status,
/// reconcile its parent (and cascade upward through terminal ancestors).
/// No-op if the child has no parent. Returns the immediate parent's updated
/// state when reconciliation changed it, so a caller (e.g. the response
/// handler) can compute that parent's own "next task" transition.
pub async fn reconcile(
    repo: &dyn Repository,
    child: &State,
    config: &UpdaterConfig,
) -> Result<Option<State>, Error> {
    let Some(parent_id) = child.parent_state_id.clone() else {
        return Ok(None);
    };

    let mut attempt = 0;
    loop {
        match reconcile_once(repo, &parent_id, child, config).await {
            Ok(updated) => return Ok(updated),
            Err(Error::LockTimeout { attempts }) if attempt + 1 < config.max_attempts => {
                attempt += 1;
                let backoff = config
                    .backoff_initial
                    .mul_f64(2f64.powi(attempt as i32))
                    .min(config.backoff_cap);
                warn!(%parent_id, attempt, "parent lock timeout, retrying reconciliation");
                tokio::time::sleep(backoff).await;
                let _ = attempts;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn reconcile_once(
    repo: &dyn Repository,
    parent_id: &task_core::TaskExecId,
    child: &State,
    config: &UpdaterConfig,
) -> Result<Option<State>, Error> {
    let mut tx = repo.begin_tx().await?;

    let parent = match tx.get_state_for_update(parent_id).await {
        Ok(parent) => parent,
        Err(Error::NotFound(msg)) => {
            warn!(%parent_id, "parent not found during reconciliation");
            return Err(Error::NotFound(msg));
        }
        Err(e) => return Err(e),
    };

    if !parent.is_parallel_execution() {
        tx.commit().await?;
        return Ok(None);
    }

    let progress = repo.get_progress_info(parent_id).await?;
    let strategy = parent.configured_strategy();
    let new_status = aggregator::overall_status(strategy, &progress);

    let mut updated_parent = parent.clone();
    updated_parent.record_child_terminal(child);

    if !apply_status(&mut updated_parent, new_status) {
        tx.commit().await?;
        return Ok(None);
    }

    if new_status.is_terminal() {
        let children = repo.list_children(parent_id).await?;
        updated_parent.output = Some(aggregate_output(&children));
    }

    tx.upsert_state_with_tx(&updated_parent).await?;
    tx.commit().await?;

    info!(
        task_exec_id = %updated_parent.task_exec_id,
        old_status = %parent.status,
        new_status = %updated_parent.status,
        "parent status reconciled"
    );

    if new_status.is_terminal() {
        Box::pin(reconcile(repo, &updated_parent, config)).await?;
    }
    Ok(Some(updated_parent))
}

/// `ShouldUpdateParentStatus` + the write itself: same status never
/// updates; `terminal→terminal` only for the worse-terminal compensation
/// (success→failed); everything else is a normal monotonic transition.
fn apply_status(parent: &mut State, new_status: Status) -> bool {
    if parent.status == new_status {
        return false;
    }
    if parent.status.is_terminal() && new_status.is_terminal() {
        if parent.status == Status::Success && new_status == Status::Failed {
            parent.status = new_status;
            parent.updated_at = Some(chrono::Utc::now());
            return true;
        }
        return false;
    }
    parent.transition(new_status).is_ok()
}

fn aggregate_output(children: &[State]) -> serde_json::Value {
    serde_json::Value::Array(children.iter().filter_map(|c| c.output.clone()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use task_core::{Component, TaskType, WorkflowExecId, WorkflowId};
    use task_repository::InMemoryRepository;

    fn parallel_root() -> State {
        State::new_pending(
            Component::Task,
            task_core::TaskId::new("root"),
            task_core::TaskExecId::new("exec-root"),
            WorkflowId::new("wf"),
            WorkflowExecId::new("wf-exec-1"),
            TaskType::Parallel,
            None,
        )
    }

    fn child(id: &str, parent: &State) -> State {
        State::new_pending(
            Component::Task,
            task_core::TaskId::new(id),
            task_core::TaskExecId::new(format!("exec-{id}")),
            parent.workflow_id.clone(),
            parent.workflow_exec_id.clone(),
            TaskType::Basic,
            Some(parent.task_exec_id.clone()),
        )
    }

    #[tokio::test]
    async fn non_composite_parent_is_a_no_op() {
        let repo = InMemoryRepository::new();
        let mut parent = parallel_root();
        parent.execution_type = TaskType::Basic;
        repo.upsert_state(&parent).await.unwrap();

        let mut c = child("a", &parent);
        c.transition(Status::Running).unwrap();
        c.transition(Status::Success).unwrap();
        repo.upsert_state(&c).await.unwrap();

        reconcile(&repo, &c, &UpdaterConfig::default()).await.unwrap();
        let unchanged = repo.get_state(&parent.task_exec_id).await.unwrap();
        assert_eq!(unchanged.status, Status::Pending);
    }

    #[tokio::test]
    async fn wait_all_parent_transitions_to_success_when_all_children_complete() {
        let repo = InMemoryRepository::new();
        let parent = parallel_root();
        repo.upsert_state(&parent).await.unwrap();

        let mut a = child("a", &parent);
        a.transition(Status::Running).unwrap();
        a.transition(Status::Success).unwrap();
        repo.upsert_state(&a).await.unwrap();

        reconcile(&repo, &a, &UpdaterConfig::default()).await.unwrap();
        let reconciled = repo.get_state(&parent.task_exec_id).await.unwrap();
        assert_eq!(reconciled.status, Status::Success);
        assert!(reconciled.output.is_some());
    }

    #[tokio::test]
    async fn terminal_to_terminal_forbids_failed_to_success() {
        let mut parent = parallel_root();
        parent.status = Status::Failed;
        let applied = apply_status(&mut parent, Status::Success);
        assert!(!applied);
        assert_eq!(parent.status, Status::Failed);
    }

    #[tokio::test]
    async fn terminal_to_terminal_allows_success_to_failed() {
        let mut parent = parallel_root();
        parent.status = Status::Success;
        let applied = apply_status(&mut parent, Status::Failed);
        assert!(applied);
        assert_eq!(parent.status, Status::Failed);
    }

    #[tokio::test]
    async fn same_status_is_not_an_update() {
        let mut parent = parallel_root();
        parent.status = Status::Pending;
        assert!(!apply_status(&mut parent, Status::Pending));
    }
}
