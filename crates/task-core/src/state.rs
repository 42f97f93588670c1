//! Runtime execution state — §3 `State` entity and §4.3 predicates.

use crate::config::{Strategy, TaskType};
use crate::ids::{TaskExecId, TaskId, WorkflowExecId, WorkflowId};
use crate::progress::ProgressInfo;
use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Agent,
    Tool,
    Task,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Running,
    Success,
    Failed,
    TimedOut,
    Canceled,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::TimedOut | Self::Canceled)
    }

    /// §3 invariant (i): pending → running → {success,failed,timed_out,canceled}.
    /// Terminal → terminal is only reachable through `ShouldUpdateParentStatus`
    /// (a "worse" terminal compensation), never through a plain state edit.
    pub fn can_transition_to(self, next: Status) -> bool {
        use Status::*;
        match (self, next) {
            (Pending, Running) => true,
            (Pending, Success | Failed | TimedOut | Canceled) => true,
            (Running, Success | Failed | TimedOut | Canceled) => true,
            (a, b) if a == b => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Canceled => "canceled",
        };
        write!(f, "{s}")
    }
}

/// Retry attempts recorded directly on the state rather than in a scheduler
/// closure, so recovery after a crash only needs the persisted state.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct RetryState {
    pub attempts: u32,
}

/// Sub-state tracked on a parallel/collection root, per §4.3's
/// `UpdateSubtaskState`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ParallelSubState {
    pub completed_tasks: Vec<TaskExecId>,
    pub failed_tasks: Vec<TaskExecId>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct State {
    pub component: Component,
    pub status: Status,
    pub task_id: TaskId,
    pub task_exec_id: TaskExecId,
    pub workflow_id: WorkflowId,
    pub workflow_exec_id: WorkflowExecId,
    pub execution_type: TaskType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_state_id: Option<TaskExecId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub input: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StateError>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel: Option<ParallelSubState>,
    #[serde(default, skip_serializing_if = "RetryState::is_zero")]
    pub retry: RetryState,
}

impl RetryState {
    fn is_zero(&self) -> bool {
        self.attempts == 0
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StateError {
    pub code: String,
    pub message: String,
}

impl State {
    pub fn new_pending(
        component: Component,
        task_id: TaskId,
        task_exec_id: TaskExecId,
        workflow_id: WorkflowId,
        workflow_exec_id: WorkflowExecId,
        execution_type: TaskType,
        parent_state_id: Option<TaskExecId>,
    ) -> Self {
        Self {
            component,
            status: Status::Pending,
            task_id,
            task_exec_id,
            workflow_id,
            workflow_exec_id,
            execution_type,
            parent_state_id,
            agent_id: None,
            tool_id: None,
            input: Default::default(),
            output: None,
            error: None,
            created_at: Utc::now(),
            updated_at: None,
            parallel: None,
            retry: RetryState::default(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_state_id.is_none()
    }

    pub fn is_basic(&self) -> bool {
        self.execution_type == TaskType::Basic
    }

    pub fn is_parallel_execution(&self) -> bool {
        matches!(
            self.execution_type,
            TaskType::Parallel | TaskType::Collection | TaskType::Composite
        )
    }

    pub fn is_child_task(&self) -> bool {
        self.parent_state_id.is_some()
    }

    pub fn is_parallel_root(&self) -> bool {
        self.is_parallel_execution() && self.is_root()
    }

    pub fn can_have_children(&self) -> bool {
        self.is_parallel_execution() || self.execution_type == TaskType::Router
    }

    /// §4.5's strategy read: `Input._parallel_config.strategy`, default `wait_all`.
    pub fn configured_strategy(&self) -> Strategy {
        self.input
            .get("_parallel_config")
            .and_then(|v| v.get("strategy"))
            .and_then(|v| v.as_str())
            .and_then(|s| match s {
                "wait_all" => Some(Strategy::WaitAll),
                "fail_fast" => Some(Strategy::FailFast),
                "best_effort" => Some(Strategy::BestEffort),
                "race" => Some(Strategy::Race),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// §4.3: error if the child's `parent_state_id`/`workflow_exec_id` don't
    /// match the claimed parent.
    pub fn validate_parent_child(&self, parent: &State) -> Result<(), Error> {
        if self.parent_state_id.as_ref() != Some(&parent.task_exec_id) {
            return Err(Error::validation(format!(
                "state {} does not belong to parent {}",
                self.task_exec_id, parent.task_exec_id
            )));
        }
        if self.workflow_exec_id != parent.workflow_exec_id {
            return Err(Error::validation(format!(
                "state {} workflow_exec_id {} does not match parent's {}",
                self.task_exec_id, self.workflow_exec_id, parent.workflow_exec_id
            )));
        }
        Ok(())
    }

    /// Transition this state's status, enforcing §3 invariant (ii): no
    /// terminal → active transition.
    pub fn transition(&mut self, next: Status) -> Result<(), Error> {
        if !self.status.can_transition_to(next) {
            return Err(Error::strategy_violation(
                self.status.to_string(),
                next.to_string(),
            ));
        }
        self.status = next;
        self.updated_at = Some(Utc::now());
        Ok(())
    }

    /// §4.3 `UpdateSubtaskState`: append to `completed_tasks`/`failed_tasks`
    /// exactly once per child terminal transition.
    pub fn record_child_terminal(&mut self, child: &State) {
        let sub = self.parallel.get_or_insert_with(ParallelSubState::default);
        let already_recorded = sub.completed_tasks.contains(&child.task_exec_id)
            || sub.failed_tasks.contains(&child.task_exec_id);
        if already_recorded {
            return;
        }
        match child.status {
            Status::Success => sub.completed_tasks.push(child.task_exec_id.clone()),
            Status::Failed | Status::TimedOut | Status::Canceled => {
                sub.failed_tasks.push(child.task_exec_id.clone())
            }
            _ => {}
        }
    }

    /// Build the `ProgressInfo` view used by the strategy evaluator, from the
    /// recorded subtask counts plus the caller-supplied total/running/pending.
    pub fn progress_from_counts(&self, total: u32, running: u32, pending: u32) -> ProgressInfo {
        let sub = self.parallel.as_ref();
        let completed = sub.map(|s| s.completed_tasks.len() as u32).unwrap_or(0);
        let failed = sub.map(|s| s.failed_tasks.len() as u32).unwrap_or(0);
        ProgressInfo::new(total, completed, failed, running, pending)
    }
}
