//! C6 — Response Handler: §4.6's per-type state machine, grounded on the
//! teacher's `ConsciousnessLoop` (`agenticlaw-agent::queue`) — one entry
//! point pattern-matching an incoming event and dispatching to per-type
//! handlers, generalized from "one conversation" to "one task-type family".

use std::time::Duration;

use task_condition::{Bindings, ConditionEvaluator};
use task_core::{
    Config, Error, ErrorTransition, RouterConfig, State, StateError, Status, SuccessTransition,
    TaskId,
};
use task_repository::Repository;
use tokio_util::sync::CancellationToken;

use crate::updater::{self, UpdaterConfig};

/// Raw outcome of a leaf (basic/signal) execution, handed to the response
/// handler by the collaborator activity runtime.
#[derive(Clone, Debug)]
pub enum TaskResult {
    Success(serde_json::Value),
    Failure(StateError),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResponseOutcome {
    pub next_task: Option<TaskId>,
    pub retry_scheduled: bool,
    pub retry_backoff: Option<Duration>,
}

/// **basic** / **signal** terminal handling: applies `OnError.RetryPolicy`
/// before ever marking the state (or its parent) terminal.
pub async fn handle_completion(
    repo: &dyn Repository,
    cfg: &Config,
    state: &mut State,
    result: TaskResult,
) -> Result<ResponseOutcome, Error> {
    if let TaskResult::Failure(ref err) = result {
        if let Some(outcome) = try_schedule_retry(repo, cfg, state, err).await? {
            return Ok(outcome);
        }
    }

    match result {
        TaskResult::Success(output) => {
            state.output = Some(output);
            state.transition(Status::Success)?;
        }
        TaskResult::Failure(err) => {
            state.error = Some(err);
            state.transition(Status::Failed)?;
        }
    }

    let next_task = finalize(repo, state, cfg.on_success.as_ref(), cfg.on_error.as_ref()).await?;
    Ok(ResponseOutcome {
        next_task,
        retry_scheduled: false,
        retry_backoff: None,
    })
}

async fn try_schedule_retry(
    repo: &dyn Repository,
    cfg: &Config,
    state: &mut State,
    err: &StateError,
) -> Result<Option<ResponseOutcome>, Error> {
    let Some(policy) = cfg.on_error.as_ref().and_then(|e| e.retry_policy.as_ref()) else {
        return Ok(None);
    };
    if state.retry.attempts >= policy.max_attempts {
        return Ok(None);
    }
    state.retry.attempts += 1;
    state.error = Some(err.clone());
    repo.upsert_state(state).await?;
    let backoff = policy.backoff_for_attempt(state.retry.attempts);
    Ok(Some(ResponseOutcome {
        next_task: None,
        retry_scheduled: true,
        retry_backoff: Some(backoff),
    }))
}

/// **wait**: signal accepted — transitions to `success` carrying the
/// (possibly processor-transformed) payload as output.
pub async fn handle_wait_accepted(
    repo: &dyn Repository,
    cfg: &Config,
    state: &mut State,
    payload: serde_json::Value,
) -> Result<ResponseOutcome, Error> {
    state.output = Some(payload);
    state.transition(Status::Success)?;
    let next_task = finalize(repo, state, cfg.on_success.as_ref(), cfg.on_error.as_ref()).await?;
    Ok(ResponseOutcome {
        next_task,
        retry_scheduled: false,
        retry_backoff: None,
    })
}

/// **wait**: idle timeout — §4.6 transitions this to `failed` with a
/// `TIMEOUT` error code (not the generic `timed_out` status).
pub async fn handle_wait_timeout(
    repo: &dyn Repository,
    cfg: &Config,
    state: &mut State,
) -> Result<ResponseOutcome, Error> {
    state.error = Some(StateError {
        code: "TIMEOUT".into(),
        message: format!("wait task {} timed out", state.task_id),
    });
    state.transition(Status::Failed)?;
    let next_task = finalize(repo, state, cfg.on_success.as_ref(), cfg.on_error.as_ref()).await?;
    Ok(ResponseOutcome {
        next_task,
        retry_scheduled: false,
        retry_backoff: None,
    })
}

/// **router**: the boolean `condition` selects between `"yes"`/`"no"` route
/// keys (scenario 5's `routes: {yes: ..., no: ...}` shape) — `RouterConfig`
/// carries no value-typed CEL result, only the boolean evaluator C1
/// provides, so the route keys are the condition's two possible outcomes
/// rather than an arbitrary CEL-computed string.
pub fn select_route(
    evaluator: &ConditionEvaluator,
    cancel: &CancellationToken,
    router: &RouterConfig,
    bindings: &Bindings,
) -> Result<TaskId, Error> {
    let outcome = evaluator.evaluate(cancel, &router.condition, bindings)?;
    let key = if outcome.result { "yes" } else { "no" };
    router
        .routes
        .get(key)
        .cloned()
        .ok_or_else(|| Error::validation(format!("router has no route for `{key}`")))
}

/// **router**: once its single dispatched child terminates, the router's
/// own status mirrors it.
pub async fn handle_router_child_terminal(
    repo: &dyn Repository,
    cfg: &Config,
    router: &mut State,
    child: &State,
) -> Result<ResponseOutcome, Error> {
    if !child.status.is_terminal() {
        return Ok(ResponseOutcome::default());
    }
    router.output = child.output.clone();
    if child.status != Status::Success {
        router.error = child.error.clone();
    }
    router.transition(child.status)?;
    let next_task = finalize(repo, router, cfg.on_success.as_ref(), cfg.on_error.as_ref()).await?;
    Ok(ResponseOutcome {
        next_task,
        retry_scheduled: false,
        retry_backoff: None,
    })
}

/// **parallel / collection / composite**: the child's own terminal
/// transition is already persisted by the caller; this drives C5 and, if
/// the immediate parent just became terminal itself, resolves its own
/// "next task" transition.
pub async fn handle_composite_child_terminal(
    repo: &dyn Repository,
    parent_cfg: &Config,
    child: &State,
) -> Result<ResponseOutcome, Error> {
    let updated_parent = updater::reconcile(repo, child, &UpdaterConfig::default()).await?;
    let Some(parent) = updated_parent else {
        return Ok(ResponseOutcome::default());
    };
    let next_task = match parent.status {
        Status::Success => parent_cfg.on_success.as_ref().and_then(|s| s.next.clone()),
        Status::Failed | Status::TimedOut | Status::Canceled => {
            parent_cfg.on_error.as_ref().and_then(|e| e.next.clone())
        }
        _ => None,
    };
    Ok(ResponseOutcome {
        next_task,
        retry_scheduled: false,
        retry_backoff: None,
    })
}

/// Persists `state` and, if it just reached a terminal status, cascades
/// into C5 before resolving the "next task" transition.
async fn finalize(
    repo: &dyn Repository,
    state: &mut State,
    on_success: Option<&SuccessTransition>,
    on_error: Option<&ErrorTransition>,
) -> Result<Option<TaskId>, Error> {
    repo.upsert_state(state).await?;
    if state.status.is_terminal() {
        updater::reconcile(repo, state, &UpdaterConfig::default()).await?;
    }
    Ok(match state.status {
        Status::Success => on_success.and_then(|s| s.next.clone()),
        Status::Failed | Status::TimedOut | Status::Canceled => {
            on_error.and_then(|e| e.next.clone())
        }
        _ => None,
    })
}
