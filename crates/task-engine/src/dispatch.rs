//! C7 — Execution Dispatch: §4.7's per-type table, grounded on the
//! teacher's `SubagentRegistry` (`agenticlaw-agent::subagent`) — parent/
//! children tracked by id with a status enum and a `parent: Option<Id>` /
//! `children: Vec<Id>` shape is exactly §3's `ParentStateID`-addressed
//! hierarchy, generalized from "name-hashed subagents" to "per-type child
//! `State` construction".
//!
//! Template rendering of `items`/`with` and agent/tool invocation are
//! external-collaborator concerns (spec Non-goals); callers pass already-
//! resolved values in (a concrete items array, a selected route target).
//! The dispatcher never persists children — it only builds them for the
//! collaborator's `CreateChildStatesInTransaction` call.

use task_condition::{Bindings, ConditionEvaluator};
use task_core::{
    CollectionConfig, CollectionMode, Component, Config, Error, ParallelConfig, State, TaskId,
    TaskType,
};
use task_config::defaults::MAX_COLLECTION_ITEMS;
use tokio_util::sync::CancellationToken;

fn new_child(parent: &State, task_id: TaskId, task_exec_id: &str, task_type: TaskType) -> State {
    State::new_pending(
        Component::Task,
        task_id,
        task_core::TaskExecId::new(task_exec_id),
        parent.workflow_id.clone(),
        parent.workflow_exec_id.clone(),
        task_type,
        Some(parent.task_exec_id.clone()),
    )
}

/// basic / signal: leaves create no children of their own.
pub fn dispatch_basic() -> Vec<State> {
    Vec::new()
}

pub fn dispatch_signal() -> Vec<State> {
    Vec::new()
}

/// router: a single child of the already-selected route's target config.
pub fn dispatch_router(parent: &State, target: &Config) -> State {
    let task_exec_id = format!("{}::{}", parent.task_exec_id, target.id);
    new_child(parent, target.id.clone(), &task_exec_id, target.task_type())
}

/// parallel: one pending child per configured task, unbounded here —
/// `MaxWorkers` governs concurrent execution, a collaborator-dispatcher
/// concern (§5), not how many `State`s exist.
pub fn dispatch_parallel(parent: &State, cfg: &ParallelConfig) -> Vec<State> {
    cfg.tasks
        .iter()
        .map(|task| {
            let task_exec_id = format!("{}::{}", parent.task_exec_id, task.id);
            new_child(parent, task.id.clone(), &task_exec_id, task.task_type())
        })
        .collect()
}

/// composite: one synthetic nested child of type `parallel` wrapping the
/// composite's own subtasks, plus that synthetic parent's own children.
pub fn dispatch_composite(parent: &State, tasks: &[Config]) -> (State, Vec<State>) {
    let synthetic_id = TaskId::new(format!("{}::__parallel", parent.task_id));
    let synthetic_exec_id = format!("{}::__parallel", parent.task_exec_id);
    let synthetic = new_child(
        parent,
        synthetic_id,
        &synthetic_exec_id,
        TaskType::Parallel,
    );
    let children = dispatch_parallel(&synthetic, &ParallelConfig { tasks: tasks.to_vec() });
    (synthetic, children)
}

/// collection: applies the optional `filter` CEL expression against each
/// item (bound as `payload`), keeping evaluation order and capping at
/// `MAX_COLLECTION_ITEMS`.
pub fn filter_items(
    evaluator: &ConditionEvaluator,
    cancel: &CancellationToken,
    filter: Option<&str>,
    items: &[serde_json::Value],
) -> Result<Vec<serde_json::Value>, Error> {
    let capped = if items.len() > MAX_COLLECTION_ITEMS {
        &items[..MAX_COLLECTION_ITEMS]
    } else {
        items
    };
    let Some(filter_expr) = filter else {
        return Ok(capped.to_vec());
    };
    let mut kept = Vec::new();
    for item in capped {
        let bindings = Bindings {
            payload: item.clone(),
            ..Default::default()
        };
        let outcome = evaluator.evaluate(cancel, filter_expr, &bindings)?;
        if outcome.result {
            kept.push(item.clone());
        }
    }
    Ok(kept)
}

/// Builds one wave of collection children starting at `start_index`:
/// the whole (filtered) array for parallel mode, or `Batch`-sized waves
/// for sequential mode. Binds `ItemVar`/`IndexVar` into each child's input.
pub fn dispatch_collection_wave(
    parent: &State,
    cfg: &CollectionConfig,
    items: &[serde_json::Value],
    start_index: usize,
) -> Vec<State> {
    let wave_size = match cfg.mode {
        CollectionMode::Parallel => items.len(),
        CollectionMode::Sequential => cfg.batch as usize,
    };
    items
        .iter()
        .enumerate()
        .skip(start_index)
        .take(wave_size)
        .map(|(index, item)| {
            let task_exec_id = format!("{}::{}::{index}", parent.task_exec_id, cfg.task.id);
            let mut child = new_child(
                parent,
                cfg.task.id.clone(),
                &task_exec_id,
                cfg.task.task_type(),
            );
            child.input.insert(cfg.item_var.clone(), item.clone());
            child
                .input
                .insert(cfg.index_var.clone(), serde_json::json!(index));
            child
        })
        .collect()
}

/// Evaluates the collection's `stop_condition` (if any) against the
/// children produced so far, binding them under `task`. Sequential-mode
/// callers check this between waves.
pub fn should_stop_collection(
    evaluator: &ConditionEvaluator,
    cancel: &CancellationToken,
    cfg: &CollectionConfig,
    produced_so_far: &[State],
) -> Result<bool, Error> {
    let Some(stop_expr) = &cfg.stop_condition else {
        return Ok(false);
    };
    let bindings = Bindings {
        task: serde_json::json!(produced_so_far
            .iter()
            .map(|s| serde_json::json!({
                "task_id": s.task_id.as_str(),
                "status": s.status.to_string(),
            }))
            .collect::<Vec<_>>()),
        ..Default::default()
    };
    let outcome = evaluator.evaluate(cancel, stop_expr, &bindings)?;
    Ok(outcome.result)
}
