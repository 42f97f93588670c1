//! §4.4 composed validators: working-directory presence, type-specific
//! shape, cycle detection, numeric bounds, and (via `validate_expressions`)
//! embedded CEL expression compilation.

use std::path::Path;

use task_condition::ConditionEvaluator;
use task_core::{Config, Error, TaskBody};

use crate::cycle;
use crate::defaults::{BATCH_MAX, BATCH_MIN, MAX_WORKERS_MAX, MAX_WORKERS_MIN};

/// Runs every composed validator over `cfg`, in the order spec.md §4.4
/// lists them. `cwd` presence is checked first since everything downstream
/// assumes a resolved working directory.
pub fn validate(cfg: &Config, cwd: &Path) -> Result<(), Error> {
    if cwd.as_os_str().is_empty() {
        return Err(Error::validation("working directory must be set"));
    }
    validate_shape(cfg)?;
    cycle::detect(cfg)?;
    validate_bounds(cfg)?;
    Ok(())
}

/// Walks the config tree validating embedded CEL expressions (router
/// condition, wait condition, collection filter/stop-condition) compile in
/// the ambient environment. Input/output template rendering itself is an
/// external collaborator's concern (spec.md §1 Non-goals); this only
/// checks the expressions compile.
pub fn validate_expressions(cfg: &Config, evaluator: &ConditionEvaluator) -> Result<(), Error> {
    match &cfg.body {
        TaskBody::Router(r) => evaluator.validate(&r.condition)?,
        TaskBody::Wait(w) => {
            if let Some(cond) = &w.condition {
                evaluator.validate(cond)?;
            }
        }
        TaskBody::Collection(c) => {
            if let Some(filter) = &c.filter {
                evaluator.validate(filter)?;
            }
            if let Some(stop) = &c.stop_condition {
                evaluator.validate(stop)?;
            }
        }
        _ => {}
    }
    for child in cfg.subtasks() {
        validate_expressions(child, evaluator)?;
    }
    Ok(())
}

fn validate_shape(cfg: &Config) -> Result<(), Error> {
    match &cfg.body {
        TaskBody::Basic(b) => {
            if b.agent.is_some() == b.tool.is_some() {
                return Err(Error::validation(format!(
                    "task {}: basic requires exactly one of agent or tool",
                    cfg.id
                )));
            }
        }
        TaskBody::Router(r) => {
            if r.condition.trim().is_empty() {
                return Err(Error::validation(format!(
                    "task {}: router requires a non-empty condition",
                    cfg.id
                )));
            }
            if r.routes.is_empty() {
                return Err(Error::validation(format!(
                    "task {}: router requires a non-empty routes map",
                    cfg.id
                )));
            }
        }
        TaskBody::Parallel(p) => {
            if p.tasks.is_empty() {
                return Err(Error::validation(format!(
                    "task {}: parallel requires a non-empty tasks list",
                    cfg.id
                )));
            }
            for child in &p.tasks {
                validate_shape(child)?;
            }
        }
        TaskBody::Composite(c) => {
            if c.tasks.is_empty() {
                return Err(Error::validation(format!(
                    "task {}: composite requires a non-empty tasks list",
                    cfg.id
                )));
            }
            for child in &c.tasks {
                validate_shape(child)?;
            }
        }
        TaskBody::Collection(c) => {
            if c.items.trim().is_empty() {
                return Err(Error::validation(format!(
                    "task {}: collection requires a non-empty items template",
                    cfg.id
                )));
            }
            if c.item_var == c.index_var {
                return Err(Error::validation(format!(
                    "task {}: collection item_var and index_var must differ",
                    cfg.id
                )));
            }
            validate_shape(&c.task)?;
        }
        TaskBody::Wait(w) => {
            if w.signal.trim().is_empty() {
                return Err(Error::validation(format!(
                    "task {}: wait requires a non-empty signal name",
                    cfg.id
                )));
            }
        }
        TaskBody::Signal(s) => {
            if s.signal.trim().is_empty() {
                return Err(Error::validation(format!(
                    "task {}: signal requires a non-empty signal name",
                    cfg.id
                )));
            }
        }
        TaskBody::Aggregate(a) => {
            if a.outputs.is_empty() {
                return Err(Error::validation(format!(
                    "task {}: aggregate requires a non-empty outputs map",
                    cfg.id
                )));
            }
        }
    }
    Ok(())
}

fn validate_bounds(cfg: &Config) -> Result<(), Error> {
    if let Some(max_workers) = cfg.max_workers {
        if !(MAX_WORKERS_MIN..=MAX_WORKERS_MAX).contains(&max_workers) {
            return Err(Error::validation(format!(
                "task {}: max_workers {max_workers} out of range [{MAX_WORKERS_MIN}, {MAX_WORKERS_MAX}]",
                cfg.id
            )));
        }
    }
    if let TaskBody::Collection(c) = &cfg.body {
        if !(BATCH_MIN..=BATCH_MAX).contains(&c.batch) {
            return Err(Error::validation(format!(
                "task {}: batch {} out of range [{BATCH_MIN}, {BATCH_MAX}]",
                cfg.id, c.batch
            )));
        }
    }
    for child in cfg.subtasks() {
        validate_bounds(child)?;
    }
    Ok(())
}
