//! `ConditionEvaluator` — §4.1's `Validate`/`Evaluate` over a compiled-
//! program cache, with cost limiting and cancellation-before-compile.

use std::sync::Arc;

use cel_interpreter::{Context, ExecutionError, Program, Value};
use quick_cache::sync::Cache;
use task_core::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::ConditionEvaluatorConfig;

/// Ambient variable environment, §4.1: `signal`, `processor`, `task`,
/// `workflow`, `payload`, `headers`, `query`, each an opaque JSON map.
#[derive(Clone, Debug, Default)]
pub struct Bindings {
    pub signal: serde_json::Value,
    pub processor: serde_json::Value,
    pub task: serde_json::Value,
    pub workflow: serde_json::Value,
    pub payload: serde_json::Value,
    pub headers: serde_json::Value,
    pub query: serde_json::Value,
}

/// Result of a successful `Evaluate`: the boolean outcome plus the cost
/// actually incurred, for callers that want to surface it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EvalOutcome {
    pub result: bool,
    pub cost: u64,
}

pub struct ConditionEvaluator {
    config: ConditionEvaluatorConfig,
    cache: Cache<String, Arc<Program>>,
}

impl ConditionEvaluator {
    pub fn new(config: ConditionEvaluatorConfig) -> Self {
        let cache = Cache::new(config.cache_size.max(1));
        Self { config, cache }
    }

    /// §4.1: trim + collapse internal whitespace, the compile-cache key.
    fn normalize(expression: &str) -> String {
        expression.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn compile(&self, normalized: &str) -> Result<Arc<Program>, Error> {
        if let Some(hit) = self.cache.get(normalized) {
            return Ok(hit);
        }
        // The underlying ANTLR-generated parser panics on some malformed
        // inputs instead of returning a parse error; catch it so a bad
        // expression surfaces as CompilationFailed rather than aborting the
        // caller's task.
        let compiled = std::panic::catch_unwind(|| Program::compile(normalized));
        let program = match compiled {
            Ok(Ok(program)) => program,
            Ok(Err(e)) => return Err(Error::CompilationFailed(e.to_string())),
            Err(_) => {
                return Err(Error::CompilationFailed(format!(
                    "unparseable expression `{normalized}`"
                )))
            }
        };
        let program = Arc::new(program);
        self.cache.insert(normalized.to_string(), program.clone());
        Ok(program)
    }

    /// §4.1 `Validate`: error if the expression fails to compile. An empty
    /// or whitespace expression is always valid (it short-circuits to
    /// `true` at evaluation time and is never compiled).
    pub fn validate(&self, expression: &str) -> Result<(), Error> {
        let normalized = Self::normalize(expression);
        if normalized.is_empty() {
            return Ok(());
        }
        self.compile(&normalized).map(|_| ())
    }

    /// §4.1 `Evaluate`. Cancellation is checked before compilation; during
    /// evaluation it is checked again immediately after, since
    /// `cel-interpreter` runs synchronously to completion and offers no
    /// mid-evaluation checkpoint to cooperate with.
    pub fn evaluate(
        &self,
        cancel: &CancellationToken,
        expression: &str,
        bindings: &Bindings,
    ) -> Result<EvalOutcome, Error> {
        if cancel.is_cancelled() {
            return Err(Error::Timeout("evaluation canceled before compile".into()));
        }

        let normalized = Self::normalize(expression);
        if normalized.is_empty() {
            return Ok(EvalOutcome {
                result: true,
                cost: 0,
            });
        }

        let program = self.compile(&normalized)?;

        if cancel.is_cancelled() {
            return Err(Error::Timeout("evaluation canceled after compile".into()));
        }

        let cost = estimate_cost(&normalized);
        if cost > self.config.cost_limit {
            return Err(Error::CostExceeded {
                actual: cost,
                limit: self.config.cost_limit,
            });
        }
        if cost * 100 > self.config.cost_limit * 80 {
            warn!(
                cost,
                limit = self.config.cost_limit,
                ratio = cost as f64 / self.config.cost_limit as f64,
                "CEL evaluation cost nearing configured limit"
            );
        }

        let mut ctx = Context::default();
        bind(&mut ctx, "signal", &bindings.signal);
        bind(&mut ctx, "processor", &bindings.processor);
        bind(&mut ctx, "task", &bindings.task);
        bind(&mut ctx, "workflow", &bindings.workflow);
        bind(&mut ctx, "payload", &bindings.payload);
        bind(&mut ctx, "headers", &bindings.headers);
        bind(&mut ctx, "query", &bindings.query);

        if cancel.is_cancelled() {
            return Err(Error::Timeout(
                "evaluation canceled before execution".into(),
            ));
        }

        let value = program.execute(&ctx).map_err(|e| map_execution_error(&normalized, e))?;
        match value {
            Value::Bool(b) => Ok(EvalOutcome { result: b, cost }),
            other => Err(Error::ValidationFailed(format!(
                "expression `{normalized}` evaluated to non-boolean type {:?}",
                other
            ))),
        }
    }
}

fn bind(ctx: &mut Context, name: &str, value: &serde_json::Value) {
    let cel_value = json_to_cel(value);
    ctx.add_variable_from_value(name, cel_value);
}

fn json_to_cel(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or_default())
            }
        }
        serde_json::Value::String(s) => Value::String(Arc::new(s.clone())),
        serde_json::Value::Array(items) => {
            Value::List(Arc::new(items.iter().map(json_to_cel).collect()))
        }
        serde_json::Value::Object(map) => {
            let entries = map
                .iter()
                .map(|(k, v)| (cel_interpreter::objects::Key::from(k.clone()), json_to_cel(v)))
                .collect();
            Value::Map(cel_interpreter::objects::Map {
                map: Arc::new(entries),
            })
        }
    }
}

/// Hand-rolled static cost estimate: `cel-interpreter` has no CEL-go-style
/// instrumented evaluation, so cost is derived from the normalized
/// expression's lexical complexity (operators, dotted accesses, calls)
/// rather than a true per-evaluation step count. Documented as a deviation
/// in DESIGN.md.
fn estimate_cost(normalized: &str) -> u64 {
    let operator_chars = normalized
        .chars()
        .filter(|c| matches!(c, '.' | '(' | '[' | '&' | '|' | '=' | '<' | '>' | '!' | '+' | '-' | '*' | '/' | '%'))
        .count();
    1 + operator_chars as u64
}

fn map_execution_error(normalized: &str, err: ExecutionError) -> Error {
    match err {
        ExecutionError::NoSuchKey(key) => {
            Error::ValidationFailed(format!("no such key: {key} in `{normalized}`"))
        }
        ExecutionError::UndeclaredReference(name) => {
            Error::ValidationFailed(format!("no such key: {name} in `{normalized}`"))
        }
        other => Error::ValidationFailed(format!("no such overload in `{normalized}`: {other}")),
    }
}
