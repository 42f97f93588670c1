//! C1 — the CEL condition evaluator: compiled-program cache, cost limiting,
//! and cancellation, per §4.1.

pub mod config;
pub mod evaluator;

pub use config::ConditionEvaluatorConfig;
pub use evaluator::{Bindings, ConditionEvaluator, EvalOutcome};
