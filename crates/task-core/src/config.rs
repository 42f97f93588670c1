//! Declarative task configuration — §3/§4.4/§6.3 of the task execution spec.
//!
//! `Config` is parsed once at load time and is thereafter immutable for a
//! given execution (it may be re-resolved per invocation via `Merge`).
//! Parsing and validation live in `task-config`; this crate only defines the
//! shape.

use crate::duration::HumanDuration;
use crate::ids::TaskId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Basic,
    Router,
    Parallel,
    Collection,
    Composite,
    Wait,
    Signal,
    Aggregate,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    WaitAll,
    FailFast,
    BestEffort,
    Race,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CollectionMode {
    #[default]
    Parallel,
    Sequential,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(default = "RetryPolicy::default_backoff_initial")]
    pub backoff_initial: HumanDuration,
    #[serde(default = "RetryPolicy::default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "RetryPolicy::default_backoff_max")]
    pub backoff_max: HumanDuration,
}

impl RetryPolicy {
    fn default_backoff_initial() -> HumanDuration {
        HumanDuration::parse("1s").unwrap()
    }

    fn default_backoff_factor() -> f64 {
        2.0
    }

    fn default_backoff_max() -> HumanDuration {
        HumanDuration::parse("1m").unwrap()
    }

    /// `min(BackoffInitial × BackoffFactor^attempts, BackoffMax)` per §4.6.
    pub fn backoff_for_attempt(&self, attempts: u32) -> std::time::Duration {
        let scaled =
            self.backoff_initial.as_duration().as_secs_f64() * self.backoff_factor.powi(attempts as i32);
        let capped = scaled.min(self.backoff_max.as_duration().as_secs_f64());
        std::time::Duration::from_secs_f64(capped.max(0.0))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct SuccessTransition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<TaskId>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct ErrorTransition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BasicConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RouterConfig {
    pub condition: String,
    pub routes: HashMap<String, TaskId>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ParallelConfig {
    pub tasks: Vec<Config>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CollectionConfig {
    pub items: String,
    pub task: Box<Config>,
    #[serde(default)]
    pub mode: CollectionMode,
    #[serde(default = "CollectionConfig::default_batch")]
    pub batch: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_condition: Option<String>,
    #[serde(default = "CollectionConfig::default_item_var")]
    pub item_var: String,
    #[serde(default = "CollectionConfig::default_index_var")]
    pub index_var: String,
    #[serde(default)]
    pub continue_on_error: bool,
}

impl CollectionConfig {
    fn default_batch() -> u32 {
        1
    }
    fn default_item_var() -> String {
        "item".to_string()
    }
    fn default_index_var() -> String {
        "index".to_string()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CompositeConfig {
    pub tasks: Vec<Config>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WaitConfig {
    pub signal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SignalConfig {
    pub signal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AggregateConfig {
    /// Output key -> source expression, evaluated against completed children.
    pub outputs: HashMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskBody {
    Basic(BasicConfig),
    Router(RouterConfig),
    Parallel(ParallelConfig),
    Collection(CollectionConfig),
    Composite(CompositeConfig),
    Wait(WaitConfig),
    Signal(SignalConfig),
    Aggregate(AggregateConfig),
}

impl TaskBody {
    pub fn task_type(&self) -> TaskType {
        match self {
            Self::Basic(_) => TaskType::Basic,
            Self::Router(_) => TaskType::Router,
            Self::Parallel(_) => TaskType::Parallel,
            Self::Collection(_) => TaskType::Collection,
            Self::Composite(_) => TaskType::Composite,
            Self::Wait(_) => TaskType::Wait,
            Self::Signal(_) => TaskType::Signal,
            Self::Aggregate(_) => TaskType::Aggregate,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub id: TaskId,
    #[serde(flatten)]
    pub body: TaskBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success: Option<SuccessTransition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error: Option<ErrorTransition>,
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<u32>,
    #[serde(default)]
    pub timeout: HumanDuration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub with: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub r#final: bool,
}

impl Config {
    pub fn task_type(&self) -> TaskType {
        self.body.task_type()
    }

    /// Direct subtask templates, for types that declare them (parallel,
    /// composite, collection, router via its route targets are not
    /// substructures — only parallel/composite/collection nest Config).
    pub fn subtasks(&self) -> Vec<&Config> {
        match &self.body {
            TaskBody::Parallel(p) => p.tasks.iter().collect(),
            TaskBody::Composite(c) => c.tasks.iter().collect(),
            TaskBody::Collection(c) => vec![c.task.as_ref()],
            _ => Vec::new(),
        }
    }

    /// Field-wise overlay: non-default fields in `other` win. Used to apply
    /// per-invocation overrides onto a shared template.
    pub fn merge(&self, other: &ConfigOverrides) -> Config {
        let mut merged = self.clone();
        if let Some(strategy) = other.strategy {
            merged.strategy = strategy;
        }
        if let Some(max_workers) = other.max_workers {
            merged.max_workers = Some(max_workers);
        }
        if let Some(timeout) = other.timeout {
            merged.timeout = timeout;
        }
        for (k, v) in &other.with {
            merged.with.insert(k.clone(), v.clone());
        }
        for (k, v) in &other.env {
            merged.env.insert(k.clone(), v.clone());
        }
        merged
    }
}

/// Sparse per-invocation overrides applied via `Config::merge`.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub strategy: Option<Strategy>,
    pub max_workers: Option<u32>,
    pub timeout: Option<HumanDuration>,
    pub with: serde_json::Map<String, serde_json::Value>,
    pub env: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic(id: &str) -> Config {
        Config {
            id: TaskId::new(id),
            body: TaskBody::Basic(BasicConfig {
                agent: Some("writer".into()),
                tool: None,
                action: None,
            }),
            on_success: None,
            on_error: None,
            strategy: Strategy::WaitAll,
            max_workers: None,
            timeout: HumanDuration::ZERO,
            input_schema: None,
            output_schema: None,
            with: Default::default(),
            env: Default::default(),
            r#final: false,
        }
    }

    #[test]
    fn merge_overlays_non_default_fields_only() {
        let base = basic("fetch");
        let overrides = ConfigOverrides {
            strategy: Some(Strategy::FailFast),
            ..Default::default()
        };
        let merged = base.merge(&overrides);
        assert_eq!(merged.strategy, Strategy::FailFast);
        assert_eq!(merged.max_workers, None);
    }

    #[test]
    fn retry_backoff_is_monotonic_and_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            backoff_initial: HumanDuration::parse("1s").unwrap(),
            backoff_factor: 2.0,
            backoff_max: HumanDuration::parse("10s").unwrap(),
        };
        let b0 = policy.backoff_for_attempt(0);
        let b1 = policy.backoff_for_attempt(1);
        let b5 = policy.backoff_for_attempt(5);
        assert!(b1 > b0);
        assert_eq!(b5, std::time::Duration::from_secs(10));
    }

    #[test]
    fn config_round_trips_through_json() {
        let cfg = basic("fetch");
        let json = serde_json::to_string(&cfg).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }

    #[test]
    fn subtasks_collects_collection_template() {
        let cfg = Config {
            body: TaskBody::Collection(CollectionConfig {
                items: "{{ .input.rows }}".into(),
                task: Box::new(basic("process-row")),
                mode: CollectionMode::Parallel,
                batch: 1,
                filter: None,
                stop_condition: None,
                item_var: "item".into(),
                index_var: "index".into(),
                continue_on_error: true,
            }),
            ..basic("collect")
        };
        assert_eq!(cfg.subtasks().len(), 1);
    }
}
