//! Ambient config for the evaluator, loaded the same way as other
//! `task-config` structures (§4.1's cache size / cost limit knobs).

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConditionEvaluatorConfig {
    pub cache_size: usize,
    pub cost_limit: u64,
}

impl Default for ConditionEvaluatorConfig {
    fn default() -> Self {
        Self {
            cache_size: 100,
            cost_limit: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let c = ConditionEvaluatorConfig::default();
        assert_eq!(c.cache_size, 100);
        assert_eq!(c.cost_limit, 1000);
    }
}
