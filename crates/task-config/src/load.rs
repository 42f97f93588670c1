//! §4.4 `Load`/`LoadAndEval` operations.

use std::path::Path;

use task_condition::ConditionEvaluator;
use task_core::{Config, Error};

use crate::{defaults, validate};

/// Parses `path` as YAML, applies the defaults table, and runs the composed
/// validators. Does not resolve embedded CEL expressions — use
/// `load_and_eval` for that.
pub fn load(cwd: &Path, path: &Path) -> Result<Config, Error> {
    if cwd.as_os_str().is_empty() {
        return Err(Error::validation("working directory must be set"));
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::NotFound(format!("{}: {e}", path.display())))?;
    let mut cfg: Config =
        serde_yaml::from_str(&raw).map_err(|e| Error::validation(e.to_string()))?;
    defaults::apply(&mut cfg);
    validate::validate(&cfg, cwd)?;
    Ok(cfg)
}

/// `Load` plus compiling every embedded CEL expression against `evaluator`,
/// so a malformed router/wait/collection condition fails at load time
/// rather than at first dispatch.
pub fn load_and_eval(
    cwd: &Path,
    path: &Path,
    evaluator: &ConditionEvaluator,
) -> Result<Config, Error> {
    let cfg = load(cwd, path)?;
    validate::validate_expressions(&cfg, evaluator)?;
    Ok(cfg)
}
