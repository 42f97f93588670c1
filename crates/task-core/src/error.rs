//! Error taxonomy shared by every task crate.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("CEL compilation failed: {0}")]
    CompilationFailed(String),

    #[error("CEL cost {actual} exceeded limit {limit}")]
    CostExceeded { actual: u64, limit: u64 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient repository error: {0}")]
    Transient(String),

    #[error("parent lock timeout after {attempts} attempt(s)")]
    LockTimeout { attempts: u32 },

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("cycle detected in task graph: {0}")]
    CycleDetected(String),

    #[error("forbidden status transition: {from} -> {to}")]
    StrategyViolation { from: String, to: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationFailed(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn strategy_violation(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::StrategyViolation {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Whether retrying the operation that produced this error might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::LockTimeout { .. })
    }
}
