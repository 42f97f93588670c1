//! Task execution core — shared types, error taxonomy, and invariants.
//!
//! No I/O lives here: configuration shape, runtime state, progress views,
//! and the signal wire format only.

pub mod config;
pub mod duration;
pub mod error;
pub mod ids;
pub mod progress;
pub mod signal;
pub mod state;

pub use config::{
    AggregateConfig, BasicConfig, CollectionConfig, CollectionMode, CompositeConfig, Config,
    ConfigOverrides, ErrorTransition, ParallelConfig, RetryPolicy, RouterConfig, SignalConfig,
    Strategy, SuccessTransition, TaskBody, TaskType, WaitConfig,
};
pub use duration::HumanDuration;
pub use error::{Error, Result};
pub use ids::{TaskExecId, TaskId, WorkflowExecId, WorkflowId};
pub use progress::ProgressInfo;
pub use signal::{SignalEnvelope, SignalMetadata};
pub use state::{Component, ParallelSubState, State, StateError, Status};
