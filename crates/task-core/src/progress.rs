//! §3 `ProgressInfo` — the ephemeral view recomputed on every parent
//! reconciliation. The strategy evaluation itself (C2) lives in
//! `task-engine::aggregator`, which consumes this type.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::state::Status;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProgressInfo {
    pub total_children: u32,
    pub completed_count: u32,
    pub failed_count: u32,
    pub running_count: u32,
    pub pending_count: u32,
    pub status_counts: HashMap<String, u32>,
}

impl ProgressInfo {
    pub fn new(total: u32, completed: u32, failed: u32, running: u32, pending: u32) -> Self {
        let mut status_counts = HashMap::new();
        status_counts.insert(Status::Success.to_string(), completed);
        status_counts.insert(Status::Failed.to_string(), failed);
        status_counts.insert(Status::Running.to_string(), running);
        status_counts.insert(Status::Pending.to_string(), pending);
        Self {
            total_children: total,
            completed_count: completed,
            failed_count: failed,
            running_count: running,
            pending_count: pending,
            status_counts,
        }
    }

    pub fn completion_rate(&self) -> f64 {
        if self.total_children == 0 {
            0.0
        } else {
            self.completed_count as f64 / self.total_children as f64
        }
    }

    pub fn failure_rate(&self) -> f64 {
        if self.total_children == 0 {
            0.0
        } else {
            self.failed_count as f64 / self.total_children as f64
        }
    }

    /// §3 invariant: `Completed+Failed+Running+Pending == Total`.
    pub fn is_consistent(&self) -> bool {
        self.completed_count + self.failed_count + self.running_count + self.pending_count
            == self.total_children
    }
}
