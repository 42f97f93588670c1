//! C8 — Wait/Signal Coordinator: §4.8's registration-by-name fan-out and
//! `SignalID` dedup, grounded on the teacher's `DashMap`-backed registries
//! (`SessionRegistry`, `SubagentRegistry`) generalized to a
//! `DashMap<(WorkflowExecId, signal name), Vec<WaitRegistration>>` plus a
//! per-registration dedup set of seen `SignalID`s.
//!
//! Processor transformation of the envelope (an agent/tool collaborator
//! call) is out of scope here; callers pass the already-transformed
//! payload that feeds the CEL condition.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use task_condition::{Bindings, ConditionEvaluator};
use task_core::{Error, TaskExecId, WorkflowExecId};
use tokio_util::sync::CancellationToken;

struct WaitRegistration {
    task_exec_id: TaskExecId,
    condition: Option<String>,
    seen_signal_ids: Mutex<HashSet<String>>,
}

#[derive(Default)]
pub struct SignalCoordinator {
    waits: dashmap::DashMap<(WorkflowExecId, String), Vec<Arc<WaitRegistration>>>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Delivery {
    /// This waiter had already seen this `SignalID`; no-op.
    Duplicate { task_exec_id: TaskExecId },
    /// Condition accepted; `payload` becomes the wait's output.
    Accepted {
        task_exec_id: TaskExecId,
        payload: serde_json::Value,
    },
    /// Condition evaluated false; the signal is recorded as seen but the
    /// wait stays pending.
    ConditionNotMet { task_exec_id: TaskExecId },
}

impl SignalCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a wait by `(workflow_exec_id, signal_name)`. Multiple
    /// waits may register for the same name (fan-out).
    pub fn register(
        &self,
        workflow_exec_id: WorkflowExecId,
        signal_name: impl Into<String>,
        task_exec_id: TaskExecId,
        condition: Option<String>,
    ) {
        let key = (workflow_exec_id, signal_name.into());
        let registration = Arc::new(WaitRegistration {
            task_exec_id,
            condition,
            seen_signal_ids: Mutex::new(HashSet::new()),
        });
        self.waits.entry(key).or_default().push(registration);
    }

    /// Removes a single wait's registration, e.g. once it transitions to a
    /// terminal status (success, or a timeout fired by the caller).
    pub fn unregister(
        &self,
        workflow_exec_id: &WorkflowExecId,
        signal_name: &str,
        task_exec_id: &TaskExecId,
    ) {
        let key = (workflow_exec_id.clone(), signal_name.to_string());
        if let Some(mut entry) = self.waits.get_mut(&key) {
            entry.retain(|r| &r.task_exec_id != task_exec_id);
        }
    }

    /// Delivers a signal to every registered waiter for `signal_name`,
    /// evaluating each waiter's own `condition` (if any) against the
    /// already-processor-transformed `payload`. `signal_id` is the dedup
    /// key scoped per-waiter.
    pub fn deliver(
        &self,
        evaluator: &ConditionEvaluator,
        cancel: &CancellationToken,
        workflow_exec_id: &WorkflowExecId,
        signal_name: &str,
        signal_id: &str,
        payload: serde_json::Value,
    ) -> Result<Vec<Delivery>, Error> {
        let key = (workflow_exec_id.clone(), signal_name.to_string());
        let Some(registrations) = self.waits.get(&key) else {
            return Ok(Vec::new());
        };

        let mut deliveries = Vec::with_capacity(registrations.len());
        for reg in registrations.iter() {
            let mut seen = reg.seen_signal_ids.lock().unwrap();
            if !seen.insert(signal_id.to_string()) {
                deliveries.push(Delivery::Duplicate {
                    task_exec_id: reg.task_exec_id.clone(),
                });
                continue;
            }
            drop(seen);

            let accepted = match &reg.condition {
                None => true,
                Some(expr) => {
                    let bindings = Bindings {
                        signal: payload.clone(),
                        ..Default::default()
                    };
                    evaluator.evaluate(cancel, expr, &bindings)?.result
                }
            };

            deliveries.push(if accepted {
                Delivery::Accepted {
                    task_exec_id: reg.task_exec_id.clone(),
                    payload: payload.clone(),
                }
            } else {
                Delivery::ConditionNotMet {
                    task_exec_id: reg.task_exec_id.clone(),
                }
            });
        }
        Ok(deliveries)
    }
}
