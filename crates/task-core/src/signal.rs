//! §6.4 signal envelope wire format, consumed by wait tasks (C8).

use crate::ids::WorkflowId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SignalMetadata {
    pub signal_id: String,
    pub received_at_utc: DateTime<Utc>,
    pub workflow_id: WorkflowId,
    pub source: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SignalEnvelope {
    pub payload: serde_json::Map<String, serde_json::Value>,
    pub metadata: SignalMetadata,
}

impl SignalEnvelope {
    pub fn new(
        signal_id: impl Into<String>,
        workflow_id: WorkflowId,
        source: impl Into<String>,
        payload: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            payload,
            metadata: SignalMetadata {
                signal_id: signal_id.into(),
                received_at_utc: Utc::now(),
                workflow_id,
                source: source.into(),
            },
        }
    }
}
