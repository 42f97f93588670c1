//! Cheaply-cloneable opaque identifiers.
//!
//! Each newtype wraps an `Arc<str>` so clones are a refcount bump, matching
//! how session/task identifiers are threaded through async handlers without
//! re-allocating on every clone.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

macro_rules! id_type {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(Arc::from(s.into()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::new(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }
    };
}

id_type!(TaskId, "Declarative task identifier from configuration.");
id_type!(TaskExecId, "Runtime instance identifier for one task execution.");
id_type!(WorkflowId, "Declarative workflow identifier from configuration.");
id_type!(
    WorkflowExecId,
    "Runtime instance identifier for one workflow execution."
);
