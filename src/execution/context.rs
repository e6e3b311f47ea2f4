//! Execution Context
//!
//! Caller-owned, run-scoped state threaded through every activity of a
//! run. The engine never inspects it beyond handing it to actions and
//! expressions.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value;

/// Run-scoped context passed to every action of a workflow run.
///
/// Contexts must be shareable across threads because a run may resume on
/// whichever thread completes an async activity.
pub trait ExecutionContext: Send + Sync {
    /// Name of the workflow this context was created for.
    fn workflow_name(&self) -> &str;

    /// Reads a named attribute shared between activities.
    fn attribute(&self, _key: &str) -> Option<Value> {
        None
    }

    /// Stores a named attribute shared between activities.
    ///
    /// The default implementation ignores writes.
    fn set_attribute(&self, _key: &str, _value: Value) {}
}

/// Context carrying the workflow name and a map of attributes.
#[derive(Debug, Default)]
pub struct DefaultExecutionContext {
    workflow_name: String,
    attributes: RwLock<HashMap<String, Value>>,
}

impl DefaultExecutionContext {
    /// Creates a context for the named workflow.
    pub fn new(workflow_name: impl Into<String>) -> Self {
        Self {
            workflow_name: workflow_name.into(),
            attributes: RwLock::new(HashMap::new()),
        }
    }

    /// Seeds an attribute before the run starts.
    pub fn with_attribute(self, key: impl Into<String>, value: Value) -> Self {
        self.set_attribute(&key.into(), value);
        self
    }

    /// Returns a snapshot of all attributes.
    pub fn attributes(&self) -> HashMap<String, Value> {
        self.attributes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ExecutionContext for DefaultExecutionContext {
    fn workflow_name(&self) -> &str {
        &self.workflow_name
    }

    fn attribute(&self, key: &str) -> Option<Value> {
        self.attributes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    fn set_attribute(&self, key: &str, value: Value) {
        self.attributes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.to_string(), value);
    }
}
