//! Workflow Errors
//!
//! Every failure that can end a run, plus the definition-time errors
//! raised while loading and registering workflows. All run errors are
//! terminal: the engine never retries or compensates.

use thiserror::Error;

use crate::execution::deferred::Abandoned;

/// Boxed error type used by actions and async handles.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while loading, registering or running workflows.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// No activity model is registered under the requested name.
    #[error("Unknown workflow: '{0}'")]
    UnknownWorkflow(String),

    /// The resolver could not produce an action for a step.
    #[error("Workflow '{workflow}': cannot resolve action '{action}': {source}")]
    UnresolvedAction {
        workflow: String,
        action: String,
        #[source]
        source: BoxError,
    },

    /// An action failed while computing its result.
    #[error("Workflow '{workflow}': activity '{activity}' failed: {source}")]
    ActionExecution {
        workflow: String,
        activity: String,
        #[source]
        source: BoxError,
    },

    /// An async handle returned by an action resolved with a failure.
    #[error("Workflow '{workflow}': async activity '{activity}' failed: {source}")]
    AsyncAction {
        workflow: String,
        activity: String,
        #[source]
        source: BoxError,
    },

    /// A switch value matched no branch and no default branch exists.
    #[error("Workflow '{workflow}': switch '{condition}' evaluated to '{value}' which matches no branch and has no default")]
    UnmatchedCondition {
        workflow: String,
        condition: String,
        value: String,
    },

    /// A suspended run was dropped because the pending value it waited on
    /// was abandoned.
    #[error("Workflow run was abandoned: {0}")]
    Abandoned(#[from] Abandoned),

    /// A workflow definition violates the activity model invariants.
    #[error("Invalid workflow definition: {0}")]
    InvalidDefinition(String),

    /// A workflow with the same name is already registered.
    #[error("Workflow '{0}' is already registered")]
    DuplicateWorkflow(String),

    #[error("Failed to read workflow definitions: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse workflow definitions: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_workflow_message() {
        let err = WorkflowError::UnknownWorkflow("missing".to_string());
        assert_eq!(err.to_string(), "Unknown workflow: 'missing'");
    }

    #[test]
    fn test_action_execution_keeps_source() {
        use std::error::Error;

        let err = WorkflowError::ActionExecution {
            workflow: "wf".to_string(),
            activity: "append".to_string(),
            source: "boom".into(),
        };

        assert!(err.to_string().contains("activity 'append' failed: boom"));
        assert_eq!(err.source().map(|s| s.to_string()), Some("boom".to_string()));
    }

    #[test]
    fn test_unmatched_condition_message() {
        let err = WorkflowError::UnmatchedCondition {
            workflow: "wf".to_string(),
            condition: "output.kind".to_string(),
            value: "z".to_string(),
        };
        assert!(err.to_string().contains("'output.kind' evaluated to 'z'"));
    }

    #[test]
    fn test_abandoned_message() {
        let err = WorkflowError::from(Abandoned);
        assert!(err.to_string().starts_with("Workflow run was abandoned"));
    }
}
