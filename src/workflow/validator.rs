//! Workflow Validation
//!
//! Checks that an activity model satisfies the invariants the engine
//! relies on:
//! - The workflow has a name and at least one activity
//! - Every action step names an action
//! - Every switch can select something (a `when` entry or a `default`)
//! - Workflow names are unique within a definition set

use std::collections::HashSet;

use log::{debug, info, warn};

use super::model::{ActivityModel, ActivityStep};
use crate::error::WorkflowError;

/// Validation error types for user-friendly error messages.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyWorkflowName,
    EmptyWorkflow(String),
    EmptyActionId { workflow: String, path: String },
    SwitchWithoutBranches { workflow: String, path: String },
    DuplicateWorkflow(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyWorkflowName => write!(f, "Workflow has empty or whitespace-only name"),
            Self::EmptyWorkflow(name) => write!(f, "Workflow '{}' has no activities", name),
            Self::EmptyActionId { workflow, path } => {
                write!(f, "Workflow '{}': activity at {} has no action specified", workflow, path)
            }
            Self::SwitchWithoutBranches { workflow, path } => write!(
                f,
                "Workflow '{}': switch at {} has neither 'when' branches nor a default",
                workflow, path
            ),
            Self::DuplicateWorkflow(name) => write!(f, "Duplicate workflow name: '{}'", name),
        }
    }
}

/// Validates steps recursively, collecting every problem found.
fn validate_steps(
    workflow: &str,
    steps: &[std::sync::Arc<ActivityStep>],
    prefix: &str,
    errors: &mut Vec<ValidationError>,
) {
    for (index, step) in steps.iter().enumerate() {
        let path = format!("{}[{}]", prefix, index);

        match step.as_ref() {
            ActivityStep::Action(action) => {
                if action.action.trim().is_empty() {
                    errors.push(ValidationError::EmptyActionId {
                        workflow: workflow.to_string(),
                        path,
                    });
                }
            }
            ActivityStep::Switch(switch) => {
                if switch.when.is_empty() && switch.default.is_none() {
                    errors.push(ValidationError::SwitchWithoutBranches {
                        workflow: workflow.to_string(),
                        path: path.clone(),
                    });
                }

                if switch.default.is_none() {
                    debug!(
                        "Workflow '{}': switch at {} has no default branch",
                        workflow, path
                    );
                }

                for (key, branch) in &switch.when {
                    if branch.is_empty() {
                        warn!(
                            "Workflow '{}': branch '{}' of switch at {} is empty",
                            workflow, key, path
                        );
                    }
                    validate_steps(workflow, branch, &format!("{}.when[{}]", path, key), errors);
                }

                if let Some(default) = &switch.default {
                    validate_steps(workflow, default, &format!("{}.default", path), errors);
                }
            }
        }
    }
}

/// Collects every validation problem of a single model.
pub fn check_workflow(model: &ActivityModel) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if model.name.trim().is_empty() {
        errors.push(ValidationError::EmptyWorkflowName);
        return errors; // Can't report further without a name
    }

    if model.is_empty() {
        errors.push(ValidationError::EmptyWorkflow(model.name.clone()));
    }

    validate_steps(&model.name, &model.activities, "activities", &mut errors);
    errors
}

/// Validates a single activity model.
pub fn validate_workflow(model: &ActivityModel) -> Result<(), WorkflowError> {
    debug!(
        "Validating workflow '{}' with {} activities",
        model.name,
        model.len()
    );

    let errors = check_workflow(model);
    if !errors.is_empty() {
        return Err(into_definition_error(&errors));
    }

    debug!(
        "Workflow '{}' validated: {} steps in total",
        model.name,
        model.total_steps()
    );
    Ok(())
}

/// Validates a set of models loaded together.
pub fn validate_workflows(models: &[ActivityModel]) -> Result<(), WorkflowError> {
    let mut errors = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for model in models {
        if !model.name.is_empty() && !seen.insert(model.name.as_str()) {
            errors.push(ValidationError::DuplicateWorkflow(model.name.clone()));
        }
        errors.extend(check_workflow(model));
    }

    if !errors.is_empty() {
        return Err(into_definition_error(&errors));
    }

    info!("Validated {} workflow definitions", models.len());
    Ok(())
}

fn into_definition_error(errors: &[ValidationError]) -> WorkflowError {
    let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    WorkflowError::InvalidDefinition(messages.join("\n"))
}
