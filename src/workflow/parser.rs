//! Workflow Parser
//!
//! Loads workflow definitions from YAML and compiles them into validated
//! activity models. A definitions file holds any number of workflows:
//!
//! ```yaml
//! workflows:
//!   - name: simpleWorkflowWithTwoActions
//!     activities:
//!       - action: identity
//!       - action: append
//!         params:
//!           suffix: dummy
//! ```

use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::model::ActivityModel;
use super::validator::validate_workflows;
use crate::error::WorkflowError;

/// Top-level shape of a definitions file.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct WorkflowDefinitions {
    /// Workflows declared in the file
    #[serde(default)]
    pub workflows: Vec<ActivityModel>,
}

/// Parses and validates workflow definitions from YAML text.
pub fn parse_definitions(yaml_content: &str) -> Result<Vec<ActivityModel>, WorkflowError> {
    let definitions: WorkflowDefinitions = serde_yaml::from_str(yaml_content)?;

    info!("Parsed {} workflow definitions", definitions.workflows.len());
    for model in &definitions.workflows {
        debug!(
            "Workflow '{}': {} activities ({} steps in total)",
            model.name,
            model.len(),
            model.total_steps()
        );
    }

    validate_workflows(&definitions.workflows)?;
    Ok(definitions.workflows)
}

/// Loads workflow definitions from a YAML file.
///
/// # Example
///
/// ```rust,no_run
/// use workflowlite::workflow::load_definitions;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let models = load_definitions("workflows.yaml")?;
///     println!("Loaded {} workflows", models.len());
///     Ok(())
/// }
/// ```
pub fn load_definitions(path: impl AsRef<Path>) -> Result<Vec<ActivityModel>, WorkflowError> {
    let path = path.as_ref();
    info!("Loading workflow definitions from: {}", path.display());

    let yaml_content = fs::read_to_string(path)?;
    debug!("YAML content loaded ({} bytes)", yaml_content.len());

    parse_definitions(&yaml_content)
}

/// Saves workflow definitions to a YAML file.
pub fn save_definitions(models: &[ActivityModel], path: impl AsRef<Path>) -> Result<(), WorkflowError> {
    let definitions = WorkflowDefinitions {
        workflows: models.to_vec(),
    };
    let yaml_content = serde_yaml::to_string(&definitions)?;
    fs::write(path.as_ref(), yaml_content)?;
    info!("Workflow definitions saved to: {}", path.as_ref().display());
    Ok(())
}
