//! Switch Evaluation
//!
//! The built-in action behind every switch step: evaluates the condition
//! and reports the selected branch so the engine can splice it in place
//! of the switch.

use log::debug;
use serde_json::Value;

use super::action::{Action, ActionError, ActionResult};
use super::context::ExecutionContext;
use crate::workflow::{branch_key, SwitchStep};

/// Action that selects exactly one branch of a switch step.
pub struct SwitchAction<'a> {
    step: &'a SwitchStep,
}

impl<'a> SwitchAction<'a> {
    pub fn new(step: &'a SwitchStep) -> Self {
        Self { step }
    }
}

impl Action for SwitchAction<'_> {
    fn execute(
        &self,
        context: &dyn ExecutionContext,
        source: &Value,
        output: &Value,
    ) -> Result<ActionResult, ActionError> {
        let value = self.step.condition.evaluate(context, source, output);
        let key = branch_key(&value);

        match self.step.select(&key) {
            Some(branch) => {
                debug!(
                    "switch '{}' selected branch '{}' ({} steps)",
                    self.step.condition,
                    if self.step.when.contains_key(&key) { key.as_str() } else { "default" },
                    branch.len()
                );
                Ok(ActionResult::Branch(branch.to_vec()))
            }
            None => Err(ActionError::UnmatchedCondition { value: key }),
        }
    }
}
