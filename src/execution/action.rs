//! Actions
//!
//! An action is the executable behavior bound to an activity. Its result
//! tells the engine how to continue: with a new output value, with a
//! branch of steps to run next, or by waiting on a deferred value.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use super::context::ExecutionContext;
use super::deferred::Deferred;
use crate::error::BoxError;
use crate::workflow::ActivityStep;

/// Outcome of executing an action.
#[derive(Debug)]
pub enum ActionResult {
    /// Becomes the current output for the next step.
    Value(Value),
    /// Steps to run before anything that was already pending.
    /// The current output is left untouched.
    Branch(Vec<Arc<ActivityStep>>),
    /// The value is not available yet; the run suspends until it resolves.
    Pending(Deferred<Value>),
}

impl From<Value> for ActionResult {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// Failure reported by an action.
#[derive(Debug, Error)]
pub enum ActionError {
    /// A switch value matched neither a branch nor a default.
    #[error("value '{value}' matches no branch and no default is defined")]
    UnmatchedCondition { value: String },

    #[error(transparent)]
    Failed(BoxError),
}

impl ActionError {
    /// Wraps any error as an action failure.
    pub fn failed(error: impl Into<BoxError>) -> Self {
        Self::Failed(error.into())
    }
}

/// Executable behavior bound to an activity step.
///
/// `source` is the input the run was started with and never changes;
/// `output` is the value produced by the previous step (equal to
/// `source` for the first step).
///
/// # Example
///
/// ```
/// use serde_json::{json, Value};
/// use workflowlite::execution::{Action, ActionError, ActionResult, ExecutionContext};
///
/// struct Shout;
///
/// impl Action for Shout {
///     fn execute(
///         &self,
///         _context: &dyn ExecutionContext,
///         _source: &Value,
///         output: &Value,
///     ) -> Result<ActionResult, ActionError> {
///         let text = output.as_str().ok_or_else(|| ActionError::failed("expected a string"))?;
///         Ok(ActionResult::Value(json!(text.to_uppercase())))
///     }
/// }
/// ```
pub trait Action: Send + Sync {
    fn execute(
        &self,
        context: &dyn ExecutionContext,
        source: &Value,
        output: &Value,
    ) -> Result<ActionResult, ActionError>;
}

impl<F> Action for F
where
    F: Fn(&dyn ExecutionContext, &Value, &Value) -> Result<ActionResult, ActionError> + Send + Sync,
{
    fn execute(
        &self,
        context: &dyn ExecutionContext,
        source: &Value,
        output: &Value,
    ) -> Result<ActionResult, ActionError> {
        self(context, source, output)
    }
}
