//! Stock Actions
//!
//! Small general-purpose actions available through
//! [`ActionRegistry::with_builtins`](super::resolver::ActionRegistry::with_builtins):
//!
//! | id          | params                      | result                                  |
//! |-------------|-----------------------------|-----------------------------------------|
//! | `identity`  |                             | current output                          |
//! | `append`    | `suffix`                    | output string with `suffix` appended    |
//! | `uppercase` |                             | output string upper-cased               |
//! | `reverse`   |                             | output string reversed                  |
//! | `constant`  | `value`                     | `value`                                 |
//! | `delay`     | `millis`, optional `value`  | pending, resolves with output or value  |
//! | `fail`      | `message`, optional `async` | failure (deferred when `async` is true) |

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::debug;
use serde_json::{Map, Value};

use super::action::{Action, ActionError, ActionResult};
use super::context::ExecutionContext;
use super::deferred::{deferred, Deferred};
use super::resolver::ActionRegistry;
use crate::error::BoxError;

/// Registers every stock action.
pub fn register_builtins(registry: &mut ActionRegistry) {
    registry
        .register_action("identity", Identity)
        .register_action("uppercase", Uppercase)
        .register_action("reverse", Reverse)
        .register("append", |params| {
            let suffix = required_str(params, "append", "suffix")?;
            Ok(Arc::new(Append { suffix }) as Arc<dyn Action>)
        })
        .register("constant", |params| {
            let value = params
                .get("value")
                .cloned()
                .ok_or("constant: missing parameter 'value'")?;
            Ok(Arc::new(Constant { value }) as Arc<dyn Action>)
        })
        .register("delay", |params| {
            let millis = params
                .get("millis")
                .and_then(Value::as_u64)
                .ok_or("delay: parameter 'millis' must be a non-negative integer")?;
            Ok(Arc::new(Delay {
                duration: Duration::from_millis(millis),
                value: params.get("value").cloned(),
            }) as Arc<dyn Action>)
        })
        .register("fail", |params| {
            let message = required_str(params, "fail", "message")?;
            let deferred = params.get("async").and_then(Value::as_bool).unwrap_or(false);
            Ok(Arc::new(Fail { message, deferred }) as Arc<dyn Action>)
        });
}

fn required_str(params: &Map<String, Value>, action: &str, key: &str) -> Result<String, BoxError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| format!("{}: parameter '{}' must be a string", action, key).into())
}

fn output_str<'a>(output: &'a Value, action: &str) -> Result<&'a str, ActionError> {
    output
        .as_str()
        .ok_or_else(|| ActionError::failed(format!("{} expects a string but got {}", action, output)))
}

struct Identity;

impl Action for Identity {
    fn execute(&self, _: &dyn ExecutionContext, _: &Value, output: &Value) -> Result<ActionResult, ActionError> {
        Ok(ActionResult::Value(output.clone()))
    }
}

struct Uppercase;

impl Action for Uppercase {
    fn execute(&self, _: &dyn ExecutionContext, _: &Value, output: &Value) -> Result<ActionResult, ActionError> {
        let text = output_str(output, "uppercase")?;
        Ok(ActionResult::Value(Value::String(text.to_uppercase())))
    }
}

struct Reverse;

impl Action for Reverse {
    fn execute(&self, _: &dyn ExecutionContext, _: &Value, output: &Value) -> Result<ActionResult, ActionError> {
        let text = output_str(output, "reverse")?;
        Ok(ActionResult::Value(Value::String(text.chars().rev().collect())))
    }
}

struct Append {
    suffix: String,
}

impl Action for Append {
    fn execute(&self, _: &dyn ExecutionContext, _: &Value, output: &Value) -> Result<ActionResult, ActionError> {
        let text = output_str(output, "append")?;
        Ok(ActionResult::Value(Value::String(format!("{}{}", text, self.suffix))))
    }
}

struct Constant {
    value: Value,
}

impl Action for Constant {
    fn execute(&self, _: &dyn ExecutionContext, _: &Value, _: &Value) -> Result<ActionResult, ActionError> {
        Ok(ActionResult::Value(self.value.clone()))
    }
}

/// Resolves after a delay, on a tokio task when a runtime is available
/// and on a helper thread otherwise.
struct Delay {
    duration: Duration,
    value: Option<Value>,
}

impl Action for Delay {
    fn execute(&self, _: &dyn ExecutionContext, _: &Value, output: &Value) -> Result<ActionResult, ActionError> {
        let (completer, handle) = deferred();
        let value = self.value.clone().unwrap_or_else(|| output.clone());
        let duration = self.duration;

        debug!("delay: resolving in {:?}", duration);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    tokio::time::sleep(duration).await;
                    completer.resolve(value);
                });
            }
            Err(_) => {
                thread::spawn(move || {
                    thread::sleep(duration);
                    completer.resolve(value);
                });
            }
        }

        Ok(ActionResult::Pending(handle))
    }
}

struct Fail {
    message: String,
    deferred: bool,
}

impl Action for Fail {
    fn execute(&self, _: &dyn ExecutionContext, _: &Value, _: &Value) -> Result<ActionResult, ActionError> {
        if self.deferred {
            return Ok(ActionResult::Pending(Deferred::failed(self.message.clone().into())));
        }
        Err(ActionError::failed(self.message.clone()))
    }
}
