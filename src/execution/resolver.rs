//! Action Resolution
//!
//! Maps the action identifier of a plain step to a concrete [`Action`].
//! [`ActionRegistry`] is the stock resolver: a table of factories keyed by
//! identifier. Factories receive the step parameters after `#{...}`
//! expressions in them have been evaluated against the context, the
//! run's source and the current output.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use serde_json::{Map, Value};

use super::action::Action;
use super::builtin;
use super::context::ExecutionContext;
use crate::error::BoxError;
use crate::workflow::{ActionStep, Expression};

/// Resolves plain steps to actions.
///
/// Resolution must be deterministic for a given action identifier.
pub trait ActionResolver: Send + Sync {
    fn resolve(
        &self,
        step: &ActionStep,
        context: &dyn ExecutionContext,
        source: &Value,
        output: &Value,
    ) -> Result<Arc<dyn Action>, BoxError>;
}

/// Builds an action from resolved step parameters.
pub type ActionFactory = Arc<dyn Fn(&Map<String, Value>) -> Result<Arc<dyn Action>, BoxError> + Send + Sync>;

/// Registry of action factories keyed by action identifier.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    factories: HashMap<String, ActionFactory>,
}

impl ActionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry preloaded with the stock actions.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register_builtins(&mut registry);
        registry
    }

    /// Registers a factory for an action identifier, replacing any previous one.
    pub fn register<F>(&mut self, action: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&Map<String, Value>) -> Result<Arc<dyn Action>, BoxError> + Send + Sync + 'static,
    {
        self.factories.insert(action.into(), Arc::new(factory));
        self
    }

    /// Registers a single shared action instance that ignores parameters.
    pub fn register_action(&mut self, action: impl Into<String>, implementation: impl Action + 'static) -> &mut Self {
        let shared: Arc<dyn Action> = Arc::new(implementation);
        self.register(action, move |_| Ok(Arc::clone(&shared)))
    }

    /// Returns true if an action identifier is registered.
    pub fn contains(&self, action: &str) -> bool {
        self.factories.contains_key(action)
    }

    /// Returns the registered identifiers in sorted order.
    pub fn actions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

impl ActionResolver for ActionRegistry {
    fn resolve(
        &self,
        step: &ActionStep,
        context: &dyn ExecutionContext,
        source: &Value,
        output: &Value,
    ) -> Result<Arc<dyn Action>, BoxError> {
        let factory = self
            .factories
            .get(&step.action)
            .ok_or_else(|| format!("no action registered as '{}'", step.action))?;

        let params = resolve_params(&step.params, context, source, output)?;
        debug!("Resolving action '{}' with {} params", step.action, params.len());

        factory(&params)
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.actions())
            .finish()
    }
}

/// Evaluates `#{...}` parameter expressions, leaving other values untouched.
fn resolve_params(
    params: &Map<String, Value>,
    context: &dyn ExecutionContext,
    source: &Value,
    output: &Value,
) -> Result<Map<String, Value>, BoxError> {
    params
        .iter()
        .map(|(key, value)| -> Result<(String, Value), BoxError> {
            let resolved = match value.as_str().and_then(embedded_expression) {
                Some(text) => Expression::parse(text)
                    .map_err(|e| format!("parameter '{}': {}", key, e))?
                    .evaluate(context, source, output),
                None => value.clone(),
            };
            Ok((key.clone(), resolved))
        })
        .collect()
}

fn embedded_expression(text: &str) -> Option<&str> {
    text.trim()
        .strip_prefix("#{")
        .and_then(|rest| rest.strip_suffix('}'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::action::{ActionError, ActionResult};
    use crate::execution::context::DefaultExecutionContext;
    use serde_json::json;

    struct Echo(Value);

    impl Action for Echo {
        fn execute(&self, _: &dyn ExecutionContext, _: &Value, _: &Value) -> Result<ActionResult, ActionError> {
            Ok(ActionResult::Value(self.0.clone()))
        }
    }

    fn value_of(action: Arc<dyn Action>) -> Value {
        let context = DefaultExecutionContext::new("wf");
        match action.execute(&context, &Value::Null, &Value::Null).unwrap() {
            ActionResult::Value(v) => v,
            other => panic!("unexpected result: {:?}", other),
        }
    }

    fn resolve(registry: &ActionRegistry, step: &ActionStep) -> Result<Arc<dyn Action>, BoxError> {
        let context = DefaultExecutionContext::new("wf").with_attribute("user", json!("ana"));
        registry.resolve(step, &context, &json!({"id": 7}), &json!("current"))
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = ActionRegistry::new();
        registry.register("echo", |params| {
            Ok(Arc::new(Echo(params.get("value").cloned().unwrap_or(Value::Null))) as Arc<dyn Action>)
        });

        assert!(registry.contains("echo"));
        let action = resolve(&registry, &ActionStep::new("echo").with_param("value", 5)).unwrap();
        assert_eq!(value_of(action), json!(5));
    }

    #[test]
    fn test_unknown_action() {
        let registry = ActionRegistry::new();
        let err = resolve(&registry, &ActionStep::new("missing")).err().unwrap();
        assert!(err.to_string().contains("no action registered as 'missing'"));
    }

    #[test]
    fn test_factory_failure_propagates() {
        let mut registry = ActionRegistry::new();
        registry.register("picky", |_| Err("bad params".into()));

        let err = resolve(&registry, &ActionStep::new("picky")).err().unwrap();
        assert_eq!(err.to_string(), "bad params");
    }

    #[test]
    fn test_register_action_shares_instance() {
        let mut registry = ActionRegistry::new();
        registry.register_action("fixed", Echo(json!("same")));

        let first = resolve(&registry, &ActionStep::new("fixed")).unwrap();
        let second = resolve(&registry, &ActionStep::new("fixed")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_param_expressions() {
        let context = DefaultExecutionContext::new("wf").with_attribute("user", json!("ana"));
        let mut params = Map::new();
        params.insert("id".to_string(), json!("#{source.id}"));
        params.insert("who".to_string(), json!(" #{context.user} "));
        params.insert("now".to_string(), json!("#{output}"));
        params.insert("plain".to_string(), json!("#not-an-expression"));
        params.insert("number".to_string(), json!(3));

        let resolved = resolve_params(&params, &context, &json!({"id": 7}), &json!("current")).unwrap();

        assert_eq!(resolved["id"], json!(7));
        assert_eq!(resolved["who"], json!("ana"));
        assert_eq!(resolved["now"], json!("current"));
        assert_eq!(resolved["plain"], json!("#not-an-expression"));
        assert_eq!(resolved["number"], json!(3));
    }

    #[test]
    fn test_invalid_param_expression() {
        let mut registry = ActionRegistry::new();
        registry.register_action("fixed", Echo(json!(1)));

        let step = ActionStep::new("fixed").with_param("bad", "#{nowhere}");
        let err = resolve(&registry, &step).err().unwrap();
        assert!(err.to_string().contains("parameter 'bad'"));
    }

    #[test]
    fn test_builtins_are_registered() {
        let registry = ActionRegistry::with_builtins();
        for name in ["identity", "append", "uppercase", "reverse", "constant", "delay", "fail"] {
            assert!(registry.contains(name), "missing builtin '{}'", name);
        }
    }
}
