//! Workflow Runner
//!
//! Holds the registered activity models and starts runs of them. The
//! manager is immutable once built and can be shared across threads; every
//! run owns its own state.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info};
use serde_json::Value;

use super::context::ExecutionContext;
use super::engine::{Execution, Run};
use super::resolver::ActionResolver;
use crate::error::WorkflowError;
use crate::workflow::{load_definitions, validate_workflow, ActivityModel};

/// Entry point for running named workflows.
pub struct WorkflowManager {
    models: HashMap<String, Arc<ActivityModel>>,
    resolver: Arc<dyn ActionResolver>,
}

impl WorkflowManager {
    /// Creates a manager with no workflows.
    pub fn new(resolver: impl ActionResolver + 'static) -> Self {
        Self {
            models: HashMap::new(),
            resolver: Arc::new(resolver),
        }
    }

    /// Creates a manager holding every workflow of a definitions file.
    pub fn from_file(path: impl AsRef<Path>, resolver: impl ActionResolver + 'static) -> Result<Self, WorkflowError> {
        let path = path.as_ref();
        let mut manager = Self::new(resolver);
        for model in load_definitions(path)? {
            manager.register(model)?;
        }
        info!(
            "Loaded {} workflows from {}",
            manager.models.len(),
            path.display()
        );
        Ok(manager)
    }

    /// Validates and registers an activity model.
    pub fn register(&mut self, model: ActivityModel) -> Result<&mut Self, WorkflowError> {
        validate_workflow(&model)?;
        if self.models.contains_key(&model.name) {
            return Err(WorkflowError::DuplicateWorkflow(model.name));
        }

        debug!("Registered workflow '{}' ({} steps)", model.name, model.total_steps());
        self.models.insert(model.name.clone(), Arc::new(model));
        Ok(self)
    }

    /// Looks up a registered model.
    pub fn workflow(&self, name: &str) -> Option<&ActivityModel> {
        self.models.get(name).map(Arc::as_ref)
    }

    /// Returns the registered workflow names in sorted order.
    pub fn workflow_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.models.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Runs the workflow registered as `name`.
    ///
    /// Returns [`Execution::Completed`] when no activity went asynchronous.
    /// Otherwise returns [`Execution::Pending`], and any later failure is
    /// reported through that handle only.
    pub fn run(
        &self,
        name: &str,
        context: Arc<dyn ExecutionContext>,
        input: impl Into<Value>,
    ) -> Result<Execution, WorkflowError> {
        let model = self
            .models
            .get(name)
            .ok_or_else(|| WorkflowError::UnknownWorkflow(name.to_string()))?;

        Run::new(model, context, Arc::clone(&self.resolver), input.into()).start()
    }

    /// Runs the workflow named by the context.
    pub fn execute(&self, context: Arc<dyn ExecutionContext>, input: impl Into<Value>) -> Result<Execution, WorkflowError> {
        let name = context.workflow_name().to_string();
        self.run(&name, context, input)
    }
}

impl std::fmt::Debug for WorkflowManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowManager")
            .field("workflows", &self.workflow_names())
            .finish()
    }
}
