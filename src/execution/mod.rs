//! Workflow Execution Module
//!
//! Runs activity models: resolves each step to an action, forwards outputs
//! from step to step, splices switch branches into the run and suspends on
//! deferred results.
//!
//! # Architecture
//!
//! - [`action`]: The action contract and its result type
//! - [`context`]: Per-run context handed to every action
//! - [`deferred`]: Single-assignment completion handles
//! - [`resolver`]: Action lookup and the stock registry
//! - [`builtin`]: Stock actions
//! - [`switch`]: Branch selection for switch steps
//! - [`engine`]: The drive loop of a single run
//! - [`runner`]: Registered workflows and run entry points

pub mod action;
pub mod builtin;
pub mod context;
pub mod deferred;
pub mod engine;
pub mod resolver;
pub mod runner;
pub mod switch;

pub use action::{Action, ActionError, ActionResult};
pub use context::{DefaultExecutionContext, ExecutionContext};
pub use deferred::{deferred, Abandoned, Completer, Deferred};
pub use engine::{Execution, RunHandle};
pub use resolver::{ActionFactory, ActionRegistry, ActionResolver};
pub use runner::WorkflowManager;
pub use switch::SwitchAction;
