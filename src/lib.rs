//! WorkflowLite - Lightweight Workflow Execution Engine
//!
//! Runs named workflows made of action steps and switch steps. Each step's
//! output feeds the next one, switches splice one of their branches into
//! the run, and actions may hand back deferred results that suspend the run
//! until they resolve.
//!
//! # Architecture
//!
//! The library is organized into three modules:
//!
//! - [`workflow`]: Activity models, expressions and YAML definitions
//! - [`execution`]: Actions, resolution and the execution engine
//! - [`error`]: Error types shared by both
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use workflowlite::execution::{ActionRegistry, DefaultExecutionContext, WorkflowManager};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = WorkflowManager::from_file("workflows.yaml", ActionRegistry::with_builtins())?;
//!
//!     let context = Arc::new(DefaultExecutionContext::new("greeting"));
//!     let output = manager.execute(context, "hello")?.wait()?;
//!     println!("{}", output);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod execution;
pub mod workflow;

// Re-export commonly used types
pub use error::{BoxError, WorkflowError};
pub use execution::{ActionRegistry, Execution, WorkflowManager};
pub use workflow::model::{ActivityModel, ActivityStep};
pub use workflow::parser::load_definitions;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "WorkflowLite";
