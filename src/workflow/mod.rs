//! Workflow Definition Module
//!
//! Provides the activity model and the tooling that builds it from
//! definition files.
//!
//! # Structure
//!
//! - [`model`]: Core data structures (ActivityModel, ActivityStep)
//! - [`expression`]: Condition and parameter expressions
//! - [`parser`]: YAML parsing and loading
//! - [`validator`]: Model invariant checks

pub mod expression;
pub mod model;
pub mod parser;
pub mod validator;

pub use expression::{branch_key, Expression};
pub use model::{ActionStep, ActivityModel, ActivityStep, SwitchStep};
pub use parser::{load_definitions, parse_definitions, save_definitions};
pub use validator::{validate_workflow, validate_workflows, ValidationError};
