//! Activity Model
//!
//! In-memory representation of a workflow: a named, ordered sequence of
//! activity steps. A step is either a plain action reference or a switch
//! whose selected branch is spliced into the run in place of the switch.
//!
//! # Example YAML Format
//!
//! ```yaml
//! name: routeByKind
//! activities:
//!   - action: append
//!     params:
//!       suffix: "-seen"
//!   - switch: output.kind
//!     when:
//!       "a":
//!         - action: uppercase
//!     default:
//!       - action: identity
//! ```
//!
//! Models are immutable once built and shared read-only between runs;
//! steps are reference counted so splicing a branch never copies it.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::de::{self, Deserializer, Error as _};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::expression::{branch_key, Expression};

/// A plain step: an action identifier plus the static parameters used to
/// resolve it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ActionStep {
    /// Identifier the resolver maps to an action implementation
    pub action: String,

    /// Parameters handed to the action factory
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
}

impl ActionStep {
    /// Creates a step referencing the given action.
    ///
    /// # Example
    ///
    /// ```
    /// use workflowlite::workflow::ActionStep;
    ///
    /// let step = ActionStep::new("append").with_param("suffix", "dummy");
    /// assert_eq!(step.params["suffix"], "dummy");
    /// ```
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into().trim().to_string(),
            params: Map::new(),
        }
    }

    /// Adds a static parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// A conditional step.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SwitchStep {
    /// Expression whose value selects the branch
    #[serde(rename = "switch")]
    pub condition: Expression,

    /// Branches keyed by condition value, in declaration order
    #[serde(
        default,
        skip_serializing_if = "IndexMap::is_empty",
        deserialize_with = "deserialize_branches"
    )]
    pub when: IndexMap<String, Vec<Arc<ActivityStep>>>,

    /// Branch used when no key matches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Vec<Arc<ActivityStep>>>,
}

impl SwitchStep {
    /// Creates a switch with no branches.
    pub fn new(condition: Expression) -> Self {
        Self {
            condition,
            when: IndexMap::new(),
            default: None,
        }
    }

    /// Parses the condition and creates a switch with no branches.
    pub fn on(condition: &str) -> Result<Self, String> {
        Expression::parse(condition).map(Self::new)
    }

    /// Adds a branch selected when the condition evaluates to `key`.
    pub fn when(mut self, key: impl Into<String>, steps: Vec<ActivityStep>) -> Self {
        self.when
            .insert(key.into(), steps.into_iter().map(Arc::new).collect());
        self
    }

    /// Sets the branch used when no key matches.
    pub fn otherwise(mut self, steps: Vec<ActivityStep>) -> Self {
        self.default = Some(steps.into_iter().map(Arc::new).collect());
        self
    }

    /// Returns the branch for `key`, falling back to the default branch.
    pub fn select(&self, key: &str) -> Option<&[Arc<ActivityStep>]> {
        self.when
            .get(key)
            .or(self.default.as_ref())
            .map(Vec::as_slice)
    }

    /// Iterates over every branch including the default.
    pub fn branches(&self) -> impl Iterator<Item = &Vec<Arc<ActivityStep>>> {
        self.when.values().chain(self.default.iter())
    }
}

/// Reads branch keys as YAML scalars so `true:` or `1:` select the same
/// branch as a condition evaluating to `true` or `1`.
fn deserialize_branches<'de, D>(deserializer: D) -> Result<IndexMap<String, Vec<Arc<ActivityStep>>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = IndexMap::<serde_yaml::Value, Vec<Arc<ActivityStep>>>::deserialize(deserializer)?;

    raw.into_iter()
        .map(|(key, steps)| -> Result<(String, Vec<Arc<ActivityStep>>), D::Error> {
            let key = match key {
                serde_yaml::Value::Sequence(_) | serde_yaml::Value::Mapping(_) | serde_yaml::Value::Tagged(_) => {
                    return Err(D::Error::custom(format!(
                        "switch branch keys must be scalars, found {:?}",
                        key
                    )))
                }
                scalar => serde_json::to_value(&scalar).map_err(D::Error::custom)?,
            };
            Ok((branch_key(&key), steps))
        })
        .collect()
}

/// One unit of a workflow.
///
/// A mapping with a `switch` field is a switch step, one with an `action`
/// field is a plain step.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ActivityStep {
    Action(ActionStep),
    Switch(SwitchStep),
}

impl<'de> Deserialize<'de> for ActivityStep {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let fields = serde_yaml::Mapping::deserialize(deserializer)?;
        let is_switch = fields.contains_key("switch");
        let is_action = fields.contains_key("action");
        let step = serde_yaml::Value::Mapping(fields);

        if is_switch {
            serde_yaml::from_value(step)
                .map(Self::Switch)
                .map_err(|e| de::Error::custom(format!("invalid switch step: {}", e)))
        } else if is_action {
            serde_yaml::from_value(step)
                .map(Self::Action)
                .map_err(|e| de::Error::custom(format!("invalid action step: {}", e)))
        } else {
            Err(de::Error::custom(
                "activity step needs either an 'action' or a 'switch' field",
            ))
        }
    }
}

impl ActivityStep {
    /// Shorthand for a plain step without parameters.
    pub fn action(action: impl Into<String>) -> Self {
        Self::Action(ActionStep::new(action))
    }

    /// Human readable label used in logs and errors.
    pub fn label(&self) -> String {
        match self {
            Self::Action(step) => step.action.clone(),
            Self::Switch(step) => format!("switch({})", step.condition),
        }
    }

    /// Counts this step plus every step nested in its branches.
    pub fn step_count(&self) -> usize {
        match self {
            Self::Action(_) => 1,
            Self::Switch(step) => {
                1 + step
                    .branches()
                    .flat_map(|branch| branch.iter())
                    .map(|nested| nested.step_count())
                    .sum::<usize>()
            }
        }
    }
}

impl From<ActionStep> for ActivityStep {
    fn from(step: ActionStep) -> Self {
        Self::Action(step)
    }
}

impl From<SwitchStep> for ActivityStep {
    fn from(step: SwitchStep) -> Self {
        Self::Switch(step)
    }
}

/// A named, ordered sequence of activity steps.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ActivityModel {
    /// Workflow name used to look the model up
    pub name: String,

    /// Top-level steps in execution order
    pub activities: Vec<Arc<ActivityStep>>,
}

impl ActivityModel {
    /// Creates a model from a list of steps.
    ///
    /// # Example
    ///
    /// ```
    /// use workflowlite::workflow::{ActionStep, ActivityModel, ActivityStep};
    ///
    /// let model = ActivityModel::new(
    ///     "simpleWorkflowWithTwoActions",
    ///     vec![
    ///         ActivityStep::action("identity"),
    ///         ActionStep::new("append").with_param("suffix", "dummy").into(),
    ///     ],
    /// );
    /// assert_eq!(model.len(), 2);
    /// ```
    pub fn new(name: impl Into<String>, activities: Vec<ActivityStep>) -> Self {
        Self {
            name: name.into().trim().to_string(),
            activities: activities.into_iter().map(Arc::new).collect(),
        }
    }

    /// Returns the number of top-level steps.
    pub fn len(&self) -> usize {
        self.activities.len()
    }

    /// Returns true if the model has no steps.
    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    /// Counts every step including those nested in switch branches.
    pub fn total_steps(&self) -> usize {
        self.activities.iter().map(|step| step.step_count()).sum()
    }

    /// Returns true if any step, nested or not, is a switch.
    pub fn has_switches(&self) -> bool {
        self.activities
            .iter()
            .any(|step| matches!(step.as_ref(), ActivityStep::Switch(_)))
    }
}
