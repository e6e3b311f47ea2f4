//! Workflow Execution Engine
//!
//! Drives one run of an activity model:
//! - Steps execute strictly in order, one at a time
//! - A switch is replaced by its selected branch, spliced in front of the
//!   steps that followed it
//! - Each step's output becomes the next step's input
//! - An action returning a pending value suspends the run; the run resumes
//!   on whichever thread resolves that value
//!
//! A run that never meets a pending value returns its result directly. The
//! first pending value creates the run's completion handle, which from then
//! on carries the result (or the failure) of the whole run.

use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, error, info};
use serde_json::Value;

use super::action::{Action, ActionError, ActionResult};
use super::context::ExecutionContext;
use super::deferred::{deferred, Completer, Deferred};
use super::resolver::ActionResolver;
use super::switch::SwitchAction;
use crate::error::{BoxError, WorkflowError};
use crate::workflow::{ActivityModel, ActivityStep};

/// Completion handle of a run that went asynchronous.
pub type RunHandle = Deferred<Value, WorkflowError>;

/// What a caller gets back from starting a run.
#[derive(Debug)]
pub enum Execution {
    /// The run finished without meeting any pending value.
    Completed(Value),
    /// The run went asynchronous; the handle resolves with its final output.
    Pending(RunHandle),
}

impl Execution {
    /// Returns true if the result is deferred.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// Returns the value of a run that completed synchronously.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Pending(_) => None,
        }
    }

    /// Blocks until the run's final output is available.
    ///
    /// Must not be called from within an async runtime; use
    /// [`Execution::resolve`] there.
    pub fn wait(self) -> Result<Value, WorkflowError> {
        match self {
            Self::Completed(value) => Ok(value),
            Self::Pending(handle) => handle.wait(),
        }
    }

    /// Awaits the run's final output.
    pub async fn resolve(self) -> Result<Value, WorkflowError> {
        match self {
            Self::Completed(value) => Ok(value),
            Self::Pending(handle) => handle.await,
        }
    }
}

/// Where a pass over the pending steps stopped.
enum Advance {
    Done,
    /// A step returned a pending value; carries it with the step's label.
    Pending(Deferred<Value>, String),
}

/// State of a single run.
pub struct Run {
    workflow: String,
    context: Arc<dyn ExecutionContext>,
    resolver: Arc<dyn ActionResolver>,
    source: Value,
    output: Value,
    pending: VecDeque<Arc<ActivityStep>>,
    executed: usize,
    async_hops: usize,
}

impl Run {
    /// Prepares a run of `model` with `input` as both source and first output.
    pub fn new(
        model: &ActivityModel,
        context: Arc<dyn ExecutionContext>,
        resolver: Arc<dyn ActionResolver>,
        input: Value,
    ) -> Self {
        Self {
            workflow: model.name.clone(),
            context,
            resolver,
            source: input.clone(),
            output: input,
            pending: model.activities.iter().cloned().collect(),
            executed: 0,
            async_hops: 0,
        }
    }

    /// Executes the run until it finishes or meets its first pending value.
    ///
    /// Errors raised before the run went asynchronous are returned here;
    /// later ones fail the returned handle.
    pub fn start(mut self) -> Result<Execution, WorkflowError> {
        info!(
            "Starting workflow '{}' ({} activities)",
            self.workflow,
            self.pending.len()
        );

        match self.advance() {
            Ok(Advance::Done) => {
                self.log_finished();
                Ok(Execution::Completed(self.output))
            }
            Ok(Advance::Pending(handle, activity)) => {
                let (completion, observer) = deferred();
                Suspended { run: self, completion }.wait_on(handle, activity);
                Ok(Execution::Pending(observer))
            }
            Err(err) => {
                error!(
                    "Workflow '{}' failed after {} activities: {}",
                    self.workflow, self.executed, err
                );
                Err(err)
            }
        }
    }

    /// Executes pending steps until none are left or one returns a pending value.
    fn advance(&mut self) -> Result<Advance, WorkflowError> {
        while let Some(step) = self.pending.pop_front() {
            let result = self.execute(&step)?;
            self.executed += 1;

            match result {
                ActionResult::Value(value) => self.output = value,
                ActionResult::Branch(branch) => {
                    debug!(
                        "[{}] '{}' spliced {} steps",
                        self.workflow,
                        step.label(),
                        branch.len()
                    );
                    for nested in branch.into_iter().rev() {
                        self.pending.push_front(nested);
                    }
                }
                ActionResult::Pending(handle) => {
                    self.async_hops += 1;
                    let activity = step.label();
                    debug!("[{}] '{}' is pending", self.workflow, activity);
                    return Ok(Advance::Pending(handle, activity));
                }
            }
        }

        Ok(Advance::Done)
    }

    fn execute(&self, step: &ActivityStep) -> Result<ActionResult, WorkflowError> {
        let context = self.context.as_ref();
        debug!("[{}] executing '{}'", self.workflow, step.label());

        match step {
            ActivityStep::Action(action_step) => {
                let action = self
                    .resolver
                    .resolve(action_step, context, &self.source, &self.output)
                    .map_err(|source| WorkflowError::UnresolvedAction {
                        workflow: self.workflow.clone(),
                        action: action_step.action.clone(),
                        source,
                    })?;

                action
                    .execute(context, &self.source, &self.output)
                    .map_err(|err| self.action_error(&action_step.action, err))
            }
            ActivityStep::Switch(switch) => SwitchAction::new(switch)
                .execute(context, &self.source, &self.output)
                .map_err(|err| self.action_error(switch.condition.as_str(), err)),
        }
    }

    fn action_error(&self, activity: &str, err: ActionError) -> WorkflowError {
        match err {
            ActionError::UnmatchedCondition { value } => WorkflowError::UnmatchedCondition {
                workflow: self.workflow.clone(),
                condition: activity.to_string(),
                value,
            },
            ActionError::Failed(source) => WorkflowError::ActionExecution {
                workflow: self.workflow.clone(),
                activity: activity.to_string(),
                source,
            },
        }
    }

    fn log_finished(&self) {
        info!(
            "Done executing all the activities of workflow '{}' ({} executed). Had async activities [{}].",
            self.workflow,
            self.executed,
            self.async_hops > 0
        );
    }
}

/// A run that went asynchronous, together with its completion handle.
///
/// Owned by exactly one thread at a time and moved into the continuation
/// of the pending value it waits on.
struct Suspended {
    run: Run,
    completion: Completer<Value, WorkflowError>,
}

impl Suspended {
    /// Waits on `handle`. Handles that are already resolved are consumed
    /// in this frame, so chains of async steps never nest calls.
    fn wait_on(mut self, mut handle: Deferred<Value>, mut activity: String) {
        loop {
            let ready = handle.on_complete((self, activity), |(suspended, activity), result| {
                suspended.resume(activity, result)
            });
            let Some(((suspended, ready_activity), result)) = ready else {
                return;
            };

            match suspended.proceed(ready_activity, result) {
                Some((next, next_handle, next_activity)) => {
                    self = next;
                    handle = next_handle;
                    activity = next_activity;
                }
                None => return,
            }
        }
    }

    /// Continues on the thread that resolved the pending value.
    fn resume(self, activity: String, result: Result<Value, BoxError>) {
        if let Some((suspended, handle, activity)) = self.proceed(activity, result) {
            suspended.wait_on(handle, activity);
        }
    }

    /// Applies a resolved pending value and runs on to the next pending
    /// step. Completes the run handle when the run ends.
    fn proceed(mut self, activity: String, result: Result<Value, BoxError>) -> Option<(Self, Deferred<Value>, String)> {
        match result {
            Ok(value) => {
                debug!("[{}] async activity '{}' returned: {}", self.run.workflow, activity, value);
                self.run.output = value;
            }
            Err(source) => {
                let err = WorkflowError::AsyncAction {
                    workflow: self.run.workflow.clone(),
                    activity,
                    source,
                };
                self.fail(err);
                return None;
            }
        }

        match self.run.advance() {
            Ok(Advance::Pending(handle, activity)) => Some((self, handle, activity)),
            Ok(Advance::Done) => {
                self.run.log_finished();
                self.completion.resolve(self.run.output);
                None
            }
            Err(err) => {
                self.fail(err);
                None
            }
        }
    }

    fn fail(self, err: WorkflowError) {
        error!(
            "Workflow '{}' failed after {} activities: {}",
            self.run.workflow, self.run.executed, err
        );
        self.completion.fail(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::context::DefaultExecutionContext;
    use crate::execution::deferred::Abandoned;
    use crate::execution::resolver::ActionRegistry;
    use crate::workflow::{ActionStep, SwitchStep};
    use serde_json::json;
    use std::sync::mpsc::{channel, Receiver, Sender};
    use std::sync::Mutex;
    use std::thread;

    type Log = Arc<Mutex<Vec<String>>>;

    /// Appends its own name to the output and records that it ran.
    struct Tag {
        name: String,
        log: Log,
    }

    impl Action for Tag {
        fn execute(&self, _: &dyn ExecutionContext, _: &Value, output: &Value) -> Result<ActionResult, ActionError> {
            self.log.lock().unwrap().push(self.name.clone());
            let text = output.as_str().unwrap_or_default();
            Ok(ActionResult::Value(json!(format!("{}{}", text, self.name))))
        }
    }

    /// Hands its completer to the test and suspends the run.
    struct Relay {
        name: String,
        log: Log,
        completers: Mutex<Sender<Completer<Value>>>,
    }

    impl Action for Relay {
        fn execute(&self, _: &dyn ExecutionContext, _: &Value, _: &Value) -> Result<ActionResult, ActionError> {
            self.log.lock().unwrap().push(self.name.clone());
            let (completer, handle) = deferred();
            self.completers.lock().unwrap().send(completer).unwrap();
            Ok(ActionResult::Pending(handle))
        }
    }

    struct Fixture {
        log: Log,
        registry: ActionRegistry,
        completers: Receiver<Completer<Value>>,
    }

    impl Fixture {
        fn new() -> Self {
            let log: Log = Arc::new(Mutex::new(Vec::new()));
            let mut registry = ActionRegistry::with_builtins();
            for name in ["A", "B", "C", "D"] {
                registry.register_action(
                    name,
                    Tag {
                        name: name.to_string(),
                        log: Arc::clone(&log),
                    },
                );
            }

            let (tx, rx) = channel();
            registry.register_action(
                "relay",
                Relay {
                    name: "relay".to_string(),
                    log: Arc::clone(&log),
                    completers: Mutex::new(tx),
                },
            );

            Self {
                log,
                registry,
                completers: rx,
            }
        }

        fn start(&self, steps: Vec<ActivityStep>, input: Value) -> Result<Execution, WorkflowError> {
            let model = ActivityModel::new("wf", steps);
            Run::new(
                &model,
                Arc::new(DefaultExecutionContext::new("wf")),
                Arc::new(self.registry.clone()),
                input,
            )
            .start()
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    fn step(name: &str) -> ActivityStep {
        ActivityStep::action(name)
    }

    #[test]
    fn test_sequential_forwarding() {
        let fixture = Fixture::new();
        let execution = fixture
            .start(vec![step("A"), step("B"), step("C")], json!("x"))
            .unwrap();

        assert!(!execution.is_pending());
        assert_eq!(execution.value(), Some(&json!("xABC")));
        assert_eq!(fixture.log(), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_builtin_chain_matches_manual_fold() {
        let fixture = Fixture::new();
        let steps = vec![
            step("reverse"),
            ActionStep::new("append").with_param("suffix", "-").into(),
            step("uppercase"),
        ];

        let execution = fixture.start(steps, json!("abc")).unwrap();
        assert_eq!(execution.wait().unwrap(), json!("CBA-"));
    }

    #[test]
    fn test_switch_branch_runs_before_following_steps() {
        let fixture = Fixture::new();
        let switch = SwitchStep::on("source")
            .unwrap()
            .when("go", vec![step("B"), step("C")])
            .when("stop", vec![step("A")]);

        let execution = fixture
            .start(vec![step("A"), switch.into(), step("D")], json!("go"))
            .unwrap();

        assert_eq!(fixture.log(), vec!["A", "B", "C", "D"]);
        // D sees C's output, the switch forwards nothing of its own
        assert_eq!(execution.value(), Some(&json!("goABCD")));
    }

    #[test]
    fn test_switch_default_branch() {
        let fixture = Fixture::new();
        let switch = SwitchStep::on("output")
            .unwrap()
            .when("never", vec![step("B")])
            .otherwise(vec![step("C")]);

        let execution = fixture
            .start(vec![step("A"), switch.into(), step("D")], json!("x"))
            .unwrap();

        assert_eq!(fixture.log(), vec!["A", "C", "D"]);
        assert_eq!(execution.value(), Some(&json!("xACD")));
    }

    #[test]
    fn test_switch_unmatched_without_default() {
        let fixture = Fixture::new();
        let switch = SwitchStep::on("source")
            .unwrap()
            .when("go", vec![step("B")]);

        let result = fixture.start(vec![step("A"), switch.into(), step("D")], json!("halt"));

        match result {
            Err(WorkflowError::UnmatchedCondition { condition, value, .. }) => {
                assert_eq!(condition, "source");
                assert_eq!(value, "halt");
            }
            other => panic!("expected unmatched condition, got {:?}", other),
        }
        assert_eq!(fixture.log(), vec!["A"]);
    }

    #[test]
    fn test_nested_switches() {
        let fixture = Fixture::new();
        let inner = SwitchStep::on("output == 'goA'")
            .unwrap()
            .when("true", vec![step("C")])
            .otherwise(vec![step("D")]);
        let outer = SwitchStep::on("source")
            .unwrap()
            .when("go", vec![inner.into(), step("B")]);

        let execution = fixture
            .start(vec![step("A"), outer.into(), step("D")], json!("go"))
            .unwrap();

        assert_eq!(fixture.log(), vec!["A", "C", "B", "D"]);
        assert_eq!(execution.value(), Some(&json!("goACBD")));
    }

    #[test]
    fn test_async_round_trip() {
        let fixture = Fixture::new();
        let execution = fixture
            .start(vec![step("A"), step("relay"), step("C")], json!("x"))
            .unwrap();

        assert!(execution.is_pending());
        assert_eq!(fixture.log(), vec!["A", "relay"]);

        let completer = fixture.completers.try_recv().unwrap();
        thread::spawn(move || completer.resolve(json!("y")));

        assert_eq!(execution.wait().unwrap(), json!("yC"));
        assert_eq!(fixture.log(), vec!["A", "relay", "C"]);
    }

    #[test]
    fn test_async_failure_short_circuits() {
        let fixture = Fixture::new();
        let execution = fixture
            .start(vec![step("A"), step("relay"), step("C")], json!("x"))
            .unwrap();

        fixture.completers.try_recv().unwrap().fail("remote error".into());

        match execution.wait() {
            Err(WorkflowError::AsyncAction { activity, source, .. }) => {
                assert_eq!(activity, "relay");
                assert_eq!(source.to_string(), "remote error");
            }
            other => panic!("expected async failure, got {:?}", other),
        }
        assert_eq!(fixture.log(), vec!["A", "relay"]);
    }

    #[test]
    fn test_abandoned_async_step_fails_run_handle() {
        let fixture = Fixture::new();
        let execution = fixture
            .start(vec![step("A"), step("relay"), step("C")], json!("x"))
            .unwrap();

        drop(fixture.completers.try_recv().unwrap());

        assert!(matches!(execution.wait(), Err(WorkflowError::Abandoned(_))));
        assert_eq!(fixture.log(), vec!["A", "relay"]);
    }

    #[test]
    fn test_pending_value_abandoned_before_returning() {
        let mut registry = ActionRegistry::new();
        registry.register_action("orphan", |_: &dyn ExecutionContext, _: &Value, _: &Value| -> Result<ActionResult, ActionError> {
            let (_, handle) = deferred::<Value, BoxError>();
            Ok(ActionResult::Pending(handle))
        });
        let model = ActivityModel::new("wf", vec![step("orphan")]);

        let execution = Run::new(
            &model,
            Arc::new(DefaultExecutionContext::new("wf")),
            Arc::new(registry),
            json!("x"),
        )
        .start()
        .unwrap();

        match execution.wait() {
            Err(WorkflowError::AsyncAction { activity, source, .. }) => {
                assert_eq!(activity, "orphan");
                assert_eq!(source.to_string(), Abandoned.to_string());
            }
            other => panic!("expected async failure, got {:?}", other),
        }
    }

    #[test]
    fn test_multiple_async_steps_share_one_handle() {
        let fixture = Fixture::new();
        let execution = fixture
            .start(
                vec![step("relay"), step("B"), step("relay"), step("D")],
                json!("x"),
            )
            .unwrap();
        assert!(execution.is_pending());

        fixture.completers.try_recv().unwrap().resolve(json!("first"));
        assert_eq!(fixture.log(), vec!["relay", "B", "relay"]);

        fixture.completers.try_recv().unwrap().resolve(json!("second"));
        assert!(fixture.completers.try_recv().is_err());

        assert_eq!(execution.wait().unwrap(), json!("secondD"));
    }

    #[test]
    fn test_async_step_inside_branch() {
        let fixture = Fixture::new();
        let switch = SwitchStep::on("source")
            .unwrap()
            .when("x", vec![step("relay"), step("C")]);

        let execution = fixture
            .start(vec![step("A"), switch.into(), step("D")], json!("x"))
            .unwrap();

        fixture.completers.try_recv().unwrap().resolve(json!("y"));

        assert_eq!(execution.wait().unwrap(), json!("yCD"));
        assert_eq!(fixture.log(), vec!["A", "relay", "C", "D"]);
    }

    #[test]
    fn test_already_resolved_pending_value() {
        let mut registry = ActionRegistry::new();
        registry.register_action("ready", |_: &dyn ExecutionContext, _: &Value, output: &Value| -> Result<ActionResult, ActionError> {
            Ok(ActionResult::Pending(Deferred::resolved(json!(format!("{}!", output.as_str().unwrap_or_default())))))
        });
        let model = ActivityModel::new("wf", vec![step("ready"), step("ready")]);
        let execution = Run::new(
            &model,
            Arc::new(DefaultExecutionContext::new("wf")),
            Arc::new(registry),
            json!("x"),
        )
        .start()
        .unwrap();

        assert!(execution.is_pending());
        assert_eq!(execution.wait().unwrap(), json!("x!!"));
    }

    #[test]
    fn test_already_failed_pending_value() {
        let fixture = Fixture::new();
        let steps = vec![
            step("A"),
            ActionStep::new("fail")
                .with_param("message", "gone")
                .with_param("async", true)
                .into(),
            step("B"),
        ];

        let execution = fixture.start(steps, json!("x")).unwrap();
        assert!(execution.is_pending());
        match execution.wait() {
            Err(WorkflowError::AsyncAction { activity, .. }) => assert_eq!(activity, "fail"),
            other => panic!("expected async failure, got {:?}", other),
        }
        assert_eq!(fixture.log(), vec!["A"]);
    }

    #[test]
    fn test_many_ready_async_hops_do_not_nest() {
        let mut registry = ActionRegistry::new();
        registry.register_action("tick", |_: &dyn ExecutionContext, _: &Value, output: &Value| -> Result<ActionResult, ActionError> {
            Ok(ActionResult::Pending(Deferred::resolved(json!(output.as_u64().unwrap_or(0) + 1))))
        });
        let model = ActivityModel::new("wf", (0..20_000).map(|_| step("tick")).collect());

        let execution = Run::new(
            &model,
            Arc::new(DefaultExecutionContext::new("wf")),
            Arc::new(registry),
            json!(0),
        )
        .start()
        .unwrap();

        assert_eq!(execution.wait().unwrap(), json!(20_000));
    }

    #[test]
    fn test_many_deferred_async_hops() {
        let fixture = Fixture::new();
        let hops = 2_000;
        let execution = fixture
            .start((0..hops).map(|_| step("relay")).collect(), json!(0))
            .unwrap();

        for i in 0..hops {
            let completer = fixture.completers.recv().unwrap();
            completer.resolve(json!(i + 1));
        }

        assert_eq!(execution.wait().unwrap(), json!(hops));
    }

    #[test]
    fn test_sync_failure_after_async_goes_through_handle() {
        let fixture = Fixture::new();
        let steps = vec![
            step("relay"),
            ActionStep::new("fail").with_param("message", "late boom").into(),
            step("D"),
        ];
        let execution = fixture.start(steps, json!("x")).unwrap();
        assert!(execution.is_pending());

        fixture.completers.try_recv().unwrap().resolve(json!("y"));

        match execution.wait() {
            Err(WorkflowError::ActionExecution { activity, .. }) => assert_eq!(activity, "fail"),
            other => panic!("expected action failure, got {:?}", other),
        }
        assert_eq!(fixture.log(), vec!["relay"]);
    }

    #[test]
    fn test_unresolved_action() {
        let fixture = Fixture::new();
        let result = fixture.start(vec![step("A"), step("nope"), step("B")], json!("x"));

        match result {
            Err(WorkflowError::UnresolvedAction { action, .. }) => assert_eq!(action, "nope"),
            other => panic!("expected unresolved action, got {:?}", other),
        }
        assert_eq!(fixture.log(), vec!["A"]);
    }

    #[test]
    fn test_source_stays_fixed() {
        let mut registry = ActionRegistry::new();
        registry.register_action("pair", |_: &dyn ExecutionContext, source: &Value, output: &Value| -> Result<ActionResult, ActionError> {
            Ok(ActionResult::Value(json!({"source": source, "previous": output})))
        });
        let model = ActivityModel::new("wf", vec![step("pair"), step("pair")]);

        let execution = Run::new(
            &model,
            Arc::new(DefaultExecutionContext::new("wf")),
            Arc::new(registry),
            json!("in"),
        )
        .start()
        .unwrap();

        assert_eq!(
            execution.value(),
            Some(&json!({"source": "in", "previous": {"source": "in", "previous": "in"}}))
        );
    }

    #[tokio::test]
    async fn test_async_run_awaited_on_runtime() {
        let fixture = Fixture::new();
        let steps = vec![
            step("A"),
            ActionStep::new("delay").with_param("millis", 10).into(),
            step("B"),
        ];

        let execution = fixture.start(steps, json!("x")).unwrap();
        assert!(execution.is_pending());
        assert_eq!(execution.resolve().await.unwrap(), json!("xAB"));
    }
}
