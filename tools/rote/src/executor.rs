use crate::actions::BrowserAction;
use crate::driver::BrowserDriver;
use crate::errors::RoteError;
use crate::logging::append_run_log;
use crate::sequence_store::SequenceStore;
use crate::substitution::{placeholders, substitute_variables, Variables};
use crate::types::{Action, NewExecution, Sequence};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

/// Tool name of the history row written when a run stops on an interrupt.
pub const INTERRUPTED_TOOL_NAME: &str = "INTERRUPTED";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    pub step: usize,
    pub tool_name: String,
    pub success: bool,
    pub output: Value,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    pub sequence_name: String,
    pub status: RunStatus,
    pub completed_steps: usize,
    pub total_steps: usize,
    pub failed_step: Option<usize>,
    pub error: Option<String>,
    pub results: Vec<StepResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunningSnapshot {
    pub sequence_name: String,
    pub interrupt_requested: bool,
}

#[derive(Debug)]
struct RunningSequence {
    name: String,
    token: CancellationToken,
}

/// Replays stored sequences one at a time.
#[derive(Debug)]
pub struct SequenceExecutor {
    running: Mutex<Option<RunningSequence>>,
    default_timeout_ms: u64,
}

// Clears the running marker however the run ends.
struct RunGuard<'a> {
    slot: &'a Mutex<Option<RunningSequence>>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl SequenceExecutor {
    pub fn new(default_timeout_ms: u64) -> Self {
        Self {
            running: Mutex::new(None),
            default_timeout_ms,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<RunningSequence>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn running(&self) -> Option<RunningSnapshot> {
        self.lock().as_ref().map(|running| RunningSnapshot {
            sequence_name: running.name.clone(),
            interrupt_requested: running.token.is_cancelled(),
        })
    }

    /// Runs `name` with a fresh cancellation token.
    pub fn run(
        &self,
        store: &SequenceStore,
        driver: &dyn BrowserDriver,
        name: &str,
        variables: &Variables,
    ) -> Result<RunOutcome, RoteError> {
        self.run_with_token(store, driver, name, variables, CancellationToken::new())
    }

    /// Runs `name`, stopping at the next step boundary once `token` is cancelled.
    /// Callers outside this module go through [`Self::run`], so every run
    /// starts with an uncancelled token.
    ///
    /// Step failures are reported through [`RunOutcome`]; `Err` is reserved for
    /// a run that never started.
    fn run_with_token(
        &self,
        store: &SequenceStore,
        driver: &dyn BrowserDriver,
        name: &str,
        variables: &Variables,
        token: CancellationToken,
    ) -> Result<RunOutcome, RoteError> {
        let sequence = store
            .get_sequence(name)?
            .ok_or_else(|| RoteError::NotFound(format!("sequence '{name}'")))?;
        let _guard = self.claim(&sequence.name, token.clone())?;

        append_run_log(
            "info",
            "sequence.run.started",
            json!({
                "name": sequence.name,
                "total_steps": sequence.actions.len(),
                "variables": variables.keys().collect::<Vec<_>>(),
            }),
        );
        let unbound = sequence
            .actions
            .iter()
            .flat_map(|action| placeholders(&action.parameters))
            .filter(|placeholder| !variables.contains_key(placeholder))
            .collect::<BTreeSet<_>>();
        if !unbound.is_empty() {
            append_run_log(
                "warn",
                "sequence.run.unbound_placeholders",
                json!({ "name": sequence.name, "placeholders": unbound }),
            );
        }
        let outcome = self.run_steps(store, driver, &sequence, variables, &token);
        append_run_log(
            if outcome.status == RunStatus::Completed {
                "info"
            } else {
                "warn"
            },
            "sequence.run.finished",
            json!({
                "name": outcome.sequence_name,
                "status": outcome.status,
                "completed_steps": outcome.completed_steps,
                "total_steps": outcome.total_steps,
                "failed_step": outcome.failed_step,
            }),
        );
        Ok(outcome)
    }

    /// Requests the active run to stop before its next step. Returns the sequence name.
    pub fn interrupt(&self) -> Result<String, RoteError> {
        let slot = self.lock();
        let running = slot.as_ref().ok_or(RoteError::NotRunning)?;
        running.token.cancel();
        append_run_log(
            "info",
            "sequence.run.interrupt_requested",
            json!({ "name": running.name }),
        );
        Ok(running.name.clone())
    }

    fn claim(&self, name: &str, token: CancellationToken) -> Result<RunGuard<'_>, RoteError> {
        let mut slot = self.lock();
        if let Some(active) = slot.as_ref() {
            append_run_log(
                "warn",
                "sequence.run.rejected",
                json!({ "active": active.name, "requested": name }),
            );
            return Err(RoteError::AlreadyRunning(active.name.clone()));
        }
        *slot = Some(RunningSequence {
            name: name.to_string(),
            token,
        });
        Ok(RunGuard {
            slot: &self.running,
        })
    }

    fn run_steps(
        &self,
        store: &SequenceStore,
        driver: &dyn BrowserDriver,
        sequence: &Sequence,
        variables: &Variables,
        token: &CancellationToken,
    ) -> RunOutcome {
        let total_steps = sequence.actions.len();
        let mut outcome = RunOutcome {
            sequence_name: sequence.name.clone(),
            status: RunStatus::Completed,
            completed_steps: 0,
            total_steps,
            failed_step: None,
            error: None,
            results: Vec::with_capacity(total_steps),
        };

        for (idx, action) in sequence.actions.iter().enumerate() {
            let step = idx + 1;
            if token.is_cancelled() {
                let completed = outcome.completed_steps;
                let message = format!("interrupted after {completed} of {total_steps} steps");
                append_history(
                    store,
                    NewExecution {
                        sequence_name: Some(sequence.name.clone()),
                        tool_name: INTERRUPTED_TOOL_NAME.to_string(),
                        parameters: json!({
                            "completed_steps": completed,
                            "total_steps": total_steps,
                        }),
                        success: false,
                        error_message: Some(message.clone()),
                    },
                );
                append_run_log(
                    "warn",
                    "sequence.run.interrupted",
                    json!({ "name": sequence.name, "before_step": step, "completed_steps": completed }),
                );
                outcome.status = RunStatus::Interrupted;
                outcome.error = Some(message);
                return outcome;
            }

            let (parameters, result) = self.dispatch(driver, action, variables);
            match result {
                Ok(output) => {
                    append_history(
                        store,
                        NewExecution {
                            sequence_name: Some(sequence.name.clone()),
                            tool_name: action.tool_name.clone(),
                            parameters,
                            success: true,
                            error_message: None,
                        },
                    );
                    append_run_log(
                        "debug",
                        "sequence.run.step_completed",
                        json!({ "name": sequence.name, "step": step, "tool_name": action.tool_name }),
                    );
                    outcome.completed_steps += 1;
                    outcome.results.push(StepResult {
                        step,
                        tool_name: action.tool_name.clone(),
                        success: true,
                        output,
                        error: None,
                    });
                }
                Err(e) => {
                    let failure = RoteError::StepFailure {
                        step,
                        tool_name: action.tool_name.clone(),
                        message: e.to_string(),
                    };
                    append_history(
                        store,
                        NewExecution {
                            sequence_name: Some(sequence.name.clone()),
                            tool_name: action.tool_name.clone(),
                            parameters,
                            success: false,
                            error_message: Some(e.to_string()),
                        },
                    );
                    append_run_log(
                        "warn",
                        "sequence.run.step_failed",
                        json!({
                            "name": sequence.name,
                            "step": step,
                            "tool_name": action.tool_name,
                            "kind": e.kind(),
                            "error": e.to_string(),
                        }),
                    );
                    outcome.results.push(StepResult {
                        step,
                        tool_name: action.tool_name.clone(),
                        success: false,
                        output: Value::Null,
                        error: Some(e.to_string()),
                    });
                    outcome.status = RunStatus::Failed;
                    outcome.failed_step = Some(step);
                    outcome.error = Some(failure.to_string());
                    return outcome;
                }
            }
        }

        outcome
    }

    /// Returns the parameters as dispatched (substituted when possible) with the result.
    fn dispatch(
        &self,
        driver: &dyn BrowserDriver,
        action: &Action,
        variables: &Variables,
    ) -> (Value, Result<Value, RoteError>) {
        let parameters = match substitute_variables(&action.parameters, variables) {
            Ok(parameters) => parameters,
            Err(e) => return (Value::Object(action.parameters.clone()), Err(e)),
        };
        let result = BrowserAction::parse(&action.tool_name, &parameters, self.default_timeout_ms)
            .and_then(|browser_action| browser_action.execute(driver));
        (Value::Object(parameters), result)
    }
}

fn append_history(store: &SequenceStore, entry: NewExecution) {
    let name = entry.sequence_name.clone();
    let tool_name = entry.tool_name.clone();
    if let Err(e) = store.log_execution(entry) {
        append_run_log(
            "error",
            "sequence.run.history_write_failed",
            json!({ "name": name, "tool_name": tool_name, "error": e.to_string() }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::FakeDriver;
    use crate::types::{NewSequence, Parameters};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn params(value: Value) -> Parameters {
        value.as_object().cloned().expect("object")
    }

    fn store_with(actions: Vec<(&str, Value)>) -> (SequenceStore, TempDir) {
        let dir = TempDir::new().expect("tempdir");
        let store = SequenceStore::open(dir.path().join("rote.sqlite")).expect("store");
        store
            .save_sequence(NewSequence {
                name: "login".to_string(),
                description: "log in".to_string(),
                trigger_pattern: None,
                actions: actions
                    .into_iter()
                    .map(|(tool, value)| Action::new(tool, params(value)))
                    .collect(),
            })
            .expect("save");
        (store, dir)
    }

    fn login_steps() -> Vec<(&'static str, Value)> {
        vec![
            ("navigate", json!({"url": "https://x.test"})),
            (
                "send_keys",
                json!({"by": "name", "value": "user", "text": "{{u}}"}),
            ),
            ("click_element", json!({"by": "id", "value": "go"})),
        ]
    }

    fn vars(value: Value) -> Variables {
        serde_json::from_value(value).expect("vars")
    }

    #[test]
    fn substitutes_variables_before_dispatch() {
        let (store, _dir) = store_with(login_steps());
        let driver = FakeDriver::new();
        let executor = SequenceExecutor::new(1000);

        let outcome = executor
            .run(&store, &driver, "login", &vars(json!({"u": "alice"})))
            .expect("run");

        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.completed_steps, 3);
        assert_eq!(driver.calls()[1].detail, "name=user <- alice");
        assert!(executor.running().is_none());

        let history = store.get_execution_history(10).expect("history");
        assert_eq!(history.len(), 3);
        assert_eq!(history[1].parameters["text"], json!("alice"));
        assert!(history.iter().all(|entry| entry.success));
    }

    #[test]
    fn failing_step_stops_the_run() {
        let (store, _dir) = store_with(login_steps());
        let driver = FakeDriver::new();
        driver.fail_call(1, "no such element");
        let executor = SequenceExecutor::new(1000);

        let outcome = executor
            .run(&store, &driver, "login", &vars(json!({"u": "alice"})))
            .expect("run");

        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(outcome.completed_steps, 1);
        assert_eq!(outcome.failed_step, Some(2));
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(driver.call_count(), 2);

        let history = store.get_execution_history(10).expect("history");
        assert_eq!(history.len(), 2);
        assert!(!history[0].success);
        assert!(history[0]
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("no such element")));
        assert!(history[1].success);
        assert!(executor.running().is_none());
    }

    #[test]
    fn unknown_tool_fails_like_any_step() {
        let (store, _dir) = store_with(vec![
            ("navigate", json!({"url": "https://x.test"})),
            ("take_screenshot", json!({})),
            ("press_key", json!({"key": "Enter"})),
        ]);
        let driver = FakeDriver::new();
        let outcome = SequenceExecutor::new(1000)
            .run(&store, &driver, "login", &Variables::new())
            .expect("run");
        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(outcome.failed_step, Some(2));
        assert!(outcome
            .error
            .as_deref()
            .is_some_and(|m| m.contains("unknown action: take_screenshot")));
        assert_eq!(driver.call_count(), 1);
    }

    #[test]
    fn missing_sequence_is_not_found() {
        let (store, _dir) = store_with(login_steps());
        let err = SequenceExecutor::new(1000)
            .run(&store, &FakeDriver::new(), "nope", &Variables::new())
            .expect_err("must fail");
        assert!(matches!(err, RoteError::NotFound(_)));
    }

    #[test]
    fn interrupt_without_run_fails() {
        let executor = SequenceExecutor::new(1000);
        assert!(matches!(
            executor.interrupt().expect_err("idle"),
            RoteError::NotRunning
        ));
    }

    #[test]
    fn interrupt_lands_between_steps() {
        let (store, _dir) = store_with(login_steps());
        let executor = Arc::new(SequenceExecutor::new(1000));
        let driver = FakeDriver::new();
        let hook_executor = Arc::clone(&executor);
        driver.on_call(move |index| {
            if index == 1 {
                hook_executor.interrupt().expect("interrupt mid-run");
            }
        });

        let outcome = executor
            .run(&store, &driver, "login", &vars(json!({"u": "bob"})))
            .expect("run");

        assert_eq!(outcome.status, RunStatus::Interrupted);
        assert_eq!(outcome.completed_steps, 2);
        assert_eq!(driver.call_count(), 2);
        assert!(executor.running().is_none());

        let history = store.get_execution_history(10).expect("history");
        assert_eq!(history[0].tool_name, INTERRUPTED_TOOL_NAME);
        assert_eq!(history[0].parameters["completed_steps"], json!(2));
        assert!(!history[0].success);
    }

    #[test]
    fn cancelled_token_stops_before_first_step() {
        let (store, _dir) = store_with(login_steps());
        let driver = FakeDriver::new();
        let token = CancellationToken::new();
        token.cancel();
        let outcome = SequenceExecutor::new(1000)
            .run_with_token(&store, &driver, "login", &Variables::new(), token)
            .expect("run");
        assert_eq!(outcome.status, RunStatus::Interrupted);
        assert_eq!(outcome.completed_steps, 0);
        assert_eq!(driver.call_count(), 0);
    }

    #[test]
    fn interrupt_between_runs_does_not_reach_next_run() {
        let (store, _dir) = store_with(login_steps());
        let executor = SequenceExecutor::new(1000);
        let driver = FakeDriver::new();
        let first = executor
            .run(&store, &driver, "login", &Variables::new())
            .expect("first run");
        assert_eq!(first.status, RunStatus::Completed);

        assert!(matches!(
            executor.interrupt().expect_err("nothing running"),
            RoteError::NotRunning
        ));

        let second = executor
            .run(&store, &driver, "login", &Variables::new())
            .expect("second run");
        assert_eq!(second.status, RunStatus::Completed);
        assert_eq!(second.completed_steps, login_steps().len());
    }

    #[test]
    fn second_run_is_rejected_while_first_is_active() {
        let (store, _dir) = store_with(login_steps());
        let executor = Arc::new(SequenceExecutor::new(1000));
        let driver = FakeDriver::new();
        let hook_executor = Arc::clone(&executor);
        let nested = Arc::new(Mutex::new(None));
        let nested_slot = Arc::clone(&nested);
        driver.on_call(move |index| {
            if index == 0 {
                let snapshot = hook_executor.running();
                *nested_slot.lock().expect("nested lock") = snapshot;
            }
        });

        let outcome = executor
            .run(&store, &driver, "login", &Variables::new())
            .expect("run");
        assert_eq!(outcome.status, RunStatus::Completed);

        let seen = nested.lock().expect("nested lock").clone().expect("marker set");
        assert_eq!(seen.sequence_name, "login");
        assert!(!seen.interrupt_requested);

        let _guard = executor
            .claim("login", CancellationToken::new())
            .expect("claim");
        let err = executor
            .run(&store, &driver, "login", &Variables::new())
            .expect_err("already running");
        assert!(matches!(err, RoteError::AlreadyRunning(name) if name == "login"));
    }
}
