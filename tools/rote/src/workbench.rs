use crate::actions::BrowserAction;
use crate::config::ExecutionConfig;
use crate::driver::BrowserDriver;
use crate::errors::RoteError;
use crate::executor::{RunOutcome, RunningSnapshot, SequenceExecutor};
use crate::logging::append_run_log;
use crate::recording::{Recorder, RecordingSession, RecordingStatus, StoppedRecording};
use crate::sequence_store::SequenceStore;
use crate::substitution::Variables;
use crate::types::{ElementMapping, ExecutionHistoryEntry, NewExecution, Parameters};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Result of one ad-hoc action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformOutcome {
    pub tool_name: String,
    pub output: Value,
    pub recorded: bool,
}

/// Owns every piece of session state: the store, the driver, the recording
/// slot and the running-sequence slot. Share it behind an `Arc` to interrupt
/// a run from another thread.
pub struct Workbench {
    store: SequenceStore,
    driver: Arc<dyn BrowserDriver>,
    recorder: Recorder,
    executor: SequenceExecutor,
    default_timeout_ms: u64,
    history_limit: usize,
}

impl Workbench {
    pub fn new(
        store: SequenceStore,
        driver: Arc<dyn BrowserDriver>,
        execution: &ExecutionConfig,
    ) -> Self {
        Self {
            store,
            driver,
            recorder: Recorder::new(),
            executor: SequenceExecutor::new(execution.default_timeout_ms),
            default_timeout_ms: execution.default_timeout_ms,
            history_limit: execution.history_limit,
        }
    }

    pub fn store(&self) -> &SequenceStore {
        &self.store
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// Performs one action outside any sequence. The attempt is written to
    /// history, and a successful action is captured by an active recording.
    pub fn perform(
        &self,
        tool_name: &str,
        parameters: Parameters,
    ) -> Result<PerformOutcome, RoteError> {
        let result = BrowserAction::parse(tool_name, &parameters, self.default_timeout_ms)
            .and_then(|action| action.execute(self.driver.as_ref()));

        let history = self.store.log_execution(NewExecution {
            sequence_name: None,
            tool_name: tool_name.to_string(),
            parameters: Value::Object(parameters.clone()),
            success: result.is_ok(),
            error_message: result.as_ref().err().map(ToString::to_string),
        });
        if let Err(e) = history {
            append_run_log(
                "error",
                "action.history_write_failed",
                json!({ "tool_name": tool_name, "error": e.to_string() }),
            );
        }

        match result {
            Ok(output) => {
                let recorded = self.recorder.record(tool_name, &parameters);
                append_run_log(
                    "info",
                    "action.performed",
                    json!({ "tool_name": tool_name, "recorded": recorded }),
                );
                Ok(PerformOutcome {
                    tool_name: tool_name.to_string(),
                    output,
                    recorded,
                })
            }
            Err(e) => {
                append_run_log(
                    "warn",
                    "action.failed",
                    json!({ "tool_name": tool_name, "kind": e.kind(), "error": e.to_string() }),
                );
                Err(e)
            }
        }
    }

    pub fn start_recording(
        &self,
        name: &str,
        description: &str,
        trigger_pattern: Option<&str>,
    ) -> Result<RecordingStatus, RoteError> {
        self.recorder.start(name, description, trigger_pattern)
    }

    pub fn stop_recording(&self) -> Result<StoppedRecording, RoteError> {
        self.recorder.stop(&self.store)
    }

    pub fn cancel_recording(&self) -> Result<RecordingSession, RoteError> {
        self.recorder.cancel()
    }

    pub fn recording_status(&self) -> RecordingStatus {
        self.recorder.status()
    }

    /// Runs against the driver directly; steps are never captured by a recording.
    pub fn run_sequence(&self, name: &str, variables: &Variables) -> Result<RunOutcome, RoteError> {
        self.executor
            .run(&self.store, self.driver.as_ref(), name, variables)
    }

    pub fn interrupt_sequence(&self) -> Result<String, RoteError> {
        self.executor.interrupt()
    }

    pub fn running_sequence(&self) -> Option<RunningSnapshot> {
        self.executor.running()
    }

    /// Mappings for `url`, or for the driver's current page when `url` is absent.
    pub fn element_mappings(&self, url: Option<&str>) -> Result<Vec<ElementMapping>, RoteError> {
        let url = self.page_url(url)?;
        self.store.get_element_mappings_for_site(&url)
    }

    pub fn resolve_element(
        &self,
        url: Option<&str>,
        element_name: &str,
    ) -> Result<ElementMapping, RoteError> {
        let url = self.page_url(url)?;
        self.store
            .resolve_element(&url, element_name)?
            .ok_or_else(|| {
                RoteError::NotFound(format!("element mapping '{element_name}' for {url}"))
            })
    }

    pub fn execution_history(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<ExecutionHistoryEntry>, RoteError> {
        self.store
            .get_execution_history(limit.unwrap_or(self.history_limit))
    }

    fn page_url(&self, url: Option<&str>) -> Result<String, RoteError> {
        if let Some(url) = url {
            return Ok(url.to_string());
        }
        self.driver.current_url()?.ok_or_else(|| {
            RoteError::Validation("no url given and the browser has no current page".to_string())
        })
    }
}
