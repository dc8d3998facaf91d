//! Tool-call surface: one serde-tagged request per operation, answered with a
//! [`ToolResponse`]. Errors never escape `handle`; they become `ok: false`
//! responses carrying the error kind.

use crate::errors::RoteError;
use crate::executor::RunStatus;
use crate::logging::append_run_log;
use crate::substitution::Variables;
use crate::types::{LocatorBy, NewElementMapping, NewSequence, Parameters};
use crate::workbench::Workbench;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum ToolRequest {
    StartRecording {
        name: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        trigger_pattern: Option<String>,
    },
    StopRecording,
    CancelRecording,
    RecordingStatus,
    SaveSequence(NewSequence),
    ListSequences,
    GetSequence {
        name: String,
    },
    SearchSequences {
        query: String,
    },
    DeleteSequence {
        name: String,
    },
    RunSequence {
        name: String,
        #[serde(default)]
        variables: Variables,
    },
    InterruptSequence,
    SaveElementMapping {
        site_pattern: String,
        element_name: String,
        locator_by: String,
        locator_value: String,
        #[serde(default)]
        description: Option<String>,
    },
    GetElementMappings {
        #[serde(default)]
        url: Option<String>,
    },
    ResolveElement {
        element_name: String,
        #[serde(default)]
        url: Option<String>,
    },
    GetExecutionHistory {
        #[serde(default)]
        limit: Option<usize>,
    },
    Perform {
        tool_name: String,
        #[serde(default)]
        parameters: Parameters,
    },
}

impl ToolRequest {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartRecording { .. } => "start_recording",
            Self::StopRecording => "stop_recording",
            Self::CancelRecording => "cancel_recording",
            Self::RecordingStatus => "recording_status",
            Self::SaveSequence(_) => "save_sequence",
            Self::ListSequences => "list_sequences",
            Self::GetSequence { .. } => "get_sequence",
            Self::SearchSequences { .. } => "search_sequences",
            Self::DeleteSequence { .. } => "delete_sequence",
            Self::RunSequence { .. } => "run_sequence",
            Self::InterruptSequence => "interrupt_sequence",
            Self::SaveElementMapping { .. } => "save_element_mapping",
            Self::GetElementMappings { .. } => "get_element_mappings",
            Self::ResolveElement { .. } => "resolve_element",
            Self::GetExecutionHistory { .. } => "get_execution_history",
            Self::Perform { .. } => "perform",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResponse {
    pub ok: bool,
    pub message: String,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl ToolResponse {
    pub fn success(message: impl Into<String>, data: Value) -> Self {
        Self {
            ok: true,
            message: message.into(),
            data,
            error_kind: None,
        }
    }

    pub fn failure(error: &RoteError) -> Self {
        Self {
            ok: false,
            message: error.to_string(),
            data: Value::Null,
            error_kind: Some(error.kind().to_string()),
        }
    }
}

fn to_data(value: impl Serialize) -> Result<Value, RoteError> {
    serde_json::to_value(value).map_err(|e| RoteError::Io(e.to_string()))
}

impl Workbench {
    pub fn handle(&self, request: ToolRequest) -> ToolResponse {
        let tool = request.name();
        append_run_log("debug", "tool.call", json!({ "tool": tool }));
        let response = self
            .dispatch_tool(request)
            .unwrap_or_else(|e| ToolResponse::failure(&e));
        append_run_log(
            if response.ok { "info" } else { "warn" },
            "tool.result",
            json!({
                "tool": tool,
                "ok": response.ok,
                "error_kind": response.error_kind,
                "message": response.message,
            }),
        );
        response
    }

    fn dispatch_tool(&self, request: ToolRequest) -> Result<ToolResponse, RoteError> {
        let response = match request {
            ToolRequest::StartRecording {
                name,
                description,
                trigger_pattern,
            } => {
                let status =
                    self.start_recording(&name, &description, trigger_pattern.as_deref())?;
                ToolResponse::success(format!("Recording '{name}'"), to_data(status)?)
            }
            ToolRequest::StopRecording => {
                let stopped = self.stop_recording()?;
                ToolResponse::success(
                    format!(
                        "Saved sequence '{}' with {} action(s)",
                        stopped.sequence.name, stopped.saved_actions
                    ),
                    to_data(stopped)?,
                )
            }
            ToolRequest::CancelRecording => {
                let session = self.cancel_recording()?;
                ToolResponse::success(
                    format!(
                        "Discarded recording '{}' ({} action(s))",
                        session.sequence_name,
                        session.actions.len()
                    ),
                    to_data(session)?,
                )
            }
            ToolRequest::RecordingStatus => {
                let status = self.recording_status();
                let message = match &status.session {
                    Some(session) => format!(
                        "Recording '{}' ({} action(s) so far)",
                        session.sequence_name,
                        session.actions.len()
                    ),
                    None => "Not recording".to_string(),
                };
                ToolResponse::success(message, to_data(status)?)
            }
            ToolRequest::SaveSequence(sequence) => {
                let saved = self.store().save_sequence(sequence)?;
                ToolResponse::success(
                    format!(
                        "Saved sequence '{}' with {} action(s)",
                        saved.name,
                        saved.actions.len()
                    ),
                    to_data(saved)?,
                )
            }
            ToolRequest::ListSequences => {
                let sequences = self.store().list_sequences()?;
                ToolResponse::success(
                    format!("{} sequence(s)", sequences.len()),
                    to_data(sequences)?,
                )
            }
            ToolRequest::GetSequence { name } => {
                let sequence = self
                    .store()
                    .get_sequence(&name)?
                    .ok_or_else(|| RoteError::NotFound(format!("sequence '{name}'")))?;
                ToolResponse::success(
                    format!(
                        "Sequence '{}' has {} action(s)",
                        sequence.name,
                        sequence.actions.len()
                    ),
                    to_data(sequence)?,
                )
            }
            ToolRequest::SearchSequences { query } => {
                let found = self.store().search_sequences(&query)?;
                ToolResponse::success(
                    format!("{} sequence(s) match '{query}'", found.len()),
                    to_data(found)?,
                )
            }
            ToolRequest::DeleteSequence { name } => {
                if !self.store().delete_sequence(&name)? {
                    return Err(RoteError::NotFound(format!("sequence '{name}'")));
                }
                ToolResponse::success(
                    format!("Deleted sequence '{name}'"),
                    json!({ "name": name, "deleted": true }),
                )
            }
            ToolRequest::RunSequence { name, variables } => {
                let outcome = self.run_sequence(&name, &variables)?;
                let (ok, message, error_kind) = match outcome.status {
                    RunStatus::Completed => (
                        true,
                        format!(
                            "Sequence '{name}' completed {} step(s)",
                            outcome.completed_steps
                        ),
                        None,
                    ),
                    RunStatus::Interrupted => (
                        true,
                        format!(
                            "Sequence '{name}' interrupted after {} of {} step(s)",
                            outcome.completed_steps, outcome.total_steps
                        ),
                        None,
                    ),
                    RunStatus::Failed => (
                        false,
                        outcome
                            .error
                            .clone()
                            .unwrap_or_else(|| format!("Sequence '{name}' failed")),
                        Some("step_failure".to_string()),
                    ),
                };
                ToolResponse {
                    ok,
                    message,
                    data: to_data(outcome)?,
                    error_kind,
                }
            }
            ToolRequest::InterruptSequence => {
                let name = self.interrupt_sequence()?;
                ToolResponse::success(
                    format!("Interrupt requested for '{name}'; it stops before its next step"),
                    json!({ "name": name }),
                )
            }
            ToolRequest::SaveElementMapping {
                site_pattern,
                element_name,
                locator_by,
                locator_value,
                description,
            } => {
                let by = LocatorBy::parse(&locator_by).ok_or_else(|| {
                    RoteError::Validation(format!("unknown locator strategy '{locator_by}'"))
                })?;
                let saved = self.store().save_element_mapping(NewElementMapping {
                    site_pattern,
                    element_name,
                    locator_by: by,
                    locator_value,
                    description,
                })?;
                ToolResponse::success(
                    format!(
                        "Mapped '{}' to {} on {}",
                        saved.element_name,
                        saved.locator(),
                        saved.site_pattern
                    ),
                    to_data(saved)?,
                )
            }
            ToolRequest::GetElementMappings { url } => {
                let mappings = self.element_mappings(url.as_deref())?;
                ToolResponse::success(
                    format!("{} mapping(s)", mappings.len()),
                    to_data(mappings)?,
                )
            }
            ToolRequest::ResolveElement { element_name, url } => {
                let mapping = self.resolve_element(url.as_deref(), &element_name)?;
                ToolResponse::success(
                    format!("'{element_name}' is {}", mapping.locator()),
                    to_data(mapping)?,
                )
            }
            ToolRequest::GetExecutionHistory { limit } => {
                let entries = self.execution_history(limit)?;
                ToolResponse::success(
                    format!("{} history entr(ies)", entries.len()),
                    to_data(entries)?,
                )
            }
            ToolRequest::Perform {
                tool_name,
                parameters,
            } => {
                let outcome = self.perform(&tool_name, parameters)?;
                ToolResponse::success(format!("Performed {tool_name}"), to_data(outcome)?)
            }
        };
        Ok(response)
    }
}
