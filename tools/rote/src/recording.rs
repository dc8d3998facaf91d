use crate::errors::RoteError;
use crate::logging::append_run_log;
use crate::sequence_store::{system_time_unix, SequenceStore};
use crate::types::{Action, NewSequence, Parameters, Sequence};
use serde::Serialize;
use serde_json::json;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
    Idle,
    Recording,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingSession {
    pub sequence_name: String,
    pub description: String,
    pub trigger_pattern: Option<String>,
    pub actions: Vec<Action>,
    pub started_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingStatus {
    pub state: RecordingState,
    pub session: Option<RecordingSession>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoppedRecording {
    pub saved_actions: usize,
    pub sequence: Sequence,
}

/// Holds the single in-progress recording, if any.
#[derive(Debug, Default)]
pub struct Recorder {
    slot: Mutex<Option<RecordingSession>>,
}

pub fn validate_transition(from: RecordingState, to: RecordingState) -> Result<(), RoteError> {
    match (from, to) {
        (RecordingState::Idle, RecordingState::Recording)
        | (RecordingState::Recording, RecordingState::Idle) => Ok(()),
        (RecordingState::Recording, RecordingState::Recording) => {
            Err(RoteError::Validation("illegal transition: Recording -> Recording".to_string()))
        }
        (RecordingState::Idle, RecordingState::Idle) => Err(RoteError::NotRecording),
    }
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<RecordingSession>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> RecordingState {
        if self.lock().is_some() {
            RecordingState::Recording
        } else {
            RecordingState::Idle
        }
    }

    pub fn start(
        &self,
        name: &str,
        description: &str,
        trigger_pattern: Option<&str>,
    ) -> Result<RecordingStatus, RoteError> {
        if name.trim().is_empty() {
            return Err(RoteError::Validation(
                "sequence name must not be empty".to_string(),
            ));
        }
        let mut slot = self.lock();
        if let Some(active) = slot.as_ref() {
            append_run_log(
                "warn",
                "recording.start.rejected",
                json!({ "active": active.sequence_name, "requested": name }),
            );
            return Err(RoteError::AlreadyRecording(active.sequence_name.clone()));
        }
        validate_transition(RecordingState::Idle, RecordingState::Recording)?;

        let session = RecordingSession {
            sequence_name: name.to_string(),
            description: description.to_string(),
            trigger_pattern: trigger_pattern.map(str::to_string),
            actions: Vec::new(),
            started_at: system_time_unix(),
        };
        *slot = Some(session.clone());
        append_run_log(
            "info",
            "recording.started",
            json!({ "name": name, "trigger_pattern": trigger_pattern }),
        );
        Ok(RecordingStatus {
            state: RecordingState::Recording,
            session: Some(session),
        })
    }

    /// Appends a copy of the action when recording; does nothing when idle.
    pub fn record(&self, tool_name: &str, parameters: &Parameters) -> bool {
        let mut slot = self.lock();
        let Some(session) = slot.as_mut() else {
            return false;
        };
        session
            .actions
            .push(Action::new(tool_name, parameters.clone()));
        append_run_log(
            "debug",
            "recording.action_captured",
            json!({
                "name": session.sequence_name,
                "tool_name": tool_name,
                "step": session.actions.len(),
            }),
        );
        true
    }

    /// Saves the captured actions as a sequence. The session survives a failed save.
    pub fn stop(&self, store: &SequenceStore) -> Result<StoppedRecording, RoteError> {
        let mut slot = self.lock();
        let session = slot.as_ref().ok_or(RoteError::NotRecording)?;
        validate_transition(RecordingState::Recording, RecordingState::Idle)?;

        let saved = store.save_sequence(NewSequence {
            name: session.sequence_name.clone(),
            description: session.description.clone(),
            trigger_pattern: session.trigger_pattern.clone(),
            actions: session.actions.clone(),
        });
        let sequence = match saved {
            Ok(sequence) => sequence,
            Err(e) => {
                append_run_log(
                    "error",
                    "recording.stop.save_failed",
                    json!({ "name": session.sequence_name, "error": e.to_string() }),
                );
                return Err(e);
            }
        };
        *slot = None;
        append_run_log(
            "info",
            "recording.stopped",
            json!({ "name": sequence.name, "saved_actions": sequence.actions.len() }),
        );
        Ok(StoppedRecording {
            saved_actions: sequence.actions.len(),
            sequence,
        })
    }

    /// Discards the session without touching the store.
    pub fn cancel(&self) -> Result<RecordingSession, RoteError> {
        let mut slot = self.lock();
        let session = slot.take().ok_or(RoteError::NotRecording)?;
        append_run_log(
            "info",
            "recording.cancelled",
            json!({
                "name": session.sequence_name,
                "discarded_actions": session.actions.len(),
            }),
        );
        Ok(session)
    }

    pub fn status(&self) -> RecordingStatus {
        let session = self.lock().clone();
        RecordingStatus {
            state: if session.is_some() {
                RecordingState::Recording
            } else {
                RecordingState::Idle
            },
            session,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn params(value: Value) -> Parameters {
        value.as_object().cloned().expect("object")
    }

    fn store() -> (SequenceStore, TempDir) {
        let dir = TempDir::new().expect("tempdir");
        let store = SequenceStore::open(dir.path().join("rote.sqlite")).expect("store");
        (store, dir)
    }

    #[test]
    fn record_is_noop_when_idle() {
        let recorder = Recorder::new();
        assert!(!recorder.record("navigate", &params(json!({"url": "https://x.test"}))));
        assert_eq!(recorder.status().state, RecordingState::Idle);
        assert!(recorder.status().session.is_none());
    }

    #[test]
    fn captured_parameters_are_snapshots() {
        let recorder = Recorder::new();
        recorder.start("login", "", None).expect("start");
        let mut live = params(json!({"url": "https://x.test"}));
        assert!(recorder.record("navigate", &live));
        live.insert("url".to_string(), json!("https://mutated.test"));

        let status = recorder.status();
        let session = status.session.expect("session");
        assert_eq!(session.actions[0].parameters["url"], json!("https://x.test"));
    }

    #[test]
    fn second_start_fails_and_keeps_session() {
        let recorder = Recorder::new();
        recorder
            .start("first", "desc", Some("do first"))
            .expect("start");
        recorder.record("press_key", &params(json!({"key": "Tab"})));

        let err = recorder.start("second", "", None).expect_err("must reject");
        assert!(matches!(err, RoteError::AlreadyRecording(name) if name == "first"));

        let session = recorder.status().session.expect("session");
        assert_eq!(session.sequence_name, "first");
        assert_eq!(session.actions.len(), 1);
    }

    #[test]
    fn stop_persists_and_returns_to_idle() {
        let (store, _dir) = store();
        let recorder = Recorder::new();
        recorder
            .start("search", "Search the catalog", Some("find a product"))
            .expect("start");
        recorder.record("navigate", &params(json!({"url": "https://shop.test"})));
        recorder.record(
            "send_keys",
            &params(json!({"by": "id", "value": "q", "text": "{{term}}"})),
        );

        let stopped = recorder.stop(&store).expect("stop");
        assert_eq!(stopped.saved_actions, 2);
        assert_eq!(recorder.state(), RecordingState::Idle);

        let saved = store.get_sequence("search").expect("get").expect("saved");
        assert_eq!(saved.trigger_pattern.as_deref(), Some("find a product"));
        assert_eq!(saved.actions[1].tool_name, "send_keys");
    }

    #[test]
    fn stop_and_cancel_fail_when_idle() {
        let (store, _dir) = store();
        let recorder = Recorder::new();
        assert!(matches!(
            recorder.stop(&store).expect_err("stop idle"),
            RoteError::NotRecording
        ));
        assert!(matches!(
            recorder.cancel().expect_err("cancel idle"),
            RoteError::NotRecording
        ));
    }

    #[test]
    fn cancel_discards_without_touching_store() {
        let (store, _dir) = store();
        let recorder = Recorder::new();
        recorder.start("scratch", "", None).expect("start");
        recorder.record("press_key", &params(json!({"key": "Escape"})));
        let discarded = recorder.cancel().expect("cancel");
        assert_eq!(discarded.actions.len(), 1);
        assert_eq!(recorder.state(), RecordingState::Idle);
        assert!(store.get_sequence("scratch").expect("get").is_none());
    }

    #[test]
    fn empty_name_is_rejected() {
        let recorder = Recorder::new();
        let err = recorder.start(" ", "", None).expect_err("must reject");
        assert!(matches!(err, RoteError::Validation(_)));
        assert_eq!(recorder.state(), RecordingState::Idle);
    }

    #[test]
    fn transition_validator_rejects_self_edges() {
        assert!(validate_transition(RecordingState::Idle, RecordingState::Recording).is_ok());
        assert!(validate_transition(RecordingState::Recording, RecordingState::Idle).is_ok());
        assert!(validate_transition(RecordingState::Recording, RecordingState::Recording).is_err());
        assert!(matches!(
            validate_transition(RecordingState::Idle, RecordingState::Idle),
            Err(RoteError::NotRecording)
        ));
    }
}
