use crate::errors::RoteError;
use crate::log_retention::enforce_total_budget;
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock, PoisonError};

pub const DEFAULT_DISK_BUDGET_BYTES: u64 = 50 * 1024 * 1024;
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JsonlLogger {
    pub path: PathBuf,
    pub max_payload_bytes: usize,
    pub budget_bytes: u64,
    pub min_level: LogLevel,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent<'a> {
    pub level: &'a str,
    pub event_type: &'a str,
    pub payload: Value,
}

impl JsonlLogger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            budget_bytes: DEFAULT_DISK_BUDGET_BYTES,
            min_level: LogLevel::Info,
        }
    }

    pub fn enabled(&self, level: &str) -> bool {
        // Unrecognized levels are always written.
        LogLevel::parse(level).map_or(true, |level| level >= self.min_level)
    }

    pub fn append(&self, event: &LogEvent<'_>) -> Result<(), RoteError> {
        if !self.enabled(event.level) {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| RoteError::Io(e.to_string()))?;
        }
        let truncated = truncate_json(event.payload.clone(), self.max_payload_bytes);
        let line = serde_json::to_string(&LogEvent {
            level: event.level,
            event_type: event.event_type,
            payload: truncated,
        })
        .map_err(|e| RoteError::Io(e.to_string()))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| RoteError::Io(e.to_string()))?;
        file.write_all(line.as_bytes())
            .map_err(|e| RoteError::Io(e.to_string()))?;
        file.write_all(b"\n")
            .map_err(|e| RoteError::Io(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            let _ = enforce_total_budget(parent, self.budget_bytes, &self.path)?;
        }

        Ok(())
    }
}

static RUN_LOGGER: OnceLock<Mutex<Option<JsonlLogger>>> = OnceLock::new();

fn logger_slot() -> &'static Mutex<Option<JsonlLogger>> {
    RUN_LOGGER.get_or_init(|| Mutex::new(None))
}

/// Install the process-wide run logger. Until this is called `append_run_log` is a no-op.
pub fn init_run_logger(logger: JsonlLogger) {
    *logger_slot().lock().unwrap_or_else(PoisonError::into_inner) = Some(logger);
}

pub fn clear_run_logger() {
    *logger_slot().lock().unwrap_or_else(PoisonError::into_inner) = None;
}

/// Append one structured event to the run log. Logging failures never surface to callers.
pub fn append_run_log(level: &str, event_type: &str, payload: Value) {
    let logger = logger_slot()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    if let Some(logger) = logger {
        let _ = logger.append(&LogEvent {
            level,
            event_type,
            payload,
        });
    }
}

pub fn structured_fallback_line(scope: &str, state: &str, message: &str) -> String {
    format!(
        "scope={scope} state={state} message={} ",
        message.replace('\n', "\\n")
    )
}

fn truncate_json(value: Value, max_bytes: usize) -> Value {
    let rendered = serde_json::to_string(&value).unwrap_or_default();
    if rendered.len() <= max_bytes {
        return value;
    }
    let mut cut = max_bytes.saturating_sub(3);
    while cut > 0 && !rendered.is_char_boundary(cut) {
        cut -= 1;
    }
    Value::String(format!("{}...", &rendered[..cut]))
}

#[cfg(test)]
mod tests {
    use super::{structured_fallback_line, JsonlLogger, LogEvent, LogLevel};
    use serde_json::json;

    #[test]
    fn logger_truncates_large_payloads_and_writes_jsonl() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("run.jsonl");
        let mut logger = JsonlLogger::new(&path);
        logger.max_payload_bytes = 20;
        logger.budget_bytes = 1024;

        logger
            .append(&LogEvent {
                level: "info",
                event_type: "sequence.saved",
                payload: json!({"name": "abcdefghijklmnopqrstuvwxyz"}),
            })
            .expect("append");

        let text = std::fs::read_to_string(&path).expect("read");
        assert!(text.contains("\"event_type\":\"sequence.saved\""));
        assert!(text.contains("..."));
    }

    #[test]
    fn events_below_min_level_are_dropped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("run.jsonl");
        let mut logger = JsonlLogger::new(&path);
        logger.min_level = LogLevel::Warn;

        logger
            .append(&LogEvent {
                level: "debug",
                event_type: "store.read",
                payload: json!({}),
            })
            .expect("append debug");
        logger
            .append(&LogEvent {
                level: "error",
                event_type: "sequence.run.step_failed",
                payload: json!({"step": 2}),
            })
            .expect("append error");

        let text = std::fs::read_to_string(&path).expect("read");
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("step_failed"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let value = super::truncate_json(json!({"text": "ééééééééééé"}), 12);
        let rendered = value.as_str().expect("string").to_string();
        assert!(rendered.ends_with("..."));
    }

    #[test]
    fn fallback_line_is_deterministic() {
        let line = structured_fallback_line("run", "failed", "hello\nworld");
        assert_eq!(line, "scope=run state=failed message=hello\\nworld ");
    }
}
