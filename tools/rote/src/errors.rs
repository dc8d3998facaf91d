use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoteError {
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("cli error: {0}")]
    Cli(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("driver error: {0}")]
    Driver(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already recording sequence '{0}'")]
    AlreadyRecording(String),
    #[error("no recording in progress")]
    NotRecording,
    #[error("sequence '{0}' is already running")]
    AlreadyRunning(String),
    #[error("no sequence is running")]
    NotRunning,
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("step {step} ({tool_name}) failed: {message}")]
    StepFailure {
        step: usize,
        tool_name: String,
        message: String,
    },
}

impl RoteError {
    /// Stable snake_case tag reported alongside tool responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::ConfigParse(_) => "config_parse",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Cli(_) => "cli",
            Self::Database(_) => "database",
            Self::Driver(_) => "driver",
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::AlreadyRecording(_) => "already_recording",
            Self::NotRecording => "not_recording",
            Self::AlreadyRunning(_) => "already_running",
            Self::NotRunning => "not_running",
            Self::UnknownAction(_) => "unknown_action",
            Self::StepFailure { .. } => "step_failure",
        }
    }
}
