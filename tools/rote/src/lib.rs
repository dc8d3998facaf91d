pub mod actions;
pub mod config;
pub mod driver;
pub mod errors;
pub mod executor;
pub mod log_retention;
pub mod logging;
pub mod recording;
pub mod runtime;
pub mod sequence_store;
pub mod site_matcher;
pub mod substitution;
pub mod tools;
pub mod types;
pub mod workbench;

use clap::{error::ErrorKind, Parser, Subcommand};
use config::{load_config, AppConfig, CliOverrides};
use driver::DryRunDriver;
use errors::RoteError;
use logging::{
    append_run_log, clear_run_logger, init_run_logger, structured_fallback_line, JsonlLogger,
    LogLevel,
};
use runtime::ProductionRuntime;
use sequence_store::SequenceStore;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use substitution::Variables;
use tools::{ToolRequest, ToolResponse};
use types::NewSequence;
use workbench::Workbench;

#[derive(Debug, Clone, Parser)]
#[command(name = "rote")]
#[command(about = "Record, store and replay browser action sequences")]
pub struct Cli {
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,
    #[arg(long, global = true)]
    pub log_level: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List stored sequences, most recently updated first
    List,
    /// Show one sequence with its actions
    Show { name: String },
    /// Case-insensitive search over name, description and trigger phrase
    Search { query: String },
    Delete { name: String },
    /// Save a sequence from a JSON file
    Import { file: PathBuf },
    /// Write a stored sequence to a JSON file that `import` accepts
    Export { name: String, file: PathBuf },
    /// Replay a sequence against the dry-run driver
    Run {
        name: String,
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,
    },
    /// Save a friendly element name for a site pattern
    Map {
        site: String,
        name: String,
        by: String,
        value: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Element mappings whose site pattern matches a URL
    Mappings { url: String },
    History {
        #[arg(long)]
        limit: Option<usize>,
    },
}

pub fn run() -> Result<i32, RoteError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let cwd = std::env::current_dir().map_err(|e| RoteError::Io(e.to_string()))?;
    let runtime = ProductionRuntime::new();
    run_with_runtime(&args, &cwd, &runtime)
}

pub fn run_with_runtime(
    args: &[std::ffi::OsString],
    cwd: &Path,
    runtime: &ProductionRuntime,
) -> Result<i32, RoteError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(RoteError::Cli(error.to_string())),
        },
    };

    let overrides = CliOverrides {
        config_path: cli.config.clone(),
        store_path: cli.store.clone(),
        log_level: cli.log_level.clone(),
    };
    let cfg = load_config(&overrides, cwd, runtime.file_system.as_ref())?;
    install_run_logger(&cfg);
    let result = execute_command(&cli.command, &cfg, runtime);
    append_run_log(
        "info",
        "cli.finish",
        json!({
            "exit_code": result.as_ref().ok(),
            "error": result.as_ref().err().map(ToString::to_string),
        }),
    );
    clear_run_logger();
    result
}

fn execute_command(
    command: &Command,
    cfg: &AppConfig,
    runtime: &ProductionRuntime,
) -> Result<i32, RoteError> {
    append_run_log(
        "info",
        "cli.start",
        json!({
            "command": format!("{command:?}"),
            "store": cfg.store.path.display().to_string(),
        }),
    );

    if let Command::Export { name, file } = command {
        let store = SequenceStore::open(&cfg.store.path)?;
        return export_sequence(runtime, &store, name, file);
    }

    let request = build_request(command, runtime)?;
    let store = SequenceStore::open(&cfg.store.path)?;
    let workbench = Workbench::new(store, Arc::new(DryRunDriver::new()), &cfg.execution);
    let response = workbench.handle(request);
    render_response(runtime, &response)?;
    Ok(if response.ok { 0 } else { 1 })
}

fn install_run_logger(cfg: &AppConfig) {
    let mut logger = JsonlLogger::new(&cfg.logging.path);
    logger.max_payload_bytes = cfg.logging.max_payload_bytes;
    logger.budget_bytes = cfg.logging.budget_bytes;
    logger.min_level = LogLevel::parse(&cfg.logging.level).unwrap_or(LogLevel::Info);
    init_run_logger(logger);
}

fn build_request(command: &Command, runtime: &ProductionRuntime) -> Result<ToolRequest, RoteError> {
    let request = match command {
        Command::List => ToolRequest::ListSequences,
        Command::Show { name } => ToolRequest::GetSequence { name: name.clone() },
        Command::Search { query } => ToolRequest::SearchSequences {
            query: query.clone(),
        },
        Command::Delete { name } => ToolRequest::DeleteSequence { name: name.clone() },
        Command::Import { file } => {
            if !runtime.file_system.exists(file) {
                return Err(RoteError::NotFound(format!(
                    "sequence file {}",
                    file.display()
                )));
            }
            let raw = runtime.file_system.read_to_string(file)?;
            let sequence: NewSequence = serde_json::from_str(&raw).map_err(|e| {
                RoteError::Validation(format!("{} is not a sequence: {e}", file.display()))
            })?;
            ToolRequest::SaveSequence(sequence)
        }
        Command::Run { name, vars } => ToolRequest::RunSequence {
            name: name.clone(),
            variables: parse_vars(vars)?,
        },
        Command::Map {
            site,
            name,
            by,
            value,
            description,
        } => ToolRequest::SaveElementMapping {
            site_pattern: site.clone(),
            element_name: name.clone(),
            locator_by: by.clone(),
            locator_value: value.clone(),
            description: description.clone(),
        },
        Command::Mappings { url } => ToolRequest::GetElementMappings {
            url: Some(url.clone()),
        },
        Command::History { limit } => ToolRequest::GetExecutionHistory { limit: *limit },
        Command::Export { .. } => {
            return Err(RoteError::Cli("export is not a tool request".to_string()))
        }
    };
    Ok(request)
}

/// Parses `KEY=VALUE` pairs. Values that are valid JSON keep their type; anything else is a string.
pub fn parse_vars(pairs: &[String]) -> Result<Variables, RoteError> {
    let mut variables = Variables::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| RoteError::Cli(format!("--var expects KEY=VALUE, got '{pair}'")))?;
        if key.is_empty() {
            return Err(RoteError::Cli(format!("--var has an empty key in '{pair}'")));
        }
        let value = serde_json::from_str::<Value>(raw)
            .unwrap_or_else(|_| Value::String(raw.to_string()));
        variables.insert(key.to_string(), value);
    }
    Ok(variables)
}

fn render_response(runtime: &ProductionRuntime, response: &ToolResponse) -> Result<(), RoteError> {
    let terminal = runtime.terminal.as_ref();
    if response.ok {
        terminal.write_line(&response.message)?;
    } else if terminal.is_interactive() {
        terminal.write_error(&format!("error: {}", response.message))?;
    } else {
        terminal.write_error(&structured_fallback_line(
            "rote",
            response.error_kind.as_deref().unwrap_or("error"),
            &response.message,
        ))?;
    }
    if !response.data.is_null() {
        let rendered = serde_json::to_string_pretty(&response.data)
            .map_err(|e| RoteError::Io(e.to_string()))?;
        terminal.write_line(&rendered)?;
    }
    Ok(())
}

fn export_sequence(
    runtime: &ProductionRuntime,
    store: &SequenceStore,
    name: &str,
    file: &Path,
) -> Result<i32, RoteError> {
    let sequence = store
        .get_sequence(name)?
        .ok_or_else(|| RoteError::NotFound(format!("sequence '{name}'")))?;
    let portable = NewSequence {
        name: sequence.name,
        description: sequence.description,
        trigger_pattern: sequence.trigger_pattern,
        actions: sequence.actions,
    };
    let rendered =
        serde_json::to_string_pretty(&portable).map_err(|e| RoteError::Io(e.to_string()))?;
    if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
        runtime.file_system.create_dir_all(parent)?;
    }
    runtime.file_system.write_string(file, &rendered)?;
    append_run_log(
        "info",
        "sequence.exported",
        json!({ "name": name, "file": file.display().to_string() }),
    );
    runtime.terminal.write_line(&format!(
        "Exported sequence '{name}' ({} action(s)) to {}",
        portable.actions.len(),
        file.display()
    ))?;
    Ok(0)
}
