use crate::errors::RoteError;
use crate::logging::{LogLevel, DEFAULT_DISK_BUDGET_BYTES, DEFAULT_MAX_PAYLOAD_BYTES};
use crate::runtime::FileSystem;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub store_path: Option<PathBuf>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub logging: LoggingConfig,
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub path: PathBuf,
    pub level: String,
    pub max_payload_bytes: usize,
    pub budget_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionConfig {
    pub default_timeout_ms: u64,
    pub history_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig {
                path: PathBuf::from(".cache/rote/rote.sqlite"),
            },
            logging: LoggingConfig {
                path: PathBuf::from(".cache/rote/logs/run.jsonl"),
                level: "info".to_string(),
                max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
                budget_bytes: DEFAULT_DISK_BUDGET_BYTES,
            },
            execution: ExecutionConfig::default(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialAppConfig {
    store: Option<PartialStoreConfig>,
    logging: Option<PartialLoggingConfig>,
    execution: Option<PartialExecutionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialStoreConfig {
    path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialLoggingConfig {
    path: Option<PathBuf>,
    level: Option<String>,
    max_payload_bytes: Option<usize>,
    budget_bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialExecutionConfig {
    default_timeout_ms: Option<u64>,
    history_limit: Option<usize>,
}

/// Defaults, then the config file, then CLI overrides. Relative paths resolve against `process_cwd`.
pub fn load_config(
    overrides: &CliOverrides,
    process_cwd: &Path,
    fs: &dyn FileSystem,
) -> Result<AppConfig, RoteError> {
    let mut cfg = AppConfig::default();

    if let Some(path) = &overrides.config_path {
        let file_contents = fs.read_to_string(path)?;
        let partial: PartialAppConfig = toml::from_str(&file_contents)
            .map_err(|e| RoteError::ConfigParse(e.to_string()))?;
        merge_partial_config(&mut cfg, partial);
    }

    apply_cli_overrides(&mut cfg, overrides);

    cfg.store.path = absolutize_path(process_cwd, &cfg.store.path);
    cfg.logging.path = absolutize_path(process_cwd, &cfg.logging.path);

    validate_config(&cfg)?;
    Ok(cfg)
}

fn merge_partial_config(cfg: &mut AppConfig, partial: PartialAppConfig) {
    if let Some(store) = partial.store {
        if let Some(path) = store.path {
            cfg.store.path = path;
        }
    }

    if let Some(logging) = partial.logging {
        if let Some(path) = logging.path {
            cfg.logging.path = path;
        }
        if let Some(level) = logging.level {
            cfg.logging.level = level;
        }
        if let Some(value) = logging.max_payload_bytes {
            cfg.logging.max_payload_bytes = value;
        }
        if let Some(value) = logging.budget_bytes {
            cfg.logging.budget_bytes = value;
        }
    }

    if let Some(execution) = partial.execution {
        if let Some(value) = execution.default_timeout_ms {
            cfg.execution.default_timeout_ms = value;
        }
        if let Some(value) = execution.history_limit {
            cfg.execution.history_limit = value;
        }
    }
}

fn apply_cli_overrides(cfg: &mut AppConfig, overrides: &CliOverrides) {
    if let Some(path) = &overrides.store_path {
        cfg.store.path = path.clone();
    }
    if let Some(level) = &overrides.log_level {
        cfg.logging.level = level.clone();
    }
}

fn absolutize_path(base: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        base.join(value)
    }
}

fn validate_config(cfg: &AppConfig) -> Result<(), RoteError> {
    if cfg.store.path.as_os_str().is_empty() {
        return Err(RoteError::InvalidConfig(
            "store.path must not be empty".to_string(),
        ));
    }

    if LogLevel::parse(&cfg.logging.level).is_none() {
        return Err(RoteError::InvalidConfig(format!(
            "logging.level must be one of debug, info, warn, error (got '{}')",
            cfg.logging.level
        )));
    }

    if cfg.execution.default_timeout_ms == 0 {
        return Err(RoteError::InvalidConfig(
            "execution.default_timeout_ms must be greater than zero".to_string(),
        ));
    }

    if cfg.execution.history_limit == 0 {
        return Err(RoteError::InvalidConfig(
            "execution.history_limit must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::FakeFileSystem;

    fn overrides_for(path: &str) -> CliOverrides {
        CliOverrides {
            config_path: Some(PathBuf::from(path)),
            ..CliOverrides::default()
        }
    }

    #[test]
    fn defaults_resolve_against_process_cwd() {
        let fs = FakeFileSystem::default();
        let cfg = load_config(&CliOverrides::default(), Path::new("/work"), &fs)
            .expect("defaults load");
        assert_eq!(cfg.store.path, PathBuf::from("/work/.cache/rote/rote.sqlite"));
        assert_eq!(
            cfg.logging.path,
            PathBuf::from("/work/.cache/rote/logs/run.jsonl")
        );
        assert_eq!(cfg.execution.default_timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(cfg.execution.history_limit, DEFAULT_HISTORY_LIMIT);
    }

    #[test]
    fn partial_file_merges_over_defaults() {
        let fs = FakeFileSystem::with_file(
            "/cfg/rote.toml",
            "[execution]\nhistory_limit = 7\n\n[logging]\nlevel = \"debug\"\n",
        );
        let cfg = load_config(&overrides_for("/cfg/rote.toml"), Path::new("/work"), &fs)
            .expect("load");
        assert_eq!(cfg.execution.history_limit, 7);
        assert_eq!(cfg.execution.default_timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(cfg.logging.level, "debug");
    }

    #[test]
    fn cli_store_path_wins_over_file() {
        let fs = FakeFileSystem::with_file("/cfg/rote.toml", "[store]\npath = \"/a.sqlite\"\n");
        let overrides = CliOverrides {
            config_path: Some(PathBuf::from("/cfg/rote.toml")),
            store_path: Some(PathBuf::from("/b.sqlite")),
            log_level: None,
        };
        let cfg = load_config(&overrides, Path::new("/work"), &fs).expect("load");
        assert_eq!(cfg.store.path, PathBuf::from("/b.sqlite"));
    }

    #[test]
    fn rejects_zero_history_limit() {
        let fs = FakeFileSystem::with_file("/cfg/rote.toml", "[execution]\nhistory_limit = 0\n");
        let err = load_config(&overrides_for("/cfg/rote.toml"), Path::new("/work"), &fs)
            .expect_err("must reject");
        assert!(matches!(err, RoteError::InvalidConfig(message) if message.contains("history_limit")));
    }

    #[test]
    fn rejects_unknown_log_level() {
        let overrides = CliOverrides {
            log_level: Some("loud".to_string()),
            ..CliOverrides::default()
        };
        let err = load_config(&overrides, Path::new("/work"), &FakeFileSystem::default())
            .expect_err("must reject");
        assert!(matches!(err, RoteError::InvalidConfig(_)));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let fs = FakeFileSystem::with_file("/cfg/rote.toml", "[execution\n");
        let err = load_config(&overrides_for("/cfg/rote.toml"), Path::new("/work"), &fs)
            .expect_err("must reject");
        assert!(matches!(err, RoteError::ConfigParse(_)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let fs = FakeFileSystem::with_file("/cfg/rote.toml", "[store]\nlocation = \"x\"\n");
        let err = load_config(&overrides_for("/cfg/rote.toml"), Path::new("/work"), &fs)
            .expect_err("must reject");
        assert!(matches!(err, RoteError::ConfigParse(_)));
    }

    #[test]
    fn missing_config_file_surfaces_io_error() {
        let fs = FakeFileSystem::default();
        let err = load_config(&overrides_for("/missing.toml"), Path::new("/work"), &fs)
            .expect_err("must fail");
        assert!(matches!(err, RoteError::Io(_)));
    }
}
