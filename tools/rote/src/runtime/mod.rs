use crate::errors::RoteError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String, RoteError>;
    fn write_string(&self, path: &Path, contents: &str) -> Result<(), RoteError>;
    fn create_dir_all(&self, path: &Path) -> Result<(), RoteError>;
    fn exists(&self, path: &Path) -> bool;
}

pub trait Terminal: Send + Sync {
    fn is_interactive(&self) -> bool;
    fn write_line(&self, line: &str) -> Result<(), RoteError>;
    fn write_error(&self, line: &str) -> Result<(), RoteError>;
}

pub struct ProductionFileSystem;

impl FileSystem for ProductionFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, RoteError> {
        std::fs::read_to_string(path)
            .map_err(|e| RoteError::Io(format!("{}: {e}", path.display())))
    }

    fn write_string(&self, path: &Path, contents: &str) -> Result<(), RoteError> {
        std::fs::write(path, contents).map_err(|e| RoteError::Io(e.to_string()))
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), RoteError> {
        std::fs::create_dir_all(path).map_err(|e| RoteError::Io(e.to_string()))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

pub struct ProductionTerminal;

impl Terminal for ProductionTerminal {
    fn is_interactive(&self) -> bool {
        std::io::IsTerminal::is_terminal(&std::io::stdout())
    }

    fn write_line(&self, line: &str) -> Result<(), RoteError> {
        use std::io::Write;
        let mut out = std::io::stdout();
        writeln!(out, "{line}").map_err(|e| RoteError::Io(e.to_string()))
    }

    fn write_error(&self, line: &str) -> Result<(), RoteError> {
        use std::io::Write;
        let mut err = std::io::stderr();
        writeln!(err, "{line}").map_err(|e| RoteError::Io(e.to_string()))
    }
}

pub struct ProductionRuntime {
    pub file_system: Arc<dyn FileSystem>,
    pub terminal: Arc<dyn Terminal>,
}

impl ProductionRuntime {
    pub fn new() -> Self {
        Self {
            file_system: Arc::new(ProductionFileSystem),
            terminal: Arc::new(ProductionTerminal),
        }
    }
}

impl Default for ProductionRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default, Clone)]
pub struct FakeFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, String>>>,
    dirs: Arc<Mutex<Vec<PathBuf>>>,
    fail_next: Arc<Mutex<Option<RoteError>>>,
}

impl FakeFileSystem {
    pub fn with_file(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let fs = Self::default();
        fs.files
            .lock()
            .expect("files lock")
            .insert(path.into(), contents.into());
        fs
    }

    pub fn set_fail_next(&self, error: RoteError) {
        *self.fail_next.lock().expect("fail lock") = Some(error);
    }

    pub fn created_dirs(&self) -> Vec<PathBuf> {
        self.dirs.lock().expect("dirs lock").clone()
    }

    fn maybe_fail(&self) -> Result<(), RoteError> {
        if let Some(err) = self.fail_next.lock().expect("fail lock").take() {
            return Err(err);
        }
        Ok(())
    }
}

impl FileSystem for FakeFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, RoteError> {
        self.maybe_fail()?;
        self.files
            .lock()
            .expect("files lock")
            .get(path)
            .cloned()
            .ok_or_else(|| RoteError::Io(format!("missing file {}", path.display())))
    }

    fn write_string(&self, path: &Path, contents: &str) -> Result<(), RoteError> {
        self.maybe_fail()?;
        self.files
            .lock()
            .expect("files lock")
            .insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), RoteError> {
        self.maybe_fail()?;
        self.dirs
            .lock()
            .expect("dirs lock")
            .push(path.to_path_buf());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().expect("files lock").contains_key(path)
    }
}

#[derive(Default, Clone)]
pub struct FakeTerminal {
    pub interactive: bool,
    writes: Arc<Mutex<Vec<String>>>,
    errors: Arc<Mutex<Vec<String>>>,
}

impl FakeTerminal {
    pub fn new(interactive: bool) -> Self {
        Self {
            interactive,
            ..Self::default()
        }
    }

    pub fn written_lines(&self) -> Vec<String> {
        self.writes.lock().expect("writes lock").clone()
    }

    pub fn error_lines(&self) -> Vec<String> {
        self.errors.lock().expect("errors lock").clone()
    }
}

impl Terminal for FakeTerminal {
    fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn write_line(&self, line: &str) -> Result<(), RoteError> {
        self.writes
            .lock()
            .expect("writes lock")
            .push(line.to_string());
        Ok(())
    }

    fn write_error(&self, line: &str) -> Result<(), RoteError> {
        self.errors
            .lock()
            .expect("errors lock")
            .push(line.to_string());
        Ok(())
    }
}
