use crate::errors::RoteError;
use std::fs;
use std::path::{Path, PathBuf};

/// Deletes the oldest files in `dir` until the directory fits in `budget_bytes`.
/// `active` is never removed, even when it alone exceeds the budget.
pub fn enforce_total_budget(
    dir: &Path,
    budget_bytes: u64,
    active: &Path,
) -> Result<Vec<PathBuf>, RoteError> {
    let mut files = fs::read_dir(dir)
        .map_err(|e| RoteError::Io(e.to_string()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter_map(|path| {
            let meta = fs::metadata(&path).ok()?;
            Some((path, meta.len(), meta.modified().ok()))
        })
        .collect::<Vec<_>>();

    files.sort_by(|a, b| a.2.cmp(&b.2));

    let mut total = files.iter().map(|(_, len, _)| *len).sum::<u64>();
    let mut deleted = Vec::new();
    for (path, len, _) in files {
        if total <= budget_bytes {
            break;
        }
        if path == active {
            continue;
        }
        fs::remove_file(&path).map_err(|e| RoteError::Io(e.to_string()))?;
        total = total.saturating_sub(len);
        deleted.push(path);
    }

    Ok(deleted)
}
