use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};

use crate::errors::RoteError;
use crate::logging::append_run_log;
use crate::site_matcher::{site_matches, strategy_for, MatchStrategy};
use crate::types::{
    Action, ElementMapping, ExecutionHistoryEntry, LocatorBy, NewElementMapping, NewExecution,
    NewSequence, Parameters, Sequence, SequenceSummary,
};

const READ_POOL_SIZE: usize = 4;
const WRITE_QUEUE_DEPTH: usize = 128;

type StoreResult<T> = Result<T, RoteError>;

#[derive(Debug)]
enum WriteCmd {
    SaveSequence {
        sequence: NewSequence,
        now: i64,
        reply: oneshot::Sender<StoreResult<Sequence>>,
    },
    DeleteSequence {
        name: String,
        reply: oneshot::Sender<StoreResult<bool>>,
    },
    SaveElementMapping {
        mapping: NewElementMapping,
        now: i64,
        reply: oneshot::Sender<StoreResult<ElementMapping>>,
    },
    LogExecution {
        entry: NewExecution,
        now: i64,
        reply: oneshot::Sender<StoreResult<i64>>,
    },
}

/// Durable storage for sequences, element mappings and execution history.
///
/// Writes are serialized through one writer thread and each is committed
/// before the caller's method returns. Reads use a small pool of read-only
/// connections and always observe whole committed writes.
pub struct SequenceStore {
    write_tx: Option<mpsc::Sender<WriteCmd>>,
    read_pool: ReadPool,
    writer_join: Option<thread::JoinHandle<()>>,
    db_path: PathBuf,
}

impl Drop for SequenceStore {
    fn drop(&mut self) {
        // Close the sender first so the writer loop exits.
        drop(self.write_tx.take());
        if let Some(handle) = self.writer_join.take() {
            let _ = handle.join();
        }
    }
}

impl SequenceStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        append_run_log(
            "info",
            "sequence_store.open",
            json!({ "path": path.display().to_string() }),
        );
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RoteError::Database(e.to_string()))?;
        }

        let existed_before_open = path.exists();

        // Zero-byte files are left behind by interrupted creation.
        if existed_before_open {
            let meta =
                std::fs::metadata(&path).map_err(|e| RoteError::Database(e.to_string()))?;
            if meta.len() == 0 {
                return Err(RoteError::Database(format!(
                    "sequence database is 0 bytes (corrupt): {}",
                    path.display()
                )));
            }
        }

        let mut write_conn = Connection::open(&path).map_err(db_err)?;
        configure_write_connection(&write_conn)?;

        if existed_before_open {
            let integrity: String = write_conn
                .pragma_query_value(None, "quick_check", |row| row.get(0))
                .map_err(db_err)?;
            if integrity != "ok" {
                return Err(RoteError::Database(format!(
                    "sequence database failed integrity check: {integrity}"
                )));
            }
        }

        run_migrations(&mut write_conn)?;

        let (write_tx, mut write_rx) = mpsc::channel(WRITE_QUEUE_DEPTH);
        let writer_join = thread::spawn(move || {
            while let Some(cmd) = write_rx.blocking_recv() {
                match cmd {
                    WriteCmd::SaveSequence {
                        sequence,
                        now,
                        reply,
                    } => {
                        let _ = reply.send(save_sequence(&mut write_conn, &sequence, now));
                    }
                    WriteCmd::DeleteSequence { name, reply } => {
                        let _ = reply.send(delete_sequence(&write_conn, &name));
                    }
                    WriteCmd::SaveElementMapping {
                        mapping,
                        now,
                        reply,
                    } => {
                        let _ = reply.send(upsert_element_mapping(&write_conn, &mapping, now));
                    }
                    WriteCmd::LogExecution { entry, now, reply } => {
                        let _ = reply.send(insert_execution(&write_conn, &entry, now));
                    }
                }
            }
        });

        let read_pool = ReadPool::open(&path, READ_POOL_SIZE)?;
        append_run_log(
            "info",
            "sequence_store.opened",
            json!({ "path": path.display().to_string() }),
        );

        Ok(Self {
            write_tx: Some(write_tx),
            read_pool,
            writer_join: Some(writer_join),
            db_path: path,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<StoreResult<T>>) -> WriteCmd,
    ) -> StoreResult<T> {
        let sender = self
            .write_tx
            .as_ref()
            .ok_or_else(|| RoteError::Database("store is closed".to_string()))?;
        let (reply_tx, reply_rx) = oneshot::channel();
        sender
            .blocking_send(build(reply_tx))
            .map_err(|e| RoteError::Database(e.to_string()))?;
        reply_rx
            .blocking_recv()
            .map_err(|e| RoteError::Database(e.to_string()))?
    }

    /// Upserts the sequence and replaces its whole action list in one transaction.
    pub fn save_sequence(&self, sequence: NewSequence) -> StoreResult<Sequence> {
        if sequence.name.trim().is_empty() {
            return Err(RoteError::Validation(
                "sequence name must not be empty".to_string(),
            ));
        }
        if let Some(step) = sequence
            .actions
            .iter()
            .position(|action| action.tool_name.trim().is_empty())
        {
            return Err(RoteError::Validation(format!(
                "action at step {} has an empty tool name",
                step + 1
            )));
        }

        append_run_log(
            "debug",
            "sequence.save",
            json!({
                "name": sequence.name,
                "action_count": sequence.actions.len(),
            }),
        );
        let now = system_time_unix();
        let result = self.request(|reply| WriteCmd::SaveSequence {
            sequence,
            now,
            reply,
        });
        match &result {
            Ok(saved) => append_run_log(
                "info",
                "sequence.saved",
                json!({
                    "name": saved.name,
                    "action_count": saved.actions.len(),
                    "created_at": saved.created_at,
                    "updated_at": saved.updated_at,
                }),
            ),
            Err(e) => append_run_log(
                "error",
                "sequence.save.failed",
                json!({ "error": e.to_string() }),
            ),
        }
        result
    }

    pub fn get_sequence(&self, name: &str) -> StoreResult<Option<Sequence>> {
        append_run_log("debug", "sequence.get", json!({ "name": name }));
        self.read_pool.with_conn(|conn| {
            let tx = conn.unchecked_transaction().map_err(db_err)?;
            let sequence = fetch_sequence(&tx, name)?;
            tx.commit().map_err(db_err)?;
            Ok(sequence)
        })
    }

    /// Newest-updated first.
    pub fn list_sequences(&self) -> StoreResult<Vec<SequenceSummary>> {
        append_run_log("debug", "sequence.list", json!({}));
        self.read_pool.with_conn(|conn| {
            let mut statement = conn
                .prepare(
                    "SELECT s.name, s.description, s.trigger_pattern, s.updated_at,
                            (SELECT COUNT(*) FROM sequence_actions a WHERE a.sequence_name = s.name)
                     FROM sequences s
                     ORDER BY s.updated_at DESC, s.name ASC",
                )
                .map_err(db_err)?;
            let rows = statement
                .query_map([], |row| {
                    let action_count: i64 = row.get(4)?;
                    Ok(SequenceSummary {
                        name: row.get(0)?,
                        description: row.get(1)?,
                        trigger_pattern: row.get(2)?,
                        updated_at: row.get(3)?,
                        action_count: action_count as usize,
                    })
                })
                .map_err(db_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
        })
    }

    /// Case-insensitive substring search over name, description and trigger pattern.
    pub fn search_sequences(&self, query: &str) -> StoreResult<Vec<Sequence>> {
        let needle = query.to_lowercase();
        let sequences = self.read_pool.with_conn(|conn| {
            let tx = conn.unchecked_transaction().map_err(db_err)?;
            let candidates = {
                let mut statement = tx
                    .prepare(
                        "SELECT name, description, trigger_pattern FROM sequences ORDER BY name ASC",
                    )
                    .map_err(db_err)?;
                let rows = statement
                    .query_map([], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, Option<String>>(2)?,
                        ))
                    })
                    .map_err(db_err)?;
                rows.collect::<Result<Vec<_>, _>>().map_err(db_err)?
            };

            let mut found = Vec::new();
            for (name, description, trigger) in candidates {
                let hit = name.to_lowercase().contains(&needle)
                    || description.to_lowercase().contains(&needle)
                    || trigger
                        .as_deref()
                        .is_some_and(|t| t.to_lowercase().contains(&needle));
                if !hit {
                    continue;
                }
                if let Some(sequence) = fetch_sequence(&tx, &name)? {
                    found.push(sequence);
                }
            }
            tx.commit().map_err(db_err)?;
            Ok(found)
        })?;
        append_run_log(
            "debug",
            "sequence.search",
            json!({ "query": query, "matches": sequences.len() }),
        );
        Ok(sequences)
    }

    /// Returns whether a sequence existed. Its actions are removed with it.
    pub fn delete_sequence(&self, name: &str) -> StoreResult<bool> {
        let result = self.request(|reply| WriteCmd::DeleteSequence {
            name: name.to_string(),
            reply,
        });
        match &result {
            Ok(true) => append_run_log("info", "sequence.deleted", json!({ "name": name })),
            Ok(false) => append_run_log("debug", "sequence.delete.missing", json!({ "name": name })),
            Err(e) => append_run_log(
                "error",
                "sequence.delete.failed",
                json!({ "name": name, "error": e.to_string() }),
            ),
        }
        result
    }

    /// Number of stored action rows for `name`, whether or not the sequence row exists.
    pub fn action_count(&self, name: &str) -> StoreResult<usize> {
        self.read_pool.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM sequence_actions WHERE sequence_name = ?1",
                [name],
                |row| row.get::<_, i64>(0),
            )
            .map(|count| count as usize)
            .map_err(db_err)
        })
    }

    pub fn save_element_mapping(&self, mapping: NewElementMapping) -> StoreResult<ElementMapping> {
        for (field, value) in [
            ("site_pattern", &mapping.site_pattern),
            ("element_name", &mapping.element_name),
            ("locator_value", &mapping.locator_value),
        ] {
            if value.trim().is_empty() {
                return Err(RoteError::Validation(format!("{field} must not be empty")));
            }
        }

        let now = system_time_unix();
        let result = self.request(|reply| WriteCmd::SaveElementMapping {
            mapping,
            now,
            reply,
        });
        match &result {
            Ok(saved) => append_run_log(
                "info",
                "element_mapping.saved",
                json!({
                    "site_pattern": saved.site_pattern,
                    "element_name": saved.element_name,
                    "locator_by": saved.locator_by.as_str(),
                }),
            ),
            Err(e) => append_run_log(
                "error",
                "element_mapping.save.failed",
                json!({ "error": e.to_string() }),
            ),
        }
        result
    }

    pub fn get_element_mapping(
        &self,
        site_pattern: &str,
        element_name: &str,
    ) -> StoreResult<Option<ElementMapping>> {
        self.read_pool.with_conn(|conn| {
            conn.query_row(
                "SELECT site_pattern, element_name, locator_by, locator_value, description,
                        created_at, updated_at
                 FROM element_mappings
                 WHERE site_pattern = ?1 AND element_name = ?2",
                params![site_pattern, element_name],
                row_to_mapping,
            )
            .optional()
            .map_err(db_err)
        })
    }

    /// Every mapping whose site pattern matches `url`, sorted by site pattern then element name.
    pub fn get_element_mappings_for_site(&self, url: &str) -> StoreResult<Vec<ElementMapping>> {
        let all = self.read_pool.with_conn(|conn| {
            let mut statement = conn
                .prepare(
                    "SELECT site_pattern, element_name, locator_by, locator_value, description,
                            created_at, updated_at
                     FROM element_mappings
                     ORDER BY site_pattern ASC, element_name ASC",
                )
                .map_err(db_err)?;
            let rows = statement.query_map([], row_to_mapping).map_err(db_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
        })?;
        let total = all.len();
        let fallback_patterns = all
            .iter()
            .filter(|mapping| strategy_for(&mapping.site_pattern) != MatchStrategy::Regex)
            .count();
        let matched = all
            .into_iter()
            .filter(|mapping| site_matches(&mapping.site_pattern, url))
            .collect::<Vec<_>>();
        append_run_log(
            "debug",
            "element_mapping.lookup",
            json!({
                "url": url,
                "candidates": total,
                "fallback_patterns": fallback_patterns,
                "matched": matched.len(),
            }),
        );
        Ok(matched)
    }

    /// First mapping named `element_name` whose site pattern matches `url`.
    pub fn resolve_element(
        &self,
        url: &str,
        element_name: &str,
    ) -> StoreResult<Option<ElementMapping>> {
        Ok(self
            .get_element_mappings_for_site(url)?
            .into_iter()
            .find(|mapping| mapping.element_name == element_name))
    }

    /// Appends one immutable history row and returns its id.
    pub fn log_execution(&self, entry: NewExecution) -> StoreResult<i64> {
        let sequence_name = entry.sequence_name.clone();
        let tool_name = entry.tool_name.clone();
        let success = entry.success;
        let now = system_time_unix();
        let result = self.request(|reply| WriteCmd::LogExecution { entry, now, reply });
        if let Err(e) = &result {
            append_run_log(
                "error",
                "execution_history.append.failed",
                json!({
                    "sequence_name": sequence_name,
                    "tool_name": tool_name,
                    "success": success,
                    "error": e.to_string(),
                }),
            );
        }
        result
    }

    /// Most recent first, at most `limit` entries.
    pub fn get_execution_history(&self, limit: usize) -> StoreResult<Vec<ExecutionHistoryEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.read_pool.with_conn(|conn| {
            let mut statement = conn
                .prepare(
                    "SELECT id, sequence_name, tool_name, parameters, success, error_message,
                            executed_at
                     FROM execution_history
                     ORDER BY executed_at DESC, id DESC
                     LIMIT ?1",
                )
                .map_err(db_err)?;
            let rows = statement.query_map([limit], row_to_history).map_err(db_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
        })
    }
}

#[derive(Clone)]
struct ReadPool {
    conns: Arc<Vec<Mutex<Connection>>>,
    next: Arc<AtomicUsize>,
}

impl ReadPool {
    fn open(path: &Path, size: usize) -> StoreResult<Self> {
        let mut conns = Vec::with_capacity(size);
        for _ in 0..size {
            let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
                .map_err(db_err)?;
            conn.busy_timeout(std::time::Duration::from_secs(3))
                .map_err(db_err)?;
            conns.push(Mutex::new(conn));
        }

        Ok(Self {
            conns: Arc::new(conns),
            next: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.conns.len();
        let guard = self.conns[idx]
            .lock()
            .map_err(|_| RoteError::Database("read connection lock poisoned".to_string()))?;
        f(&guard)
    }
}

fn configure_write_connection(conn: &Connection) -> StoreResult<()> {
    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(db_err)?;
    conn.pragma_update(None, "synchronous", "FULL")
        .map_err(db_err)?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(db_err)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(db_err)?;
    Ok(())
}

fn run_migrations(conn: &mut Connection) -> StoreResult<()> {
    let migrations = [
        (1_i64, include_str!("../migrations/0001_sequences.sql")),
        (2_i64, include_str!("../migrations/0002_indexes.sql")),
    ];

    conn.execute_batch("BEGIN IMMEDIATE; CREATE TABLE IF NOT EXISTS schema_migrations (version INTEGER PRIMARY KEY, applied_at INTEGER NOT NULL); COMMIT;")
        .map_err(db_err)?;

    for (version, sql) in migrations {
        let exists = conn
            .query_row(
                "SELECT 1 FROM schema_migrations WHERE version = ?1 LIMIT 1",
                [version],
                |_| Ok(()),
            )
            .optional()
            .map_err(db_err)?
            .is_some();

        if exists {
            continue;
        }

        append_run_log(
            "info",
            "sequence_store.migration.applying",
            json!({ "version": version }),
        );
        let tx = conn.transaction().map_err(db_err)?;
        tx.execute_batch(sql).map_err(db_err)?;
        tx.execute(
            "INSERT INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
            params![version, system_time_unix()],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        append_run_log(
            "info",
            "sequence_store.migration.applied",
            json!({ "version": version }),
        );
    }

    Ok(())
}

fn save_sequence(conn: &mut Connection, sequence: &NewSequence, now: i64) -> StoreResult<Sequence> {
    let tx = conn.transaction().map_err(db_err)?;
    tx.execute(
        "INSERT INTO sequences (name, description, trigger_pattern, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT(name) DO UPDATE SET
            description = excluded.description,
            trigger_pattern = excluded.trigger_pattern,
            updated_at = MAX(excluded.updated_at, sequences.updated_at + 1)",
        params![
            sequence.name,
            sequence.description,
            sequence.trigger_pattern,
            now
        ],
    )
    .map_err(db_err)?;
    tx.execute(
        "DELETE FROM sequence_actions WHERE sequence_name = ?1",
        [&sequence.name],
    )
    .map_err(db_err)?;
    {
        let mut insert = tx
            .prepare(
                "INSERT INTO sequence_actions (sequence_name, step, tool_name, parameters)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .map_err(db_err)?;
        for (idx, action) in sequence.actions.iter().enumerate() {
            let parameters = serde_json::to_string(&action.parameters)
                .map_err(|e| RoteError::Validation(e.to_string()))?;
            insert
                .execute(params![
                    sequence.name,
                    (idx + 1) as i64,
                    action.tool_name,
                    parameters
                ])
                .map_err(db_err)?;
        }
    }
    let saved = fetch_sequence(&tx, &sequence.name)?
        .ok_or_else(|| RoteError::Database("sequence missing after save".to_string()))?;
    tx.commit().map_err(db_err)?;
    Ok(saved)
}

fn delete_sequence(conn: &Connection, name: &str) -> StoreResult<bool> {
    let changed = conn
        .execute("DELETE FROM sequences WHERE name = ?1", [name])
        .map_err(db_err)?;
    Ok(changed > 0)
}

fn upsert_element_mapping(
    conn: &Connection,
    mapping: &NewElementMapping,
    now: i64,
) -> StoreResult<ElementMapping> {
    conn.query_row(
        "INSERT INTO element_mappings (
            site_pattern, element_name, locator_by, locator_value, description, created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
         ON CONFLICT(site_pattern, element_name) DO UPDATE SET
            locator_by = excluded.locator_by,
            locator_value = excluded.locator_value,
            description = excluded.description,
            updated_at = MAX(excluded.updated_at, element_mappings.updated_at + 1)
         RETURNING site_pattern, element_name, locator_by, locator_value, description,
                   created_at, updated_at",
        params![
            mapping.site_pattern,
            mapping.element_name,
            mapping.locator_by.as_str(),
            mapping.locator_value,
            mapping.description,
            now
        ],
        row_to_mapping,
    )
    .map_err(db_err)
}

fn insert_execution(conn: &Connection, entry: &NewExecution, now: i64) -> StoreResult<i64> {
    let parameters =
        serde_json::to_string(&entry.parameters).map_err(|e| RoteError::Database(e.to_string()))?;
    conn.execute(
        "INSERT INTO execution_history (
            sequence_name, tool_name, parameters, success, error_message, executed_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.sequence_name,
            entry.tool_name,
            parameters,
            entry.success,
            entry.error_message,
            now
        ],
    )
    .map_err(db_err)?;
    Ok(conn.last_insert_rowid())
}

fn fetch_sequence(conn: &Connection, name: &str) -> StoreResult<Option<Sequence>> {
    let header = conn
        .query_row(
            "SELECT name, description, trigger_pattern, created_at, updated_at
             FROM sequences
             WHERE name = ?1",
            [name],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            },
        )
        .optional()
        .map_err(db_err)?;
    let Some((name, description, trigger_pattern, created_at, updated_at)) = header else {
        return Ok(None);
    };

    let mut statement = conn
        .prepare(
            "SELECT step, tool_name, parameters
             FROM sequence_actions
             WHERE sequence_name = ?1
             ORDER BY step ASC",
        )
        .map_err(db_err)?;
    let rows = statement
        .query_map([&name], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })
        .map_err(db_err)?;

    let mut actions = Vec::new();
    for row in rows {
        let (step, tool_name, raw) = row.map_err(db_err)?;
        let parameters = serde_json::from_str::<Parameters>(&raw).map_err(|e| {
            RoteError::Database(format!(
                "sequence '{name}' step {step} has corrupt parameters: {e}"
            ))
        })?;
        actions.push(Action {
            tool_name,
            parameters,
        });
    }

    Ok(Some(Sequence {
        name,
        description,
        trigger_pattern,
        actions,
        created_at,
        updated_at,
    }))
}

fn row_to_mapping(row: &rusqlite::Row<'_>) -> rusqlite::Result<ElementMapping> {
    let locator_by = row.get::<_, String>(2)?;
    Ok(ElementMapping {
        site_pattern: row.get(0)?,
        element_name: row.get(1)?,
        locator_by: LocatorBy::parse(&locator_by).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "invalid locator strategy",
                )),
            )
        })?,
        locator_value: row.get(3)?,
        description: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn row_to_history(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExecutionHistoryEntry> {
    let raw = row.get::<_, String>(3)?;
    Ok(ExecutionHistoryEntry {
        id: row.get(0)?,
        sequence_name: row.get(1)?,
        tool_name: row.get(2)?,
        parameters: parse_history_parameters(&raw),
        success: row.get(4)?,
        error_message: row.get(5)?,
        executed_at: row.get(6)?,
    })
}

// A corrupt snapshot must not fail the whole history query.
fn parse_history_parameters(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => value,
        Err(e) => json!({
            "parse_error": e.to_string(),
            "raw": raw,
        }),
    }
}

fn db_err(error: rusqlite::Error) -> RoteError {
    RoteError::Database(error.to_string())
}

/// Milliseconds since the unix epoch.
pub fn system_time_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
