// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite-backed store for tasks, sessions, and conversation history.
//!
//! Every write runs in an IMMEDIATE transaction so concurrent writers
//! queue at begin time instead of failing on lock upgrade. The
//! connection carries a 5s busy timeout; WAL journaling is enabled for
//! file-backed databases. Checkpoint callers treat failures as
//! warnings, so nothing here is allowed to panic or hang.

use crate::schema::SCHEMA;
use chrono::Utc;
use gf_core::{BackendType, FailureMode, Task, TaskId, TaskStatus};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Separator for the `writes_files` column; the ASCII unit separator
/// cannot appear in sane paths, so the list round-trips.
const FILE_SEP: char = '\u{1f}';

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    #[error("session not found for task: {0}")]
    SessionNotFound(TaskId),
    #[error("task {task} depends on unknown task {dep}")]
    MissingDependency { task: TaskId, dep: TaskId },
    #[error("corrupt row: {0}")]
    Decode(String),
}

/// One persisted agent session, used by resume to reattach a
/// conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub task_id: TaskId,
    pub session_id: String,
    pub backend_type: BackendType,
}

/// One conversation turn; append-only, ordered by `(timestamp, id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub task_id: TaskId,
    pub role: String,
    pub content: String,
    pub timestamp: i64,
}

/// Durable task/session/history store.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (and migrate) a file-backed database, creating parent
    /// directories as needed.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        tracing::debug!(path = %path.display(), "opening state db");
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        // SQLite ships with foreign keys off; we rely on cascade deletes.
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Idempotent upsert of a task and its dependency edges.
    ///
    /// Edges are replaced (delete + insert) in the same transaction, and
    /// every edge target is verified to exist first, independent of the
    /// engine's deferred-FK behavior.
    pub fn save_task(&self, task: &Task) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        upsert_task(&tx, task)?;
        replace_dependencies(&tx, task)?;
        tx.commit()?;
        Ok(())
    }

    /// Persist a whole DAG snapshot in one transaction.
    ///
    /// Tasks are inserted before any edges so forward references within
    /// the snapshot resolve regardless of iteration order.
    pub fn save_dag<'a>(
        &self,
        tasks: impl IntoIterator<Item = &'a Task> + Clone,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        for task in tasks.clone() {
            upsert_task(&tx, task)?;
        }
        for task in tasks {
            replace_dependencies(&tx, task)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_task(&self, id: &TaskId) -> Result<Task, StoreError> {
        let conn = self.conn.lock();
        let mut task = conn
            .query_row(
                "SELECT id, name, role, prompt, writes_files, status, failure_mode, result, error
                 FROM tasks WHERE id = ?1",
                params![id.as_str()],
                decode_task_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::TaskNotFound(id.clone()))??;
        task.depends_on = query_dependencies(&conn, id)?;
        Ok(task)
    }

    /// Update status/result/error; fails when the task is absent.
    pub fn update_task_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
        result: &str,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let updated = tx.execute(
            "UPDATE tasks SET status = ?2, result = ?3, error = ?4, updated_at = ?5
             WHERE id = ?1",
            params![
                id.as_str(),
                status.to_string(),
                result,
                error,
                Utc::now().timestamp()
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::TaskNotFound(id.clone()));
        }
        tx.commit()?;
        Ok(())
    }

    /// Load every task with its full dependency list.
    ///
    /// The outer query is materialized before dependency queries run, so
    /// a single connection never hosts two live statements.
    pub fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, role, prompt, writes_files, status, failure_mode, result, error
             FROM tasks ORDER BY created_at, id",
        )?;
        let rows: Vec<Result<Task, StoreError>> = stmt
            .query_map([], decode_task_row)?
            .collect::<Result<_, _>>()?;
        drop(stmt);

        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            let mut task = row?;
            task.depends_on = query_dependencies(&conn, &task.id)?;
            tasks.push(task);
        }
        Ok(tasks)
    }

    /// Upsert the agent session attached to a task.
    pub fn save_session(
        &self,
        task_id: &TaskId,
        session_id: &str,
        backend_type: BackendType,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO sessions (task_id, session_id, backend_type, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(task_id) DO UPDATE SET
                 session_id = excluded.session_id,
                 backend_type = excluded.backend_type",
            params![
                task_id.as_str(),
                session_id,
                backend_type.to_string(),
                Utc::now().timestamp()
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_session(&self, task_id: &TaskId) -> Result<SessionRecord, StoreError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT session_id, backend_type FROM sessions WHERE task_id = ?1",
            params![task_id.as_str()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                ))
            },
        )
        .optional()?
        .ok_or_else(|| StoreError::SessionNotFound(task_id.clone()))
        .and_then(|(session_id, backend_type)| {
            Ok(SessionRecord {
                task_id: task_id.clone(),
                session_id,
                backend_type: BackendType::from_str(&backend_type)
                    .map_err(StoreError::Decode)?,
            })
        })
    }

    /// Append one conversation turn.
    pub fn save_message(
        &self,
        task_id: &TaskId,
        role: &str,
        content: &str,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO conversation_history (task_id, role, content, timestamp)
             VALUES (?1, ?2, ?3, ?4)",
            params![task_id.as_str(), role, content, Utc::now().timestamp()],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Chronological history; insertion order breaks same-second ties.
    /// Returns an empty list for unknown tasks.
    pub fn get_history(&self, task_id: &TaskId) -> Result<Vec<ConversationTurn>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT role, content, timestamp FROM conversation_history
             WHERE task_id = ?1 ORDER BY timestamp ASC, id ASC",
        )?;
        let turns = stmt
            .query_map(params![task_id.as_str()], |row| {
                Ok(ConversationTurn {
                    task_id: task_id.clone(),
                    role: row.get(0)?,
                    content: row.get(1)?,
                    timestamp: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(turns)
    }

    /// Close the underlying connection. Dropping the store is
    /// equivalent; this only surfaces close-time errors.
    pub fn close(self) -> Result<(), StoreError> {
        self.conn
            .into_inner()
            .close()
            .map_err(|(_conn, e)| StoreError::Sqlite(e))
    }
}

fn upsert_task(conn: &Connection, task: &Task) -> Result<(), StoreError> {
    let now = Utc::now().timestamp();
    conn.execute(
        "INSERT INTO tasks
             (id, name, role, prompt, writes_files, status, failure_mode,
              result, error, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
         ON CONFLICT(id) DO UPDATE SET
             name = excluded.name,
             role = excluded.role,
             prompt = excluded.prompt,
             writes_files = excluded.writes_files,
             status = excluded.status,
             failure_mode = excluded.failure_mode,
             result = excluded.result,
             error = excluded.error,
             updated_at = excluded.updated_at",
        params![
            task.id.as_str(),
            task.name,
            task.role,
            task.prompt,
            encode_files(&task.writes_files),
            task.status.to_string(),
            task.failure_mode.to_string(),
            task.result,
            task.error.as_deref(),
            now,
        ],
    )?;
    Ok(())
}

fn replace_dependencies(conn: &Connection, task: &Task) -> Result<(), StoreError> {
    conn.execute(
        "DELETE FROM task_dependencies WHERE task_id = ?1",
        params![task.id.as_str()],
    )?;
    for dep in &task.depends_on {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM tasks WHERE id = ?1)",
            params![dep.as_str()],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StoreError::MissingDependency {
                task: task.id.clone(),
                dep: dep.clone(),
            });
        }
        conn.execute(
            "INSERT INTO task_dependencies (task_id, depends_on_id) VALUES (?1, ?2)",
            params![task.id.as_str(), dep.as_str()],
        )?;
    }
    Ok(())
}

fn query_dependencies(conn: &Connection, id: &TaskId) -> Result<Vec<TaskId>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT depends_on_id FROM task_dependencies WHERE task_id = ?1 ORDER BY rowid",
    )?;
    let deps = stmt
        .query_map(params![id.as_str()], |row| {
            row.get::<_, String>(0).map(TaskId::new)
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(deps)
}

/// Decode a task row; `depends_on` is filled in by the caller.
#[allow(clippy::type_complexity)]
fn decode_task_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Task, StoreError>> {
    let id: String = row.get(0)?;
    let name: String = row.get(1)?;
    let role: String = row.get(2)?;
    let prompt: String = row.get(3)?;
    let writes_files: String = row.get(4)?;
    let status: String = row.get(5)?;
    let failure_mode: String = row.get(6)?;
    let result: String = row.get(7)?;
    let error: Option<String> = row.get(8)?;

    Ok((|| {
        let mut task = Task::new(id, name, role, prompt);
        task.writes_files = decode_files(&writes_files);
        task.status = TaskStatus::from_str(&status).map_err(StoreError::Decode)?;
        task.failure_mode = FailureMode::from_str(&failure_mode).map_err(StoreError::Decode)?;
        task.result = result;
        // Persisted error text round-trips as an opaque string.
        task.error = error;
        Ok(task)
    })())
}

fn encode_files(files: &[PathBuf]) -> String {
    files
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(&FILE_SEP.to_string())
}

fn decode_files(encoded: &str) -> Vec<PathBuf> {
    encoded
        .split(FILE_SEP)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
