//! Edit session repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::models::{EditSession, SessionId, SessionStatus, SyncConflict};
use crate::util::unix_millis_now;
use libsql::{params, Connection, Row, Value};

const SESSION_COLUMNS: &str = "id, chat_id, user_id, document_id, document_url, local_path, \
     file_name, original_content, last_sync_content, status, last_revision_id, last_sync_time, \
     sync_count, conflict_count, created_at, ended_at";

/// Trait for edit session storage operations (async)
#[allow(async_fn_in_trait)]
pub trait SessionRepository {
    /// Insert a freshly started session
    async fn insert(&self, session: &EditSession) -> Result<()>;

    /// Store the outcome of a sync tick: revision, timestamps, counters, content and status
    async fn update_progress(&self, session: &EditSession) -> Result<()>;

    /// Mark a session completed with its end timestamp
    async fn mark_completed(&self, id: &SessionId, ended_at: i64) -> Result<()>;

    /// Get a session by ID
    async fn get(&self, id: &SessionId) -> Result<Option<EditSession>>;

    /// List sessions, newest first
    async fn list_recent(&self, limit: usize) -> Result<Vec<EditSession>>;

    /// Sessions still `editing` created at or after `created_after` (Unix ms)
    async fn list_restorable(&self, created_after: i64) -> Result<Vec<EditSession>>;

    /// Log a detected conflict
    async fn record_conflict(
        &self,
        session_id: &SessionId,
        conflict_path: &str,
        conflict_number: u32,
        detected_at: i64,
    ) -> Result<SyncConflict>;

    /// List logged conflicts, newest first
    async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>>;
}

/// libSQL implementation of `SessionRepository`
pub struct LibSqlSessionRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSessionRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    async fn query_sessions(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<EditSession>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut sessions = Vec::new();
        while let Some(row) = rows.next().await? {
            sessions.push(Self::parse_session(&row)?);
        }
        Ok(sessions)
    }

    /// Parse a session from a row selected with `SESSION_COLUMNS`
    fn parse_session(row: &Row) -> Result<EditSession> {
        let id: String = row.get(0)?;
        let status: String = row.get(9)?;
        let original_content: String = row.get(7)?;
        Ok(EditSession {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("Invalid session ID: {id}")))?,
            chat_id: row.get(1)?,
            user_id: optional_text(row, 2)?,
            document_id: row.get(3)?,
            document_url: row.get(4)?,
            local_path: PathBuf::from(row.get::<String>(5)?),
            file_name: row.get(6)?,
            last_sync_content: optional_text(row, 8)?
                .unwrap_or_else(|| original_content.clone()),
            original_content,
            status: status.parse().map_err(Error::Database)?,
            last_revision_id: optional_integer(row, 10)?,
            last_sync_time: row.get(11)?,
            sync_count: counter(row, 12)?,
            conflict_count: counter(row, 13)?,
            created_at: row.get(14)?,
            ended_at: optional_integer(row, 15)?,
        })
    }
}

impl SessionRepository for LibSqlSessionRepository<'_> {
    async fn insert(&self, session: &EditSession) -> Result<()> {
        let now = unix_millis_now();
        self.conn
            .execute(
                "INSERT INTO edit_sessions (
                    id, chat_id, user_id, document_id, document_url, local_path, file_name,
                    original_content, last_sync_content, status, last_revision_id,
                    last_sync_time, sync_count, conflict_count, created_at, updated_at, ended_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    session.id.as_str(),
                    session.chat_id.as_str(),
                    text_or_null(session.user_id.as_deref()),
                    session.document_id.as_str(),
                    session.document_url.as_str(),
                    session.local_path.to_string_lossy().to_string(),
                    session.file_name.as_str(),
                    session.original_content.as_str(),
                    session.last_sync_content.as_str(),
                    session.status.as_str(),
                    integer_or_null(session.last_revision_id),
                    session.last_sync_time,
                    i64::from(session.sync_count),
                    i64::from(session.conflict_count),
                    session.created_at,
                    now,
                    integer_or_null(session.ended_at)
                ],
            )
            .await?;
        Ok(())
    }

    async fn update_progress(&self, session: &EditSession) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE edit_sessions
                 SET last_revision_id = ?, last_sync_time = ?, last_sync_content = ?,
                     sync_count = ?, conflict_count = ?, status = ?, updated_at = ?
                 WHERE id = ?",
                params![
                    integer_or_null(session.last_revision_id),
                    session.last_sync_time,
                    session.last_sync_content.as_str(),
                    i64::from(session.sync_count),
                    i64::from(session.conflict_count),
                    session.status.as_str(),
                    unix_millis_now(),
                    session.id.as_str()
                ],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(session.id.to_string()));
        }
        Ok(())
    }

    async fn mark_completed(&self, id: &SessionId, ended_at: i64) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE edit_sessions SET status = ?, ended_at = ?, updated_at = ? WHERE id = ?",
                params![
                    SessionStatus::Completed.as_str(),
                    ended_at,
                    unix_millis_now(),
                    id.as_str()
                ],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn get(&self, id: &SessionId) -> Result<Option<EditSession>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM edit_sessions WHERE id = ?");
        let mut sessions = self.query_sessions(&sql, params![id.as_str()]).await?;
        Ok(sessions.pop())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<EditSession>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM edit_sessions ORDER BY created_at DESC LIMIT ?"
        );
        self.query_sessions(&sql, params![limit as i64]).await
    }

    async fn list_restorable(&self, created_after: i64) -> Result<Vec<EditSession>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM edit_sessions
             WHERE status = ? AND created_at >= ?
             ORDER BY created_at ASC"
        );
        self.query_sessions(
            &sql,
            params![SessionStatus::Editing.as_str(), created_after],
        )
        .await
    }

    async fn record_conflict(
        &self,
        session_id: &SessionId,
        conflict_path: &str,
        conflict_number: u32,
        detected_at: i64,
    ) -> Result<SyncConflict> {
        self.conn
            .execute(
                "INSERT INTO sync_conflicts (session_id, conflict_path, conflict_number, detected_at)
                 VALUES (?, ?, ?, ?)",
                params![
                    session_id.as_str(),
                    conflict_path,
                    i64::from(conflict_number),
                    detected_at
                ],
            )
            .await?;

        Ok(SyncConflict {
            id: self.conn.last_insert_rowid(),
            session_id: session_id.to_string(),
            conflict_path: conflict_path.to_string(),
            conflict_number,
            detected_at,
        })
    }

    async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, session_id, conflict_path, conflict_number, detected_at
                 FROM sync_conflicts
                 ORDER BY detected_at DESC, id DESC
                 LIMIT ?",
                params![limit as i64],
            )
            .await?;

        let mut conflicts = Vec::new();
        while let Some(row) = rows.next().await? {
            conflicts.push(SyncConflict {
                id: row.get(0)?,
                session_id: row.get(1)?,
                conflict_path: row.get(2)?,
                conflict_number: counter(&row, 3)?,
                detected_at: row.get(4)?,
            });
        }
        Ok(conflicts)
    }
}

fn text_or_null(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |text| Value::Text(text.to_string()))
}

fn integer_or_null(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}

fn optional_text(row: &Row, index: i32) -> Result<Option<String>> {
    match row.get_value(index)? {
        Value::Text(text) => Ok(Some(text)),
        Value::Null => Ok(None),
        other => Err(Error::Database(format!(
            "Expected text in column {index}, got {other:?}"
        ))),
    }
}

fn optional_integer(row: &Row, index: i32) -> Result<Option<i64>> {
    match row.get_value(index)? {
        Value::Integer(value) => Ok(Some(value)),
        Value::Null => Ok(None),
        other => Err(Error::Database(format!(
            "Expected integer in column {index}, got {other:?}"
        ))),
    }
}

fn counter(row: &Row, index: i32) -> Result<u32> {
    let value: i64 = row.get(index)?;
    u32::try_from(value)
        .map_err(|_| Error::Database(format!("Counter out of range in column {index}: {value}")))
}
