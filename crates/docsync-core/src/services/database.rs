//! Shared database service used by the session registry and the CLI.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{Database, LibSqlSessionRepository, SessionRepository};
use crate::models::{EditSession, SessionId, SyncConflict};
use crate::Result;

/// Thread-safe service for DB and repository operations.
#[derive(Clone)]
pub struct DatabaseService {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl DatabaseService {
    /// Open a database service at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let db = Database::open(&db_path).await?;
        tracing::debug!(path = %db_path.display(), "Opened session database");
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory database service (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Path of the backing file, `None` for in-memory databases.
    pub fn path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    /// Persist a newly started session.
    pub async fn insert_session(&self, session: &EditSession) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlSessionRepository::new(db.connection());
        repo.insert(session).await
    }

    /// Persist the result of a sync tick.
    pub async fn update_session(&self, session: &EditSession) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlSessionRepository::new(db.connection());
        repo.update_progress(session).await
    }

    /// Persist a stopped session as completed.
    pub async fn complete_session(&self, id: &SessionId, ended_at: i64) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlSessionRepository::new(db.connection());
        repo.mark_completed(id, ended_at).await
    }

    /// Fetch a session by id.
    pub async fn get_session(&self, id: &SessionId) -> Result<Option<EditSession>> {
        let db = self.db.lock().await;
        let repo = LibSqlSessionRepository::new(db.connection());
        repo.get(id).await
    }

    /// List sessions newest-first.
    pub async fn list_sessions(&self, limit: usize) -> Result<Vec<EditSession>> {
        let db = self.db.lock().await;
        let repo = LibSqlSessionRepository::new(db.connection());
        repo.list_recent(limit).await
    }

    /// Sessions eligible for restore.
    pub async fn restorable_sessions(&self, created_after: i64) -> Result<Vec<EditSession>> {
        let db = self.db.lock().await;
        let repo = LibSqlSessionRepository::new(db.connection());
        repo.list_restorable(created_after).await
    }

    /// Log a detected conflict.
    pub async fn record_conflict(
        &self,
        session_id: &SessionId,
        conflict_path: &str,
        conflict_number: u32,
        detected_at: i64,
    ) -> Result<SyncConflict> {
        let db = self.db.lock().await;
        let repo = LibSqlSessionRepository::new(db.connection());
        repo.record_conflict(session_id, conflict_path, conflict_number, detected_at)
            .await
    }

    /// List recently detected conflicts.
    pub async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let db = self.db.lock().await;
        let repo = LibSqlSessionRepository::new(db.connection());
        repo.list_conflicts(limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn in_memory_insert_and_list_roundtrip() {
        let service = DatabaseService::open_in_memory().await.unwrap();
        let session = EditSession::new(
            "chat",
            None,
            "doc",
            "https://feishu.cn/docx/doc",
            PathBuf::from("/tmp/test.md"),
            "# T",
        );

        service.insert_session(&session).await.unwrap();
        let sessions = service.list_sessions(10).await.unwrap();

        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, session.id);
        assert!(service.path().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn file_backed_service_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("docsync.db");
        let session = EditSession::new(
            "chat",
            None,
            "doc",
            "https://feishu.cn/docx/doc",
            tmp.path().join("test.md"),
            "# T",
        );

        {
            let service = DatabaseService::open_path(&db_path).await.unwrap();
            service.insert_session(&session).await.unwrap();
        }

        let reopened = DatabaseService::open_path(&db_path).await.unwrap();
        let loaded = reopened.get_session(&session.id).await.unwrap();
        assert_eq!(loaded, Some(session));
    }
}
