//! Edit session registry: lifecycle, periodic sync timers and restart recovery

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::messages;
use crate::config::EditorConfig;
use crate::error::{Error, Result};
use crate::models::{EditSession, SessionId, SessionStatus};
use crate::remote::{fetch_remote_markdown, upload_markdown, DocumentHandle, DocumentStore, Notifier};
use crate::services::DatabaseService;
use crate::sync::{read_local, sync_session, SyncStep};
use crate::util::unix_millis_now;

/// Why a tick did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another tick of the same session is still running
    Busy,
    /// The session is not in `editing` status
    NotEditing,
    /// The session is not registered
    Missing,
}

/// What one sync tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Skipped(SkipReason),
    Unchanged,
    Converged,
    Applied {
        sync_count: u32,
    },
    Conflict {
        artifact: PathBuf,
        conflict_number: u32,
    },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started {
        session_id: SessionId,
        document_url: String,
        message: String,
    },
    /// The file already has a session; nothing was created
    AlreadyEditing {
        session_id: SessionId,
        document_url: String,
        message: String,
    },
}

impl StartOutcome {
    pub fn message(&self) -> &str {
        match self {
            Self::Started { message, .. } | Self::AlreadyEditing { message, .. } => message,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StopSummary {
    pub session: EditSession,
    /// Outcome of the final sync, `None` when the session was not editing
    pub final_sync: Option<TickOutcome>,
    pub message: String,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct SessionSlot {
    session: Mutex<EditSession>,
    /// Held for the whole duration of a tick
    busy: tokio::sync::Mutex<()>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl SessionSlot {
    fn new(session: EditSession) -> Self {
        Self {
            session: Mutex::new(session),
            busy: tokio::sync::Mutex::new(()),
            timer: Mutex::new(None),
        }
    }

    fn session(&self) -> MutexGuard<'_, EditSession> {
        lock(&self.session)
    }

    fn snapshot(&self) -> EditSession {
        self.session().clone()
    }

    fn cancel_timer(&self) {
        if let Some(timer) = lock(&self.timer).take() {
            timer.abort();
        }
    }
}

struct RegistryInner {
    store: Arc<dyn DocumentStore>,
    notifier: Arc<dyn Notifier>,
    db: DatabaseService,
    config: EditorConfig,
    sessions: Mutex<HashMap<SessionId, Arc<SessionSlot>>>,
    /// Paths whose session is being created
    opening: Mutex<HashSet<PathBuf>>,
}

/// Releases a path reservation when dropped
struct PathReservation<'a> {
    opening: &'a Mutex<HashSet<PathBuf>>,
    path: PathBuf,
}

impl Drop for PathReservation<'_> {
    fn drop(&mut self) {
        lock(self.opening).remove(&self.path);
    }
}

enum Reservation<'a> {
    Reserved(PathReservation<'a>),
    Existing(EditSession),
}

/// Owns every live edit session of the process.
///
/// Cloning is cheap; clones share the same sessions.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl SessionRegistry {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        notifier: Arc<dyn Notifier>,
        db: DatabaseService,
        config: EditorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                store,
                notifier,
                db,
                config,
                sessions: Mutex::new(HashMap::new()),
                opening: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.inner.config
    }

    /// Start editing `local_path` in a new remote document.
    ///
    /// Returns [`StartOutcome::AlreadyEditing`] without creating anything when
    /// the file already has a live session.
    pub async fn start(
        &self,
        chat_id: &str,
        local_path: impl AsRef<Path>,
        user_id: Option<String>,
    ) -> Result<StartOutcome> {
        let path = std::path::absolute(local_path.as_ref())?;
        let _reservation = match self.reserve_path(&path)? {
            Reservation::Reserved(reservation) => reservation,
            Reservation::Existing(existing) => {
                tracing::info!(
                    session_id = %existing.id,
                    path = %path.display(),
                    "File already has an edit session"
                );
                return Ok(StartOutcome::AlreadyEditing {
                    session_id: existing.id,
                    message: messages::already_editing_message(&existing),
                    document_url: existing.document_url,
                });
            }
        };

        let content = read_local(&path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let title = format!("{}{file_name}", self.inner.config.title_prefix);

        let handle = self.inner.store.create_document(&title).await?;
        let (session, blocks) = match self
            .publish_session(chat_id, user_id, &handle, path, content)
            .await
        {
            Ok(published) => published,
            Err(error) => {
                tracing::error!(
                    document_id = %handle.document_id,
                    document_url = %handle.url,
                    %error,
                    "Edit session setup failed, remote document left behind"
                );
                return Err(error);
            }
        };

        let message = messages::start_message(&session, self.inner.config.sync_interval);
        let session_id = session.id;
        let document_url = session.document_url.clone();
        tracing::info!(
            session_id = %session_id,
            document_id = %session.document_id,
            path = %session.local_path.display(),
            blocks,
            "Started edit session"
        );
        self.register(session);

        Ok(StartOutcome::Started {
            session_id,
            document_url,
            message,
        })
    }

    /// Upload `content` to a fresh document and persist the session bound to it.
    ///
    /// The session starts from the remote rendering of the upload, which is
    /// what every later tick reads back.
    async fn publish_session(
        &self,
        chat_id: &str,
        user_id: Option<String>,
        handle: &DocumentHandle,
        path: PathBuf,
        content: String,
    ) -> Result<(EditSession, usize)> {
        let store = self.inner.store.as_ref();
        let config = &self.inner.config;
        let blocks = upload_markdown(store, &handle.document_id, &content, config).await?;
        let uploaded =
            fetch_remote_markdown(store, &handle.document_id, config.max_child_depth).await?;

        let mut session = EditSession::new(
            chat_id,
            user_id,
            handle.document_id.clone(),
            handle.url.clone(),
            path,
            content,
        );
        session.last_sync_content = uploaded.content;
        session.last_revision_id = uploaded.revision_id;
        self.inner.db.insert_session(&session).await?;
        Ok((session, blocks))
    }

    /// Run a final sync, cancel the timer and mark the session completed
    pub async fn stop(&self, id: SessionId) -> Result<StopSummary> {
        let slot = self
            .slot(&id)
            .ok_or_else(|| Error::NotFound(format!("edit session {id}")))?;

        // Waits for an in-flight tick to finish
        let _busy = slot.busy.lock().await;
        if !self.contains(&id) {
            return Err(Error::NotFound(format!("edit session {id}")));
        }

        let final_sync = if slot.snapshot().status == SessionStatus::Editing {
            Some(self.run_tick(&slot).await)
        } else {
            None
        };
        slot.cancel_timer();

        let ended_at = unix_millis_now();
        let session = {
            let mut session = slot.session();
            session.status = SessionStatus::Completed;
            session.ended_at = Some(ended_at);
            session.clone()
        };
        lock(&self.inner.sessions).remove(&id);
        self.inner.db.complete_session(&id, ended_at).await?;

        tracing::info!(
            session_id = %id,
            syncs = session.sync_count,
            conflicts = session.conflict_count,
            "Stopped edit session"
        );
        Ok(StopSummary {
            message: messages::stop_message(&session, ended_at),
            session,
            final_sync,
        })
    }

    /// Stop the newest session of a chat
    pub async fn stop_for_chat(&self, chat_id: &str) -> Result<StopSummary> {
        let session = self
            .find_by_chat(chat_id)
            .ok_or_else(|| Error::NotFound(format!("edit session for chat {chat_id}")))?;
        self.stop(session.id).await
    }

    /// Live sessions of a chat, oldest first
    pub fn status(&self, chat_id: &str) -> Vec<EditSession> {
        let mut sessions: Vec<EditSession> = self
            .list()
            .into_iter()
            .filter(|session| session.chat_id == chat_id)
            .collect();
        sessions.sort_by_key(|session| session.created_at);
        sessions
    }

    pub fn status_message(&self, chat_id: &str) -> String {
        messages::status_message(&self.status(chat_id), unix_millis_now())
    }

    /// Resume persisted `editing` sessions created within the recovery window
    pub async fn restore(&self) -> Result<Vec<SessionId>> {
        let window = i64::try_from(self.inner.config.recovery_window.as_millis()).unwrap_or(i64::MAX);
        let cutoff = unix_millis_now().saturating_sub(window);
        let candidates = self.inner.db.restorable_sessions(cutoff).await?;

        let mut restored = Vec::new();
        for mut session in candidates {
            if self.contains(&session.id) {
                continue;
            }
            if let Some(existing) = self.find_by_path(&session.local_path) {
                tracing::warn!(
                    session_id = %session.id,
                    existing = %existing.id,
                    path = %session.local_path.display(),
                    "Skipping restore of a file that already has a session"
                );
                continue;
            }
            session.status = SessionStatus::Editing;
            restored.push(self.register(session));
        }

        tracing::info!(count = restored.len(), "Restored edit sessions");
        Ok(restored)
    }

    /// Put an `error` session back to `editing`; returns whether it changed
    pub fn reset(&self, id: SessionId) -> Result<bool> {
        let slot = self
            .slot(&id)
            .ok_or_else(|| Error::NotFound(format!("edit session {id}")))?;
        let mut session = slot.session();
        if session.status == SessionStatus::Error {
            session.status = SessionStatus::Editing;
            tracing::info!(session_id = %id, "Reset edit session after error");
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Run one tick now, outside the timer
    pub async fn sync_now(&self, id: SessionId) -> Result<TickOutcome> {
        if !self.contains(&id) {
            return Err(Error::NotFound(format!("edit session {id}")));
        }
        Ok(self.tick(id).await)
    }

    /// Cancel every timer and forget all sessions without completing them
    pub fn shutdown(&self) {
        let slots: Vec<Arc<SessionSlot>> = lock(&self.inner.sessions)
            .drain()
            .map(|(_, slot)| slot)
            .collect();
        for slot in &slots {
            slot.cancel_timer();
        }
        tracing::info!(count = slots.len(), "Edit session registry shut down");
    }

    pub fn get(&self, id: SessionId) -> Option<EditSession> {
        self.slot(&id).map(|slot| slot.snapshot())
    }

    /// Every live session, oldest first
    pub fn list(&self) -> Vec<EditSession> {
        let slots: Vec<Arc<SessionSlot>> = lock(&self.inner.sessions).values().cloned().collect();
        let mut sessions: Vec<EditSession> = slots.iter().map(|slot| slot.snapshot()).collect();
        sessions.sort_by_key(|session| session.created_at);
        sessions
    }

    /// Newest live session of a chat
    pub fn find_by_chat(&self, chat_id: &str) -> Option<EditSession> {
        self.list()
            .into_iter()
            .filter(|session| session.chat_id == chat_id)
            .max_by_key(|session| session.created_at)
    }

    /// One sync tick, skipped when the previous one is still running
    pub async fn tick(&self, id: SessionId) -> TickOutcome {
        let Some(slot) = self.slot(&id) else {
            return TickOutcome::Skipped(SkipReason::Missing);
        };
        let Ok(_busy) = slot.busy.try_lock() else {
            tracing::debug!(session_id = %id, "Previous sync still running, skipping tick");
            return TickOutcome::Skipped(SkipReason::Busy);
        };
        self.run_tick(&slot).await
    }

    fn slot(&self, id: &SessionId) -> Option<Arc<SessionSlot>> {
        lock(&self.inner.sessions).get(id).cloned()
    }

    fn contains(&self, id: &SessionId) -> bool {
        lock(&self.inner.sessions).contains_key(id)
    }

    fn find_by_path(&self, path: &Path) -> Option<EditSession> {
        lock(&self.inner.sessions)
            .values()
            .map(|slot| slot.snapshot())
            .find(|session| session.local_path == path)
    }

    fn reserve_path(&self, path: &Path) -> Result<Reservation<'_>> {
        let mut opening = lock(&self.inner.opening);
        if let Some(existing) = self.find_by_path(path) {
            return Ok(Reservation::Existing(existing));
        }
        if !opening.insert(path.to_path_buf()) {
            return Err(Error::InvalidInput(format!(
                "{} is already being opened for editing",
                path.display()
            )));
        }
        Ok(Reservation::Reserved(PathReservation {
            opening: &self.inner.opening,
            path: path.to_path_buf(),
        }))
    }

    fn register(&self, session: EditSession) -> SessionId {
        let id = session.id;
        let slot = Arc::new(SessionSlot::new(session));
        lock(&self.inner.sessions).insert(id, Arc::clone(&slot));
        *lock(&slot.timer) = Some(self.spawn_timer(id));
        id
    }

    fn spawn_timer(&self, id: SessionId) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.config.sync_interval;

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let registry = Self { inner };
                if !registry.contains(&id) {
                    break;
                }
                // Ticks run detached so a slow one is skipped, not queued
                tokio::spawn(async move {
                    registry.tick(id).await;
                });
            }
        })
    }

    /// Body of a tick; the caller holds the busy guard
    async fn run_tick(&self, slot: &SessionSlot) -> TickOutcome {
        let snapshot = {
            let mut session = slot.session();
            if session.status != SessionStatus::Editing {
                return TickOutcome::Skipped(SkipReason::NotEditing);
            }
            session.status = SessionStatus::Syncing;
            session.clone()
        };

        match sync_session(self.inner.store.as_ref(), &self.inner.config, &snapshot).await {
            Ok(step) => self.apply_step(slot, step).await,
            Err(error) => self.fail_tick(slot, &error).await,
        }
    }

    async fn apply_step(&self, slot: &SessionSlot, step: SyncStep) -> TickOutcome {
        let now = unix_millis_now();
        let mut detected_at = now;
        let (outcome, persisted) = {
            let mut session = slot.session();
            let outcome = match step {
                SyncStep::Unchanged => {
                    session.status = SessionStatus::Editing;
                    return TickOutcome::Unchanged;
                }
                SyncStep::Converged {
                    content,
                    revision_id,
                } => {
                    session.last_sync_content = content;
                    session.last_revision_id = revision_id;
                    session.status = SessionStatus::Editing;
                    TickOutcome::Converged
                }
                SyncStep::Applied {
                    content,
                    revision_id,
                    ..
                } => {
                    session.last_sync_content = content;
                    session.last_revision_id = revision_id;
                    session.sync_count += 1;
                    session.status = SessionStatus::Editing;
                    TickOutcome::Applied {
                        sync_count: session.sync_count,
                    }
                }
                SyncStep::Conflict {
                    record,
                    artifact,
                    revision_id,
                } => {
                    session.last_revision_id = revision_id;
                    session.conflict_count = record.conflict_number;
                    session.status = SessionStatus::Conflict;
                    detected_at = record.detected_at;
                    TickOutcome::Conflict {
                        artifact,
                        conflict_number: record.conflict_number,
                    }
                }
            };
            session.last_sync_time = now;

            let mut persisted = session.clone();
            persisted.status = SessionStatus::Editing;
            (outcome, persisted)
        };

        if self.contains(&persisted.id) {
            if let Err(error) = self.inner.db.update_session(&persisted).await {
                tracing::error!(session_id = %persisted.id, %error, "Failed to persist sync progress");
            }
        }

        if let TickOutcome::Conflict {
            artifact,
            conflict_number,
        } = &outcome
        {
            if let Err(error) = self
                .inner
                .db
                .record_conflict(
                    &persisted.id,
                    &artifact.to_string_lossy(),
                    *conflict_number,
                    detected_at,
                )
                .await
            {
                tracing::warn!(session_id = %persisted.id, %error, "Failed to log conflict");
            }
            self.notify(
                &persisted.chat_id,
                &messages::conflict_message(&persisted, artifact),
            )
            .await;

            let mut session = slot.session();
            if session.status == SessionStatus::Conflict {
                session.status = SessionStatus::Editing;
            }
        }

        outcome
    }

    async fn fail_tick(&self, slot: &SessionSlot, error: &Error) -> TickOutcome {
        let message = error.to_string();
        let session = {
            let mut session = slot.session();
            session.status = SessionStatus::Error;
            session.clone()
        };
        tracing::error!(session_id = %session.id, %error, "Sync failed, pausing session");
        self.notify(&session.chat_id, &messages::error_message(&session, &message))
            .await;
        TickOutcome::Failed(message)
    }

    async fn notify(&self, chat_id: &str, text: &str) {
        if let Err(error) = self.inner.notifier.notify(chat_id, text).await {
            tracing::warn!(chat_id, %error, "Failed to send notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MemoryDocumentStore, MemoryNotifier};
    use crate::sync::backup_path;
    use std::time::Duration;
    use tempfile::TempDir;

    const HOUR_MS: i64 = 60 * 60 * 1000;

    struct Harness {
        dir: TempDir,
        store: Arc<MemoryDocumentStore>,
        notifier: Arc<MemoryNotifier>,
        db: DatabaseService,
        registry: SessionRegistry,
    }

    impl Harness {
        async fn new() -> Self {
            Self::with_interval(Duration::from_secs(3600)).await
        }

        async fn with_interval(sync_interval: Duration) -> Self {
            let store = Arc::new(MemoryDocumentStore::new());
            let notifier = Arc::new(MemoryNotifier::new());
            let db = DatabaseService::open_in_memory().await.unwrap();
            let config = EditorConfig {
                sync_interval,
                append_batch_delay: Duration::ZERO,
                ..EditorConfig::default()
            };
            let registry =
                SessionRegistry::new(store.clone(), notifier.clone(), db.clone(), config);
            Self {
                dir: tempfile::tempdir().unwrap(),
                store,
                notifier,
                db,
                registry,
            }
        }

        async fn file(&self, name: &str, content: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            tokio::fs::write(&path, content).await.unwrap();
            path
        }

        async fn start(&self, path: &Path) -> SessionId {
            match self.registry.start("chat-1", path, None).await.unwrap() {
                StartOutcome::Started { session_id, .. } => session_id,
                StartOutcome::AlreadyEditing { .. } => panic!("expected a new session"),
            }
        }

        fn session(&self, id: SessionId) -> EditSession {
            self.registry.get(id).unwrap()
        }
    }

    async fn read(path: &Path) -> String {
        tokio::fs::read_to_string(path).await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn start_creates_document_and_persists_session() {
        let h = Harness::new().await;
        let path = h.file("test.md", "# T\n\nbody").await;

        let outcome = h.registry.start("chat-1", &path, Some("user-1".into())).await.unwrap();

        let StartOutcome::Started {
            session_id,
            document_url,
            message,
        } = outcome
        else {
            panic!("expected started");
        };
        assert!(message.contains(&document_url));
        assert_eq!(h.store.document_count(), 1);

        let session = h.session(session_id);
        let metadata = h.store.get_metadata(&session.document_id).await.unwrap();
        assert_eq!(metadata.title, "[Editing] test.md");
        assert_eq!(session.status, SessionStatus::Editing);

        let persisted = h.db.get_session(&session_id).await.unwrap().unwrap();
        assert_eq!(persisted.user_id.as_deref(), Some("user-1"));
        assert_eq!(persisted.original_content, "# T\n\nbody");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn second_start_for_same_file_reports_existing_session() {
        let h = Harness::new().await;
        let path = h.file("test.md", "# T").await;
        let first = h.start(&path).await;

        let outcome = h.registry.start("chat-2", &path, None).await.unwrap();

        let StartOutcome::AlreadyEditing {
            session_id,
            message,
            ..
        } = outcome
        else {
            panic!("expected already editing");
        };
        assert_eq!(session_id, first);
        assert!(message.contains(&first.to_string()));
        assert_eq!(h.store.document_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_start_releases_the_path() {
        let h = Harness::new().await;
        let path = h.dir.path().join("later.md");

        assert!(h.registry.start("chat-1", &path, None).await.is_err());
        assert_eq!(h.store.document_count(), 0);

        tokio::fs::write(&path, "# Later").await.unwrap();
        h.start(&path).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unchanged_remote_leaves_file_and_counters_alone() {
        let h = Harness::new().await;
        let path = h.file("test.md", "# T").await;
        let id = h.start(&path).await;

        assert_eq!(h.registry.sync_now(id).await.unwrap(), TickOutcome::Unchanged);

        assert_eq!(read(&path).await, "# T");
        assert!(!backup_path(&path).exists());
        assert_eq!(h.session(id).sync_count, 0);
        assert_eq!(h.session(id).status, SessionStatus::Editing);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn formatting_the_remote_normalizes_is_not_a_change() {
        let h = Harness::new().await;
        let original = "# Title\n\nA.\n\nB.\n";
        let path = h.file("test.md", original).await;
        let id = h.start(&path).await;

        assert_eq!(h.session(id).last_sync_content, "# Title\n\nA.\nB.");
        assert_eq!(h.session(id).original_content, original);
        assert_eq!(h.registry.sync_now(id).await.unwrap(), TickOutcome::Unchanged);
        assert_eq!(read(&path).await, original);
        assert!(!backup_path(&path).exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn local_only_edit_is_never_a_conflict() {
        let h = Harness::new().await;
        let path = h.file("test.md", "# Title\n\nA.\n\nB.\n").await;
        let id = h.start(&path).await;

        tokio::fs::write(&path, "# Title\n\nA.\n\nB.\n\nC.\n").await.unwrap();
        assert_eq!(h.registry.sync_now(id).await.unwrap(), TickOutcome::Unchanged);
        assert_eq!(h.registry.sync_now(id).await.unwrap(), TickOutcome::Unchanged);

        assert_eq!(h.session(id).conflict_count, 0);
        assert!(h.db.list_conflicts(10).await.unwrap().is_empty());
        assert_eq!(read(&path).await, "# Title\n\nA.\n\nB.\n\nC.\n");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn nested_list_survives_start_and_remote_edit() {
        let h = Harness::new().await;
        let path = h.file("list.md", "- a\n  - b\n").await;
        let id = h.start(&path).await;
        let document_id = h.session(id).document_id;

        assert_eq!(h.session(id).last_sync_content, "- a\n  - b");
        assert_eq!(h.registry.sync_now(id).await.unwrap(), TickOutcome::Unchanged);

        h.store.replace_content(&document_id, "- a\n  - b\n  - c").unwrap();
        assert_eq!(
            h.registry.sync_now(id).await.unwrap(),
            TickOutcome::Applied { sync_count: 1 }
        );
        assert_eq!(read(&path).await, "- a\n  - b\n  - c");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn setup_failure_after_creation_fails_start_and_releases_path() {
        let h = Harness::new().await;
        let path = h.file("test.md", "# T").await;
        h.store.fail_reads("read back failed");

        let error = h.registry.start("chat-1", &path, None).await.unwrap_err();

        assert!(error.to_string().contains("read back failed"));
        assert_eq!(h.store.document_count(), 1);
        assert!(h.registry.list().is_empty());
        assert!(h.db.list_sessions(10).await.unwrap().is_empty());

        h.store.clear_failures();
        h.start(&path).await;
        assert_eq!(h.store.document_count(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn clean_update_applies_once_then_settles() {
        let h = Harness::new().await;
        let path = h.file("test.md", "# T").await;
        let id = h.start(&path).await;
        let document_id = h.session(id).document_id;

        h.store.replace_content(&document_id, "# T2").unwrap();
        assert_eq!(
            h.registry.sync_now(id).await.unwrap(),
            TickOutcome::Applied { sync_count: 1 }
        );
        assert_eq!(read(&path).await, "# T2");
        assert_eq!(read(&backup_path(&path)).await, "# T");

        assert_eq!(h.registry.sync_now(id).await.unwrap(), TickOutcome::Unchanged);
        assert_eq!(h.session(id).sync_count, 1);

        let persisted = h.db.get_session(&id).await.unwrap().unwrap();
        assert_eq!(persisted.last_sync_content, "# T2");
        assert_eq!(persisted.sync_count, 1);
        assert!(persisted.last_revision_id.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn conflict_keeps_local_file_and_writes_every_version() {
        let h = Harness::new().await;
        let path = h.file("test.md", "# T").await;
        let id = h.start(&path).await;
        let document_id = h.session(id).document_id;

        h.store.replace_content(&document_id, "# T2").unwrap();
        h.registry.sync_now(id).await.unwrap();

        tokio::fs::write(&path, "# Local").await.unwrap();
        h.store.replace_content(&document_id, "# Remote").unwrap();
        let outcome = h.registry.sync_now(id).await.unwrap();

        let TickOutcome::Conflict {
            artifact,
            conflict_number,
        } = outcome
        else {
            panic!("expected conflict, got {outcome:?}");
        };
        assert_eq!(conflict_number, 1);
        assert_eq!(read(&path).await, "# Local");

        let rendered = read(&artifact).await;
        assert!(rendered.contains("# Remote"));
        assert!(rendered.contains("# Local"));
        assert!(rendered.contains("# T2"));
        assert!(rendered.contains("\n# T\n"));

        let session = h.session(id);
        assert_eq!(session.conflict_count, 1);
        assert_eq!(session.status, SessionStatus::Editing);
        assert_eq!(session.last_sync_content, "# T2");

        let notices = h.notifier.messages();
        assert!(notices.iter().any(|(chat, text)| chat == "chat-1" && text.contains("conflict")));
        assert_eq!(h.db.list_conflicts(10).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unresolved_conflict_is_reported_again() {
        let h = Harness::new().await;
        let path = h.file("test.md", "# T").await;
        let id = h.start(&path).await;
        let document_id = h.session(id).document_id;

        tokio::fs::write(&path, "# Local").await.unwrap();
        h.store.replace_content(&document_id, "# Remote").unwrap();

        let TickOutcome::Conflict {
            artifact: first,
            conflict_number: 1,
        } = h.registry.sync_now(id).await.unwrap()
        else {
            panic!("expected first conflict");
        };
        let TickOutcome::Conflict {
            artifact: second,
            conflict_number,
        } = h.registry.sync_now(id).await.unwrap()
        else {
            panic!("expected second conflict");
        };
        assert_eq!(conflict_number, 2);
        assert_ne!(first, second);
        assert!(first.exists());
        assert!(second.exists());
        assert_eq!(read(&path).await, "# Local");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn identical_edits_on_both_sides_converge() {
        let h = Harness::new().await;
        let path = h.file("test.md", "# T").await;
        let id = h.start(&path).await;
        let document_id = h.session(id).document_id;

        tokio::fs::write(&path, "# Same").await.unwrap();
        h.store.replace_content(&document_id, "# Same").unwrap();

        assert_eq!(h.registry.sync_now(id).await.unwrap(), TickOutcome::Converged);
        assert_eq!(h.registry.sync_now(id).await.unwrap(), TickOutcome::Unchanged);
        assert_eq!(h.session(id).conflict_count, 0);
        assert!(!backup_path(&path).exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_tick_pauses_until_reset() {
        let h = Harness::new().await;
        let path = h.file("test.md", "# T").await;
        let id = h.start(&path).await;
        let document_id = h.session(id).document_id;

        h.store.fail_reads("network down");
        let outcome = h.registry.sync_now(id).await.unwrap();
        assert!(matches!(outcome, TickOutcome::Failed(ref message) if message.contains("network down")));
        assert_eq!(h.session(id).status, SessionStatus::Error);
        assert!(h
            .notifier
            .messages()
            .iter()
            .any(|(_, text)| text.contains("network down")));

        h.store.clear_failures();
        h.store.replace_content(&document_id, "# T2").unwrap();
        assert_eq!(
            h.registry.sync_now(id).await.unwrap(),
            TickOutcome::Skipped(SkipReason::NotEditing)
        );
        assert_eq!(read(&path).await, "# T");

        assert!(h.registry.reset(id).unwrap());
        assert!(!h.registry.reset(id).unwrap());
        assert_eq!(
            h.registry.sync_now(id).await.unwrap(),
            TickOutcome::Applied { sync_count: 1 }
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn overlapping_tick_is_skipped() {
        let h = Harness::new().await;
        let path = h.file("test.md", "# T").await;
        let id = h.start(&path).await;
        h.store.set_read_delay(Duration::from_millis(300));

        let registry = h.registry.clone();
        let slow = tokio::spawn(async move { registry.tick(id).await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(
            h.registry.tick(id).await,
            TickOutcome::Skipped(SkipReason::Busy)
        );
        assert_eq!(slow.await.unwrap(), TickOutcome::Unchanged);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn notification_failures_do_not_break_ticks() {
        let h = Harness::new().await;
        let path = h.file("test.md", "# T").await;
        let id = h.start(&path).await;
        let document_id = h.session(id).document_id;
        h.notifier.fail_with("chat offline");

        tokio::fs::write(&path, "# Local").await.unwrap();
        h.store.replace_content(&document_id, "# Remote").unwrap();

        assert!(matches!(
            h.registry.sync_now(id).await.unwrap(),
            TickOutcome::Conflict { .. }
        ));
        assert_eq!(h.session(id).status, SessionStatus::Editing);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_runs_final_sync_and_completes() {
        let h = Harness::new().await;
        let path = h.file("test.md", "# T").await;
        let id = h.start(&path).await;
        let document_id = h.session(id).document_id;
        h.store.replace_content(&document_id, "# Final").unwrap();

        let summary = h.registry.stop(id).await.unwrap();

        assert_eq!(
            summary.final_sync,
            Some(TickOutcome::Applied { sync_count: 1 })
        );
        assert_eq!(summary.session.status, SessionStatus::Completed);
        assert!(summary.message.contains("Syncs: 1"));
        assert_eq!(read(&path).await, "# Final");
        assert!(h.registry.get(id).is_none());

        let persisted = h.db.get_session(&id).await.unwrap().unwrap();
        assert_eq!(persisted.status, SessionStatus::Completed);
        assert!(persisted.ended_at.is_some());

        assert!(matches!(h.registry.stop(id).await, Err(Error::NotFound(_))));
        assert!(matches!(h.registry.sync_now(id).await, Err(Error::NotFound(_))));

        // The file is free again
        h.start(&path).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_for_chat_and_status_listing() {
        let h = Harness::new().await;
        let path = h.file("test.md", "# T").await;
        let id = h.start(&path).await;

        assert_eq!(h.registry.status("chat-1").len(), 1);
        assert!(h.registry.status("other").is_empty());
        assert!(h.registry.status_message("chat-1").contains("test.md"));

        assert!(h.registry.stop_for_chat("other").await.is_err());
        let summary = h.registry.stop_for_chat("chat-1").await.unwrap();
        assert_eq!(summary.session.id, id);
        assert_eq!(h.registry.status_message("chat-1"), "No active edit sessions");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn restore_honors_recovery_window() {
        let h = Harness::new().await;
        let now = unix_millis_now();
        let persist = |name: &str, age_hours: i64| {
            let mut session = EditSession::new(
                "chat-1",
                None,
                "doc",
                "https://docs.example.test/docx/doc",
                h.dir.path().join(name),
                "# T",
            );
            session.created_at = now - age_hours * HOUR_MS;
            session
        };
        let fresh = persist("fresh.md", 23);
        let stale = persist("stale.md", 25);
        let finished = persist("finished.md", 1);
        for session in [&fresh, &stale, &finished] {
            h.db.insert_session(session).await.unwrap();
        }
        h.db.complete_session(&finished.id, now).await.unwrap();

        let restored = h.registry.restore().await.unwrap();

        assert_eq!(restored, vec![fresh.id]);
        assert!(h.registry.get(fresh.id).is_some());
        assert!(h.registry.get(stale.id).is_none());
        let stale_row = h.db.get_session(&stale.id).await.unwrap().unwrap();
        assert_eq!(stale_row.status, SessionStatus::Editing);

        assert!(h.registry.restore().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn restored_session_resumes_from_last_synced_content() {
        let h = Harness::new().await;
        let path = h.file("test.md", "# T").await;
        let id = h.start(&path).await;
        let document_id = h.session(id).document_id;
        h.store.replace_content(&document_id, "# T2").unwrap();
        h.registry.sync_now(id).await.unwrap();
        h.registry.shutdown();
        assert!(h.registry.list().is_empty());

        let registry = SessionRegistry::new(
            h.store.clone(),
            h.notifier.clone(),
            h.db.clone(),
            h.registry.config().clone(),
        );
        assert_eq!(registry.restore().await.unwrap(), vec![id]);

        assert_eq!(registry.sync_now(id).await.unwrap(), TickOutcome::Unchanged);
        assert_eq!(registry.get(id).unwrap().sync_count, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn timer_applies_remote_changes() {
        let h = Harness::with_interval(Duration::from_millis(50)).await;
        let path = h.file("test.md", "# T").await;
        let id = h.start(&path).await;
        let document_id = h.session(id).document_id;

        h.store.replace_content(&document_id, "# Timed").unwrap();

        let mut synced = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if read(&path).await == "# Timed" {
                synced = true;
                break;
            }
        }
        assert!(synced, "timer never synced the remote change");
        h.registry.shutdown();
    }
}
