use std::env;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use docsync_core::remote::{ApiClient, HttpDocumentStore, HttpNotifier, LogNotifier, Notifier};
use docsync_core::services::DatabaseService;
use docsync_core::util::unix_millis_now;
use docsync_core::{models::SyncConflict, EditSession, EditorConfig, RemoteConfig, SessionRegistry};
use serde::Serialize;

use crate::error::CliError;

/// Chat id used when sessions are driven from a terminal
pub const LOCAL_CHAT_ID: &str = "local";

#[derive(Debug, Serialize)]
pub struct SessionListItem {
    pub id: String,
    pub file_name: String,
    pub local_path: String,
    pub document_url: String,
    pub status: String,
    pub sync_count: u32,
    pub conflict_count: u32,
    pub created_at: i64,
    pub ended_at: Option<i64>,
    pub relative_time: String,
}

#[derive(Debug, Serialize)]
pub struct ConflictItem {
    pub id: i64,
    pub session_id: String,
    pub conflict_path: String,
    pub conflict_number: u32,
    pub detected_at: i64,
    pub detected_at_iso: String,
}

pub fn session_to_item(session: &EditSession) -> SessionListItem {
    SessionListItem {
        id: session.id.to_string(),
        file_name: session.file_name.clone(),
        local_path: session.local_path.display().to_string(),
        document_url: session.document_url.clone(),
        status: session.status.to_string(),
        sync_count: session.sync_count,
        conflict_count: session.conflict_count,
        created_at: session.created_at,
        ended_at: session.ended_at,
        relative_time: format_relative_time(session.created_at, unix_millis_now()),
    }
}

pub fn conflict_to_item(conflict: &SyncConflict) -> ConflictItem {
    ConflictItem {
        id: conflict.id,
        session_id: conflict.session_id.clone(),
        conflict_path: conflict.conflict_path.clone(),
        conflict_number: conflict.conflict_number,
        detected_at: conflict.detected_at,
        detected_at_iso: format_timestamp(conflict.detected_at),
    }
}

pub fn format_session_lines(sessions: &[EditSession]) -> Vec<String> {
    let now_ms = unix_millis_now();
    sessions
        .iter()
        .map(|session| {
            format!(
                "{short}  {status:<9}  {file:<24}  syncs={syncs} conflicts={conflicts}  {relative}",
                short = session.id.short(),
                status = session.status.as_str(),
                file = session.file_name,
                syncs = session.sync_count,
                conflicts = session.conflict_count,
                relative = format_relative_time(session.created_at, now_ms),
            )
        })
        .collect()
}

pub fn format_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  #{:<3}  session={}  {}",
                format_timestamp(conflict.detected_at),
                conflict.conflict_number,
                conflict.session_id,
                conflict.conflict_path
            )
        })
        .collect()
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else {
        format!("{}d ago", diff / day)
    }
}

/// Resolve a file name from a chat command against `root`.
///
/// Only relative `.md` paths that stay inside `root` are accepted.
pub fn resolve_markdown_path(root: &Path, file_name: &str) -> Result<PathBuf, CliError> {
    let relative = Path::new(file_name);
    let escapes = relative
        .components()
        .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(CliError::NotMarkdown(file_name.to_string()));
    }
    ensure_markdown(relative)?;
    Ok(root.join(relative))
}

pub fn ensure_markdown(path: &Path) -> Result<(), CliError> {
    let is_markdown = path
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("md"));
    if is_markdown {
        Ok(())
    } else {
        Err(CliError::NotMarkdown(path.display().to_string()))
    }
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    cli_db_path
        .or_else(|| env::var_os("DOCSYNC_DB_PATH").map(PathBuf::from))
        .or_else(default_db_path)
        .ok_or(CliError::NoDataDir)
}

pub fn default_db_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("docsync").join("docsync.db"))
}

pub async fn open_database(path: &Path) -> Result<DatabaseService, CliError> {
    Ok(DatabaseService::open_path(path).await?)
}

/// Build a registry backed by the hosted document API.
///
/// Notifications go to the chat API only when a chat id was given.
pub fn build_registry(db: DatabaseService, notify_chat: bool) -> Result<SessionRegistry, CliError> {
    let config = EditorConfig::from_env()?;
    let remote = RemoteConfig::from_env()?.ok_or(CliError::RemoteNotConfigured)?;
    let api = Arc::new(ApiClient::new(remote)?);

    let notifier: Arc<dyn Notifier> = if notify_chat {
        Arc::new(HttpNotifier::new(Arc::clone(&api)))
    } else {
        Arc::new(LogNotifier)
    };
    let store = Arc::new(HttpDocumentStore::new(api));

    Ok(SessionRegistry::new(store, notifier, db, config))
}
