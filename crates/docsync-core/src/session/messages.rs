//! User-facing chat messages

use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use crate::models::EditSession;

pub fn start_message(session: &EditSession, interval: Duration) -> String {
    format!(
        "✅ Edit session created\n\n\
         📝 Edit link: {url}\n\
         🔑 Session: {short}\n\
         ⏱ Sync interval: every {seconds} seconds\n\n\
         How to use:\n\
         • Open the link and edit the document\n\
         • Changes are synced back to the local Markdown file\n\
         • Send \"stop edit\" to end the session\n\
         • Send \"edit status\" to check progress\n\n\
         ⚠️ Avoid editing the local file and the document at the same time",
        url = session.document_url,
        short = session.id.short(),
        seconds = interval.as_secs(),
    )
}

pub fn already_editing_message(session: &EditSession) -> String {
    format!(
        "⚠️ This file is already being edited\nEdit link: {}\nSession: {}",
        session.document_url, session.id
    )
}

pub fn stop_message(session: &EditSession, now_ms: i64) -> String {
    format!(
        "✅ Edit session finished\n\n\
         📄 File: {file}\n\
         ⏱ Duration: {minutes} min\n\
         🔄 Syncs: {syncs}\n\
         ⚠️ Conflicts: {conflicts}\n\n\
         Saved locally at: {path}",
        file = session.file_name,
        minutes = session.duration_minutes(now_ms),
        syncs = session.sync_count,
        conflicts = session.conflict_count,
        path = session.local_path.display(),
    )
}

pub fn status_message(sessions: &[EditSession], now_ms: i64) -> String {
    if sessions.is_empty() {
        return "No active edit sessions".to_string();
    }

    let mut message = String::from("📝 Active edit sessions\n");
    for session in sessions {
        let _ = write!(
            message,
            "\n• File: {file}\n  Session: {short}\n  Status: {marker} {status}\n  \
             Syncs: {syncs}\n  Duration: {minutes} min\n  Link: {url}\n",
            file = session.file_name,
            short = session.id.short(),
            marker = session.status.marker(),
            status = session.status,
            syncs = session.sync_count,
            minutes = session.duration_minutes(now_ms),
            url = session.document_url,
        );
    }
    message
}

pub fn conflict_message(session: &EditSession, artifact: &Path) -> String {
    let artifact_name = artifact
        .file_name()
        .map_or_else(|| artifact.display().to_string(), |name| name.to_string_lossy().into_owned());
    format!(
        "⚠️ Edit conflict\n\nFile: {}\nConflict saved to: {artifact_name}\n\
         Resolve it by hand, or send \"stop edit\" to end the session.",
        session.file_name
    )
}

pub fn error_message(session: &EditSession, error: &str) -> String {
    format!("⚠️ Sync failed (session {}): {error}", session.id.short())
}
