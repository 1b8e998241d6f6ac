use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use docsync_core::remote::{MemoryDocumentStore, MemoryNotifier};
use docsync_core::services::DatabaseService;
use docsync_core::{EditSession, EditorConfig, SessionRegistry, SessionStatus};

use crate::cli::CompletionShell;
use crate::commands::common::{
    conflict_to_item, format_conflict_lines, format_relative_time, format_session_lines,
    format_timestamp, open_database, resolve_db_path, resolve_markdown_path, session_to_item,
};
use crate::commands::completions::{render_completions, run_completions};
use crate::commands::serve::handle_line;
use crate::error::CliError;

fn sample_session() -> EditSession {
    EditSession::new(
        "chat-1",
        None,
        "doc1",
        "https://docs.example.test/docx/doc1",
        PathBuf::from("/notes/plan.md"),
        "# Plan",
    )
}

async fn memory_registry() -> (Arc<MemoryDocumentStore>, SessionRegistry) {
    let store = Arc::new(MemoryDocumentStore::new());
    let db = DatabaseService::open_in_memory().await.unwrap();
    let config = EditorConfig {
        sync_interval: Duration::from_secs(3600),
        append_batch_delay: Duration::ZERO,
        ..EditorConfig::default()
    };
    let registry = SessionRegistry::new(
        store.clone(),
        Arc::new(MemoryNotifier::new()),
        db,
        config,
    );
    (store, registry)
}

#[test]
fn format_relative_time_units() {
    let now = 10_000_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
    assert_eq!(format_relative_time(now - 3 * 24 * 60 * 60_000, now), "3d ago");
}

#[test]
fn format_timestamp_is_utc() {
    assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
}

#[test]
fn resolve_db_path_prefers_explicit_path() {
    let explicit = PathBuf::from("/tmp/custom.db");
    assert_eq!(resolve_db_path(Some(explicit.clone())).unwrap(), explicit);
}

#[test]
fn resolve_markdown_path_stays_inside_root() {
    let root = Path::new("/srv/notes");
    assert_eq!(
        resolve_markdown_path(root, "weekly/plan.md").unwrap(),
        root.join("weekly/plan.md")
    );
    assert!(matches!(
        resolve_markdown_path(root, "../secrets.md"),
        Err(CliError::NotMarkdown(_))
    ));
    assert!(resolve_markdown_path(root, "/etc/passwd.md").is_err());
    assert!(resolve_markdown_path(root, "plan.txt").is_err());
}

#[test]
fn session_items_carry_status_and_counts() {
    let mut session = sample_session();
    session.sync_count = 4;
    session.status = SessionStatus::Completed;

    let item = session_to_item(&session);
    assert_eq!(item.status, "completed");
    assert_eq!(item.sync_count, 4);
    assert_eq!(item.local_path, "/notes/plan.md");

    let lines = format_session_lines(&[session]);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("plan.md"));
    assert!(lines[0].contains("syncs=4"));
}

#[test]
fn completions_mention_binary_name() {
    let script = String::from_utf8(render_completions(CompletionShell::Bash)).unwrap();
    assert!(script.contains("docsync"));
}

#[test]
fn completions_can_be_written_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("docsync.fish");
    run_completions(CompletionShell::Fish, Some(&output)).unwrap();
    assert!(std::fs::read_to_string(&output).unwrap().contains("docsync"));
}

#[tokio::test(flavor = "multi_thread")]
async fn sessions_and_conflicts_are_listed_from_database_file() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("docsync.db");
    let session = sample_session();
    {
        let db = open_database(&db_path).await.unwrap();
        db.insert_session(&session).await.unwrap();
        db.record_conflict(&session.id, "/notes/plan.conflict.1.md", 1, 0)
            .await
            .unwrap();
    }

    let db = open_database(&db_path).await.unwrap();
    let sessions = db.list_sessions(10).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, session.id);

    let conflicts = db.list_conflicts(10).await.unwrap();
    let lines = format_conflict_lines(&conflicts);
    assert!(lines[0].contains("#1"));
    assert!(lines[0].contains("plan.conflict.1.md"));
    assert_eq!(conflict_to_item(&conflicts[0]).detected_at_iso, "1970-01-01 00:00:00 UTC");
}

#[tokio::test(flavor = "multi_thread")]
async fn chat_lines_drive_a_session() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("plan.md"), "# Plan").unwrap();
    let (store, registry) = memory_registry().await;

    let reply = handle_line(&registry, "chat-1", dir.path(), "edit plan.md")
        .await
        .unwrap();
    assert!(reply.contains("Edit session created"));
    assert_eq!(store.document_count(), 1);

    let reply = handle_line(&registry, "chat-1", dir.path(), "编辑 plan.md")
        .await
        .unwrap();
    assert!(reply.contains("already being edited"));
    assert_eq!(store.document_count(), 1);

    let reply = handle_line(&registry, "chat-1", dir.path(), "edit status")
        .await
        .unwrap();
    assert!(reply.contains("File: plan.md"));

    let reply = handle_line(&registry, "chat-1", dir.path(), "stop edit")
        .await
        .unwrap();
    assert!(reply.contains("Edit session finished"));

    let reply = handle_line(&registry, "chat-1", dir.path(), "停止编辑")
        .await
        .unwrap();
    assert_eq!(reply, "No active edit session");
}

#[tokio::test(flavor = "multi_thread")]
async fn chat_lines_report_failures_and_ignore_chatter() {
    let dir = tempfile::tempdir().unwrap();
    let (store, registry) = memory_registry().await;

    assert!(handle_line(&registry, "chat-1", dir.path(), "good morning")
        .await
        .is_none());

    let reply = handle_line(&registry, "chat-1", dir.path(), "edit missing.md")
        .await
        .unwrap();
    assert!(reply.starts_with("❌ Could not start editing missing.md"));

    let reply = handle_line(&registry, "chat-1", dir.path(), "edit ../outside.md")
        .await
        .unwrap();
    assert!(reply.starts_with("❌"));
    assert_eq!(store.document_count(), 0);
}
