//! One reconciliation pass between a remote document and its local file

use std::path::PathBuf;

use super::local::{read_local, write_conflict_artifact, write_with_backup};
use crate::config::EditorConfig;
use crate::error::Result;
use crate::models::{ConflictRecord, EditSession};
use crate::remote::{fetch_remote_markdown, normalize_markdown, DocumentStore};
use crate::util::unix_millis_now;

/// How remote, local and last-synced content relate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Remote still matches the last synced content
    Unchanged,
    /// Only the remote changed
    CleanUpdate,
    /// Both sides changed to the same content
    Converged,
    /// Both sides changed differently
    Conflict,
}

impl Reconciliation {
    pub fn classify(remote: &str, local: &str, last_sync: &str) -> Self {
        if remote == last_sync {
            Self::Unchanged
        } else if local == last_sync {
            Self::CleanUpdate
        } else if local == remote {
            Self::Converged
        } else {
            Self::Conflict
        }
    }
}

/// Result of a sync pass, to be folded into the live session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStep {
    Unchanged,
    Converged {
        content: String,
        revision_id: Option<i64>,
    },
    /// The local file now holds `content`; the previous content is in `backup`
    Applied {
        content: String,
        revision_id: Option<i64>,
        backup: PathBuf,
    },
    /// The local file was left alone and an artifact was written
    Conflict {
        record: Box<ConflictRecord>,
        artifact: PathBuf,
        revision_id: Option<i64>,
    },
}

/// Run one pass for `session` without mutating it.
///
/// The local file is only read when the remote moved away from the last
/// synced content. Local text is compared in its normalized rendering, so
/// formatting the remote cannot represent never counts as a local edit.
pub async fn sync_session(
    store: &dyn DocumentStore,
    config: &EditorConfig,
    session: &EditSession,
) -> Result<SyncStep> {
    let remote = fetch_remote_markdown(store, &session.document_id, config.max_child_depth).await?;
    if remote.content == session.last_sync_content {
        return Ok(SyncStep::Unchanged);
    }

    let local = read_local(&session.local_path).await?;
    let normalized = normalize_markdown(&local);
    match Reconciliation::classify(&remote.content, &normalized, &session.last_sync_content) {
        Reconciliation::Unchanged => Ok(SyncStep::Unchanged),
        Reconciliation::CleanUpdate => {
            let backup = write_with_backup(&session.local_path, &local, &remote.content).await?;
            tracing::info!(
                session_id = %session.id,
                path = %session.local_path.display(),
                "Applied remote update to local file"
            );
            Ok(SyncStep::Applied {
                content: remote.content,
                revision_id: remote.revision_id,
                backup,
            })
        }
        Reconciliation::Converged => {
            tracing::debug!(session_id = %session.id, "Local and remote converged");
            Ok(SyncStep::Converged {
                content: remote.content,
                revision_id: remote.revision_id,
            })
        }
        Reconciliation::Conflict => {
            let mut counted = session.clone();
            counted.conflict_count += 1;
            let record = ConflictRecord::capture(&counted, &remote.content, &local, unix_millis_now());
            let artifact = write_conflict_artifact(&record).await?;
            tracing::warn!(
                session_id = %session.id,
                artifact = %artifact.display(),
                conflict_number = record.conflict_number,
                "Local and remote edits conflict"
            );
            Ok(SyncStep::Conflict {
                record: Box::new(record),
                artifact,
                revision_id: remote.revision_id,
            })
        }
    }
}
