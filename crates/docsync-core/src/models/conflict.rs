//! Conflict artifact model

use std::path::PathBuf;

use super::session::{EditSession, SessionId};

/// Snapshot of divergent content captured when both sides changed since the last sync.
///
/// Written to a sibling file of the local document; never stored on the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRecord {
    pub session_id: SessionId,
    pub file_name: String,
    pub local_path: PathBuf,
    /// Detection timestamp (Unix ms)
    pub detected_at: i64,
    /// Running conflict count of the session, including this one
    pub conflict_number: u32,
    pub remote_content: String,
    pub local_content: String,
    /// Content both sides agreed on before they diverged
    pub last_synced_content: String,
    /// Content at session creation
    pub original_content: String,
}

impl ConflictRecord {
    /// Capture a conflict for `session`, whose conflict count was already incremented
    pub fn capture(
        session: &EditSession,
        remote_content: &str,
        local_content: &str,
        detected_at: i64,
    ) -> Self {
        Self {
            session_id: session.id,
            file_name: session.file_name.clone(),
            local_path: session.local_path.clone(),
            detected_at,
            conflict_number: session.conflict_count,
            remote_content: remote_content.to_string(),
            local_content: local_content.to_string(),
            last_synced_content: session.last_sync_content.clone(),
            original_content: session.original_content.clone(),
        }
    }

    /// Render the artifact as a Markdown document with one labeled section per version
    pub fn render(&self) -> String {
        let detected = chrono::DateTime::from_timestamp_millis(self.detected_at).map_or_else(
            || self.detected_at.to_string(),
            |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        );

        format!(
            "# Document sync conflict\n\n\
             ## Conflict details\n\
             - File: {file}\n\
             - Session: {session}\n\
             - Detected: {detected}\n\
             - Conflict #{number} in this session\n\n\
             ## Remote version\n{remote}\n\n\
             ## Local version\n{local}\n\n\
             ## Last synced version\n{last}\n\n\
             ## Original version (at session start)\n{original}\n\n\
             ---\n\
             Resolve the conflict by hand, then save the correct content to: {path}\n",
            file = self.file_name,
            session = self.session_id,
            number = self.conflict_number,
            remote = self.remote_content,
            local = self.local_content,
            last = self.last_synced_content,
            original = self.original_content,
            path = self.local_path.display(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_contains_every_version_verbatim() {
        let mut session = EditSession::new(
            "chat",
            None,
            "doc",
            "https://example.com/doc",
            PathBuf::from("/tmp/test.md"),
            "# T",
        );
        session.last_sync_content = "# T2".to_string();
        session.conflict_count = 1;

        let record = ConflictRecord::capture(&session, "# Remote", "# Local", 0);
        let rendered = record.render();

        assert!(rendered.contains("## Remote version\n# Remote\n"));
        assert!(rendered.contains("## Local version\n# Local\n"));
        assert!(rendered.contains("## Last synced version\n# T2\n"));
        assert!(rendered.contains("## Original version (at session start)\n# T\n"));
        assert!(rendered.contains("Conflict #1"));
        assert!(rendered.contains("1970-01-01 00:00:00 UTC"));
        assert!(rendered.contains(&session.id.to_string()));
    }
}
