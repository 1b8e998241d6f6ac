//! Edit session model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// A unique identifier for an edit session, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new unique session ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }

    /// First eight characters, used in chat messages
    #[must_use]
    pub fn short(&self) -> String {
        self.as_str().chars().take(8).collect()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lifecycle state of an edit session.
///
/// `Syncing` and `Conflict` only exist for the duration of one tick; `Error`
/// stays until someone resets or stops the session; `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Editing,
    Syncing,
    Completed,
    Conflict,
    Error,
}

impl SessionStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Editing => "editing",
            Self::Syncing => "syncing",
            Self::Completed => "completed",
            Self::Conflict => "conflict",
            Self::Error => "error",
        }
    }

    /// Marker shown next to the status in chat listings
    pub const fn marker(self) -> &'static str {
        match self {
            Self::Editing => "✏️",
            Self::Syncing => "🔄",
            Self::Completed => "✅",
            Self::Conflict => "⚠️",
            Self::Error => "❌",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "editing" => Ok(Self::Editing),
            "syncing" => Ok(Self::Syncing),
            "completed" => Ok(Self::Completed),
            "conflict" => Ok(Self::Conflict),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown session status: {other}")),
        }
    }
}

/// An ongoing synchronization between one local Markdown file and one remote document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditSession {
    pub id: SessionId,
    pub chat_id: String,
    pub user_id: Option<String>,
    pub document_id: String,
    pub document_url: String,
    /// Revision of the remote document observed by the last completed tick
    pub last_revision_id: Option<i64>,
    /// Absolute path of the bound local file
    pub local_path: PathBuf,
    pub file_name: String,
    /// File content when the session was created
    pub original_content: String,
    /// Last content known to be mirrored on both sides
    pub last_sync_content: String,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last sync timestamp (Unix ms)
    pub last_sync_time: i64,
    /// End timestamp (Unix ms), set when the session completes
    pub ended_at: Option<i64>,
    pub sync_count: u32,
    pub conflict_count: u32,
    pub status: SessionStatus,
}

impl EditSession {
    /// Create a new editing session bound to `local_path` and a freshly created document
    pub fn new(
        chat_id: impl Into<String>,
        user_id: Option<String>,
        document_id: impl Into<String>,
        document_url: impl Into<String>,
        local_path: PathBuf,
        content: impl Into<String>,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        let content = content.into();
        let file_name = local_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            id: SessionId::new(),
            chat_id: chat_id.into(),
            user_id,
            document_id: document_id.into(),
            document_url: document_url.into(),
            last_revision_id: None,
            local_path,
            file_name,
            last_sync_content: content.clone(),
            original_content: content,
            created_at: now,
            last_sync_time: now,
            ended_at: None,
            sync_count: 0,
            conflict_count: 0,
            status: SessionStatus::Editing,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Editing
    }

    /// Session duration in whole minutes, up to `now_ms` (or the end time)
    pub fn duration_minutes(&self, now_ms: i64) -> i64 {
        crate::util::elapsed_minutes(self.created_at, self.ended_at.unwrap_or(now_ms))
    }
}
