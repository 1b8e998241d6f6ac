//! Sync conflict log model

use serde::{Deserialize, Serialize};

/// A conflict recorded while synchronizing an edit session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Conflict row identifier
    pub id: i64,
    /// Session involved in the conflict
    pub session_id: String,
    /// Path of the conflict artifact written next to the local file
    pub conflict_path: String,
    /// Running conflict number within the session
    pub conflict_number: u32,
    /// Detection timestamp (unix ms)
    pub detected_at: i64,
}
