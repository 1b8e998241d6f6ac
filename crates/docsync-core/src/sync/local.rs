//! Local file side of synchronization

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::ConflictRecord;

/// Single-generation backup next to the file: `notes.md` -> `notes.md.backup`
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".backup");
    path.with_file_name(name)
}

/// Conflict artifact next to the file: `notes.md` -> `notes.conflict.<ms>-<n>.md`,
/// where `n` is the session's conflict number
pub fn conflict_path(path: &Path, detected_at: i64, conflict_number: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{stem}.conflict.{detected_at}-{conflict_number}.md"))
}

pub async fn read_local(path: &Path) -> Result<String> {
    Ok(tokio::fs::read_to_string(path).await?)
}

/// Save `previous` as the backup, then replace the file with `content`
pub async fn write_with_backup(path: &Path, previous: &str, content: &str) -> Result<PathBuf> {
    let backup = backup_path(path);
    tokio::fs::write(&backup, previous).await?;
    tokio::fs::write(path, content).await?;
    Ok(backup)
}

/// Write the rendered artifact of `record`; the bound file is not touched
pub async fn write_conflict_artifact(record: &ConflictRecord) -> Result<PathBuf> {
    let path = conflict_path(&record.local_path, record.detected_at, record.conflict_number);
    tokio::fs::write(&path, record.render()).await?;
    Ok(path)
}
