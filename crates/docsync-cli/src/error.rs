use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] docsync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Not a Markdown file: {0}")]
    NotMarkdown(String),
    #[error("Failed to resolve the data directory; pass --db-path or set DOCSYNC_DB_PATH")]
    NoDataDir,
    #[error(
        "Remote documents are not configured. Set DOCSYNC_APP_ID and DOCSYNC_APP_SECRET (a .env file works too)."
    )]
    RemoteNotConfigured,
}
