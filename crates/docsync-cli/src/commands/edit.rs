use std::path::Path;

use docsync_core::StartOutcome;

use crate::commands::common::{build_registry, ensure_markdown, open_database, LOCAL_CHAT_ID};
use crate::error::CliError;

pub async fn run_edit(
    file: &Path,
    chat_id: Option<&str>,
    user_id: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    ensure_markdown(file)?;

    let db = open_database(db_path).await?;
    let registry = build_registry(db, chat_id.is_some())?;
    let chat_id = chat_id.unwrap_or(LOCAL_CHAT_ID);

    let outcome = registry
        .start(chat_id, file, user_id.map(ToString::to_string))
        .await?;
    println!("{}", outcome.message());

    let StartOutcome::Started { session_id, .. } = outcome else {
        return Ok(());
    };

    println!("\nSyncing until interrupted, press Ctrl-C to finish.");
    tokio::signal::ctrl_c().await?;

    let summary = registry.stop(session_id).await?;
    println!("\n{}", summary.message);
    Ok(())
}
