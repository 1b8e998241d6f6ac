use std::path::Path;

use docsync_core::{parse_command, Command, Error, SessionRegistry};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::commands::common::{build_registry, open_database, resolve_markdown_path, LOCAL_CHAT_ID};
use crate::error::CliError;

pub async fn run_serve(
    root: Option<&Path>,
    chat_id: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let root = match root {
        Some(root) => root.to_path_buf(),
        None => std::env::current_dir()?,
    };
    let db = open_database(db_path).await?;
    let registry = build_registry(db, chat_id.is_some())?;
    let chat_id = chat_id.unwrap_or(LOCAL_CHAT_ID);

    let restored = registry.restore().await?;
    if !restored.is_empty() {
        println!("Restored {} edit session(s)", restored.len());
    }
    println!("Listening for commands (edit <file>.md, edit status, stop edit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if let Some(reply) = handle_line(&registry, chat_id, &root, &line).await {
                    println!("{reply}");
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    // Sessions stay `editing` in the database and are restored next time
    registry.shutdown();
    Ok(())
}

/// Answer one chat line; `None` when it is not a command
pub async fn handle_line(
    registry: &SessionRegistry,
    chat_id: &str,
    root: &Path,
    line: &str,
) -> Option<String> {
    let reply = match parse_command(line)? {
        Command::Edit { file_name } => match resolve_markdown_path(root, &file_name) {
            Ok(path) => match registry.start(chat_id, &path, None).await {
                Ok(outcome) => outcome.message().to_string(),
                Err(error) => format!("❌ Could not start editing {file_name}: {error}"),
            },
            Err(error) => format!("❌ {error}"),
        },
        Command::Stop => match registry.stop_for_chat(chat_id).await {
            Ok(summary) => summary.message,
            Err(Error::NotFound(_)) => "No active edit session".to_string(),
            Err(error) => format!("❌ Could not stop editing: {error}"),
        },
        Command::Status => registry.status_message(chat_id),
    };
    Some(reply)
}
