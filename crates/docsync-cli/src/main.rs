//! docsync CLI - edit local Markdown files through a hosted rich document
//!
//! Changes made online are pulled back into the local file on a timer.

mod cli;
mod commands;
mod error;

#[cfg(test)]
mod tests;

use clap::Parser;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::common::resolve_db_path;
use crate::commands::completions::run_completions;
use crate::commands::conflicts::run_conflicts;
use crate::commands::edit::run_edit;
use crate::commands::serve::run_serve;
use crate::commands::sessions::run_sessions;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "docsync=info".parse::<Directive>() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Edit {
            file,
            chat_id,
            user_id,
        } => {
            let db_path = resolve_db_path(cli.db_path)?;
            run_edit(&file, chat_id.as_deref(), user_id.as_deref(), &db_path).await?;
        }
        Commands::Serve { root, chat_id } => {
            let db_path = resolve_db_path(cli.db_path)?;
            run_serve(root.as_deref(), chat_id.as_deref(), &db_path).await?;
        }
        Commands::Sessions { limit, json } => {
            let db_path = resolve_db_path(cli.db_path)?;
            run_sessions(limit, json, &db_path).await?;
        }
        Commands::Conflicts { limit, json } => {
            let db_path = resolve_db_path(cli.db_path)?;
            run_conflicts(limit, json, &db_path).await?;
        }
        Commands::Completions { shell, output } => {
            run_completions(shell, output.as_deref())?;
        }
    }

    Ok(())
}
