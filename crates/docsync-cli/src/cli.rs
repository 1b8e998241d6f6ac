use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "docsync")]
#[command(about = "Edit local Markdown files through a hosted rich document")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open a Markdown file for online editing and sync until interrupted
    Edit {
        /// Markdown file to edit
        file: PathBuf,
        /// Chat to send notifications to (log only when omitted)
        #[arg(long, value_name = "ID")]
        chat_id: Option<String>,
        /// User who requested the session
        #[arg(long, value_name = "ID")]
        user_id: Option<String>,
    },
    /// Restore persisted sessions and read chat commands from stdin
    Serve {
        /// Directory that file names in `edit` commands are resolved against
        #[arg(long, value_name = "DIR")]
        root: Option<PathBuf>,
        /// Chat that commands are attributed to (log only when omitted)
        #[arg(long, value_name = "ID")]
        chat_id: Option<String>,
    },
    /// List recent edit sessions
    Sessions {
        /// Number of sessions to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recently detected sync conflicts
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
