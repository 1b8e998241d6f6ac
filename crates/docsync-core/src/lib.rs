//! docsync-core - Core library for docsync
//!
//! This crate contains the block model, the Markdown converters, the remote
//! document clients, the sync engine and the edit session registry used by the
//! `docsync` CLI.

pub mod command;
pub mod config;
pub mod db;
pub mod error;
pub mod markdown;
pub mod models;
pub mod remote;
pub mod services;
pub mod session;
pub mod sync;
pub mod util;

pub use command::{parse_command, Command};
pub use config::{EditorConfig, RemoteConfig};
pub use error::{Error, Result};
pub use models::{Block, BlockKind, EditSession, SessionId, SessionStatus};
pub use session::{SessionRegistry, StartOutcome, StopSummary, TickOutcome};
