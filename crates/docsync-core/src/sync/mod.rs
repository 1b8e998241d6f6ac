//! Synchronization between a remote document and its bound local file

mod engine;
mod local;

pub use engine::{sync_session, Reconciliation, SyncStep};
pub use local::{backup_path, conflict_path, read_local, write_conflict_artifact, write_with_backup};
