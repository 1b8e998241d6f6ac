//! Data models for docsync

mod block;
mod conflict;
mod session;
mod sync_conflict;

pub use block::{
    block_type, plain_text, Block, BlockKind, TableCell, TableGrid, TextRun, TextStyle,
};
pub use conflict::ConflictRecord;
pub use session::{EditSession, SessionId, SessionStatus};
pub use sync_conflict::SyncConflict;
