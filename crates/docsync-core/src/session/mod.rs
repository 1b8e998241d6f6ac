//! Edit sessions: registry and user-facing messages

mod messages;
mod registry;

pub use messages::{
    already_editing_message, conflict_message, error_message, start_message, status_message,
    stop_message,
};
pub use registry::{SessionRegistry, SkipReason, StartOutcome, StopSummary, TickOutcome};
