pub mod common;
pub mod completions;
pub mod conflicts;
pub mod edit;
pub mod serve;
pub mod sessions;
