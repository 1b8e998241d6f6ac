//! Lossy two-way conversion between Markdown text and document blocks.
//!
//! The contract is semantic equivalence (block order, type and inline style),
//! not byte-for-byte fidelity.

mod from_blocks;
mod inline;
mod to_blocks;

pub use from_blocks::{blocks_to_markdown, render_block};
pub use inline::{parse_inline, render_runs};
pub use to_blocks::markdown_to_blocks;
