//! Rich document block model

use serde::{Deserialize, Serialize};

/// Numeric block type codes used by the remote document surface.
pub mod block_type {
    pub const PAGE: u16 = 1;
    pub const TEXT: u16 = 2;
    pub const HEADING1: u16 = 3;
    pub const HEADING6: u16 = 8;
    pub const BULLET: u16 = 12;
    pub const ORDERED: u16 = 13;
    pub const CODE: u16 = 14;
    pub const QUOTE: u16 = 15;
    pub const TODO: u16 = 17;
    pub const DIVIDER: u16 = 22;
    pub const IMAGE: u16 = 27;
    pub const TABLE: u16 = 31;
    pub const TABLE_CELL: u16 = 32;
}

/// Inline style flags of a [`TextRun`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextStyle {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub strikethrough: bool,
    #[serde(default)]
    pub underline: bool,
    #[serde(default)]
    pub inline_code: bool,
    /// Hyperlink target, if the run is a link
    #[serde(default)]
    pub link: Option<String>,
}

impl TextStyle {
    /// True when no style flag is set
    pub fn is_plain(&self) -> bool {
        *self == Self::default()
    }
}

/// Inline styled text fragment. Runs never nest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRun {
    pub content: String,
    #[serde(default)]
    pub style: TextStyle,
}

impl TextRun {
    pub fn plain(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            style: TextStyle::default(),
        }
    }

    pub fn styled(content: impl Into<String>, style: TextStyle) -> Self {
        Self {
            content: content.into(),
            style,
        }
    }

    pub fn bold(content: impl Into<String>) -> Self {
        Self::styled(
            content,
            TextStyle {
                bold: true,
                ..TextStyle::default()
            },
        )
    }

    pub fn italic(content: impl Into<String>) -> Self {
        Self::styled(
            content,
            TextStyle {
                italic: true,
                ..TextStyle::default()
            },
        )
    }

    pub fn code(content: impl Into<String>) -> Self {
        Self::styled(
            content,
            TextStyle {
                inline_code: true,
                ..TextStyle::default()
            },
        )
    }

    pub fn link(content: impl Into<String>, url: impl Into<String>) -> Self {
        Self::styled(
            content,
            TextStyle {
                link: Some(url.into()),
                ..TextStyle::default()
            },
        )
    }
}

/// Concatenate the unstyled text of a run sequence
pub fn plain_text(runs: &[TextRun]) -> String {
    runs.iter().map(|run| run.content.as_str()).collect()
}

/// One cell of a table grid, addressed by explicit row/column indices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCell {
    pub row: usize,
    pub column: usize,
    pub runs: Vec<TextRun>,
}

/// Table payload: declared dimensions plus the cells that carry content
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableGrid {
    pub rows: usize,
    pub columns: usize,
    pub cells: Vec<TableCell>,
}

/// Block type together with its type-specific payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockKind {
    Page,
    Text {
        runs: Vec<TextRun>,
    },
    Heading {
        level: u8,
        runs: Vec<TextRun>,
    },
    Bullet {
        runs: Vec<TextRun>,
    },
    Ordered {
        runs: Vec<TextRun>,
    },
    Code {
        language: String,
        text: String,
    },
    Quote {
        runs: Vec<TextRun>,
    },
    Todo {
        runs: Vec<TextRun>,
        done: bool,
    },
    Divider,
    Image {
        token: String,
    },
    Table(TableGrid),
    /// Container of a table cell; its text lives in child blocks
    TableCell,
    /// A block type this crate does not model; keeps whatever text was recoverable
    Unknown {
        type_code: u16,
        runs: Vec<TextRun>,
    },
}

impl BlockKind {
    /// Heading with the level clamped to 1..=6
    pub fn heading(level: u8, runs: Vec<TextRun>) -> Self {
        Self::Heading {
            level: level.clamp(1, 6),
            runs,
        }
    }

    /// Numeric type code on the remote surface
    pub const fn type_code(&self) -> u16 {
        match self {
            Self::Page => block_type::PAGE,
            Self::Text { .. } => block_type::TEXT,
            Self::Heading { level, .. } => {
                let level = if *level < 1 {
                    1
                } else if *level > 6 {
                    6
                } else {
                    *level
                };
                block_type::HEADING1 + level as u16 - 1
            }
            Self::Bullet { .. } => block_type::BULLET,
            Self::Ordered { .. } => block_type::ORDERED,
            Self::Code { .. } => block_type::CODE,
            Self::Quote { .. } => block_type::QUOTE,
            Self::Todo { .. } => block_type::TODO,
            Self::Divider => block_type::DIVIDER,
            Self::Image { .. } => block_type::IMAGE,
            Self::Table(_) => block_type::TABLE,
            Self::TableCell => block_type::TABLE_CELL,
            Self::Unknown { type_code, .. } => *type_code,
        }
    }

    /// Text runs of run-carrying kinds
    pub fn runs(&self) -> Option<&[TextRun]> {
        match self {
            Self::Text { runs }
            | Self::Heading { runs, .. }
            | Self::Bullet { runs }
            | Self::Ordered { runs }
            | Self::Quote { runs }
            | Self::Todo { runs, .. }
            | Self::Unknown { runs, .. } => Some(runs),
            _ => None,
        }
    }

    pub const fn is_list_item(&self) -> bool {
        matches!(
            self,
            Self::Bullet { .. } | Self::Ordered { .. } | Self::Todo { .. }
        )
    }
}

/// A node in a remote document's block tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub block_id: String,
    /// Empty for the root page block
    pub parent_id: String,
    pub kind: BlockKind,
    /// Ids of child blocks, in document order
    #[serde(default)]
    pub children: Vec<String>,
    /// List nesting depth
    #[serde(default)]
    pub indent: u8,
}

impl Block {
    /// A detached block, not yet placed in any document
    pub const fn new(kind: BlockKind) -> Self {
        Self {
            block_id: String::new(),
            parent_id: String::new(),
            kind,
            children: Vec::new(),
            indent: 0,
        }
    }

    #[must_use]
    pub const fn with_indent(mut self, indent: u8) -> Self {
        self.indent = indent;
        self
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Root page blocks have page kind and no parent
    pub fn is_root(&self) -> bool {
        matches!(self.kind, BlockKind::Page) && self.parent_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_levels_map_to_consecutive_codes() {
        assert_eq!(BlockKind::heading(1, vec![]).type_code(), 3);
        assert_eq!(BlockKind::heading(6, vec![]).type_code(), 8);
        assert_eq!(BlockKind::heading(9, vec![]).type_code(), 8);
        assert_eq!(BlockKind::heading(0, vec![]).type_code(), 3);
    }

    #[test]
    fn plain_text_ignores_styles() {
        let runs = vec![
            TextRun::plain("a "),
            TextRun::bold("b"),
            TextRun::link("c", "https://x"),
        ];
        assert_eq!(plain_text(&runs), "a bc");
    }

    #[test]
    fn root_detection_requires_page_without_parent() {
        let mut page = Block::new(BlockKind::Page);
        page.block_id = "doc".to_string();
        assert!(page.is_root());

        page.parent_id = "other".to_string();
        assert!(!page.is_root());

        assert!(!Block::new(BlockKind::Divider).is_root());
    }

    #[test]
    fn list_items_are_bullets_ordered_and_todos() {
        assert!(BlockKind::Bullet { runs: vec![] }.is_list_item());
        assert!(BlockKind::Todo {
            runs: vec![],
            done: true
        }
        .is_list_item());
        assert!(!BlockKind::Quote { runs: vec![] }.is_list_item());
    }
}
