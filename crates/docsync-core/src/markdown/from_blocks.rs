//! Block -> Markdown conversion for documents fetched from the remote surface

use super::inline::render_runs;
use crate::models::{Block, BlockKind, TableGrid};

/// Render a flattened block sequence as Markdown.
///
/// Headings, code blocks, dividers and tables are followed by a blank line;
/// consecutive list items are not separated until the list ends. Blocks that
/// carry nothing renderable are skipped rather than failing the document.
pub fn blocks_to_markdown(blocks: &[Block]) -> String {
    let mut markdown = String::new();
    let mut previous_list: Option<ListFamily> = None;

    for (index, block) in blocks.iter().enumerate() {
        let Some(content) = render_block(block) else {
            continue;
        };

        let family = ListFamily::of(&block.kind);
        match (previous_list, family) {
            (Some(_), None) => ensure_blank_line(&mut markdown),
            (Some(previous), Some(current)) if previous != current && block.indent == 0 => {
                ensure_blank_line(&mut markdown);
            }
            _ => {}
        }

        markdown.push_str(&content);
        markdown.push('\n');

        let next_is_spaced = blocks
            .get(index + 1)
            .is_some_and(|next| is_spaced(&next.kind));
        if blocks.get(index + 1).is_some() && (is_spaced(&block.kind) || next_is_spaced) {
            ensure_blank_line(&mut markdown);
        }

        previous_list = family;
    }

    markdown.trim_start_matches('\n').trim_end().to_string()
}

/// Render a single block, or `None` when it has no Markdown form
pub fn render_block(block: &Block) -> Option<String> {
    let list_indent = "  ".repeat(usize::from(block.indent));
    let content = match &block.kind {
        BlockKind::Page | BlockKind::TableCell => return None,
        BlockKind::Text { runs } => render_runs(runs),
        BlockKind::Heading { level, runs } => {
            let level = usize::from((*level).clamp(1, 6));
            format!("{} {}", "#".repeat(level), render_runs(runs))
        }
        BlockKind::Bullet { runs } => format!("{list_indent}- {}", render_runs(runs)),
        BlockKind::Ordered { runs } => format!("{list_indent}1. {}", render_runs(runs)),
        BlockKind::Code { language, text } => format!("```{language}\n{text}\n```"),
        BlockKind::Quote { runs } => render_runs(runs)
            .lines()
            .map(|line| format!("> {line}"))
            .collect::<Vec<_>>()
            .join("\n"),
        BlockKind::Todo { runs, done } => {
            let mark = if *done { 'x' } else { ' ' };
            format!("{list_indent}- [{mark}] {}", render_runs(runs))
        }
        BlockKind::Divider => "---".to_string(),
        BlockKind::Image { token } if token.is_empty() => return None,
        BlockKind::Image { token } => format!("![image]({token})"),
        BlockKind::Table(grid) => render_table(grid)?,
        BlockKind::Unknown { type_code, runs } => {
            tracing::warn!(
                block_id = %block.block_id,
                type_code,
                "Unknown block type, falling back to plain text"
            );
            render_runs(runs)
        }
    };

    if content.is_empty() {
        None
    } else {
        Some(content)
    }
}

fn render_table(grid: &TableGrid) -> Option<String> {
    if grid.rows == 0 || grid.columns == 0 {
        return None;
    }

    let mut matrix = vec![vec![String::new(); grid.columns]; grid.rows];
    for cell in &grid.cells {
        if cell.row < grid.rows && cell.column < grid.columns {
            matrix[cell.row][cell.column] = render_runs(&cell.runs)
                .replace('|', "\\|")
                .replace('\n', " ");
        }
    }

    let mut lines = Vec::with_capacity(grid.rows + 1);
    lines.push(format!("| {} |", matrix[0].join(" | ")));
    lines.push(format!("|{}|", vec![" --- "; grid.columns].join("|")));
    for row in &matrix[1..] {
        lines.push(format!("| {} |", row.join(" | ")));
    }
    Some(lines.join("\n"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListFamily {
    Bullet,
    Ordered,
    Todo,
}

impl ListFamily {
    const fn of(kind: &BlockKind) -> Option<Self> {
        match kind {
            BlockKind::Bullet { .. } => Some(Self::Bullet),
            BlockKind::Ordered { .. } => Some(Self::Ordered),
            BlockKind::Todo { .. } => Some(Self::Todo),
            _ => None,
        }
    }
}

const fn is_spaced(kind: &BlockKind) -> bool {
    matches!(
        kind,
        BlockKind::Heading { .. } | BlockKind::Code { .. } | BlockKind::Divider | BlockKind::Table(_)
    )
}

fn ensure_blank_line(markdown: &mut String) {
    if !markdown.is_empty() && !markdown.ends_with("\n\n") {
        markdown.push('\n');
    }
}
