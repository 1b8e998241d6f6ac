//! Markdown -> Block conversion for initial document creation

use super::inline::parse_inline;
use crate::models::{Block, BlockKind};

/// Convert a Markdown string into an ordered list of detached blocks.
///
/// This is a line-oriented scan, not a CommonMark parser. Blank lines never
/// produce blocks; an unterminated code fence closes at end of input.
pub fn markdown_to_blocks(markdown: &str) -> Vec<Block> {
    let lines: Vec<&str> = markdown.lines().collect();
    let mut blocks = Vec::new();
    let mut index = 0;

    while index < lines.len() {
        let line = lines[index];
        let trimmed = line.trim_start();
        index += 1;

        if trimmed.trim().is_empty() {
            continue;
        }

        if let Some(info) = trimmed.strip_prefix("```") {
            let mut code_lines = Vec::new();
            while index < lines.len() && !lines[index].trim_start().starts_with("```") {
                code_lines.push(lines[index]);
                index += 1;
            }
            // Skip the closing fence when there is one.
            index += 1;
            blocks.push(Block::new(BlockKind::Code {
                language: info.trim().to_string(),
                text: code_lines.join("\n"),
            }));
            continue;
        }

        blocks.push(parse_line(line));
    }

    blocks
}

fn parse_line(line: &str) -> Block {
    let indent = indent_level(line);
    let trimmed = line.trim();

    if let Some((level, text)) = parse_heading(trimmed) {
        return Block::new(BlockKind::heading(level, parse_inline(text)));
    }
    if is_divider(trimmed) {
        return Block::new(BlockKind::Divider);
    }
    if let Some((done, text)) = parse_todo(trimmed) {
        return Block::new(BlockKind::Todo {
            runs: parse_inline(text),
            done,
        })
        .with_indent(indent);
    }
    if let Some(text) = trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
    {
        return Block::new(BlockKind::Bullet {
            runs: parse_inline(text.trim()),
        })
        .with_indent(indent);
    }
    if let Some(text) = parse_ordered(trimmed) {
        return Block::new(BlockKind::Ordered {
            runs: parse_inline(text),
        })
        .with_indent(indent);
    }
    if let Some(text) = trimmed.strip_prefix('>') {
        return Block::new(BlockKind::Quote {
            runs: parse_inline(text.trim()),
        });
    }

    Block::new(BlockKind::Text {
        runs: parse_inline(trimmed),
    })
}

/// `#` through `######` followed by a space
fn parse_heading(line: &str) -> Option<(u8, &str)> {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if !(1..=6).contains(&hashes) {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.starts_with(' ') {
        return None;
    }
    let level = u8::try_from(hashes).ok()?;
    Some((level, rest.trim()))
}

/// `1. item`, `23. item`
fn parse_ordered(line: &str) -> Option<&str> {
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let rest = line[digits..].strip_prefix('.')?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim())
}

/// `- [ ] item` / `- [x] item`
fn parse_todo(line: &str) -> Option<(bool, &str)> {
    let rest = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))?
        .trim_start();
    if let Some(text) = rest.strip_prefix("[ ]") {
        return Some((false, text.trim()));
    }
    rest.strip_prefix("[x]")
        .or_else(|| rest.strip_prefix("[X]"))
        .map(|text| (true, text.trim()))
}

fn is_divider(line: &str) -> bool {
    let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    compact.len() >= 3
        && ['-', '*', '_']
            .iter()
            .any(|marker| compact.chars().all(|c| c == *marker))
}

/// Two spaces (or one tab) per nesting level
fn indent_level(line: &str) -> u8 {
    let width: usize = line
        .chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .map(|c| if c == '\t' { 2 } else { 1 })
        .sum();
    u8::try_from(width / 2).unwrap_or(u8::MAX)
}
