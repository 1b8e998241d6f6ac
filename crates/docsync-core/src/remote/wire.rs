//! JSON wire format of document blocks

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::markdown::render_block;
use crate::models::{block_type, Block, BlockKind, TableCell, TableGrid, TextRun, TextStyle};

/// Code block languages and their numeric ids on the remote surface
const CODE_LANGUAGES: &[(&str, u32)] = &[
    ("plaintext", 1),
    ("bash", 7),
    ("csharp", 8),
    ("cpp", 9),
    ("c", 10),
    ("css", 12),
    ("go", 22),
    ("html", 24),
    ("json", 28),
    ("java", 29),
    ("javascript", 30),
    ("kotlin", 32),
    ("markdown", 39),
    ("python", 49),
    ("ruby", 52),
    ("rust", 53),
    ("sql", 56),
    ("shell", 60),
    ("swift", 61),
    ("typescript", 63),
    ("xml", 66),
    ("yaml", 67),
];

const LANGUAGE_ALIASES: &[(&str, &str)] = &[
    ("c#", "csharp"),
    ("c++", "cpp"),
    ("golang", "go"),
    ("js", "javascript"),
    ("md", "markdown"),
    ("py", "python"),
    ("rb", "ruby"),
    ("rs", "rust"),
    ("sh", "bash"),
    ("ts", "typescript"),
    ("yml", "yaml"),
    ("zsh", "shell"),
];

/// Numeric id of a fence language; unknown and empty names are plain text
pub fn code_language_id(name: &str) -> u32 {
    let name = name.trim().to_ascii_lowercase();
    let name = LANGUAGE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map_or(name.as_str(), |(_, canonical)| canonical);
    CODE_LANGUAGES
        .iter()
        .find(|(known, _)| *known == name)
        .map_or(1, |(_, id)| *id)
}

/// Fence language of a numeric id; plain text and unknown ids have none
pub fn code_language_name(id: u32) -> &'static str {
    if id == 1 {
        return "";
    }
    CODE_LANGUAGES
        .iter()
        .find(|(_, known)| *known == id)
        .map_or("", |(name, _)| name)
}

#[derive(Debug, Deserialize)]
struct WireBlock {
    #[serde(default)]
    block_id: String,
    #[serde(default)]
    parent_id: String,
    block_type: u16,
    #[serde(default)]
    children: Vec<String>,
    #[serde(flatten)]
    payload: Map<String, Value>,
}

/// Decode one block. Never fails: malformed payloads degrade to an
/// `Unknown` block holding whatever text could be recovered.
pub fn decode_block(value: &Value) -> Block {
    match WireBlock::deserialize(value) {
        Ok(wire) => {
            let indent = wire
                .payload
                .get("indent")
                .and_then(Value::as_u64)
                .and_then(|indent| u8::try_from(indent).ok())
                .unwrap_or(0);
            Block {
                kind: decode_kind(wire.block_type, &wire.payload),
                block_id: wire.block_id,
                parent_id: wire.parent_id,
                children: wire.children,
                indent,
            }
        }
        Err(error) => {
            tracing::warn!(%error, "Malformed block payload, keeping recoverable text");
            let object = value.as_object().cloned().unwrap_or_default();
            let text_field = |key: &str| {
                object
                    .get(key)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            let type_code = object
                .get("block_type")
                .and_then(Value::as_u64)
                .and_then(|code| u16::try_from(code).ok())
                .unwrap_or(0);
            Block {
                block_id: text_field("block_id"),
                parent_id: text_field("parent_id"),
                kind: BlockKind::Unknown {
                    type_code,
                    runs: recover_runs(&object),
                },
                children: Vec::new(),
                indent: 0,
            }
        }
    }
}

fn decode_kind(type_code: u16, payload: &Map<String, Value>) -> BlockKind {
    let runs_of = |key: &str| {
        payload
            .get(key)
            .and_then(|body| body.get("elements"))
            .map(decode_elements)
            .unwrap_or_default()
    };

    match type_code {
        block_type::PAGE => BlockKind::Page,
        block_type::TEXT => BlockKind::Text {
            runs: runs_of("text"),
        },
        // heading7..heading9 have no Markdown form and collapse into level 6
        block_type::HEADING1..=11 => {
            let level = u8::try_from(type_code - block_type::HEADING1 + 1).unwrap_or(6);
            BlockKind::heading(level, runs_of(&format!("heading{level}")))
        }
        block_type::BULLET => BlockKind::Bullet {
            runs: runs_of("bullet"),
        },
        block_type::ORDERED => BlockKind::Ordered {
            runs: runs_of("ordered"),
        },
        block_type::CODE => {
            let body = payload.get("code");
            let language = body
                .and_then(|body| body.pointer("/style/language"))
                .map_or("", |language| match language {
                    Value::Number(id) => id
                        .as_u64()
                        .and_then(|id| u32::try_from(id).ok())
                        .map_or("", code_language_name),
                    Value::String(name) => code_language_name(code_language_id(name)),
                    _ => "",
                });
            let text = body
                .and_then(|body| body.get("elements"))
                .map(decode_elements)
                .unwrap_or_default()
                .into_iter()
                .map(|run| run.content)
                .collect();
            BlockKind::Code {
                language: language.to_string(),
                text,
            }
        }
        block_type::QUOTE => BlockKind::Quote {
            runs: runs_of("quote"),
        },
        block_type::TODO => BlockKind::Todo {
            runs: runs_of("todo"),
            done: payload
                .get("todo")
                .and_then(|body| body.pointer("/style/done"))
                .and_then(Value::as_bool)
                .unwrap_or(false),
        },
        block_type::DIVIDER => BlockKind::Divider,
        block_type::IMAGE => BlockKind::Image {
            token: payload
                .get("image")
                .and_then(|body| body.get("token"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
        block_type::TABLE => BlockKind::Table(decode_table(payload.get("table"))),
        block_type::TABLE_CELL => BlockKind::TableCell,
        other => {
            tracing::debug!(type_code = other, "Unmodeled block type");
            BlockKind::Unknown {
                type_code: other,
                runs: recover_runs(payload),
            }
        }
    }
}

/// Table dimensions, plus inline cells when the payload carries them
fn decode_table(body: Option<&Value>) -> TableGrid {
    let Some(body) = body else {
        return TableGrid::default();
    };
    let dimension = |key: &str| {
        body.pointer(&format!("/property/{key}"))
            .and_then(Value::as_u64)
            .and_then(|value| usize::try_from(value).ok())
            .unwrap_or(0)
    };

    let cells = body
        .get("cells")
        .and_then(Value::as_array)
        .map(|cells| {
            cells
                .iter()
                .filter(|cell| cell.is_object())
                .map(|cell| {
                    let index = |key: &str| {
                        cell.get(key)
                            .and_then(Value::as_u64)
                            .and_then(|value| usize::try_from(value).ok())
                            .unwrap_or(0)
                    };
                    TableCell {
                        row: index("row_index"),
                        column: index("column_index"),
                        runs: cell.get("elements").map(decode_elements).unwrap_or_default(),
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    TableGrid {
        rows: dimension("row_size"),
        columns: dimension("column_size"),
        cells,
    }
}

/// Runs from the first payload entry that has `elements`
fn recover_runs(payload: &Map<String, Value>) -> Vec<TextRun> {
    payload
        .values()
        .find_map(|body| body.get("elements"))
        .map(decode_elements)
        .unwrap_or_default()
}

fn decode_elements(elements: &Value) -> Vec<TextRun> {
    let Some(elements) = elements.as_array() else {
        return Vec::new();
    };
    elements.iter().filter_map(decode_element).collect()
}

fn decode_element(element: &Value) -> Option<TextRun> {
    if let Some(text_run) = element.get("text_run") {
        let content = text_run.get("content").and_then(Value::as_str)?;
        let style = text_run
            .get("text_element_style")
            .map(decode_style)
            .unwrap_or_default();
        return Some(TextRun::styled(content, style));
    }
    if let Some(user_id) = element.pointer("/mention_user/user_id").and_then(Value::as_str) {
        return Some(TextRun::plain(format!("@{user_id}")));
    }
    if let Some(mention) = element.get("mention_doc") {
        let title = mention
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("document");
        return match mention.get("url").and_then(Value::as_str) {
            Some(url) => Some(TextRun::link(title, decode_url(url))),
            None => Some(TextRun::plain(title)),
        };
    }
    if let Some(equation) = element.pointer("/equation/content").and_then(Value::as_str) {
        return Some(TextRun::plain(format!("${}$", equation.trim_end())));
    }
    None
}

fn decode_style(style: &Value) -> TextStyle {
    let flag = |key: &str| style.get(key).and_then(Value::as_bool).unwrap_or(false);
    TextStyle {
        bold: flag("bold"),
        italic: flag("italic"),
        strikethrough: flag("strikethrough"),
        underline: flag("underline"),
        inline_code: flag("inline_code"),
        link: style
            .pointer("/link/url")
            .and_then(Value::as_str)
            .map(decode_url),
    }
}

fn decode_url(url: &str) -> String {
    urlencoding::decode(url).map_or_else(|_| url.to_string(), |decoded| decoded.into_owned())
}

/// Encode a block for an append request.
///
/// Kinds the surface cannot create from text (images, tables) are sent as
/// a text block carrying their Markdown rendering.
pub fn encode_block(block: &Block) -> Value {
    let elements = |runs: &[TextRun]| encode_elements(runs);
    match &block.kind {
        BlockKind::Text { runs } | BlockKind::Unknown { runs, .. } => {
            json!({ "block_type": block_type::TEXT, "text": { "elements": elements(runs) } })
        }
        BlockKind::Heading { level, runs } => {
            let key = format!("heading{level}");
            let mut body = Map::new();
            body.insert("block_type".into(), json!(block.kind.type_code()));
            body.insert(key, json!({ "elements": elements(runs) }));
            Value::Object(body)
        }
        BlockKind::Bullet { runs } => {
            json!({ "block_type": block_type::BULLET, "bullet": { "elements": elements(runs) } })
        }
        BlockKind::Ordered { runs } => {
            json!({ "block_type": block_type::ORDERED, "ordered": { "elements": elements(runs) } })
        }
        BlockKind::Quote { runs } => {
            json!({ "block_type": block_type::QUOTE, "quote": { "elements": elements(runs) } })
        }
        BlockKind::Todo { runs, done } => json!({
            "block_type": block_type::TODO,
            "todo": { "elements": elements(runs), "style": { "done": done } }
        }),
        BlockKind::Code { language, text } => json!({
            "block_type": block_type::CODE,
            "code": {
                "elements": elements(&[TextRun::plain(text.as_str())]),
                "style": { "language": code_language_id(language) }
            }
        }),
        BlockKind::Divider => json!({ "block_type": block_type::DIVIDER, "divider": {} }),
        BlockKind::Page | BlockKind::TableCell | BlockKind::Image { .. } | BlockKind::Table(_) => {
            let fallback = render_block(block).unwrap_or_default();
            json!({
                "block_type": block_type::TEXT,
                "text": { "elements": elements(&[TextRun::plain(fallback)]) }
            })
        }
    }
}

fn encode_elements(runs: &[TextRun]) -> Vec<Value> {
    let mut elements: Vec<Value> = runs
        .iter()
        .filter(|run| !run.content.is_empty())
        .map(|run| {
            let mut text_run = Map::new();
            text_run.insert("content".into(), json!(run.content));
            let style = encode_style(&run.style);
            if !style.is_empty() {
                text_run.insert("text_element_style".into(), Value::Object(style));
            }
            json!({ "text_run": text_run })
        })
        .collect();

    if elements.is_empty() {
        elements.push(json!({ "text_run": { "content": "" } }));
    }
    elements
}

fn encode_style(style: &TextStyle) -> Map<String, Value> {
    let mut encoded = Map::new();
    for (key, set) in [
        ("bold", style.bold),
        ("italic", style.italic),
        ("strikethrough", style.strikethrough),
        ("underline", style.underline),
        ("inline_code", style.inline_code),
    ] {
        if set {
            encoded.insert(key.into(), Value::Bool(true));
        }
    }
    if let Some(url) = &style.link {
        encoded.insert(
            "link".into(),
            json!({ "url": urlencoding::encode(url).into_owned() }),
        );
    }
    encoded
}
