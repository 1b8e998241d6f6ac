//! Inline Markdown spans <-> text runs

use crate::models::{TextRun, TextStyle};

/// Split one line of Markdown into styled runs.
///
/// Recognizes `**bold**`, `*italic*`, `` `code` ``, `~~strike~~` and
/// `[text](url)` left to right. Markers without a closing partner stay literal.
pub fn parse_inline(text: &str) -> Vec<TextRun> {
    let chars: Vec<char> = text.chars().collect();
    let mut runs = Vec::new();
    let mut plain = String::new();
    let mut index = 0;

    while index < chars.len() {
        if let Some((run, next)) = match_span(&chars, index) {
            if !plain.is_empty() {
                runs.push(TextRun::plain(std::mem::take(&mut plain)));
            }
            runs.push(run);
            index = next;
        } else {
            plain.push(chars[index]);
            index += 1;
        }
    }

    if !plain.is_empty() {
        runs.push(TextRun::plain(plain));
    }
    runs
}

fn match_span(chars: &[char], index: usize) -> Option<(TextRun, usize)> {
    let next = chars.get(index + 1).copied();
    match chars[index] {
        '*' if next == Some('*') => {
            delimited(chars, index + 2, &['*', '*']).map(|(text, end)| (TextRun::bold(text), end))
        }
        '*' => delimited(chars, index + 1, &['*']).map(|(text, end)| (TextRun::italic(text), end)),
        '`' => delimited(chars, index + 1, &['`']).map(|(text, end)| (TextRun::code(text), end)),
        '~' if next == Some('~') => delimited(chars, index + 2, &['~', '~']).map(|(text, end)| {
            let style = TextStyle {
                strikethrough: true,
                ..TextStyle::default()
            };
            (TextRun::styled(text, style), end)
        }),
        '[' => match_link(chars, index),
        _ => None,
    }
}

/// Find `closer` after `start`; the enclosed span must be non-empty
fn delimited(chars: &[char], start: usize, closer: &[char]) -> Option<(String, usize)> {
    let mut cursor = start;
    while cursor + closer.len() <= chars.len() {
        if chars[cursor..cursor + closer.len()] == *closer {
            if cursor == start {
                return None;
            }
            return Some((chars[start..cursor].iter().collect(), cursor + closer.len()));
        }
        cursor += 1;
    }
    None
}

fn match_link(chars: &[char], index: usize) -> Option<(TextRun, usize)> {
    let (label, after_label) = delimited(chars, index + 1, &[']'])?;
    if chars.get(after_label) != Some(&'(') {
        return None;
    }
    let (url, end) = delimited(chars, after_label + 1, &[')'])?;
    Some((TextRun::link(label, url.trim()), end))
}

/// Render runs back to inline Markdown
pub fn render_runs(runs: &[TextRun]) -> String {
    runs.iter().map(render_run).collect()
}

fn render_run(run: &TextRun) -> String {
    if run.content.is_empty() {
        return String::new();
    }
    let style = &run.style;
    if style.is_plain() {
        return run.content.clone();
    }

    // Emphasis markers must hug the text, so edge whitespace stays outside.
    let (leading, core, trailing) = if style.inline_code {
        ("", run.content.as_str(), "")
    } else {
        split_edge_whitespace(&run.content)
    };
    if core.is_empty() {
        return run.content.clone();
    }

    let mut text = if style.inline_code {
        format!("`{core}`")
    } else {
        core.to_string()
    };
    if style.bold {
        text = format!("**{text}**");
    }
    if style.italic {
        text = format!("*{text}*");
    }
    if style.strikethrough {
        text = format!("~~{text}~~");
    }
    if style.underline {
        text = format!("<u>{text}</u>");
    }
    if let Some(url) = style.link.as_deref() {
        text = format!("[{text}]({url})");
    }
    format!("{leading}{text}{trailing}")
}

fn split_edge_whitespace(text: &str) -> (&str, &str, &str) {
    let start = text.len() - text.trim_start().len();
    let end = text.trim_end().len().max(start);
    (&text[..start], &text[start..end], &text[end..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_bold_italic_and_code_left_to_right() {
        let runs = parse_inline("a **b** *c* `d` e");
        assert_eq!(
            runs,
            vec![
                TextRun::plain("a "),
                TextRun::bold("b"),
                TextRun::plain(" "),
                TextRun::italic("c"),
                TextRun::plain(" "),
                TextRun::code("d"),
                TextRun::plain(" e"),
            ]
        );
    }

    #[test]
    fn unterminated_markers_stay_literal() {
        assert_eq!(parse_inline("2 * 3 = 6"), vec![TextRun::plain("2 * 3 = 6")]);
        assert_eq!(parse_inline("**open"), vec![TextRun::plain("**open")]);
        assert_eq!(parse_inline("`tick"), vec![TextRun::plain("`tick")]);
    }

    #[test]
    fn parses_links_and_strikethrough() {
        let runs = parse_inline("see [docs](https://x.dev) ~~old~~");
        assert_eq!(runs[1], TextRun::link("docs", "https://x.dev"));
        assert!(runs[3].style.strikethrough);
        assert_eq!(runs[3].content, "old");
    }

    #[test]
    fn bracket_without_url_is_plain() {
        assert_eq!(parse_inline("[x] done"), vec![TextRun::plain("[x] done")]);
    }

    #[test]
    fn empty_input_has_no_runs() {
        assert!(parse_inline("").is_empty());
    }

    #[test]
    fn renders_styles_with_link_outermost() {
        let style = TextStyle {
            bold: true,
            link: Some("https://x.dev".to_string()),
            ..TextStyle::default()
        };
        assert_eq!(
            render_runs(&[TextRun::styled("go", style)]),
            "[**go**](https://x.dev)"
        );
        let underline = TextStyle {
            underline: true,
            ..TextStyle::default()
        };
        assert_eq!(render_runs(&[TextRun::styled("u", underline)]), "<u>u</u>");
    }

    #[test]
    fn renders_edge_whitespace_outside_markers() {
        assert_eq!(render_runs(&[TextRun::bold(" b ")]), " **b** ");
        assert_eq!(render_runs(&[TextRun::bold("  ")]), "  ");
        assert_eq!(render_runs(&[TextRun::code(" c ")]), "` c `");
    }

    #[test]
    fn inline_round_trip_preserves_styles() {
        let source = "x **b** *i* `c` ~~s~~ [l](https://u)";
        assert_eq!(render_runs(&parse_inline(source)), source);
    }
}
