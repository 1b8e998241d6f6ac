//! Chat command recognition

use std::sync::OnceLock;

use regex::Regex;

/// A chat message that drives an edit session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start editing the named Markdown file
    Edit { file_name: String },
    /// Stop the chat's active session
    Stop,
    /// List the chat's sessions
    Status,
}

fn edit_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(?:编辑|edit|修改|在线编辑)\s+(.+\.md)$").expect("Invalid regex")
    })
}

fn stop_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(?:停止编辑|完成编辑|结束编辑|stop\s+edit|finish\s+edit)$")
            .expect("Invalid regex")
    })
}

fn status_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(?:查看编辑状态|编辑状态|edit\s+status)$").expect("Invalid regex")
    })
}

/// Recognize an edit command in a chat message.
///
/// Surrounding whitespace is ignored; anything else returns `None`.
pub fn parse_command(text: &str) -> Option<Command> {
    let text = text.trim();
    if let Some(captures) = edit_pattern().captures(text) {
        let file_name = captures.get(1)?.as_str().trim().to_string();
        return Some(Command::Edit { file_name });
    }
    if stop_pattern().is_match(text) {
        return Some(Command::Stop);
    }
    if status_pattern().is_match(text) {
        return Some(Command::Status);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_commands() {
        for text in ["edit notes.md", "EDIT notes.md", "编辑 notes.md", "  修改 notes.md  "] {
            assert_eq!(
                parse_command(text),
                Some(Command::Edit {
                    file_name: "notes.md".to_string()
                }),
                "{text}"
            );
        }
        assert_eq!(
            parse_command("在线编辑 docs/weekly plan.md"),
            Some(Command::Edit {
                file_name: "docs/weekly plan.md".to_string()
            })
        );
    }

    #[test]
    fn test_edit_requires_markdown_file() {
        assert_eq!(parse_command("edit notes.txt"), None);
        assert_eq!(parse_command("edit"), None);
        assert_eq!(parse_command("editnotes.md"), None);
    }

    #[test]
    fn test_stop_and_status_commands() {
        for text in ["stop edit", "Finish  Edit", "停止编辑", "完成编辑", "结束编辑"] {
            assert_eq!(parse_command(text), Some(Command::Stop), "{text}");
        }
        for text in ["edit status", "编辑状态", "查看编辑状态"] {
            assert_eq!(parse_command(text), Some(Command::Status), "{text}");
        }
    }

    #[test]
    fn test_unrelated_text() {
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command("please stop edit now"), None);
    }
}
