//! Prompt context gathered from the nodes feeding a chat.

use log::error;
use regex::Regex;
use std::sync::LazyLock;

use crate::node::{Node, NodeKind};
use crate::storage::Storage;

const CHARS_PER_TOKEN: usize = 4;
const SECTION_SEPARATOR: &str = "\n\n---\n\n";
const TRUNCATION_MARKER: &str = "\n\n...(truncated)";

/// What one upstream node contributes, captured without holding the graph.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextSource {
    NoteFile { path: String, basename: String },
    Text(String),
}

impl ContextSource {
    /// Notes without a file and blank text nodes contribute nothing.
    pub fn from_node(node: &Node) -> Option<Self> {
        match &node.kind {
            NodeKind::Note(note) => note.file.as_ref().map(|file| ContextSource::NoteFile {
                path: file.path.clone(),
                basename: file.basename.clone(),
            }),
            NodeKind::Text(text) if !text.content().is_empty() => {
                Some(ContextSource::Text(text.content().to_string()))
            }
            _ => None,
        }
    }
}

/// Approximate token count at four characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Cut `content` to roughly `max_tokens`, backing off to the last space.
pub fn truncate_to_token_limit(content: &str, max_tokens: usize) -> String {
    let max_chars = max_tokens.saturating_mul(CHARS_PER_TOKEN);
    let Some((cut, _)) = content.char_indices().nth(max_chars) else {
        return content.to_string();
    };
    let head = &content[..cut];
    let head = match head.rfind(' ') {
        Some(space) if space > 0 => &head[..space],
        _ => head,
    };
    format!("{}{}", head, TRUNCATION_MARKER)
}

static BLANK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("Invalid regex pattern for blank lines"));

fn collapse_blank_lines(content: &str) -> String {
    BLANK_RUN.replace_all(content, "\n\n").into_owned()
}

async fn note_section(storage: &dyn Storage, path: &str, basename: &str) -> String {
    match storage.read_to_string(path).await {
        Ok(content) => format!(
            "## {}\n*Source: {}*\n\n{}",
            basename,
            path,
            collapse_blank_lines(&content).trim()
        ),
        Err(e) => {
            error!("could not read {} for chat context: {}", path, e);
            format!("## {}\n\n*Error reading file*", basename)
        }
    }
}

/// Note sections first, then numbered text sections, truncated to
/// `limit` tokens. Unreadable notes become an error section.
pub async fn build_context(storage: &dyn Storage, sources: &[ContextSource], limit: usize) -> String {
    let mut sections = Vec::new();
    for source in sources {
        if let ContextSource::NoteFile { path, basename } = source {
            sections.push(note_section(storage, path, basename).await);
        }
    }

    let texts = sources.iter().filter_map(|s| match s {
        ContextSource::Text(text) => Some(text),
        ContextSource::NoteFile { .. } => None,
    });
    for (i, text) in texts.enumerate() {
        sections.push(format!("## Text Note {}\n\n{}", i + 1, text));
    }

    truncate_to_token_limit(&sections.join(SECTION_SEPARATOR), limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeType, NoteFile, Position, TextNode};
    use crate::storage::MemoryStorage;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_truncate_backs_off_to_space() {
        assert_eq!(truncate_to_token_limit("short", 10), "short");
        assert_eq!(
            truncate_to_token_limit("alpha beta gamma", 3),
            "alpha beta\n\n...(truncated)"
        );
        assert_eq!(
            truncate_to_token_limit("abcdefghijkl", 2),
            "abcdefgh\n\n...(truncated)"
        );
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\nb\n\n\nc"), "a\n\nb\n\nc");
        assert_eq!(collapse_blank_lines("a\n\nb"), "a\n\nb");
        assert_eq!(collapse_blank_lines("a\n\n\nb"), collapse_blank_lines("a\n\n\n\nb"));
    }

    #[test]
    fn test_source_from_node() {
        let mut note = Node::new("n".into(), NodeType::Note, Position::ORIGIN);
        assert_eq!(ContextSource::from_node(&note), None);
        if let NodeKind::Note(inner) = &mut note.kind {
            inner.file = Some(NoteFile::from_path("notes/a.md", 0));
        }
        assert_eq!(
            ContextSource::from_node(&note),
            Some(ContextSource::NoteFile {
                path: "notes/a.md".to_string(),
                basename: "a".to_string()
            })
        );

        let mut text = Node::new("t".into(), NodeType::Text, Position::ORIGIN);
        assert_eq!(ContextSource::from_node(&text), None);
        text.kind = NodeKind::Text(TextNode::new("hi"));
        assert_eq!(
            ContextSource::from_node(&text),
            Some(ContextSource::Text("hi".to_string()))
        );
    }

    #[tokio::test]
    async fn test_build_context_layout() {
        let storage = MemoryStorage::new();
        storage.insert("notes/a.md", "line one\n\n\n\n\nline two\n");

        let sources = vec![
            ContextSource::Text("first text".to_string()),
            ContextSource::NoteFile {
                path: "notes/a.md".to_string(),
                basename: "a".to_string(),
            },
            ContextSource::NoteFile {
                path: "notes/gone.md".to_string(),
                basename: "gone".to_string(),
            },
            ContextSource::Text("second text".to_string()),
        ];
        let context = build_context(&storage, &sources, 4000).await;
        assert_eq!(
            context,
            "## a\n*Source: notes/a.md*\n\nline one\n\nline two\
             \n\n---\n\n## gone\n\n*Error reading file*\
             \n\n---\n\n## Text Note 1\n\nfirst text\
             \n\n---\n\n## Text Note 2\n\nsecond text"
        );
    }

    #[tokio::test]
    async fn test_build_context_empty() {
        let storage = MemoryStorage::new();
        assert_eq!(build_context(&storage, &[], 10).await, "");
    }
}
