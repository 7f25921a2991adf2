//! Node and connection data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

/// Number of characters of a note's file kept as its preview.
pub const NOTE_PREVIEW_CHARS: usize = 500;

/// Leading slice of a note file shown on the node.
pub fn note_preview(content: &str) -> String {
    content.chars().take(NOTE_PREVIEW_CHARS).collect()
}

/// A 2-D point. World coordinates unless stated otherwise; also used for
/// screen points and pointer deltas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const ORIGIN: Position = Position { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl Add for Position {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Position {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Position {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl Div<f64> for Position {
    type Output = Self;
    fn div(self, rhs: f64) -> Self {
        Self::new(self.x / rhs, self.y / rhs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Inclusive min/max footprint a node variant may take.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeBounds {
    pub min: Size,
    pub max: Size,
}

impl SizeBounds {
    pub fn clamp(&self, size: Size) -> Size {
        Size {
            width: size.width.clamp(self.min.width, self.max.width),
            height: size.height.clamp(self.min.height, self.max.height),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub String);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        ConnectionId(s.to_string())
    }
}

/// Logical attachment point of a connection end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Port {
    Output,
    Input,
}

/// Payload-free node variant tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeType {
    Note,
    Text,
    AiChat,
}

impl NodeType {
    pub const ALL: [NodeType; 3] = [NodeType::Note, NodeType::Text, NodeType::AiChat];

    /// Tag used in persisted documents and as the id prefix.
    pub fn tag(&self) -> &'static str {
        match self {
            NodeType::Note => "note",
            NodeType::Text => "text",
            NodeType::AiChat => "ai-chat",
        }
    }

    pub fn default_size(&self) -> Size {
        match self {
            NodeType::Note => Size::new(280.0, 180.0),
            NodeType::Text => Size::new(250.0, 160.0),
            NodeType::AiChat => Size::new(400.0, 600.0),
        }
    }

    pub fn size_bounds(&self) -> SizeBounds {
        match self {
            NodeType::Note | NodeType::Text => SizeBounds {
                min: Size::new(200.0, 150.0),
                max: Size::new(600.0, 800.0),
            },
            NodeType::AiChat => SizeBounds {
                min: Size::new(350.0, 450.0),
                max: Size::new(800.0, 900.0),
            },
        }
    }

    /// Note and text nodes feed chats; chats only receive.
    pub fn ports(&self) -> &'static [Port] {
        match self {
            NodeType::Note | NodeType::Text => &[Port::Output],
            NodeType::AiChat => &[Port::Input],
        }
    }
}

/// Resolved reference to a file in the storage collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteFile {
    pub path: String,
    pub basename: String,
    pub extension: String,
    /// Unix milliseconds.
    #[serde(default)]
    pub modified_time: i64,
}

impl NoteFile {
    pub fn from_path(path: &str, modified_time: i64) -> Self {
        let p = std::path::Path::new(path);
        Self {
            path: path.to_string(),
            basename: p
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            extension: p
                .extension()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            modified_time,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn now(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<NoteFile>,
    /// Preview of the referenced file's content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Free text. The counts are written out for readers of the document but
/// always derived from `content`, including on load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredText")]
pub struct TextNode {
    content: String,
    word_count: usize,
    char_count: usize,
}

/// Persisted form of a text node; stored counts are ignored.
#[derive(Deserialize)]
struct StoredText {
    #[serde(default)]
    content: String,
}

impl From<StoredText> for TextNode {
    fn from(stored: StoredText) -> Self {
        TextNode::new(stored.content)
    }
}

impl TextNode {
    pub fn new(content: impl Into<String>) -> Self {
        let mut node = TextNode::default();
        node.set_content(content);
        node
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn word_count(&self) -> usize {
        self.word_count
    }

    pub fn char_count(&self) -> usize {
        self.char_count
    }

    /// Replace the text and recompute the derived counts.
    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.word_count = self.content.split_whitespace().count();
        self.char_count = self.content.chars().count();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatNode {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// Live number of connections targeting this node. Maintained by the graph.
    #[serde(default)]
    pub(crate) connected_count: usize,
}

impl ChatNode {
    pub fn connected_count(&self) -> usize {
        self.connected_count
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum NodeKind {
    Note(NoteNode),
    Text(TextNode),
    AiChat(ChatNode),
}

impl NodeKind {
    pub fn empty(node_type: NodeType) -> Self {
        match node_type {
            NodeType::Note => NodeKind::Note(NoteNode::default()),
            NodeType::Text => NodeKind::Text(TextNode::default()),
            NodeType::AiChat => NodeKind::AiChat(ChatNode::default()),
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Note(_) => NodeType::Note,
            NodeKind::Text(_) => NodeType::Text,
            NodeKind::AiChat(_) => NodeType::AiChat,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub position: Position,
    pub size: Size,
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl Node {
    pub fn new(id: NodeId, node_type: NodeType, position: Position) -> Self {
        Self {
            id,
            position,
            size: node_type.default_size(),
            kind: NodeKind::empty(node_type),
        }
    }

    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    pub fn ports(&self) -> &'static [Port] {
        self.node_type().ports()
    }

    pub fn has_port(&self, port: Port) -> bool {
        self.ports().contains(&port)
    }

    pub fn as_note(&self) -> Option<&NoteNode> {
        match &self.kind {
            NodeKind::Note(note) => Some(note),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&TextNode> {
        match &self.kind {
            NodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_chat(&self) -> Option<&ChatNode> {
        match &self.kind {
            NodeKind::AiChat(chat) => Some(chat),
            _ => None,
        }
    }

    pub fn as_chat_mut(&mut self) -> Option<&mut ChatNode> {
        match &mut self.kind {
            NodeKind::AiChat(chat) => Some(chat),
            _ => None,
        }
    }

    /// Right and bottom edges of the node's footprint.
    pub fn far_corner(&self) -> Position {
        Position::new(
            self.position.x + self.size.width,
            self.position.y + self.size.height,
        )
    }
}

/// Partial update merged into a node by `Graph::update_node`.
///
/// Fields that do not apply to the node's variant are ignored. `content`
/// is the text of a text node or the preview of a note node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeUpdate {
    pub position: Option<Position>,
    pub size: Option<Size>,
    pub content: Option<String>,
    pub file: Option<Option<NoteFile>>,
    pub messages: Option<Vec<ChatMessage>>,
}

impl NodeUpdate {
    pub fn position(position: Position) -> Self {
        Self {
            position: Some(position),
            ..Self::default()
        }
    }

    pub fn size(size: Size) -> Self {
        Self {
            size: Some(size),
            ..Self::default()
        }
    }

    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn messages(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages: Some(messages),
            ..Self::default()
        }
    }

    pub fn with_file(mut self, file: Option<NoteFile>) -> Self {
        self.file = Some(file);
        self
    }
}

/// Directed edge from an output port to an input port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: ConnectionId,
    pub from_node_id: NodeId,
    pub to_node_id: NodeId,
    pub from_port: Port,
    pub to_port: Port,
}

impl Connection {
    pub fn touches(&self, id: &NodeId) -> bool {
        &self.from_node_id == id || &self.to_node_id == id
    }
}
