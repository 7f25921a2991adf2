//! Node-graph canvas engine: notes, text and AI chat nodes wired together
//! on a pannable, zoomable surface, saved as versioned JSON documents.

pub mod chat;
pub mod config;
pub mod context;
pub mod document;
pub mod error;
pub mod graph;
pub mod interaction;
mod layout;
pub mod node;
pub mod notes;
pub mod provider;
pub mod selection;
pub mod serializer;
pub mod session;
pub mod storage;
pub mod viewport;

pub use config::Settings;
pub use document::{CanvasDocument, LoadWarning, MetadataOverrides};
pub use error::{CanvasError, ProviderError, Result, StorageError};
pub use graph::Graph;
pub use node::{Connection, ConnectionId, Node, NodeId, NodeKind, NodeType, NodeUpdate, Port, Position, Size};
pub use session::{CanvasMessage, CanvasSession};
pub use storage::{FsStorage, MemoryStorage, Storage};
pub use viewport::Viewport;
