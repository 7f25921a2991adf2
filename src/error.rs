use thiserror::Error;

use crate::node::{ConnectionId, NodeId};

pub type Result<T> = std::result::Result<T, CanvasError>;

#[derive(Debug, Error)]
pub enum CanvasError {
    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("connection {0} not found")]
    ConnectionNotFound(ConnectionId),

    /// The document was written by a build this one does not understand.
    #[error("unsupported canvas version: {0}")]
    UnsupportedVersion(String),

    #[error("invalid canvas structure: {0}")]
    Structural(String),

    #[error("node {0} already has a chat request in flight")]
    ChatBusy(NodeId),

    #[error("node {0} is not an AI chat node")]
    NotAChatNode(NodeId),

    #[error("node {0} is not a note node")]
    NotANoteNode(NodeId),

    #[error("cannot send an empty message")]
    EmptyMessage,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            return StorageError::NotFound(path.into());
        }
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0} API key not configured")]
    MissingApiKey(&'static str),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Api(String),
}
