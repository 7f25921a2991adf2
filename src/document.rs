//! Persisted canvas document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::node::{Connection, ConnectionId, Node, NodeId};
use crate::viewport::Viewport;

/// Version string written by this build.
pub const CANVAS_VERSION: &str = "3.0.0";

/// Versions this build loads. Anything else, older included, is rejected.
pub const SUPPORTED_VERSIONS: &[&str] = &[CANVAS_VERSION];

pub const DEFAULT_NAME: &str = "Untitled Flow";

pub fn is_version_supported(version: &str) -> bool {
    SUPPORTED_VERSIONS.contains(&version)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Caller-supplied metadata for a save. Unset fields take defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataOverrides {
    pub name: Option<String>,
    pub description: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub tags: Vec<String>,
}

impl MetadataOverrides {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }
}

impl From<&DocumentMetadata> for MetadataOverrides {
    fn from(meta: &DocumentMetadata) -> Self {
        Self {
            name: Some(meta.name.clone()),
            description: meta.description.clone(),
            created_at: Some(meta.created_at),
            author: meta.author.clone(),
            tags: meta.tags.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasDocument {
    pub version: String,
    pub metadata: DocumentMetadata,
    pub viewport: Viewport,
    pub nodes: Vec<Node>,
    pub connections: Vec<Connection>,
}

/// A per-node problem that degraded a load without aborting it.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadWarning {
    /// The note's file no longer exists; its reference was cleared.
    MissingFile { node_id: NodeId, path: String },
    /// The note's file exists but could not be read; its preview was cleared.
    UnreadableFile {
        node_id: NodeId,
        path: String,
        reason: String,
    },
    /// The connection named a node absent from the document and was dropped.
    DanglingConnection { connection_id: ConnectionId },
}

/// A saved document found in the storage folder.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedCanvas {
    pub path: String,
    pub metadata: DocumentMetadata,
}
