//! Versioned canvas documents against a storage collaborator.

use chrono::Utc;
use log::{debug, warn};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use crate::document::{
    CANVAS_VERSION, CanvasDocument, DEFAULT_NAME, DocumentMetadata, LoadWarning,
    MetadataOverrides, SavedCanvas, is_version_supported,
};
use crate::error::{CanvasError, Result};
use crate::graph::Graph;
use crate::node::{Connection, ConnectionId, Node, NodeId, NodeKind, NoteFile, note_preview};
use crate::storage::{self, Storage};
use crate::viewport::Viewport;

/// Snapshot `graph` into a document. `updatedAt` is always now;
/// `createdAt` comes from the overrides when given.
pub fn serialize(graph: &Graph, overrides: MetadataOverrides) -> CanvasDocument {
    let now = Utc::now();
    let mut nodes: Vec<Node> = graph.nodes().values().cloned().collect();
    nodes.sort_by(|a, b| a.id.cmp(&b.id));
    let mut connections: Vec<Connection> = graph.connections().values().cloned().collect();
    connections.sort_by(|a, b| a.id.cmp(&b.id));

    CanvasDocument {
        version: CANVAS_VERSION.to_string(),
        metadata: DocumentMetadata {
            name: overrides.name.unwrap_or_else(|| DEFAULT_NAME.to_string()),
            description: overrides.description,
            created_at: overrides.created_at.unwrap_or(now),
            updated_at: now,
            author: overrides.author,
            // written as given; no default tag is appended
            tags: overrides.tags,
        },
        viewport: graph.viewport(),
        nodes,
        connections,
    }
}

/// Cheap shape check run before any field is read.
pub fn validate_structure(raw: &Value) -> bool {
    let Some(obj) = raw.as_object() else {
        return false;
    };
    let version_ok = obj
        .get("version")
        .and_then(Value::as_str)
        .is_some_and(|v| !v.is_empty());
    let present = |key: &str| obj.get(key).is_some_and(|v| !v.is_null());
    version_ok
        && present("metadata")
        && present("viewport")
        && obj.get("nodes").is_some_and(Value::is_array)
        && obj.get("connections").is_some_and(Value::is_array)
}

static FILENAME_UNSAFE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^a-zA-Z0-9]").expect("Invalid regex pattern for file names")
});

/// `My Flow!` -> `My_Flow_.json`.
pub fn document_filename(name: &str) -> String {
    format!("{}.json", FILENAME_UNSAFE.replace_all(name, "_"))
}

/// Result of a successful load.
#[derive(Debug, Clone)]
pub struct LoadedCanvas {
    pub graph: Graph,
    pub metadata: DocumentMetadata,
    pub warnings: Vec<LoadWarning>,
}

pub struct CanvasSerializer {
    storage: Arc<dyn Storage>,
    folder: String,
}

impl CanvasSerializer {
    pub fn new(storage: Arc<dyn Storage>, folder: impl Into<String>) -> Self {
        Self {
            storage,
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &str {
        &self.folder
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Build a graph from a raw document.
    ///
    /// Shape, version, typing and id uniqueness are checked before anything
    /// is built, so a failure never yields a partial graph. Note files are
    /// then re-resolved one by one; a file that went missing degrades that
    /// node only.
    pub async fn deserialize(&self, raw: Value) -> Result<LoadedCanvas> {
        if !validate_structure(&raw) {
            return Err(CanvasError::Structural(
                "expected version, metadata, viewport, nodes and connections".to_string(),
            ));
        }
        let version = raw["version"].as_str().unwrap_or_default();
        if !is_version_supported(version) {
            return Err(CanvasError::UnsupportedVersion(version.to_string()));
        }

        let doc: CanvasDocument =
            serde_json::from_value(raw).map_err(|e| CanvasError::Structural(e.to_string()))?;

        let mut nodes: HashMap<NodeId, Node> = HashMap::with_capacity(doc.nodes.len());
        for node in doc.nodes {
            if nodes.contains_key(&node.id) {
                return Err(CanvasError::Structural(format!("duplicate node id {}", node.id)));
            }
            nodes.insert(node.id.clone(), node);
        }

        let mut warnings = Vec::new();
        let mut connections: HashMap<ConnectionId, Connection> =
            HashMap::with_capacity(doc.connections.len());
        for conn in doc.connections {
            if connections.contains_key(&conn.id) {
                return Err(CanvasError::Structural(format!(
                    "duplicate connection id {}",
                    conn.id
                )));
            }
            let dangling = conn.from_node_id == conn.to_node_id
                || !nodes.contains_key(&conn.from_node_id)
                || !nodes.contains_key(&conn.to_node_id);
            if dangling {
                warn!("dropping connection {}: endpoints do not resolve", conn.id);
                warnings.push(LoadWarning::DanglingConnection {
                    connection_id: conn.id,
                });
                continue;
            }
            connections.insert(conn.id.clone(), conn);
        }

        for node in nodes.values_mut() {
            if let Some(warning) = self.resolve_note(node).await {
                warnings.push(warning);
            }
        }

        let viewport = Viewport::new(doc.viewport.x, doc.viewport.y, doc.viewport.zoom);
        debug!(
            "canvas deserialized: {} nodes, {} connections, {} warnings",
            nodes.len(),
            connections.len(),
            warnings.len()
        );
        Ok(LoadedCanvas {
            graph: Graph::from_parts(nodes, connections, viewport),
            metadata: doc.metadata,
            warnings,
        })
    }

    /// Refresh a note's file reference and preview from storage.
    async fn resolve_note(&self, node: &mut Node) -> Option<LoadWarning> {
        let NodeKind::Note(note) = &mut node.kind else {
            return None;
        };
        let file = note.file.take()?;

        if !self.storage.exists(&file.path).await {
            warn!("note {}: file {} no longer exists", node.id, file.path);
            note.content = None;
            return Some(LoadWarning::MissingFile {
                node_id: node.id.clone(),
                path: file.path,
            });
        }

        let modified = self
            .storage
            .modified_time(&file.path)
            .await
            .unwrap_or(file.modified_time);
        let path = file.path;
        note.file = Some(NoteFile::from_path(&path, modified));

        match self.storage.read_to_string(&path).await {
            Ok(content) => {
                note.content = Some(note_preview(&content));
                None
            }
            Err(e) => {
                warn!("note {}: could not read {}: {}", node.id, path, e);
                note.content = None;
                Some(LoadWarning::UnreadableFile {
                    node_id: node.id.clone(),
                    path,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Write `doc` into the storage folder, named after its metadata name
    /// unless `filename` is given. Returns the path written.
    pub async fn save(&self, doc: &CanvasDocument, filename: Option<&str>) -> Result<String> {
        self.ensure_storage_folder().await?;
        let name = filename
            .map(str::to_string)
            .unwrap_or_else(|| document_filename(&doc.metadata.name));
        let path = storage::join(&self.folder, &name);
        let bytes =
            serde_json::to_vec_pretty(doc).map_err(|e| CanvasError::Structural(e.to_string()))?;
        self.storage.write(&path, &bytes).await?;
        debug!("canvas saved to {}", path);
        Ok(path)
    }

    /// Read and shape-check a document without building a graph.
    pub async fn read_document(&self, path: &str) -> Result<Value> {
        let text = self.storage.read_to_string(path).await?;
        let raw: Value = serde_json::from_str(&text)
            .map_err(|e| CanvasError::Structural(format!("{}: {}", path, e)))?;
        if !validate_structure(&raw) {
            return Err(CanvasError::Structural(format!(
                "{} is not a canvas document",
                path
            )));
        }
        Ok(raw)
    }

    pub async fn load(&self, path: &str) -> Result<LoadedCanvas> {
        let raw = self.read_document(path).await?;
        self.deserialize(raw).await
    }

    /// Documents in the storage folder, most recently updated first.
    /// Entries that fail to read or parse are skipped.
    pub async fn list_saved(&self) -> Vec<SavedCanvas> {
        let paths = match self.storage.list(&self.folder).await {
            Ok(paths) => paths,
            Err(e) => {
                warn!("could not list {}: {}", self.folder, e);
                return Vec::new();
            }
        };

        let mut saved = Vec::new();
        for path in paths.into_iter().filter(|p| p.ends_with(".json")) {
            let metadata = match self.read_document(&path).await {
                Ok(mut raw) => serde_json::from_value::<DocumentMetadata>(raw["metadata"].take())
                    .map_err(|e| CanvasError::Structural(e.to_string())),
                Err(e) => Err(e),
            };
            match metadata {
                Ok(metadata) => saved.push(SavedCanvas { path, metadata }),
                Err(e) => warn!("skipping {}: {}", path, e),
            }
        }
        saved.sort_by(|a, b| b.metadata.updated_at.cmp(&a.metadata.updated_at));
        saved
    }

    pub async fn ensure_storage_folder(&self) -> Result<()> {
        self.storage.ensure_folder(&self.folder).await?;
        Ok(())
    }
}
