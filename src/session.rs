//! One open canvas and everything that acts on it.

use log::{debug, info};
use std::sync::Arc;

use crate::chat::{self, ChatDispatcher, ChatExport, ChatJob, ChatReply};
use crate::config::Settings;
use crate::document::{DocumentMetadata, LoadWarning, MetadataOverrides, SavedCanvas};
use crate::error::{CanvasError, Result};
use crate::graph::Graph;
use crate::interaction::{ConnectionDraw, ConnectionRequest, FrameCoalescer, ResizeGesture, ResizeHandle};
use crate::node::{ConnectionId, NodeId, NodeKind, NodeType, NodeUpdate, NoteFile, Port, Position, Size};
use crate::notes::{NoteJob, NoteReply};
use crate::provider::{ChatProvider, provider_from_settings};
use crate::serializer::{self, CanvasSerializer};
use crate::storage::Storage;

/// Synchronous state transitions a host feeds in from its event loop.
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasMessage {
    AddNode {
        node_type: NodeType,
        position: Option<Position>,
    },
    RemoveNode(NodeId),
    UpdateNode {
        node_id: NodeId,
        update: NodeUpdate,
    },
    /// Screen-space pointer delta.
    NodeDragged {
        node_id: NodeId,
        delta: Position,
    },
    ResizeStarted {
        node_id: NodeId,
        handle: ResizeHandle,
        pointer: Position,
    },
    ResizeMoved(Position),
    ResizeEnded,
    ConnectionStarted {
        node_id: NodeId,
        port: Port,
        anchor: Position,
    },
    ConnectionMoved(Position),
    ConnectionEnded {
        node_id: NodeId,
        port: Port,
    },
    ConnectionCancelled,
    RemoveConnection(ConnectionId),
    SelectNode {
        node_id: NodeId,
        multi: bool,
    },
    SelectConnection {
        connection_id: ConnectionId,
        multi: bool,
    },
    ClearSelection,
    DeleteSelected,
    Pan(Position),
    Zoom {
        delta_y: f64,
        cursor: Position,
    },
    ZoomIn,
    ZoomOut,
    ResetZoom,
    FitToContent {
        viewport_size: Size,
        padding: f64,
    },
    ClearChat(NodeId),
    ClearAll,
}

/// Owns the graph, the gestures in progress and the collaborators.
/// Nothing here is global; hosts hold one session per open canvas.
pub struct CanvasSession {
    graph: Graph,
    draw: ConnectionDraw,
    resize: ResizeGesture,
    frame: FrameCoalescer<(NodeId, Size)>,
    settings: Settings,
    serializer: CanvasSerializer,
    provider: Arc<dyn ChatProvider>,
    chats: ChatDispatcher,
    /// Metadata of the document this canvas was loaded from or saved to.
    metadata: Option<DocumentMetadata>,
}

impl CanvasSession {
    pub fn new(settings: Settings, storage: Arc<dyn Storage>) -> Self {
        let provider = provider_from_settings(&settings);
        let serializer = CanvasSerializer::new(storage, settings.storage_folder.clone());
        Self {
            graph: Graph::new(),
            draw: ConnectionDraw::default(),
            resize: ResizeGesture::default(),
            frame: FrameCoalescer::default(),
            settings,
            serializer,
            provider,
            chats: ChatDispatcher::new(),
            metadata: None,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn ChatProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn draw_state(&self) -> &ConnectionDraw {
        &self.draw
    }

    pub fn metadata(&self) -> Option<&DocumentMetadata> {
        self.metadata.as_ref()
    }

    pub fn is_chat_busy(&self, node_id: &NodeId) -> bool {
        self.chats.is_busy(node_id)
    }

    /// Swap in new settings, rebuilding the provider and storage folder.
    pub fn set_settings(&mut self, settings: Settings) {
        self.provider = provider_from_settings(&settings);
        self.serializer = CanvasSerializer::new(
            self.serializer.storage().clone(),
            settings.storage_folder.clone(),
        );
        self.settings = settings;
    }

    pub fn add_node(&mut self, node_type: NodeType, position: Option<Position>) -> NodeId {
        self.graph.add_node(node_type, position)
    }

    pub fn update(&mut self, message: CanvasMessage) {
        match message {
            CanvasMessage::AddNode {
                node_type,
                position,
            } => {
                self.graph.add_node(node_type, position);
            }
            CanvasMessage::RemoveNode(node_id) => {
                self.graph.remove_node(&node_id);
            }
            CanvasMessage::UpdateNode { node_id, update } => {
                self.graph.update_node(&node_id, update);
            }
            CanvasMessage::NodeDragged { node_id, delta } => {
                if let Some(node) = self.graph.node(&node_id) {
                    let position = node.position + delta / self.graph.viewport().zoom;
                    self.graph.move_node(&node_id, position);
                }
            }
            CanvasMessage::ResizeStarted {
                node_id,
                handle,
                pointer,
            } => {
                if let Some(node) = self.graph.node(&node_id) {
                    let (node_type, size) = (node.node_type(), node.size);
                    self.resize.start(node_id, node_type, handle, pointer, size);
                }
            }
            CanvasMessage::ResizeMoved(pointer) => {
                if let Some(pending) = self.resize.update(pointer, self.graph.viewport().zoom) {
                    self.frame.push(pending);
                }
            }
            CanvasMessage::ResizeEnded => {
                self.flush_frame();
                self.resize.end();
            }
            CanvasMessage::ConnectionStarted {
                node_id,
                port,
                anchor,
            } => {
                self.draw.start(node_id, port, anchor);
            }
            CanvasMessage::ConnectionMoved(point) => {
                self.draw.move_to(point);
            }
            CanvasMessage::ConnectionEnded { node_id, port } => {
                if let Some(request) = self.draw.finish(node_id, port) {
                    self.apply_connection(request);
                }
            }
            CanvasMessage::ConnectionCancelled => {
                self.draw.cancel();
            }
            CanvasMessage::RemoveConnection(id) => {
                self.graph.remove_connection(&id);
            }
            CanvasMessage::SelectNode { node_id, multi } => {
                self.graph.select_node(&node_id, multi);
            }
            CanvasMessage::SelectConnection {
                connection_id,
                multi,
            } => {
                self.graph.select_connection(&connection_id, multi);
            }
            CanvasMessage::ClearSelection => {
                self.graph.clear_selection();
            }
            CanvasMessage::DeleteSelected => {
                self.graph.remove_selected();
            }
            CanvasMessage::Pan(delta) => {
                let viewport = self.graph.viewport().pan_by(delta);
                self.graph.set_viewport(viewport);
            }
            CanvasMessage::Zoom { delta_y, cursor } => {
                let viewport = self.graph.viewport().wheel_zoom(cursor, delta_y);
                self.graph.set_viewport(viewport);
            }
            CanvasMessage::ZoomIn => {
                let viewport = self.graph.viewport().zoom_in();
                self.graph.set_viewport(viewport);
            }
            CanvasMessage::ZoomOut => {
                let viewport = self.graph.viewport().zoom_out();
                self.graph.set_viewport(viewport);
            }
            CanvasMessage::ResetZoom => {
                let viewport = self.graph.viewport().reset();
                self.graph.set_viewport(viewport);
            }
            CanvasMessage::FitToContent {
                viewport_size,
                padding,
            } => {
                let viewport = self.graph.viewport().fit_to_content(
                    self.graph.nodes().values(),
                    viewport_size,
                    padding,
                );
                self.graph.set_viewport(viewport);
            }
            CanvasMessage::ClearChat(node_id) => {
                chat::clear_chat(&mut self.graph, &node_id);
            }
            CanvasMessage::ClearAll => {
                self.graph.clear_all();
                self.draw.cancel();
                self.resize.end();
                self.frame.take();
            }
        }
    }

    /// Apply the latest resize queued since the last frame.
    pub fn flush_frame(&mut self) -> bool {
        match self.frame.take() {
            Some((node_id, size)) => self.graph.update_node(&node_id, NodeUpdate::size(size)),
            None => false,
        }
    }

    /// Orient the request output-to-input and add it if both ends have
    /// the ports it names.
    fn apply_connection(&mut self, request: ConnectionRequest) -> Option<ConnectionId> {
        let request = if request.from_port == Port::Input {
            ConnectionRequest {
                from: request.to,
                to: request.from,
                from_port: request.to_port,
                to_port: request.from_port,
            }
        } else {
            request
        };

        let ports_ok = self
            .graph
            .node(&request.from)
            .is_some_and(|n| n.has_port(request.from_port))
            && self
                .graph
                .node(&request.to)
                .is_some_and(|n| n.has_port(request.to_port));
        if !ports_ok {
            debug!("connection {} -> {} rejected: port mismatch", request.from, request.to);
            return None;
        }
        self.graph.add_connection(
            &request.from,
            &request.to,
            request.from_port,
            request.to_port,
        )
    }

    /// Start a fresh, unsaved canvas.
    pub fn new_canvas(&mut self) {
        self.update(CanvasMessage::ClearAll);
        self.metadata = None;
    }

    /// Save under `name`, or under the name this canvas was last saved or
    /// loaded with. Returns the storage path written.
    pub async fn save(&mut self, name: Option<&str>) -> Result<String> {
        let mut overrides = self
            .metadata
            .as_ref()
            .map(MetadataOverrides::from)
            .unwrap_or_default();
        if let Some(name) = name {
            overrides.name = Some(name.to_string());
        }

        let doc = serializer::serialize(&self.graph, overrides);
        let path = self.serializer.save(&doc, None).await?;
        info!("saved canvas {:?} to {}", doc.metadata.name, path);
        self.metadata = Some(doc.metadata);
        Ok(path)
    }

    /// Replace the canvas with the document at `path`. On error the
    /// current canvas is left untouched.
    pub async fn load(&mut self, path: &str) -> Result<Vec<LoadWarning>> {
        let loaded = self.serializer.load(path).await?;
        info!(
            "loaded canvas {:?} from {} ({} warnings)",
            loaded.metadata.name,
            path,
            loaded.warnings.len()
        );
        self.graph = loaded.graph;
        self.metadata = Some(loaded.metadata);
        self.draw.cancel();
        self.resize.end();
        self.frame.take();
        self.chats = ChatDispatcher::new();
        Ok(loaded.warnings)
    }

    pub async fn list_saved(&self) -> Vec<SavedCanvas> {
        self.serializer.list_saved().await
    }

    /// Check that `node_id` is a note and hand out the read of `path`.
    pub fn begin_attach_note(&self, node_id: &NodeId, path: &str) -> Result<NoteJob> {
        self.expect_note(node_id)?;
        Ok(NoteJob::attach(
            node_id.clone(),
            path,
            self.serializer.storage().clone(),
        ))
    }

    /// Hand out a re-read of the note's file, or `None` if it has none.
    pub fn begin_refresh_note(&self, node_id: &NodeId) -> Result<Option<NoteJob>> {
        let job = self.expect_note(node_id)?.map(|file| {
            NoteJob::refresh(node_id.clone(), file.path, self.serializer.storage().clone())
        });
        Ok(job)
    }

    /// Apply a finished note read. Returns `false` if the node was removed
    /// or replaced while the read was out.
    pub fn complete_note(&mut self, reply: NoteReply) -> Result<bool> {
        let read = reply.read?;
        Ok(self.apply_to_note(&reply.node_id, read.into_update()))
    }

    /// Point a note node at a file and load its preview.
    pub async fn attach_note_file(&mut self, node_id: &NodeId, path: &str) -> Result<bool> {
        let job = self.begin_attach_note(node_id, path)?;
        self.complete_note(job.run().await)
    }

    /// Re-read a note's file. A note whose file has gone loses the reference.
    pub async fn refresh_note(&mut self, node_id: &NodeId) -> Result<bool> {
        match self.begin_refresh_note(node_id)? {
            Some(job) => self.complete_note(job.run().await),
            None => Ok(false),
        }
    }

    /// Record the user's message and hand out the provider call. The
    /// session stays usable until the reply comes back to [`complete_chat`].
    ///
    /// [`complete_chat`]: CanvasSession::complete_chat
    pub fn begin_chat(&mut self, node_id: &NodeId, text: &str) -> Result<ChatJob> {
        let pending = self.chats.begin(&mut self.graph, node_id, text)?;
        Ok(ChatJob::new(
            pending,
            self.serializer.storage().clone(),
            self.provider.clone(),
            self.settings.clone(),
        ))
    }

    /// Apply a provider reply. Returns `false` if the chat node was removed
    /// in the meantime.
    pub fn complete_chat(&mut self, reply: ChatReply) -> bool {
        self.chats.complete(&mut self.graph, &reply.node_id, reply.reply)
    }

    /// Send `text` from a chat node and wait for the reply. Provider
    /// failures end up in the chat as a system message, not as an error.
    pub async fn send_chat(&mut self, node_id: &NodeId, text: &str) -> Result<bool> {
        let job = self.begin_chat(node_id, text)?;
        Ok(self.complete_chat(job.run().await))
    }

    pub fn export_chat(&self, node_id: &NodeId) -> Option<ChatExport> {
        chat::export_chat(&self.graph, node_id)
    }

    /// The note's current file, or an error if `node_id` is not a note.
    fn expect_note(&self, node_id: &NodeId) -> Result<Option<NoteFile>> {
        let node = self
            .graph
            .node(node_id)
            .ok_or_else(|| CanvasError::NodeNotFound(node_id.clone()))?;
        match &node.kind {
            NodeKind::Note(note) => Ok(note.file.clone()),
            _ => Err(CanvasError::NotANoteNode(node_id.clone())),
        }
    }

    /// Apply only if the node is still a note on the canvas.
    fn apply_to_note(&mut self, node_id: &NodeId, update: NodeUpdate) -> bool {
        let still_note = self
            .graph
            .node(node_id)
            .is_some_and(|n| n.node_type() == NodeType::Note);
        if !still_note {
            debug!("note {} gone; dropping file update", node_id);
            return false;
        }
        self.graph.update_node(node_id, update)
    }
}
