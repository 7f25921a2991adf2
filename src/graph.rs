use log::debug;
use rand::Rng;
use std::collections::{BTreeMap, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::layout;
use crate::node::{
    Connection, ConnectionId, Node, NodeId, NodeKind, NodeType, NodeUpdate, Port, Position,
};
use crate::selection::Selection;
use crate::viewport::Viewport;

const CONNECTION_TAG: &str = "conn";
const ID_SUFFIX_LEN: usize = 5;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Aggregate counts over the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub node_count: usize,
    pub connection_count: usize,
    pub per_type: BTreeMap<NodeType, usize>,
}

impl GraphStats {
    pub fn count(&self, node_type: NodeType) -> usize {
        self.per_type.get(&node_type).copied().unwrap_or(0)
    }
}

/// Nodes, connections, viewport and selection of one canvas.
///
/// Every mutation keeps the derived fields consistent: chat nodes'
/// connected counts follow the live connections, text counts follow
/// the text, and the selection never names a removed id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    nodes: HashMap<NodeId, Node>,
    connections: HashMap<ConnectionId, Connection>,
    viewport: Viewport,
    selection: Selection,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a graph from loaded parts. The selection starts empty.
    pub(crate) fn from_parts(
        nodes: HashMap<NodeId, Node>,
        connections: HashMap<ConnectionId, Connection>,
        viewport: Viewport,
    ) -> Self {
        let mut graph = Self {
            nodes,
            connections,
            viewport,
            selection: Selection::default(),
        };
        graph.recount_connections();
        graph
    }

    pub fn nodes(&self) -> &HashMap<NodeId, Node> {
        &self.nodes
    }

    pub fn connections(&self) -> &HashMap<ConnectionId, Connection> {
        &self.connections
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn connection(&self, id: &ConnectionId) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Replace the viewport. Zoom is clamped into the supported range.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = Viewport::new(viewport.x, viewport.y, viewport.zoom);
    }

    pub fn add_node(&mut self, node_type: NodeType, position: Option<Position>) -> NodeId {
        let id = NodeId(self.fresh_id(node_type.tag()));
        let position = position.unwrap_or_else(|| {
            layout::default_position(&self.nodes, node_type.default_size())
        });
        debug!("node added: {} at ({}, {})", id, position.x, position.y);
        self.nodes
            .insert(id.clone(), Node::new(id.clone(), node_type, position));
        id
    }

    /// Remove a node with every connection touching it. Returns the
    /// removed node, or `None` if the id was unknown.
    pub fn remove_node(&mut self, id: &NodeId) -> Option<Node> {
        let node = self.nodes.remove(id)?;
        self.selection.forget_node(id);

        let dropped: Vec<ConnectionId> = self
            .connections
            .values()
            .filter(|c| c.touches(id))
            .map(|c| c.id.clone())
            .collect();
        for conn_id in &dropped {
            self.connections.remove(conn_id);
            self.selection.forget_connection(conn_id);
        }

        debug!("node removed: {} ({} connections dropped)", id, dropped.len());
        if !dropped.is_empty() {
            self.recount_connections();
        }
        Some(node)
    }

    /// Merge `update` into an existing node. Sizes are clamped to the
    /// variant's bounds and text counts are recomputed. Returns `false`
    /// if the id was unknown.
    pub fn update_node(&mut self, id: &NodeId, update: NodeUpdate) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };

        if let Some(position) = update.position {
            node.position = position;
        }
        if let Some(size) = update.size {
            node.size = node.node_type().size_bounds().clamp(size);
        }

        match &mut node.kind {
            NodeKind::Note(note) => {
                if let Some(file) = update.file {
                    // a detached note keeps no stale preview
                    if file.is_none() {
                        note.content = None;
                    }
                    note.file = file;
                }
                if let Some(content) = update.content {
                    note.content = Some(content);
                }
            }
            NodeKind::Text(text) => {
                if let Some(content) = update.content {
                    text.set_content(content);
                }
            }
            NodeKind::AiChat(chat) => {
                if let Some(messages) = update.messages {
                    chat.messages = messages;
                }
            }
        }
        true
    }

    pub fn move_node(&mut self, id: &NodeId, position: Position) -> bool {
        self.update_node(id, NodeUpdate::position(position))
    }

    /// Connect two distinct, existing nodes. Self-loops and unknown
    /// endpoints are rejected with `None`.
    pub fn add_connection(
        &mut self,
        from: &NodeId,
        to: &NodeId,
        from_port: Port,
        to_port: Port,
    ) -> Option<ConnectionId> {
        if from == to {
            debug!("connection rejected: self-loop on {}", from);
            return None;
        }
        if !self.nodes.contains_key(from) || !self.nodes.contains_key(to) {
            debug!("connection rejected: unknown endpoint {} -> {}", from, to);
            return None;
        }

        let id = ConnectionId(self.fresh_id(CONNECTION_TAG));
        self.connections.insert(
            id.clone(),
            Connection {
                id: id.clone(),
                from_node_id: from.clone(),
                to_node_id: to.clone(),
                from_port,
                to_port,
            },
        );
        debug!("connection added: {} ({} -> {})", id, from, to);
        self.recount_connections();
        Some(id)
    }

    pub fn remove_connection(&mut self, id: &ConnectionId) -> Option<Connection> {
        let conn = self.connections.remove(id)?;
        self.selection.forget_connection(id);
        debug!("connection removed: {}", id);
        self.recount_connections();
        Some(conn)
    }

    /// Upstream sources of `id`: the origin of every connection ending at
    /// `id`, ordered by connection id.
    pub fn connected_nodes(&self, id: &NodeId) -> Vec<&Node> {
        let mut incoming: Vec<&Connection> = self
            .connections
            .values()
            .filter(|c| &c.to_node_id == id)
            .collect();
        incoming.sort_by(|a, b| a.id.cmp(&b.id));
        incoming
            .into_iter()
            .filter_map(|c| self.nodes.get(&c.from_node_id))
            .collect()
    }

    pub fn stats(&self) -> GraphStats {
        let mut per_type = BTreeMap::new();
        for node in self.nodes.values() {
            *per_type.entry(node.node_type()).or_insert(0) += 1;
        }
        GraphStats {
            node_count: self.nodes.len(),
            connection_count: self.connections.len(),
            per_type,
        }
    }

    pub fn clear_all(&mut self) {
        *self = Graph::default();
    }

    /// Select an existing node; unknown ids are ignored.
    pub fn select_node(&mut self, id: &NodeId, multi: bool) {
        if self.nodes.contains_key(id) {
            self.selection.select_node(id.clone(), multi);
        }
    }

    pub fn select_connection(&mut self, id: &ConnectionId, multi: bool) {
        if self.connections.contains_key(id) {
            self.selection.select_connection(id.clone(), multi);
        }
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Delete every selected connection, then every selected node.
    pub fn remove_selected(&mut self) {
        let connections: Vec<ConnectionId> =
            self.selection.connections().iter().cloned().collect();
        for id in &connections {
            self.remove_connection(id);
        }
        let nodes: Vec<NodeId> = self.selection.nodes().iter().cloned().collect();
        for id in &nodes {
            self.remove_node(id);
        }
    }

    /// Bring every chat node's connected count in line with the live
    /// connections. Only nodes whose count changed are touched.
    fn recount_connections(&mut self) {
        let mut incoming: HashMap<&NodeId, usize> = HashMap::new();
        for conn in self.connections.values() {
            *incoming.entry(&conn.to_node_id).or_insert(0) += 1;
        }

        for (id, node) in self.nodes.iter_mut() {
            if let NodeKind::AiChat(chat) = &mut node.kind {
                let count = incoming.get(id).copied().unwrap_or(0);
                if chat.connected_count != count {
                    chat.connected_count = count;
                }
            }
        }
    }

    /// `<tag>-<unix millis>-<random base36>`, redrawn until unused.
    fn fresh_id(&self, tag: &str) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let mut rng = rand::thread_rng();
        loop {
            let suffix: String = (0..ID_SUFFIX_LEN)
                .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
                .collect();
            let candidate = format!("{}-{}-{}", tag, millis, suffix);
            let taken = self.nodes.contains_key(&NodeId(candidate.clone()))
                || self
                    .connections
                    .contains_key(&ConnectionId(candidate.clone()));
            if !taken {
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{ChatMessage, Role, Size};
    use proptest::prelude::*;

    fn chat_count(graph: &Graph, id: &NodeId) -> usize {
        graph.node(id).unwrap().as_chat().unwrap().connected_count()
    }

    fn assert_counts_consistent(graph: &Graph) {
        for node in graph.nodes().values() {
            if let Some(chat) = node.as_chat() {
                let live = graph
                    .connections()
                    .values()
                    .filter(|c| c.to_node_id == node.id)
                    .count();
                assert_eq!(chat.connected_count(), live);
            }
        }
    }

    #[test]
    fn test_add_node_defaults() {
        let mut graph = Graph::new();
        let text = graph.add_node(NodeType::Text, None);
        let chat = graph.add_node(NodeType::AiChat, Some(Position::new(10.0, 20.0)));
        let note = graph.add_node(NodeType::Note, None);

        assert!(text.0.starts_with("text-"));
        assert!(chat.0.starts_with("ai-chat-"));
        let t = graph.node(&text).unwrap();
        assert_eq!(t.as_text().unwrap().content(), "");
        assert_eq!(t.size, Size::new(250.0, 160.0));
        assert_eq!(graph.node(&chat).unwrap().position, Position::new(10.0, 20.0));
        assert!(graph.node(&chat).unwrap().as_chat().unwrap().messages.is_empty());
        assert!(graph.node(&note).unwrap().as_note().unwrap().file.is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let mut graph = Graph::new();
        for _ in 0..200 {
            graph.add_node(NodeType::Text, Some(Position::ORIGIN));
        }
        assert_eq!(graph.nodes().len(), 200);
    }

    #[test]
    fn test_connect_then_remove_source() {
        let mut graph = Graph::new();
        let t1 = graph.add_node(NodeType::Text, None);
        let a1 = graph.add_node(NodeType::AiChat, None);
        let conn = graph.add_connection(&t1, &a1, Port::Output, Port::Input);
        assert!(conn.is_some());
        assert_eq!(chat_count(&graph, &a1), 1);

        graph.remove_node(&t1);
        assert_eq!(chat_count(&graph, &a1), 0);
        assert!(graph.connections().is_empty());
    }

    #[test]
    fn test_self_loop_rejected() {
        let mut graph = Graph::new();
        let a = graph.add_node(NodeType::AiChat, None);
        let before = graph.clone();
        assert_eq!(graph.add_connection(&a, &a, Port::Output, Port::Input), None);
        assert_eq!(graph, before);
    }

    #[test]
    fn test_unknown_endpoint_rejected() {
        let mut graph = Graph::new();
        let a = graph.add_node(NodeType::AiChat, None);
        let ghost = NodeId::from("ghost");
        assert_eq!(graph.add_connection(&ghost, &a, Port::Output, Port::Input), None);
        assert!(graph.connections().is_empty());
    }

    #[test]
    fn test_missing_ids_are_noops() {
        let mut graph = Graph::new();
        graph.add_node(NodeType::Text, None);
        let before = graph.clone();
        let ghost = NodeId::from("ghost");

        assert!(graph.remove_node(&ghost).is_none());
        assert!(!graph.update_node(&ghost, NodeUpdate::content("x")));
        assert!(!graph.move_node(&ghost, Position::new(1.0, 1.0)));
        assert!(graph.remove_connection(&ConnectionId::from("nope")).is_none());
        assert_eq!(graph, before);
    }

    #[test]
    fn test_update_merges_and_recounts_text() {
        let mut graph = Graph::new();
        let id = graph.add_node(NodeType::Text, Some(Position::new(5.0, 5.0)));
        assert!(graph.update_node(&id, NodeUpdate::content("one two three")));

        let node = graph.node(&id).unwrap();
        assert_eq!(node.position, Position::new(5.0, 5.0));
        assert_eq!(node.as_text().unwrap().word_count(), 3);
        assert_eq!(node.as_text().unwrap().char_count(), 13);

        graph.move_node(&id, Position::new(1.0, 2.0));
        let node = graph.node(&id).unwrap();
        assert_eq!(node.position, Position::new(1.0, 2.0));
        assert_eq!(node.as_text().unwrap().content(), "one two three");
    }

    #[test]
    fn test_update_clamps_size_and_ignores_foreign_fields() {
        let mut graph = Graph::new();
        let id = graph.add_node(NodeType::Text, None);
        let update = NodeUpdate {
            size: Some(Size::new(10_000.0, 1.0)),
            messages: Some(vec![ChatMessage::now(Role::User, "hi")]),
            ..NodeUpdate::default()
        };
        graph.update_node(&id, update);
        let node = graph.node(&id).unwrap();
        assert_eq!(node.size, Size::new(600.0, 150.0));
        assert!(node.as_chat().is_none());
    }

    #[test]
    fn test_remove_node_prunes_selection() {
        let mut graph = Graph::new();
        let t = graph.add_node(NodeType::Text, None);
        let a = graph.add_node(NodeType::AiChat, None);
        let c = graph.add_connection(&t, &a, Port::Output, Port::Input).unwrap();
        graph.select_node(&t, true);
        graph.select_node(&a, true);
        graph.select_connection(&c, false);

        graph.remove_node(&t);
        assert!(!graph.selection().contains_node(&t));
        assert!(graph.selection().contains_node(&a));
        assert!(!graph.selection().contains_connection(&c));
    }

    #[test]
    fn test_select_unknown_is_ignored() {
        let mut graph = Graph::new();
        graph.select_node(&NodeId::from("ghost"), false);
        assert!(graph.selection().is_empty());
    }

    #[test]
    fn test_connected_nodes_are_upstream_sources() {
        let mut graph = Graph::new();
        let t = graph.add_node(NodeType::Text, None);
        let n = graph.add_node(NodeType::Note, None);
        let a = graph.add_node(NodeType::AiChat, None);
        let b = graph.add_node(NodeType::AiChat, None);
        graph.add_connection(&t, &a, Port::Output, Port::Input);
        graph.add_connection(&n, &a, Port::Output, Port::Input);
        graph.add_connection(&t, &b, Port::Output, Port::Input);

        let mut upstream: Vec<&NodeId> = graph.connected_nodes(&a).iter().map(|n| &n.id).collect();
        upstream.sort();
        let mut expected = vec![&t, &n];
        expected.sort();
        assert_eq!(upstream, expected);
        assert!(graph.connected_nodes(&t).is_empty());

        let first: Vec<NodeId> = graph.connected_nodes(&a).iter().map(|n| n.id.clone()).collect();
        let second: Vec<NodeId> = graph.connected_nodes(&a).iter().map(|n| n.id.clone()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_stats() {
        let mut graph = Graph::new();
        let t = graph.add_node(NodeType::Text, None);
        graph.add_node(NodeType::Text, None);
        let a = graph.add_node(NodeType::AiChat, None);
        graph.add_connection(&t, &a, Port::Output, Port::Input);

        let stats = graph.stats();
        assert_eq!(stats.node_count, 3);
        assert_eq!(stats.connection_count, 1);
        assert_eq!(stats.count(NodeType::Text), 2);
        assert_eq!(stats.count(NodeType::AiChat), 1);
        assert_eq!(stats.count(NodeType::Note), 0);
    }

    #[test]
    fn test_remove_selected_and_clear_all() {
        let mut graph = Graph::new();
        let t = graph.add_node(NodeType::Text, None);
        let a = graph.add_node(NodeType::AiChat, None);
        graph.add_connection(&t, &a, Port::Output, Port::Input);
        graph.select_node(&t, false);
        graph.remove_selected();
        assert!(graph.node(&t).is_none());
        assert_eq!(chat_count(&graph, &a), 0);

        graph.set_viewport(Viewport::new(4.0, 4.0, 2.0));
        graph.clear_all();
        assert_eq!(graph, Graph::default());
    }

    #[test]
    fn test_set_viewport_clamps_zoom() {
        let mut graph = Graph::new();
        graph.set_viewport(Viewport {
            x: 12.0,
            y: -3.0,
            zoom: 0.0,
        });
        assert_eq!(graph.viewport(), Viewport::new(12.0, -3.0, 0.1));

        graph.set_viewport(Viewport {
            x: 0.0,
            y: 0.0,
            zoom: 40.0,
        });
        assert_eq!(graph.viewport().zoom, 3.0);
    }

    proptest! {
        #[test]
        fn prop_connected_counts_track_connections(
            ops in prop::collection::vec((0usize..6, 0usize..6, any::<bool>()), 1..40)
        ) {
            let mut graph = Graph::new();
            let ids: Vec<NodeId> = (0..6)
                .map(|i| {
                    let ty = if i % 2 == 0 { NodeType::Text } else { NodeType::AiChat };
                    graph.add_node(ty, Some(Position::ORIGIN))
                })
                .collect();

            for (from, to, remove) in ops {
                if remove {
                    let victim = graph.connections().keys().next().cloned();
                    if let Some(victim) = victim {
                        graph.remove_connection(&victim);
                    }
                } else {
                    let created = graph.add_connection(&ids[from], &ids[to], Port::Output, Port::Input);
                    prop_assert_eq!(created.is_none(), from == to);
                }
                assert_counts_consistent(&graph);
            }
        }

        #[test]
        fn prop_remove_node_drops_touching_connections(
            edges in prop::collection::vec((0usize..5, 0usize..5), 0..20),
            victim in 0usize..5
        ) {
            let mut graph = Graph::new();
            let ids: Vec<NodeId> = (0..5)
                .map(|_| graph.add_node(NodeType::AiChat, Some(Position::ORIGIN)))
                .collect();
            for (from, to) in edges {
                graph.add_connection(&ids[from], &ids[to], Port::Output, Port::Input);
            }

            graph.remove_node(&ids[victim]);
            prop_assert!(graph.connections().values().all(|c| !c.touches(&ids[victim])));
            assert_counts_consistent(&graph);
        }
    }
}
