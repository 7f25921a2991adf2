use std::collections::HashSet;
use std::hash::Hash;

use crate::node::{ConnectionId, NodeId};

/// Currently selected nodes and connections. Never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    nodes: HashSet<NodeId>,
    connections: HashSet<ConnectionId>,
}

impl Selection {
    pub fn nodes(&self) -> &HashSet<NodeId> {
        &self.nodes
    }

    pub fn connections(&self) -> &HashSet<ConnectionId> {
        &self.connections
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.connections.is_empty()
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.nodes.contains(id)
    }

    pub fn contains_connection(&self, id: &ConnectionId) -> bool {
        self.connections.contains(id)
    }

    /// Plain click replaces the node selection with `id`; multi-select
    /// toggles `id` in the existing set.
    pub fn select_node(&mut self, id: NodeId, multi: bool) {
        toggle(&mut self.nodes, id, multi);
    }

    pub fn select_connection(&mut self, id: ConnectionId, multi: bool) {
        toggle(&mut self.connections, id, multi);
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.connections.clear();
    }

    pub(crate) fn forget_node(&mut self, id: &NodeId) {
        self.nodes.remove(id);
    }

    pub(crate) fn forget_connection(&mut self, id: &ConnectionId) {
        self.connections.remove(id);
    }
}

fn toggle<T: Eq + Hash>(set: &mut HashSet<T>, id: T, multi: bool) {
    if !multi {
        set.clear();
        set.insert(id);
        return;
    }
    if !set.remove(&id) {
        set.insert(id);
    }
}
