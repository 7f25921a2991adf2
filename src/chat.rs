//! Chat turns on AI chat nodes.
//!
//! A send is split so the graph is never borrowed across the network
//! call. [`ChatDispatcher::begin`] records the user message and snapshots
//! what the request needs. A [`ChatJob`] then builds the request and calls
//! the provider while owning only that snapshot. [`ChatDispatcher::complete`]
//! applies the reply only if the node still exists.

use chrono::{DateTime, Utc};
use log::{debug, error};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::Settings;
use crate::context::{self, ContextSource};
use crate::error::{CanvasError, ProviderError, Result};
use crate::graph::Graph;
use crate::node::{ChatMessage, NodeId, NodeUpdate, Role};
use crate::provider::{ChatOptions, ChatProvider, PromptMessage};
use crate::storage::Storage;

/// Everything a request needs, captured when the send began.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingChat {
    pub node_id: NodeId,
    pub sources: Vec<ContextSource>,
    /// User and assistant turns, oldest first, ending with the new message.
    pub history: Vec<PromptMessage>,
}

/// The network half of a send. Owns everything it touches, so it can be
/// awaited or spawned while the canvas keeps taking messages.
pub struct ChatJob {
    pending: PendingChat,
    storage: Arc<dyn Storage>,
    provider: Arc<dyn ChatProvider>,
    settings: Settings,
}

/// Outcome of a [`ChatJob`], handed back to the canvas.
#[derive(Debug)]
pub struct ChatReply {
    pub node_id: NodeId,
    pub reply: std::result::Result<String, ProviderError>,
}

impl ChatJob {
    pub fn new(
        pending: PendingChat,
        storage: Arc<dyn Storage>,
        provider: Arc<dyn ChatProvider>,
        settings: Settings,
    ) -> Self {
        Self {
            pending,
            storage,
            provider,
            settings,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.pending.node_id
    }

    pub async fn run(self) -> ChatReply {
        let messages = build_request(self.storage.as_ref(), &self.pending, &self.settings).await;
        let reply = self
            .provider
            .chat(&messages, ChatOptions::from(&self.settings))
            .await;
        ChatReply {
            node_id: self.pending.node_id,
            reply,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatExport {
    pub timestamp: DateTime<Utc>,
    pub messages: Vec<ChatMessage>,
    pub message_count: usize,
    pub connected_count: usize,
}

/// Tracks which chat nodes have a request in flight.
#[derive(Debug, Clone, Default)]
pub struct ChatDispatcher {
    in_flight: HashSet<NodeId>,
}

impl ChatDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self, node_id: &NodeId) -> bool {
        self.in_flight.contains(node_id)
    }

    /// Append the user's message and mark the node busy.
    pub fn begin(&mut self, graph: &mut Graph, node_id: &NodeId, text: &str) -> Result<PendingChat> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CanvasError::EmptyMessage);
        }
        let node = graph
            .node(node_id)
            .ok_or_else(|| CanvasError::NodeNotFound(node_id.clone()))?;
        let chat = node
            .as_chat()
            .ok_or_else(|| CanvasError::NotAChatNode(node_id.clone()))?;
        if self.is_busy(node_id) {
            return Err(CanvasError::ChatBusy(node_id.clone()));
        }

        let mut messages = chat.messages.clone();
        messages.push(ChatMessage::now(Role::User, text));
        let history = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| PromptMessage::new(m.role, m.content.clone()))
            .collect();
        let sources = graph
            .connected_nodes(node_id)
            .into_iter()
            .filter_map(ContextSource::from_node)
            .collect();

        graph.update_node(node_id, NodeUpdate::messages(messages));
        self.in_flight.insert(node_id.clone());
        debug!("chat {} sending", node_id);
        Ok(PendingChat {
            node_id: node_id.clone(),
            sources,
            history,
        })
    }

    /// Record the provider's answer, or the failure as a system message.
    /// Returns `false` when the node was removed in the meantime.
    pub fn complete(
        &mut self,
        graph: &mut Graph,
        node_id: &NodeId,
        reply: std::result::Result<String, ProviderError>,
    ) -> bool {
        self.in_flight.remove(node_id);

        let Some(chat) = graph.node(node_id).and_then(|n| n.as_chat()) else {
            debug!("chat {} gone; discarding reply", node_id);
            return false;
        };
        let message = match reply {
            Ok(text) => ChatMessage::now(Role::Assistant, text),
            Err(e) => {
                error!("chat {} failed: {}", node_id, e);
                ChatMessage::now(Role::System, format!("Error: {}", e))
            }
        };
        let mut messages = chat.messages.clone();
        messages.push(message);
        graph.update_node(node_id, NodeUpdate::messages(messages))
    }
}

/// System prompt with the gathered context, followed by the history.
pub async fn build_request(
    storage: &dyn Storage,
    pending: &PendingChat,
    settings: &Settings,
) -> Vec<PromptMessage> {
    let context = context::build_context(storage, &pending.sources, settings.context_limit).await;
    let mut system = settings.system_prompt.clone();
    if !context.is_empty() {
        system.push_str("\n\nContext from connected notes:\n");
        system.push_str(&context);
    }

    let mut messages = Vec::with_capacity(pending.history.len() + 1);
    messages.push(PromptMessage::new(Role::System, system));
    messages.extend(pending.history.iter().cloned());
    messages
}

pub fn clear_chat(graph: &mut Graph, node_id: &NodeId) -> bool {
    if graph.node(node_id).and_then(|n| n.as_chat()).is_none() {
        return false;
    }
    graph.update_node(node_id, NodeUpdate::messages(Vec::new()))
}

pub fn export_chat(graph: &Graph, node_id: &NodeId) -> Option<ChatExport> {
    let chat = graph.node(node_id)?.as_chat()?;
    Some(ChatExport {
        timestamp: Utc::now(),
        messages: chat.messages.clone(),
        message_count: chat.messages.len(),
        connected_count: chat.connected_count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeType, Port, Position};
    use crate::storage::MemoryStorage;

    fn chat_graph() -> (Graph, NodeId, NodeId) {
        let mut graph = Graph::new();
        let text = graph.add_node(NodeType::Text, Some(Position::ORIGIN));
        let chat = graph.add_node(NodeType::AiChat, Some(Position::new(500.0, 0.0)));
        graph.update_node(&text, NodeUpdate::content("the sky is green"));
        graph.add_connection(&text, &chat, Port::Output, Port::Input);
        (graph, text, chat)
    }

    fn messages(graph: &Graph, id: &NodeId) -> Vec<(Role, String)> {
        graph
            .node(id)
            .unwrap()
            .as_chat()
            .unwrap()
            .messages
            .iter()
            .map(|m| (m.role, m.content.clone()))
            .collect()
    }

    #[test]
    fn test_begin_guards() {
        let (mut graph, text, chat) = chat_graph();
        let mut chats = ChatDispatcher::new();

        assert!(matches!(
            chats.begin(&mut graph, &chat, "   "),
            Err(CanvasError::EmptyMessage)
        ));
        assert!(matches!(
            chats.begin(&mut graph, &text, "hi"),
            Err(CanvasError::NotAChatNode(_))
        ));
        assert!(matches!(
            chats.begin(&mut graph, &NodeId::from("ghost"), "hi"),
            Err(CanvasError::NodeNotFound(_))
        ));

        let pending = chats.begin(&mut graph, &chat, "  hello ").unwrap();
        assert_eq!(pending.history, vec![PromptMessage::new(Role::User, "hello")]);
        assert_eq!(
            pending.sources,
            vec![ContextSource::Text("the sky is green".to_string())]
        );
        assert!(chats.is_busy(&chat));
        assert!(matches!(
            chats.begin(&mut graph, &chat, "again"),
            Err(CanvasError::ChatBusy(_))
        ));
        assert_eq!(messages(&graph, &chat), vec![(Role::User, "hello".to_string())]);
    }

    #[test]
    fn test_complete_appends_reply_or_error() {
        let (mut graph, _, chat) = chat_graph();
        let mut chats = ChatDispatcher::new();

        chats.begin(&mut graph, &chat, "one").unwrap();
        assert!(chats.complete(&mut graph, &chat, Ok("two".to_string())));
        assert!(!chats.is_busy(&chat));

        chats.begin(&mut graph, &chat, "three").unwrap();
        let failure = ProviderError::Api("boom".to_string());
        assert!(chats.complete(&mut graph, &chat, Err(failure)));

        assert_eq!(
            messages(&graph, &chat),
            vec![
                (Role::User, "one".to_string()),
                (Role::Assistant, "two".to_string()),
                (Role::User, "three".to_string()),
                (Role::System, "Error: boom".to_string()),
            ]
        );
    }

    #[test]
    fn test_history_skips_system_messages() {
        let (mut graph, _, chat) = chat_graph();
        let mut chats = ChatDispatcher::new();
        chats.begin(&mut graph, &chat, "one").unwrap();
        chats.complete(&mut graph, &chat, Err(ProviderError::Api("x".to_string())));

        let pending = chats.begin(&mut graph, &chat, "two").unwrap();
        let roles: Vec<Role> = pending.history.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::User]);
    }

    #[test]
    fn test_stale_completion_is_dropped() {
        let (mut graph, _, chat) = chat_graph();
        let mut chats = ChatDispatcher::new();
        chats.begin(&mut graph, &chat, "hi").unwrap();
        graph.remove_node(&chat);

        assert!(!chats.complete(&mut graph, &chat, Ok("late".to_string())));
        assert!(graph.node(&chat).is_none());
        assert!(!chats.is_busy(&chat));
    }

    #[tokio::test]
    async fn test_build_request_with_context() {
        let (mut graph, _, chat) = chat_graph();
        let mut chats = ChatDispatcher::new();
        let pending = chats.begin(&mut graph, &chat, "what colour?").unwrap();
        let settings = Settings {
            system_prompt: "sys".to_string(),
            ..Settings::default()
        };

        let request = build_request(&MemoryStorage::new(), &pending, &settings).await;
        assert_eq!(request.len(), 2);
        assert_eq!(request[0].role, Role::System);
        assert_eq!(
            request[0].content,
            "sys\n\nContext from connected notes:\n## Text Note 1\n\nthe sky is green"
        );
        assert_eq!(request[1], PromptMessage::new(Role::User, "what colour?"));
    }

    #[tokio::test]
    async fn test_build_request_without_context() {
        let mut graph = Graph::new();
        let chat = graph.add_node(NodeType::AiChat, None);
        let mut chats = ChatDispatcher::new();
        let pending = chats.begin(&mut graph, &chat, "hi").unwrap();

        let request = build_request(&MemoryStorage::new(), &pending, &Settings::default()).await;
        assert_eq!(request[0].content, Settings::default().system_prompt);
    }

    #[test]
    fn test_clear_and_export() {
        let (mut graph, text, chat) = chat_graph();
        let mut chats = ChatDispatcher::new();
        chats.begin(&mut graph, &chat, "hi").unwrap();
        chats.complete(&mut graph, &chat, Ok("hello".to_string()));

        let export = export_chat(&graph, &chat).unwrap();
        assert_eq!(export.message_count, 2);
        assert_eq!(export.connected_count, 1);
        let value = serde_json::to_value(&export).unwrap();
        assert_eq!(value["messageCount"], 2);
        assert!(export_chat(&graph, &text).is_none());

        assert!(clear_chat(&mut graph, &chat));
        assert!(messages(&graph, &chat).is_empty());
        assert!(!clear_chat(&mut graph, &text));
    }
}
