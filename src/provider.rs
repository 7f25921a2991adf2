//! Chat-completion backends.

use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::config::{ProviderKind, Settings};
use crate::error::ProviderError;
use crate::node::Role;

pub const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const ANTHROPIC_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Reply used when a provider answers without any text.
pub const EMPTY_REPLY: &str = "No response generated";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChatOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl From<&Settings> for ChatOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn chat(
        &self,
        messages: &[PromptMessage],
        options: ChatOptions,
    ) -> Result<String, ProviderError>;
}

/// Provider selected by the settings. Keys are checked per request so a
/// missing key surfaces in the chat instead of at startup.
pub fn provider_from_settings(settings: &Settings) -> Arc<dyn ChatProvider> {
    match settings.provider {
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(
            settings.openai_api_key.clone(),
            settings.openai_model.clone(),
        )),
        ProviderKind::Custom => Arc::new(OpenAiProvider::custom(
            settings.custom_endpoint.clone(),
            settings.custom_api_key.clone(),
            settings.openai_model.clone(),
        )),
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(
            settings.anthropic_api_key.clone(),
            settings.anthropic_model.clone(),
        )),
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
}

fn api_failure(label: &str, detail: &str) -> ProviderError {
    ProviderError::Api(format!("{} request failed: {}", label, detail))
}

fn non_empty(reply: Option<String>) -> String {
    reply
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| EMPTY_REPLY.to_string())
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    #[serde(default)]
    message: Option<OpenAiReply>,
}

#[derive(Debug, Deserialize)]
struct OpenAiReply {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI chat completions, or any endpoint speaking the same protocol.
pub struct OpenAiProvider {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    label: &'static str,
    requires_key: bool,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            endpoint: OPENAI_ENDPOINT.to_string(),
            api_key,
            model,
            label: "OpenAI",
            requires_key: true,
        }
    }

    /// Self-hosted endpoint. An empty key sends no authorization header.
    pub fn custom(endpoint: String, api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            api_key,
            model,
            label: "Custom",
            requires_key: false,
        }
    }

    fn request_body<'a>(
        &'a self,
        messages: &'a [PromptMessage],
        options: ChatOptions,
    ) -> OpenAiRequest<'a> {
        OpenAiRequest {
            model: &self.model,
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        }
    }
}

fn parse_openai_response(label: &str, success: bool, body: Value) -> Result<String, ProviderError> {
    let parsed: OpenAiResponse =
        serde_json::from_value(body).map_err(|e| api_failure(label, &e.to_string()))?;
    if let Some(err) = parsed.error {
        let detail = err.message.unwrap_or_else(|| format!("{} API error", label));
        return Err(api_failure(label, &detail));
    }
    if !success {
        return Err(api_failure(label, "unexpected response status"));
    }
    let reply = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content);
    Ok(non_empty(reply))
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    async fn chat(
        &self,
        messages: &[PromptMessage],
        options: ChatOptions,
    ) -> Result<String, ProviderError> {
        if self.endpoint.is_empty() {
            return Err(ProviderError::Api(format!(
                "{} endpoint not configured",
                self.label
            )));
        }
        if self.requires_key && self.api_key.is_empty() {
            return Err(ProviderError::MissingApiKey(self.label));
        }

        debug!("{} chat: {} messages to {}", self.label, messages.len(), self.endpoint);
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&self.request_body(messages, options));
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await?;
        let success = response.status().is_success();
        let body: Value = response.json().await?;
        parse_openai_response(self.label, success, body).inspect_err(|e| {
            error!("{} chat failed: {}", self.label, e);
        })
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: Vec<&'a PromptMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicBlock>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    #[serde(default)]
    text: Option<String>,
}

/// Anthropic messages API. The system prompt travels as its own field.
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    model: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
        }
    }

    fn request_body<'a>(
        &'a self,
        messages: &'a [PromptMessage],
        options: ChatOptions,
    ) -> AnthropicRequest<'a> {
        let system = messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        AnthropicRequest {
            model: &self.model,
            system,
            messages: messages.iter().filter(|m| m.role != Role::System).collect(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        }
    }
}

fn parse_anthropic_response(success: bool, body: Value) -> Result<String, ProviderError> {
    let parsed: AnthropicResponse =
        serde_json::from_value(body).map_err(|e| api_failure("Anthropic", &e.to_string()))?;
    if let Some(err) = parsed.error {
        let detail = err
            .message
            .unwrap_or_else(|| "Anthropic API error".to_string());
        return Err(api_failure("Anthropic", &detail));
    }
    if !success {
        return Err(api_failure("Anthropic", "unexpected response status"));
    }
    Ok(non_empty(parsed.content.into_iter().next().and_then(|b| b.text)))
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    async fn chat(
        &self,
        messages: &[PromptMessage],
        options: ChatOptions,
    ) -> Result<String, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::MissingApiKey("Anthropic"));
        }

        debug!("Anthropic chat: {} messages", messages.len());
        let response = self
            .client
            .post(ANTHROPIC_ENDPOINT)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.request_body(messages, options))
            .send()
            .await?;
        let success = response.status().is_success();
        let body: Value = response.json().await?;
        parse_anthropic_response(success, body).inspect_err(|e| {
            error!("Anthropic chat failed: {}", e);
        })
    }
}
