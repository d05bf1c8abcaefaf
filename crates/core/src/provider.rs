//! Provider trait: the abstraction over the language-model backend.
//!
//! A Provider knows how to send a conversation to the backend and get a
//! response back, either as a complete message or as a stream of typed
//! events, and how to count the tokens a payload would consume.

use crate::error::ProviderError;
use crate::message::{Message, MessageToolCall};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "claude-sonnet-4-20250514")
    pub model: String,

    /// The conversation messages. System messages are lifted into the
    /// backend's system field by the provider.
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Capabilities the model can invoke
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,

    /// Stop sequences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

fn default_temperature() -> f32 {
    0.7
}

impl ProviderRequest {
    /// A request with default sampling parameters and no tools.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: default_temperature(),
            max_tokens: None,
            tools: Vec::new(),
            stream: false,
            stop: Vec::new(),
        }
    }
}

/// A capability declaration sent to the backend so it knows what it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The capability name
    pub name: String,

    /// Description of what the capability does
    pub description: String,

    /// JSON Schema describing the capability's parameters
    pub parameters: serde_json::Value,
}

/// A complete (non-streaming) response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated message
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,

    /// Why generation stopped ("end_turn", "tool_use", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Add another usage report into this one.
    pub fn accumulate(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Who executes a capability invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationOrigin {
    /// The caller must execute it and send the result back.
    Client,
    /// Already resolved by the backend; nothing for the caller to do.
    Backend,
}

/// One event of a streaming generation round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Visible text
    TextDelta { text: String },

    /// Hidden reasoning trace; never surfaced to the end user
    ReasoningDelta { text: String },

    /// A capability invocation begins at content index `index`
    InvocationStart {
        index: usize,
        id: String,
        name: String,
        origin: InvocationOrigin,
    },

    /// A raw JSON fragment of the invocation's input
    InvocationInputDelta { index: usize, fragment: String },

    /// The invocation at `index` is complete
    InvocationStop { index: usize },

    /// Token usage (may arrive more than once; later reports are cumulative)
    Usage { usage: Usage },

    /// Final event of the round
    Done {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stop_reason: Option<String>,
    },
}

/// Receiving half of a streaming generation round.
pub type EventStream = tokio::sync::mpsc::Receiver<std::result::Result<StreamEvent, ProviderError>>;

/// The core Provider trait.
///
/// The orchestrator and the delegate gateway call `stream()`/`complete()`
/// without knowing which backend is being used.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Send a request and get a stream of typed events.
    ///
    /// Default implementation calls `complete()` and replays the result as
    /// one text delta, one start/input/stop triple per tool call, usage and done.
    async fn stream(&self, request: ProviderRequest) -> std::result::Result<EventStream, ProviderError> {
        let response = self.complete(request).await?;
        let events = replay_response(response);
        let (tx, rx) = tokio::sync::mpsc::channel(events.len().max(1));
        for event in events {
            let _ = tx.send(Ok(event)).await;
        }
        Ok(rx)
    }

    /// Count the input tokens a request would consume.
    ///
    /// Default implementation reports that counting is unsupported, which
    /// callers treat as a signal to fall back to a heuristic.
    async fn count_tokens(&self, _request: &ProviderRequest) -> std::result::Result<u32, ProviderError> {
        Err(ProviderError::NotConfigured(format!(
            "Provider '{}' does not support token counting",
            self.name()
        )))
    }

    /// Health check: can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

/// Convert a complete response into the equivalent event sequence.
pub fn replay_response(response: ProviderResponse) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    if !response.message.content.is_empty() {
        events.push(StreamEvent::TextDelta {
            text: response.message.content,
        });
    }
    for (index, call) in response.message.tool_calls.into_iter().enumerate() {
        let MessageToolCall { id, name, arguments } = call;
        events.push(StreamEvent::InvocationStart {
            index,
            id,
            name,
            origin: InvocationOrigin::Client,
        });
        events.push(StreamEvent::InvocationInputDelta {
            index,
            fragment: arguments.to_string(),
        });
        events.push(StreamEvent::InvocationStop { index });
    }
    if let Some(usage) = response.usage {
        events.push(StreamEvent::Usage { usage });
    }
    events.push(StreamEvent::Done {
        stop_reason: response.stop_reason,
    });
    events
}
