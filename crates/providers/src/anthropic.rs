//! Anthropic native provider implementation.
//!
//! Uses Anthropic's Messages API directly.
//!
//! Features:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//! - Native tool use with `tool_use` / `tool_result` content blocks
//! - Image and PDF document blocks
//! - Streaming via SSE mapped onto typed [`StreamEvent`]s
//! - Exact input token counting via `/v1/messages/count_tokens`

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use threadwise_config::AppConfig;
use threadwise_core::error::ProviderError;
use threadwise_core::message::{self, Message, MessageToolCall, Role};
use threadwise_core::provider::*;
use tracing::{debug, trace, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    /// Budget tokens for extended thinking, when enabled.
    thinking_budget: Option<u32>,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider.
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
            thinking_budget: None,
        }
    }

    /// Build a provider from application config. Fails if no API key is set.
    pub fn from_config(config: &AppConfig) -> std::result::Result<Self, ProviderError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            ProviderError::NotConfigured(
                "No API key: set api_key in config.toml or THREADWISE_API_KEY / ANTHROPIC_API_KEY".into(),
            )
        })?;
        let mut provider = Self::new(api_key);
        if let Some(url) = &config.api_url {
            provider = provider.with_base_url(url.clone());
        }
        Ok(provider)
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Enable extended thinking. Thinking text arrives as reasoning deltas.
    pub fn with_extended_thinking(mut self, budget_tokens: u32) -> Self {
        self.thinking_budget = Some(budget_tokens);
        self
    }

    /// Extract system messages from the message list.
    /// Anthropic puts system prompt as a top-level field, not in messages.
    fn extract_system(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut non_system: Vec<&Message> = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => system_parts.push(&msg.content),
                _ => non_system.push(msg),
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };

        (system, non_system)
    }

    fn attachment_block(block: &message::ContentBlock) -> ApiBlock {
        match block {
            message::ContentBlock::Text { text } => ApiBlock::Text { text: text.clone() },
            message::ContentBlock::Image { media_type, data } => ApiBlock::Image {
                source: Base64Source::new(media_type, data),
            },
            message::ContentBlock::Document { media_type, data, name } => ApiBlock::Document {
                source: Base64Source::new(media_type, data),
                title: name.clone(),
            },
        }
    }

    /// Convert messages to Anthropic API format with content blocks.
    fn to_api_messages(messages: &[&Message]) -> Vec<AnthropicMessage> {
        let mut result = Vec::new();

        for msg in messages {
            match msg.role {
                Role::User => {
                    if msg.attachments.is_empty() && msg.tool_results.is_empty() {
                        result.push(AnthropicMessage {
                            role: "user".into(),
                            content: AnthropicContent::Text(msg.content.clone()),
                        });
                        continue;
                    }

                    // tool_result blocks must lead the user turn
                    let mut blocks: Vec<ApiBlock> = msg
                        .tool_results
                        .iter()
                        .map(|r| ApiBlock::ToolResult {
                            tool_use_id: r.tool_call_id.clone(),
                            content: r.content.clone(),
                            is_error: r.is_error,
                        })
                        .collect();
                    blocks.extend(msg.attachments.iter().map(Self::attachment_block));
                    if !msg.content.is_empty() {
                        blocks.push(ApiBlock::Text {
                            text: msg.content.clone(),
                        });
                    }
                    result.push(AnthropicMessage {
                        role: "user".into(),
                        content: AnthropicContent::Blocks(blocks),
                    });
                }
                Role::Assistant => {
                    if msg.tool_calls.is_empty() {
                        result.push(AnthropicMessage {
                            role: "assistant".into(),
                            content: AnthropicContent::Text(msg.content.clone()),
                        });
                    } else {
                        let mut blocks: Vec<ApiBlock> = Vec::new();
                        if !msg.content.is_empty() {
                            blocks.push(ApiBlock::Text {
                                text: msg.content.clone(),
                            });
                        }
                        for tc in &msg.tool_calls {
                            blocks.push(ApiBlock::ToolUse {
                                id: tc.id.clone(),
                                name: tc.name.clone(),
                                input: tc.arguments.clone(),
                            });
                        }
                        result.push(AnthropicMessage {
                            role: "assistant".into(),
                            content: AnthropicContent::Blocks(blocks),
                        });
                    }
                }
                Role::System => {} // handled separately
            }
        }

        result
    }

    /// Convert tool definitions to Anthropic format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<AnthropicTool> {
        tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters.clone(),
            })
            .collect()
    }

    fn build_body(&self, request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let (system, messages) = Self::extract_system(&request.messages);
        let api_messages = Self::to_api_messages(&messages);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": api_messages,
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": request.temperature,
        });

        if stream {
            body["stream"] = serde_json::json!(true);
        }
        if let Some(ref sys) = system {
            body["system"] = serde_json::json!(sys);
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }
        if !request.stop.is_empty() {
            body["stop_sequences"] = serde_json::json!(request.stop);
        }
        if let Some(budget) = self.thinking_budget {
            body["thinking"] = serde_json::json!({
                "type": "enabled",
                "budget_tokens": budget
            });
        }

        body
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> std::result::Result<reqwest::Response, ProviderError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            return Err(ProviderError::RateLimited { retry_after_secs });
        }
        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid Anthropic API key".into(),
            ));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Anthropic API error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        Ok(response)
    }

    /// Convert Anthropic API response to our ProviderResponse.
    fn response_to_provider_response(resp: AnthropicResponse) -> ProviderResponse {
        let mut text_content = String::new();
        let mut tool_calls = Vec::new();

        for block in resp.content {
            match block {
                ResponseContentBlock::Text { text } => {
                    if !text_content.is_empty() {
                        text_content.push('\n');
                    }
                    text_content.push_str(&text);
                }
                ResponseContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(MessageToolCall {
                        id,
                        name,
                        arguments: input,
                    });
                }
                ResponseContentBlock::Thinking { thinking } => {
                    trace!(thinking = %thinking, "Anthropic reasoning");
                }
                ResponseContentBlock::Other => {}
            }
        }

        let mut message = Message::assistant(text_content);
        message.id = resp.id;
        message.tool_calls = tool_calls;

        ProviderResponse {
            message,
            usage: Some(Usage::new(resp.usage.input_tokens, resp.usage.output_tokens)),
            model: resp.model,
            stop_reason: resp.stop_reason,
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError> {
        let body = self.build_body(&request, false);
        debug!(provider = "anthropic", model = %request.model, "Sending completion request");

        let response = self.post("/v1/messages", &body).await?;
        let api_resp: AnthropicResponse = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse Anthropic response: {e}"),
        })?;

        Ok(Self::response_to_provider_response(api_resp))
    }

    async fn stream(&self, request: ProviderRequest) -> std::result::Result<EventStream, ProviderError> {
        let body = self.build_body(&request, true);
        debug!(
            provider = "anthropic",
            model = %request.model,
            tools = request.tools.len(),
            "Sending streaming request"
        );

        let response = self.post("/v1/messages", &body).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(64);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut parser = SseParser::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(Err(ProviderError::StreamInterrupted(e.to_string()))).await;
                        return;
                    }
                };

                for item in parser.feed(&bytes) {
                    let finished = matches!(item, Ok(StreamEvent::Done { .. }) | Err(_));
                    if tx.send(item).await.is_err() || finished {
                        return;
                    }
                }
            }

            // Stream ended without message_stop
            let _ = tx.send(parser.finish()).await;
        });

        Ok(rx)
    }

    async fn count_tokens(&self, request: &ProviderRequest) -> std::result::Result<u32, ProviderError> {
        let (system, messages) = Self::extract_system(&request.messages);
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&messages),
        });
        if let Some(sys) = system {
            body["system"] = serde_json::json!(sys);
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        let response = self.post("/v1/messages/count_tokens", &body).await?;
        let counted: CountTokensResponse = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse token count: {e}"),
        })?;
        trace!(input_tokens = counted.input_tokens, "Counted tokens");
        Ok(counted.input_tokens)
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let body = serde_json::json!({
            "model": "claude-3-5-haiku-20241022",
            "messages": [{"role": "user", "content": "hi"}],
        });
        match self.post("/v1/messages/count_tokens", &body).await {
            Ok(_) => Ok(true),
            Err(ProviderError::AuthenticationFailed(_)) => Ok(false),
            // Reachable but unhappy (rate limit, 5xx) still counts as reachable
            Err(ProviderError::Network(e)) => Err(ProviderError::Network(e)),
            Err(_) => Ok(true),
        }
    }
}

/// Incremental decoder for Anthropic's SSE stream.
///
/// Chunks may split lines, and multi-byte characters, arbitrarily, so raw
/// bytes are buffered and only complete lines are decoded. Only `data:` lines are interpreted; the JSON payload
/// carries its own `type`.
#[derive(Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    /// Content indices that are invocation blocks
    invocation_blocks: HashSet<usize>,
    input_tokens: u32,
    stop_reason: Option<String>,
}

impl SseParser {
    /// Feed a chunk of the response body and collect complete events.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<std::result::Result<StreamEvent, ProviderError>> {
        self.buffer.extend_from_slice(chunk);
        let mut out = Vec::new();

        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data.is_empty() {
                continue;
            }

            match serde_json::from_str::<serde_json::Value>(data) {
                Ok(event) => out.extend(self.handle(&event)),
                Err(e) => trace!(error = %e, data = %data, "Ignoring unparseable Anthropic SSE"),
            }
        }

        out
    }

    /// Terminal event for a stream that closed without `message_stop`.
    pub fn finish(&mut self) -> std::result::Result<StreamEvent, ProviderError> {
        Ok(StreamEvent::Done {
            stop_reason: self.stop_reason.take(),
        })
    }

    fn handle(&mut self, event: &serde_json::Value) -> Vec<std::result::Result<StreamEvent, ProviderError>> {
        let index = event["index"].as_u64().unwrap_or(0) as usize;

        match event["type"].as_str().unwrap_or("") {
            "message_start" => {
                let usage = &event["message"]["usage"];
                self.input_tokens = usage["input_tokens"].as_u64().unwrap_or(0) as u32;
                let output = usage["output_tokens"].as_u64().unwrap_or(0) as u32;
                vec![Ok(StreamEvent::Usage {
                    usage: Usage::new(self.input_tokens, output),
                })]
            }
            "content_block_start" => {
                let block = &event["content_block"];
                let origin = match block["type"].as_str() {
                    Some("tool_use") => InvocationOrigin::Client,
                    Some("server_tool_use") => InvocationOrigin::Backend,
                    Some("text") => {
                        return match block["text"].as_str() {
                            Some(text) if !text.is_empty() => vec![Ok(StreamEvent::TextDelta { text: text.into() })],
                            _ => Vec::new(),
                        };
                    }
                    _ => return Vec::new(),
                };
                self.invocation_blocks.insert(index);
                vec![Ok(StreamEvent::InvocationStart {
                    index,
                    id: block["id"].as_str().unwrap_or_default().to_string(),
                    name: block["name"].as_str().unwrap_or_default().to_string(),
                    origin,
                })]
            }
            "content_block_delta" => {
                let delta = &event["delta"];
                let item = match delta["type"].as_str().unwrap_or("") {
                    "text_delta" => delta["text"].as_str().map(|t| StreamEvent::TextDelta { text: t.into() }),
                    "thinking_delta" => delta["thinking"]
                        .as_str()
                        .map(|t| StreamEvent::ReasoningDelta { text: t.into() }),
                    "input_json_delta" => delta["partial_json"].as_str().map(|f| StreamEvent::InvocationInputDelta {
                        index,
                        fragment: f.into(),
                    }),
                    _ => None,
                };
                item.into_iter().map(Ok).collect()
            }
            "content_block_stop" => {
                if self.invocation_blocks.remove(&index) {
                    vec![Ok(StreamEvent::InvocationStop { index })]
                } else {
                    Vec::new()
                }
            }
            "message_delta" => {
                if let Some(reason) = event["delta"]["stop_reason"].as_str() {
                    self.stop_reason = Some(reason.to_string());
                }
                match event["usage"]["output_tokens"].as_u64() {
                    Some(out) => {
                        let input = event["usage"]["input_tokens"]
                            .as_u64()
                            .map(|v| v as u32)
                            .unwrap_or(self.input_tokens);
                        vec![Ok(StreamEvent::Usage {
                            usage: Usage::new(input, out as u32),
                        })]
                    }
                    None => Vec::new(),
                }
            }
            "message_stop" => vec![self.finish()],
            "error" => {
                let kind = event["error"]["type"].as_str().unwrap_or("error");
                let message = event["error"]["message"].as_str().unwrap_or("unknown error").to_string();
                let err = match kind {
                    "overloaded_error" => ProviderError::ApiError {
                        status_code: 529,
                        message,
                    },
                    "rate_limit_error" => ProviderError::RateLimited { retry_after_secs: 5 },
                    _ => ProviderError::StreamInterrupted(format!("{kind}: {message}")),
                };
                vec![Err(err)]
            }
            _ => Vec::new(),
        }
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: AnthropicContent,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<ApiBlock>),
}

#[derive(Debug, Serialize, Deserialize)]
struct Base64Source {
    #[serde(rename = "type")]
    kind: String,
    media_type: String,
    data: String,
}

impl Base64Source {
    fn new(media_type: &str, data: &str) -> Self {
        Self {
            kind: "base64".into(),
            media_type: media_type.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum ApiBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image")]
    Image { source: Base64Source },
    #[serde(rename = "document")]
    Document {
        source: Base64Source,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    model: String,
    content: Vec<ResponseContentBlock>,
    usage: AnthropicUsage,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "thinking")]
    Thinking { thinking: String },
    /// Server tool blocks and anything newer than this client
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CountTokensResponse {
    input_tokens: u32,
}
