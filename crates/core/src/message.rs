//! Message domain types.
//!
//! These are the value objects sent to the language-model backend:
//! Transport history → ContextAssembler converts it → Orchestrator extends it
//! with invocation echoes and results → Provider serializes it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user (also carries capability results back to the backend)
    User,
    /// The AI assistant
    Assistant,
    /// System instructions (preamble, summary prefix)
    System,
}

/// A non-text block attached to a message: a reference document, an image,
/// or the extracted text of a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        media_type: String,
        /// Base64-encoded bytes
        data: String,
    },
    Document {
        media_type: String,
        /// Base64-encoded bytes
        data: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

impl ContentBlock {
    /// Approximate size in characters, used by the heuristic token estimate.
    pub fn char_len(&self) -> usize {
        match self {
            Self::Text { text } => text.len(),
            Self::Image { data, .. } | Self::Document { data, .. } => data.len(),
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Self::Image { .. })
    }

    pub fn is_document(&self) -> bool {
        matches!(self, Self::Document { .. })
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Documents and images sent alongside the text
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<ContentBlock>,

    /// Capability invocations requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// Capability results carried back to the backend (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<MessageToolResult>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// Optional metadata (author, source message id, etc.)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    fn with_role(role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            attachments: Vec::new(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            timestamp: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content.into())
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content.into())
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content.into())
    }

    /// Create an assistant turn that echoes the given invocations.
    pub fn assistant_with_calls(content: impl Into<String>, calls: Vec<MessageToolCall>) -> Self {
        let mut msg = Self::assistant(content);
        msg.tool_calls = calls;
        msg
    }

    /// Create one user turn carrying every capability result of a round.
    pub fn tool_results(results: Vec<MessageToolResult>) -> Self {
        let mut msg = Self::user(String::new());
        msg.tool_results = results;
        msg
    }

    /// Attach content blocks to this message.
    pub fn with_attachments(mut self, attachments: Vec<ContentBlock>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Characters contributed to the payload, used by heuristic estimates.
    pub fn char_len(&self) -> usize {
        let calls: usize = self
            .tool_calls
            .iter()
            .map(|c| c.name.len() + c.arguments.to_string().len())
            .sum();
        let results: usize = self.tool_results.iter().map(|r| r.content.len()).sum();
        let blocks: usize = self.attachments.iter().map(ContentBlock::char_len).sum();
        self.content.len() + calls + results + blocks
    }
}

/// A capability invocation embedded in an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Unique ID for this invocation
    pub id: String,

    /// Name of the capability to invoke
    pub name: String,

    /// Arguments as a JSON object
    pub arguments: serde_json::Value,
}

/// The result of one capability invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageToolResult {
    /// The invocation this result answers
    pub tool_call_id: String,

    /// Result text (or error text)
    pub content: String,

    #[serde(default)]
    pub is_error: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, agent!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello, agent!");
        assert!(msg.tool_calls.is_empty());
        assert!(msg.tool_results.is_empty());
    }

    #[test]
    fn tool_results_form_a_single_user_turn() {
        let msg = Message::tool_results(vec![
            MessageToolResult {
                tool_call_id: "a".into(),
                content: "one".into(),
                is_error: false,
            },
            MessageToolResult {
                tool_call_id: "b".into(),
                content: "Error: boom".into(),
                is_error: true,
            },
        ]);
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.tool_results.len(), 2);
        assert!(msg.content.is_empty());
    }

    #[test]
    fn content_block_serializes_with_type_tag() {
        let block = ContentBlock::Image {
            media_type: "image/png".into(),
            data: "aGVsbG8=".into(),
        };
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "image");
        assert_eq!(json["media_type"], "image/png");
    }

    #[test]
    fn char_len_counts_calls_and_blocks() {
        let msg = Message::assistant_with_calls(
            "hi",
            vec![MessageToolCall {
                id: "1".into(),
                name: "abc".into(),
                arguments: serde_json::json!({}),
            }],
        )
        .with_attachments(vec![ContentBlock::Text { text: "12345".into() }]);
        // "hi" + "abc" + "{}" + "12345"
        assert_eq!(msg.char_len(), 2 + 3 + 2 + 5);
    }
}
