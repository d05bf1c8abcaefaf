//! ChatTransport trait: the abstraction over the chat platform.
//!
//! The transport owns the connection to the platform. This crate only needs
//! read access to channel history plus the two thread operations that
//! capabilities expose to the backend.

use crate::error::TransportError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The author of a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Platform user ID
    pub id: String,

    /// Display name
    pub name: String,

    /// Whether the author is this assistant
    #[serde(default)]
    pub is_self: bool,
}

impl Author {
    pub fn user(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_self: false,
        }
    }

    pub fn assistant(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_self: true,
        }
    }
}

/// A file attached to a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Filename as uploaded
    pub name: String,

    /// File size in bytes
    pub size: u64,

    /// Download URL
    pub url: String,

    /// MIME type reported by the platform
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl Attachment {
    /// Identity used for deduplication: the same file re-posted has the
    /// same name and size even when the URL differs.
    pub fn dedup_key(&self) -> (String, u64) {
        (self.name.clone(), self.size)
    }
}

/// A message as stored by the chat platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Platform message ID
    pub id: String,

    pub author: Author,

    pub content: String,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

/// Paging options for a history fetch.
///
/// `after` and `before` are exclusive message-id bounds. The transport
/// returns the newest `limit` messages inside the bounds, ordered
/// oldest → newest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    pub limit: usize,
    pub after: Option<String>,
    pub before: Option<String>,
}

impl FetchOptions {
    pub fn latest(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    pub fn after(mut self, message_id: Option<String>) -> Self {
        self.after = message_id;
        self
    }

    pub fn before(mut self, message_id: Option<String>) -> Self {
        self.before = message_id;
        self
    }
}

/// Basic information about a channel or thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,

    /// The channel a thread was created in, if this is a thread
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

/// The core ChatTransport trait.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Human-readable transport name (e.g., "local", "discord").
    fn name(&self) -> &str;

    /// Fetch a page of history for a channel or thread.
    async fn fetch_messages(
        &self,
        channel_id: &str,
        options: FetchOptions,
    ) -> std::result::Result<Vec<ChatMessage>, TransportError>;

    /// Look up a channel or thread by ID.
    async fn describe_channel(&self, channel_id: &str) -> std::result::Result<ChannelInfo, TransportError>;

    /// List the threads that belong to a channel.
    async fn list_threads(&self, channel_id: &str) -> std::result::Result<Vec<ChannelInfo>, TransportError>;

    /// Create a thread in a channel, optionally posting an opening message.
    async fn create_thread(
        &self,
        channel_id: &str,
        name: &str,
        opening_message: Option<&str>,
    ) -> std::result::Result<ChannelInfo, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_options_builder() {
        let opts = FetchOptions::latest(25).after(Some("100".into()));
        assert_eq!(opts.limit, 25);
        assert_eq!(opts.after.as_deref(), Some("100"));
        assert!(opts.before.is_none());
    }

    #[test]
    fn dedup_key_ignores_url() {
        let a = Attachment {
            name: "report.pdf".into(),
            size: 2048,
            url: "https://cdn.example.com/1/report.pdf".into(),
            mime_type: Some("application/pdf".into()),
        };
        let b = Attachment {
            url: "https://cdn.example.com/2/report.pdf".into(),
            ..a.clone()
        };
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn attachment_serialization() {
        let attachment = Attachment {
            name: "photo.jpg".into(),
            size: 102400,
            url: "https://example.com/photo.jpg".into(),
            mime_type: Some("image/jpeg".into()),
        };
        let json = serde_json::to_string(&attachment).unwrap();
        assert!(json.contains("image/jpeg"));
    }
}
