//! SummaryStore trait: persisted rolling summaries of channel segments.
//!
//! Windows are written by an external summarization process and are
//! read-only to the context assembler. `(channel_id, window_number)` is
//! unique; writes for an existing pair update it in place.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A file referenced by the messages a window summarizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub name: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// A persisted rolling summary of a channel segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationWindow {
    pub channel_id: String,

    /// 1-based, unique per channel
    pub window_number: u32,

    pub summary: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_descriptors: Vec<FileDescriptor>,

    /// The last message covered by this summary; history resumes strictly after it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Arguments of a create-or-update write.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowUpdate {
    pub channel_id: String,
    pub window_number: u32,
    pub summary: String,
    pub file_descriptors: Vec<FileDescriptor>,
    pub last_message_id: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Backend name ("sqlite", "in_memory").
    fn name(&self) -> &str;

    /// The window with the highest number for a channel.
    async fn latest_by_channel(&self, channel_id: &str) -> std::result::Result<Option<ConversationWindow>, StoreError>;

    /// All windows for a channel, ordered by window number.
    async fn list_by_channel(&self, channel_id: &str) -> std::result::Result<Vec<ConversationWindow>, StoreError>;

    /// Insert a window, or update the existing one with the same number.
    async fn create_or_update(&self, update: WindowUpdate) -> std::result::Result<ConversationWindow, StoreError>;

    /// The number the next window for this channel should get.
    ///
    /// This is a read followed by a separate write by the caller; two
    /// concurrent writers for one channel can both observe the same value.
    async fn next_window_number(&self, channel_id: &str) -> std::result::Result<u32, StoreError> {
        Ok(self
            .latest_by_channel(channel_id)
            .await?
            .map(|w| w.window_number + 1)
            .unwrap_or(1))
    }
}
