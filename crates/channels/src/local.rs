//! Local transport: an in-process chat platform.
//!
//! Channels, threads and messages live in memory. Message IDs are drawn from
//! one increasing counter, so numeric order is platform order, the same
//! property snowflake IDs give real platforms. Used by `threadwise chat` and
//! by tests that need a realistic history source.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use threadwise_core::channel::{Attachment, Author, ChannelInfo, ChatMessage, ChatTransport, FetchOptions};
use threadwise_core::error::TransportError;
use tokio::sync::RwLock;
use tracing::{debug, info};

struct LocalChannel {
    info: ChannelInfo,
    messages: Vec<ChatMessage>,
}

#[derive(Default)]
struct State {
    channels: BTreeMap<String, LocalChannel>,
    next_id: u64,
}

impl State {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }
}

pub struct LocalTransport {
    assistant: Author,
    state: RwLock<State>,
}

impl LocalTransport {
    pub fn new(assistant_name: impl Into<String>) -> Self {
        Self {
            assistant: Author::assistant("assistant", assistant_name),
            state: RwLock::new(State::default()),
        }
    }

    /// The author used for messages posted on the assistant's behalf.
    pub fn assistant(&self) -> &Author {
        &self.assistant
    }

    /// Register a top-level channel. Re-adding an existing ID is a no-op.
    pub async fn add_channel(&self, id: &str, name: &str) -> ChannelInfo {
        let mut state = self.state.write().await;
        state
            .channels
            .entry(id.to_string())
            .or_insert_with(|| LocalChannel {
                info: ChannelInfo {
                    id: id.to_string(),
                    name: name.to_string(),
                    parent_id: None,
                },
                messages: Vec::new(),
            })
            .info
            .clone()
    }

    /// Append a message to a channel or thread, timestamped now.
    pub async fn post(
        &self,
        channel_id: &str,
        author: Author,
        content: impl Into<String>,
        attachments: Vec<Attachment>,
    ) -> Result<ChatMessage, TransportError> {
        self.post_at(channel_id, author, content, attachments, Utc::now()).await
    }

    /// Append a message with an explicit timestamp.
    pub async fn post_at(
        &self,
        channel_id: &str,
        author: Author,
        content: impl Into<String>,
        attachments: Vec<Attachment>,
        created_at: DateTime<Utc>,
    ) -> Result<ChatMessage, TransportError> {
        let mut state = self.state.write().await;
        let id = state.next_id();
        let channel = state
            .channels
            .get_mut(channel_id)
            .ok_or_else(|| TransportError::ChannelNotFound(channel_id.to_string()))?;

        let message = ChatMessage {
            id,
            author,
            content: content.into(),
            created_at,
            attachments,
        };
        channel.messages.push(message.clone());
        Ok(message)
    }

    /// Number of messages in a channel or thread.
    pub async fn message_count(&self, channel_id: &str) -> usize {
        self.state
            .read()
            .await
            .channels
            .get(channel_id)
            .map(|c| c.messages.len())
            .unwrap_or(0)
    }

    fn parse_bound(channel_id: &str, bound: Option<&str>) -> Result<Option<u64>, TransportError> {
        bound
            .map(|id| {
                id.parse::<u64>().map_err(|_| TransportError::RequestFailed {
                    channel: channel_id.to_string(),
                    reason: format!("invalid message id '{id}'"),
                })
            })
            .transpose()
    }
}

#[async_trait]
impl ChatTransport for LocalTransport {
    fn name(&self) -> &str {
        "local"
    }

    async fn fetch_messages(&self, channel_id: &str, options: FetchOptions) -> Result<Vec<ChatMessage>, TransportError> {
        let after = Self::parse_bound(channel_id, options.after.as_deref())?;
        let before = Self::parse_bound(channel_id, options.before.as_deref())?;

        let state = self.state.read().await;
        let channel = state
            .channels
            .get(channel_id)
            .ok_or_else(|| TransportError::ChannelNotFound(channel_id.to_string()))?;

        let in_bounds: Vec<&ChatMessage> = channel
            .messages
            .iter()
            .filter(|m| {
                let id = m.id.parse::<u64>().unwrap_or(0);
                after.is_none_or(|a| id > a) && before.is_none_or(|b| id < b)
            })
            .collect();

        // Newest `limit` within bounds, returned oldest first
        let skip = in_bounds.len().saturating_sub(options.limit);
        let page: Vec<ChatMessage> = in_bounds.into_iter().skip(skip).cloned().collect();

        debug!(
            channel_id,
            limit = options.limit,
            returned = page.len(),
            "Local fetch"
        );
        Ok(page)
    }

    async fn describe_channel(&self, channel_id: &str) -> Result<ChannelInfo, TransportError> {
        self.state
            .read()
            .await
            .channels
            .get(channel_id)
            .map(|c| c.info.clone())
            .ok_or_else(|| TransportError::ChannelNotFound(channel_id.to_string()))
    }

    async fn list_threads(&self, channel_id: &str) -> Result<Vec<ChannelInfo>, TransportError> {
        let state = self.state.read().await;
        if !state.channels.contains_key(channel_id) {
            return Err(TransportError::ChannelNotFound(channel_id.to_string()));
        }
        Ok(state
            .channels
            .values()
            .filter(|c| c.info.parent_id.as_deref() == Some(channel_id))
            .map(|c| c.info.clone())
            .collect())
    }

    async fn create_thread(
        &self,
        channel_id: &str,
        name: &str,
        opening_message: Option<&str>,
    ) -> Result<ChannelInfo, TransportError> {
        let mut state = self.state.write().await;
        if !state.channels.contains_key(channel_id) {
            return Err(TransportError::ChannelNotFound(channel_id.to_string()));
        }

        let thread_id = format!("thread-{}", state.next_id());
        let info = ChannelInfo {
            id: thread_id.clone(),
            name: name.to_string(),
            parent_id: Some(channel_id.to_string()),
        };

        let mut messages = Vec::new();
        if let Some(text) = opening_message {
            messages.push(ChatMessage {
                id: state.next_id(),
                author: self.assistant.clone(),
                content: text.to_string(),
                created_at: Utc::now(),
                attachments: Vec::new(),
            });
        }

        state.channels.insert(
            thread_id.clone(),
            LocalChannel {
                info: info.clone(),
                messages,
            },
        );
        info!(channel_id, thread_id = %thread_id, name, "Thread created");
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded(count: usize) -> LocalTransport {
        let transport = LocalTransport::new("Threadwise");
        transport.add_channel("general", "general").await;
        for i in 0..count {
            transport
                .post("general", Author::user("u1", "Ada"), format!("message {i}"), vec![])
                .await
                .unwrap();
        }
        transport
    }

    fn contents(messages: &[ChatMessage]) -> Vec<String> {
        messages.iter().map(|m| m.content.clone()).collect()
    }

    #[tokio::test]
    async fn fetch_returns_newest_oldest_first() {
        let transport = seeded(5).await;
        let page = transport.fetch_messages("general", FetchOptions::latest(3)).await.unwrap();
        assert_eq!(contents(&page), vec!["message 2", "message 3", "message 4"]);
    }

    #[tokio::test]
    async fn fetch_after_is_exclusive() {
        let transport = seeded(5).await;
        let all = transport.fetch_messages("general", FetchOptions::latest(100)).await.unwrap();
        let boundary = all[1].id.clone();

        let page = transport
            .fetch_messages("general", FetchOptions::latest(100).after(Some(boundary)))
            .await
            .unwrap();
        assert_eq!(contents(&page), vec!["message 2", "message 3", "message 4"]);
    }

    #[tokio::test]
    async fn fetch_before_pages_backwards() {
        let transport = seeded(5).await;
        let newest = transport.fetch_messages("general", FetchOptions::latest(2)).await.unwrap();
        let older = transport
            .fetch_messages("general", FetchOptions::latest(2).before(Some(newest[0].id.clone())))
            .await
            .unwrap();
        assert_eq!(contents(&older), vec!["message 1", "message 2"]);
    }

    #[tokio::test]
    async fn unknown_channel_is_an_error() {
        let transport = seeded(0).await;
        let err = transport.fetch_messages("nope", FetchOptions::latest(10)).await.unwrap_err();
        assert!(matches!(err, TransportError::ChannelNotFound(_)));
    }

    #[tokio::test]
    async fn invalid_bound_is_an_error() {
        let transport = seeded(1).await;
        let err = transport
            .fetch_messages("general", FetchOptions::latest(10).after(Some("abc".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::RequestFailed { .. }));
    }

    #[tokio::test]
    async fn threads_are_listed_under_parent() {
        let transport = seeded(0).await;
        let thread = transport
            .create_thread("general", "release-plan", Some("Let's plan the release"))
            .await
            .unwrap();

        assert_eq!(thread.parent_id.as_deref(), Some("general"));
        let threads = transport.list_threads("general").await.unwrap();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].name, "release-plan");

        let history = transport.fetch_messages(&thread.id, FetchOptions::latest(10)).await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].author.is_self);
        assert_eq!(transport.describe_channel(&thread.id).await.unwrap().name, "release-plan");
    }

    #[tokio::test]
    async fn create_thread_in_unknown_channel_fails() {
        let transport = seeded(0).await;
        assert!(transport.create_thread("missing", "t", None).await.is_err());
    }
}
