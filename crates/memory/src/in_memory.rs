//! In-memory summary store: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use threadwise_core::error::StoreError;
use threadwise_core::summary::{ConversationWindow, SummaryStore, WindowUpdate};
use tokio::sync::RwLock;

/// Windows keyed by `(channel_id, window_number)`; the BTreeMap keeps each
/// channel's windows in number order.
pub struct InMemorySummaryStore {
    windows: Arc<RwLock<BTreeMap<(String, u32), ConversationWindow>>>,
}

impl InMemorySummaryStore {
    pub fn new() -> Self {
        Self {
            windows: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

impl Default for InMemorySummaryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SummaryStore for InMemorySummaryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn latest_by_channel(&self, channel_id: &str) -> Result<Option<ConversationWindow>, StoreError> {
        let windows = self.windows.read().await;
        Ok(windows
            .values()
            .filter(|w| w.channel_id == channel_id)
            .max_by_key(|w| w.window_number)
            .cloned())
    }

    async fn list_by_channel(&self, channel_id: &str) -> Result<Vec<ConversationWindow>, StoreError> {
        let windows = self.windows.read().await;
        Ok(windows
            .values()
            .filter(|w| w.channel_id == channel_id)
            .cloned()
            .collect())
    }

    async fn create_or_update(&self, update: WindowUpdate) -> Result<ConversationWindow, StoreError> {
        let now = Utc::now();
        let mut windows = self.windows.write().await;
        let key = (update.channel_id.clone(), update.window_number);
        let created_at = windows.get(&key).map(|w| w.created_at).unwrap_or(now);

        let window = ConversationWindow {
            channel_id: update.channel_id,
            window_number: update.window_number,
            summary: update.summary,
            file_descriptors: update.file_descriptors,
            last_message_id: update.last_message_id,
            last_message_at: update.last_message_at,
            created_at,
            updated_at: now,
        };
        windows.insert(key, window.clone());
        Ok(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(channel: &str, number: u32, summary: &str) -> WindowUpdate {
        WindowUpdate {
            channel_id: channel.into(),
            window_number: number,
            summary: summary.into(),
            file_descriptors: vec![],
            last_message_id: None,
            last_message_at: None,
        }
    }

    #[tokio::test]
    async fn create_and_read_back() {
        let store = InMemorySummaryStore::new();
        store.create_or_update(update("c1", 1, "one")).await.unwrap();
        store.create_or_update(update("c1", 2, "two")).await.unwrap();

        let latest = store.latest_by_channel("c1").await.unwrap().unwrap();
        assert_eq!(latest.summary, "two");
        assert_eq!(store.next_window_number("c1").await.unwrap(), 3);
        assert!(store.latest_by_channel("c2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_keeps_created_at() {
        let store = InMemorySummaryStore::new();
        let first = store.create_or_update(update("c1", 1, "draft")).await.unwrap();
        let second = store.create_or_update(update("c1", 1, "final")).await.unwrap();
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(store.list_by_channel("c1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_orders_by_number() {
        let store = InMemorySummaryStore::new();
        for n in [10, 2, 7] {
            store.create_or_update(update("c1", n, "s")).await.unwrap();
        }
        let numbers: Vec<u32> = store
            .list_by_channel("c1")
            .await
            .unwrap()
            .into_iter()
            .map(|w| w.window_number)
            .collect();
        assert_eq!(numbers, vec![2, 7, 10]);
    }
}
