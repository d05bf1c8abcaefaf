//! CLI command implementations.

pub mod chat;
pub mod onboard;
pub mod status;
pub mod windows;

use std::sync::Arc;
use threadwise_config::AppConfig;
use threadwise_core::summary::SummaryStore;
use threadwise_memory::{InMemorySummaryStore, SqliteSummaryStore};

/// Open the summary store named by `[store] backend`.
pub(crate) async fn open_store(config: &AppConfig) -> Result<Arc<dyn SummaryStore>, Box<dyn std::error::Error>> {
    match config.store.backend.as_str() {
        "in_memory" => Ok(Arc::new(InMemorySummaryStore::new())),
        _ => Ok(Arc::new(SqliteSummaryStore::open(&config.store.resolved_path()).await?)),
    }
}
