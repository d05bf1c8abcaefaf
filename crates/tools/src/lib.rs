//! Built-in capabilities for Threadwise.
//!
//! Capabilities are what the model can invoke mid-response: list the
//! threads under a channel, open a new thread, or ask a delegate a
//! question about a thread's history without pulling it into context.

pub mod create_thread;
pub mod delegate_query;
pub mod list_threads;

use std::sync::Arc;
use threadwise_core::capability::CapabilityRegistry;
use threadwise_core::channel::ChatTransport;
use threadwise_core::delegate::DelegateService;

pub use create_thread::CreateThreadTool;
pub use delegate_query::DelegateQueryTool;
pub use list_threads::ListThreadsTool;

/// Create the registry of built-in capabilities for one channel.
///
/// `home_channel` is where threads are listed and created when the model
/// does not name a channel.
pub fn default_registry(
    transport: Arc<dyn ChatTransport>,
    delegate: Arc<dyn DelegateService>,
    home_channel: &str,
) -> CapabilityRegistry {
    let mut registry = CapabilityRegistry::new();
    registry.register(Box::new(ListThreadsTool::new(transport.clone(), home_channel)));
    registry.register(Box::new(CreateThreadTool::new(transport, home_channel)));
    registry.register(Box::new(DelegateQueryTool::new(delegate)));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use threadwise_channels::LocalTransport;
    use threadwise_core::delegate::{DelegateAnswer, DelegateRequest};
    use threadwise_core::error::DelegateError;

    struct Unwired;

    #[async_trait]
    impl DelegateService for Unwired {
        async fn ask(&self, _request: DelegateRequest) -> Result<DelegateAnswer, DelegateError> {
            Err(DelegateError::NotWired("test".into()))
        }
    }

    #[test]
    fn default_registry_has_all_capabilities() {
        let registry = default_registry(Arc::new(LocalTransport::new("Threadwise")), Arc::new(Unwired), "general");
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.names(), vec!["create_thread", "delegate_query", "list_threads"]);
    }

    #[test]
    fn definitions_are_sorted_and_carry_schemas() {
        let registry = default_registry(Arc::new(LocalTransport::new("Threadwise")), Arc::new(Unwired), "general");
        let defs = registry.definitions();
        assert_eq!(defs[1].name, "delegate_query");
        assert_eq!(defs[1].parameters["required"][0], "thread_id");
    }
}
