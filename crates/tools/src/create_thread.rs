//! Create thread tool: opens a new thread in a channel.

use async_trait::async_trait;
use std::sync::Arc;
use threadwise_core::capability::{Capability, CapabilityResult};
use threadwise_core::channel::ChatTransport;
use threadwise_core::error::CapabilityError;

/// Longest thread name most platforms accept.
const MAX_THREAD_NAME_CHARS: usize = 100;

pub struct CreateThreadTool {
    transport: Arc<dyn ChatTransport>,
    home_channel: String,
}

impl CreateThreadTool {
    pub fn new(transport: Arc<dyn ChatTransport>, home_channel: impl Into<String>) -> Self {
        Self {
            transport,
            home_channel: home_channel.into(),
        }
    }
}

#[async_trait]
impl Capability for CreateThreadTool {
    fn name(&self) -> &str {
        "create_thread"
    }

    fn description(&self) -> &str {
        "Create a new thread in the current channel, optionally posting an opening message."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Thread name (max 100 characters)"
                },
                "message": {
                    "type": "string",
                    "description": "Optional opening message for the thread"
                }
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CapabilityResult, CapabilityError> {
        let name = arguments["name"]
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CapabilityError::InvalidArguments("Missing 'name' argument".into()))?;
        let name: String = name.chars().take(MAX_THREAD_NAME_CHARS).collect();
        let opening = arguments["message"].as_str().filter(|s| !s.trim().is_empty());

        let thread = self
            .transport
            .create_thread(&self.home_channel, &name, opening)
            .await
            .map_err(|e| CapabilityError::ExecutionFailed {
                name: "create_thread".into(),
                reason: e.to_string(),
            })?;

        Ok(
            CapabilityResult::ok(format!("Created thread \"{}\" (id: {}).", thread.name, thread.id))
                .with_data(serde_json::json!({ "thread_id": thread.id, "name": thread.name })),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadwise_channels::LocalTransport;
    use threadwise_core::channel::FetchOptions;

    async fn transport() -> Arc<LocalTransport> {
        let transport = Arc::new(LocalTransport::new("Threadwise"));
        transport.add_channel("general", "general").await;
        transport
    }

    #[tokio::test]
    async fn creates_thread_with_opening_message() {
        let transport = transport().await;
        let tool = CreateThreadTool::new(transport.clone(), "general");

        let result = tool
            .execute(serde_json::json!({"name": "  Q3 planning ", "message": "Kicking off"}))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.contains("Q3 planning"));

        let thread_id = result.data.unwrap()["thread_id"].as_str().unwrap().to_string();
        let history = transport.fetch_messages(&thread_id, FetchOptions::latest(10)).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "Kicking off");
    }

    #[tokio::test]
    async fn long_names_are_truncated() {
        let transport = transport().await;
        let tool = CreateThreadTool::new(transport.clone(), "general");
        tool.execute(serde_json::json!({"name": "x".repeat(300)})).await.unwrap();

        let threads = transport.list_threads("general").await.unwrap();
        assert_eq!(threads[0].name.chars().count(), MAX_THREAD_NAME_CHARS);
    }

    #[tokio::test]
    async fn missing_name_is_invalid() {
        let tool = CreateThreadTool::new(transport().await, "general");
        let err = tool.execute(serde_json::json!({"name": "   "})).await.unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidArguments(_)));
    }
}
