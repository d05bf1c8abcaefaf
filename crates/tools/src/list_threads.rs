//! List threads tool: read-only query of the threads under a channel.

use async_trait::async_trait;
use std::sync::Arc;
use threadwise_core::capability::{Capability, CapabilityResult};
use threadwise_core::channel::ChatTransport;
use threadwise_core::error::CapabilityError;

pub struct ListThreadsTool {
    transport: Arc<dyn ChatTransport>,
    home_channel: String,
}

impl ListThreadsTool {
    /// `home_channel` is used when the backend omits `channel_id`.
    pub fn new(transport: Arc<dyn ChatTransport>, home_channel: impl Into<String>) -> Self {
        Self {
            transport,
            home_channel: home_channel.into(),
        }
    }
}

#[async_trait]
impl Capability for ListThreadsTool {
    fn name(&self) -> &str {
        "list_threads"
    }

    fn description(&self) -> &str {
        "List the threads in a channel, with their IDs. Use the IDs with delegate_query \
         to ask about a thread's contents."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "channel_id": {
                    "type": "string",
                    "description": "Channel to list threads for (defaults to the current channel)"
                }
            }
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CapabilityResult, CapabilityError> {
        let channel_id = arguments["channel_id"]
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.home_channel);

        let threads = self
            .transport
            .list_threads(channel_id)
            .await
            .map_err(|e| CapabilityError::ExecutionFailed {
                name: "list_threads".into(),
                reason: e.to_string(),
            })?;

        if threads.is_empty() {
            return Ok(CapabilityResult::ok(format!("No threads in channel {channel_id}.")));
        }

        let mut output = format!("{} thread(s) in channel {channel_id}:", threads.len());
        for thread in &threads {
            output.push_str(&format!("\n- {} (id: {})", thread.name, thread.id));
        }

        let data = serde_json::to_value(&threads).unwrap_or_default();
        Ok(CapabilityResult::ok(output).with_data(data))
    }
}
