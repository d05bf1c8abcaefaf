//! Delegate query tool: asks a focused question about another thread.
//!
//! The answer comes from a separate generation session scoped to that
//! thread, so the thread's history never enters the primary context.
//! Expected failures (bad input, circuit open, thread unreadable) come back
//! as a failed result the backend can read; only an unwired gateway is an
//! error.

use async_trait::async_trait;
use std::sync::Arc;
use threadwise_core::capability::{Capability, CapabilityResult};
use threadwise_core::delegate::{DelegateRequest, DelegateService};
use threadwise_core::error::{CapabilityError, DelegateError};
use tracing::warn;

pub struct DelegateQueryTool {
    service: Arc<dyn DelegateService>,
}

impl DelegateQueryTool {
    pub fn new(service: Arc<dyn DelegateService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Capability for DelegateQueryTool {
    fn name(&self) -> &str {
        "delegate_query"
    }

    fn description(&self) -> &str {
        "Ask a focused question about the contents of a specific thread. A separate assistant \
         reads that thread and answers; use this instead of guessing what was said there."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "thread_id": {
                    "type": "string",
                    "description": "ID of the thread to read (from list_threads)"
                },
                "query": {
                    "type": "string",
                    "description": "The question to answer from the thread (max 2000 characters)"
                },
                "hint": {
                    "type": "string",
                    "description": "Optional guidance on what to look for (max 500 characters)"
                }
            },
            "required": ["thread_id", "query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CapabilityResult, CapabilityError> {
        let request = DelegateRequest {
            thread_id: arguments["thread_id"].as_str().unwrap_or_default().to_string(),
            query: arguments["query"].as_str().unwrap_or_default().to_string(),
            hint: arguments["hint"].as_str().map(String::from),
        };

        match self.service.ask(request).await {
            Ok(answer) => {
                let mut output = format!(
                    "Answer from thread \"{}\" ({} messages{}):\n{}",
                    answer.thread_name,
                    answer.source_message_count,
                    if answer.has_documents { ", with documents" } else { "" },
                    answer.answer
                );
                if answer.degraded {
                    output.push_str("\n(Note: context size for this thread was estimated.)");
                }
                let data = serde_json::to_value(&answer).unwrap_or_default();
                Ok(CapabilityResult::ok(output).with_data(data))
            }
            Err(DelegateError::NotWired(reason)) => Err(CapabilityError::Unavailable(reason)),
            Err(e) => {
                warn!(error = %e, "Delegate query failed");
                Ok(CapabilityResult::failed(format!("Delegate query failed: {e}")))
            }
        }
    }
}
