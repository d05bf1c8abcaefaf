//! Delegate query contract: a focused sub-question about one thread,
//! answered by a secondary generation session without growing the primary
//! context.

use crate::error::DelegateError;
use crate::provider::Usage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A focused sub-question about a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateRequest {
    pub thread_id: String,
    pub query: String,

    /// Optional guidance on what to look for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// The answer to a delegate query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegateAnswer {
    pub answer: String,
    pub thread_id: String,
    pub thread_name: String,

    /// How many thread messages the answer was based on
    pub source_message_count: usize,

    /// Whether reference documents were part of the context
    pub has_documents: bool,

    /// Input/output tokens as reported by the backend
    pub usage: Usage,

    /// Whether the token figures for the context were heuristic
    #[serde(default)]
    pub degraded: bool,
}

/// Answers delegate queries. Implemented by the gateway in the agent crate
/// and consumed by the `delegate_query` capability.
#[async_trait]
pub trait DelegateService: Send + Sync {
    async fn ask(&self, request: DelegateRequest) -> std::result::Result<DelegateAnswer, DelegateError>;
}
