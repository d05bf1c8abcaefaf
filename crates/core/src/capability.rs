//! Capability trait: side-effecting calls the backend can request mid-response.
//!
//! Capabilities are executed by the caller (client-side) when the backend
//! surfaces an invocation: listing threads, creating a thread, asking a
//! focused delegate query about a thread.

use crate::error::CapabilityError;
use crate::provider::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A request to execute a capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityCall {
    /// Unique invocation ID (matches the backend's tool_use id)
    pub id: String,

    /// Name of the capability to execute
    pub name: String,

    /// Arguments as a JSON object
    pub arguments: serde_json::Value,
}

/// The result of a capability execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityResult {
    /// Whether the capability executed successfully
    pub success: bool,

    /// The output text sent back to the backend
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl CapabilityResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            data: None,
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// The core Capability trait.
#[async_trait]
pub trait Capability: Send + Sync {
    /// The unique name of this capability (e.g., "create_thread").
    fn name(&self) -> &str;

    /// A description of what this capability does (sent to the backend).
    fn description(&self) -> &str;

    /// JSON Schema describing this capability's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the capability with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<CapabilityResult, CapabilityError>;

    /// Convert this capability into a declaration for the backend.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Dispatch table of available capabilities, keyed by name.
pub struct CapabilityRegistry {
    capabilities: HashMap<String, Box<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            capabilities: HashMap::new(),
        }
    }

    /// Register a capability. Replaces any existing capability with the same name.
    pub fn register(&mut self, capability: Box<dyn Capability>) {
        let name = capability.name().to_string();
        self.capabilities.insert(name, capability);
    }

    /// Get a capability by name.
    pub fn get(&self, name: &str) -> Option<&dyn Capability> {
        self.capabilities.get(name).map(|c| c.as_ref())
    }

    /// All declarations, sorted by name so requests are stable across runs.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.capabilities.values().map(|c| c.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Execute an invocation.
    ///
    /// An unknown name is not an error: it is logged and yields `Ok(None)`,
    /// meaning there is nothing to append to the transcript.
    pub async fn dispatch(
        &self,
        call: &CapabilityCall,
    ) -> std::result::Result<Option<CapabilityResult>, CapabilityError> {
        let Some(capability) = self.capabilities.get(&call.name) else {
            tracing::warn!(name = %call.name, id = %call.id, "Unknown capability requested");
            return Ok(None);
        };
        tracing::debug!(name = %call.name, id = %call.id, "Executing capability");
        capability.execute(call.arguments.clone()).await.map(Some)
    }

    /// List all registered capability names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.capabilities.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
