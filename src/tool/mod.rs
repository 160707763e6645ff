//! Tool registry (§4.1): name → tool map with O(1) dispatch.

mod registry;

pub use registry::{ToolRegistry, ToolRegistryBuilder};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::Attachment;

/// Name, description, and JSON-Schema parameters for one callable tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique name the model uses to invoke this tool.
    pub name: String,
    /// Human-readable description shown to the model.
    pub description: String,
    /// JSON-Schema object describing the call's arguments.
    pub parameters: Value,
}

impl ToolDefinition {
    /// Derive `parameters` from `T`'s [`schemars::JsonSchema`] impl instead
    /// of hand-writing the JSON Schema literal — the same generator the
    /// teacher's structured-output agents use for their response schemas.
    #[must_use]
    pub fn from_schema<T: schemars::JsonSchema>(name: impl Into<String>, description: impl Into<String>) -> Self {
        let schema = schemars::schema_for!(T);
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::to_value(schema).unwrap_or(Value::Null),
        }
    }
}

/// The successful payload of a tool execution.
#[derive(Debug, Clone, Default)]
pub struct ToolPayload {
    /// Text content returned to the model.
    pub content: String,
    /// Attachments produced by the call.
    pub attachments: Vec<Attachment>,
}

impl ToolPayload {
    /// Build a text-only payload.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            attachments: Vec::new(),
        }
    }
}

/// A tool execution failure. Never aborts the loop — the engine converts it
/// into an `is_error = true` tool-result message so the model can recover.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct ToolError(pub String);

impl ToolError {
    /// Build a tool error from any displayable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// An optional progress-event sink passed to streaming-capable tools.
pub type ToolProgress = crate::stream::StreamSink;

/// A callable tool. Object-safe via `async-trait` so the registry can hold
/// `Arc<dyn Tool>` regardless of the concrete implementation.
#[async_trait]
pub trait Tool: Send + Sync {
    /// One or more tool definitions this implementation exposes (most tools
    /// expose exactly one; a few expose a small family under one impl).
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Execute `name` (one of [`Tool::definitions`]'s names) with `args`.
    async fn execute(&self, name: &str, args: Value) -> Result<ToolPayload, ToolError>;

    /// Execute with progress streaming. Tools that don't support incremental
    /// progress can rely on the default, which just calls [`Tool::execute`].
    async fn execute_stream(
        &self,
        name: &str,
        args: Value,
        _progress: &ToolProgress,
    ) -> Result<ToolPayload, ToolError> {
        self.execute(name, args).await
    }

    /// Whether this tool has a meaningfully different streaming path.
    fn supports_streaming(&self) -> bool {
        false
    }
}
