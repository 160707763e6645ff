//! `CodeRunner`: the `execute_code` built-in's sandbox collaborator contract.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::message::ToolCall;

use super::ToolResult;

/// A callback `CodeRunner` implementations use to let sandboxed code invoke
/// engine tools. Wrapped by the engine so nested `execute_plan`/`execute_code`
/// calls are rejected before reaching the real dispatcher (§9 "cyclic dispatch").
pub type ToolDispatchFn =
    Arc<dyn Fn(ToolCall) -> Pin<Box<dyn Future<Output = ToolResult> + Send>> + Send + Sync>;

/// The sandboxed result of running one `execute_code` call.
#[derive(Debug, Clone, Default)]
pub struct CodeRunResult {
    /// Structured output, if the code produced one (preferred by the engine
    /// over `logs` when present).
    pub output: Option<Value>,
    /// Captured stdout/stderr-equivalent logs.
    pub logs: String,
    /// Process/sandbox exit code.
    pub exit_code: i32,
    /// Error message, if the run failed.
    pub error: Option<String>,
}

/// Executes sandboxed code on behalf of the `execute_code` built-in.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    /// Run `code`, letting it call back into engine tools via `dispatch`.
    async fn run(&self, code: &str, dispatch: ToolDispatchFn) -> Result<CodeRunResult>;
}
