//! Parallel dispatcher (§4.3) and the `Dispatcher` capability every tool
//! registry / built-in / subagent router implements.

mod code_runner;
mod core;
mod input_handler;

pub use code_runner::{CodeRunResult, CodeRunner, ToolDispatchFn};
pub use core::CoreDispatcher;
pub use input_handler::{InputHandler, InputRequest, InputResponse};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::cancel::CancellationToken;
use crate::message::{Attachment, ToolCall};
use crate::stream::StreamSink;
use crate::task::{AgentTask, StepKind};
use crate::tool::ToolDefinition;
use crate::usage::Usage;

/// Up to this many tool calls run concurrently within one iteration (§4.3).
pub const MAX_PARALLEL_WORKERS: usize = 10;

/// Everything a single dispatched call needs besides the call itself:
/// cancellation, an optional stream sink, the built-in recursion guards
/// (`in_plan`/`in_code`), and (for `Network` subagent routing) the
/// originating task whose attachments/context get propagated to a subagent.
#[derive(Clone)]
pub struct DispatchCx {
    /// Cooperative cancellation signal for this execution.
    pub cancel: CancellationToken,
    /// Stream sink, present only for streaming executions.
    pub sink: Option<StreamSink>,
    /// Set while executing steps dispatched from inside `execute_plan`.
    pub in_plan: bool,
    /// Set while executing the callback dispatched from inside `execute_code`.
    pub in_code: bool,
    /// The task driving this execution, if the dispatcher needs it (only
    /// `Network` does, to forward attachments/context to subagents).
    pub task: Option<Arc<AgentTask>>,
}

impl DispatchCx {
    /// Build a fresh (non-nested) dispatch context.
    #[must_use]
    pub fn new(cancel: CancellationToken, sink: Option<StreamSink>) -> Self {
        Self {
            cancel,
            sink,
            in_plan: false,
            in_code: false,
            task: None,
        }
    }

    /// Attach the originating task (builder-style), for `Network` subagent
    /// attachment/context propagation.
    #[must_use]
    pub fn with_task(mut self, task: Arc<AgentTask>) -> Self {
        self.task = Some(task);
        self
    }

    /// Clone this context with `in_plan` set, for calls made from within
    /// `execute_plan`.
    #[must_use]
    pub fn nested_in_plan(&self) -> Self {
        let mut cx = self.clone();
        cx.in_plan = true;
        cx
    }

    /// Clone this context with `in_code` set, for calls made from within
    /// `execute_code`'s callback.
    #[must_use]
    pub fn nested_in_code(&self) -> Self {
        let mut cx = self.clone();
        cx.in_code = true;
        cx
    }
}

/// The outcome of dispatching one [`ToolCall`], ready to become a tool-result
/// message and a [`crate::task::StepTrace`].
#[derive(Debug, Clone)]
pub struct ToolResult {
    /// Id of the call this answers.
    pub call_id: String,
    /// Tool (or `agent_<name>`) name invoked.
    pub name: String,
    /// Text content to show the model.
    pub content: String,
    /// Whether this represents a failure.
    pub is_error: bool,
    /// Attachments produced by the call.
    pub attachments: Vec<Attachment>,
    /// Usage attributable to the call (non-zero only for agent delegations).
    pub usage: Usage,
    /// Whether this was a plain tool call or a subagent delegation.
    pub kind: StepKind,
    /// Wall-clock duration of the call.
    pub duration: Duration,
}

impl ToolResult {
    /// Build a successful tool result.
    #[must_use]
    pub fn ok(call: &ToolCall, content: String, attachments: Vec<Attachment>, duration: Duration) -> Self {
        Self {
            call_id: call.id.clone(),
            name: call.name.clone(),
            content,
            is_error: false,
            attachments,
            usage: Usage::zero(),
            kind: StepKind::Tool,
            duration,
        }
    }

    /// Build an error tool result (`content` should read `"error: ..."`).
    #[must_use]
    pub fn error(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            call_id: call.id.clone(),
            name: call.name.clone(),
            content: content.into(),
            is_error: true,
            attachments: Vec::new(),
            usage: Usage::zero(),
            kind: StepKind::Tool,
            duration: Duration::ZERO,
        }
    }

    /// Build a cancellation-marker tool result.
    #[must_use]
    pub fn cancelled(call: &ToolCall, reason: &str) -> Self {
        Self::error(call, format!("error: {reason}"))
    }

    /// Mark this result as an agent delegation with its own usage/duration.
    #[must_use]
    pub fn into_agent(mut self, usage: Usage, duration: Duration) -> Self {
        self.kind = StepKind::Agent;
        self.usage = usage;
        self.duration = duration;
        self
    }
}

/// Anything that can answer "what tools exist" and "dispatch this call" —
/// implemented by [`CoreDispatcher`] (plain tool registry + built-ins) and by
/// `Network`'s router (registry + built-ins + subagent pseudo-tools).
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Tool definitions to advertise to the model this execution.
    fn tool_definitions(&self) -> Vec<ToolDefinition>;

    /// Dispatch one call, routing to a tool, a built-in, or a subagent.
    async fn dispatch(&self, call: &ToolCall, cx: &DispatchCx) -> ToolResult;
}

/// Dispatch `calls` respecting §4.3's parallel-dispatcher rules: a single
/// call runs inline; multiple calls fan out over up to
/// `min(len, MAX_PARALLEL_WORKERS)` concurrently in-flight tasks, each
/// guarded against panics via `tokio::spawn` + `JoinHandle`. Results are
/// always returned in the original call order. If `cx.cancel` fires
/// mid-flight, any result not yet collected is filled with a cancellation
/// marker without waiting on the still-running task.
pub async fn dispatch_all(
    dispatcher: Arc<dyn Dispatcher>,
    calls: &[ToolCall],
    cx: DispatchCx,
) -> Vec<ToolResult> {
    if calls.is_empty() {
        return Vec::new();
    }
    if calls.len() == 1 {
        return vec![dispatcher.dispatch(&calls[0], &cx).await];
    }

    let limit = calls.len().min(MAX_PARALLEL_WORKERS);
    let semaphore = Arc::new(Semaphore::new(limit));
    let mut handles = Vec::with_capacity(calls.len());
    for call in calls {
        let dispatcher = Arc::clone(&dispatcher);
        let call = call.clone();
        let cx = cx.clone();
        let semaphore = Arc::clone(&semaphore);
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            dispatcher.dispatch(&call, &cx).await
        }));
    }

    let mut results = Vec::with_capacity(calls.len());
    for (call, handle) in calls.iter().zip(handles) {
        if cx.cancel.is_cancelled() {
            handle.abort();
            let reason = cx.cancel.reason().unwrap_or_else(|| "cancelled".to_string());
            results.push(ToolResult::cancelled(call, &reason));
            continue;
        }
        match handle.await {
            Ok(result) => results.push(result),
            Err(join_err) if join_err.is_cancelled() => {
                let reason = cx.cancel.reason().unwrap_or_else(|| "cancelled".to_string());
                results.push(ToolResult::cancelled(call, &reason));
            }
            Err(join_err) => {
                results.push(ToolResult::error(
                    call,
                    format!("error: tool {} panic: {join_err}", call.name),
                ));
            }
        }
    }

    results
}
