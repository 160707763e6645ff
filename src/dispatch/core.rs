//! Built-in pseudo-tools (§4.4) and the plain tool-registry dispatcher they
//! share a pipeline with.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::message::ToolCall;
use crate::tool::{ToolDefinition, ToolRegistry};

use super::{dispatch_all, CodeRunner, Dispatcher, DispatchCx, InputHandler, InputRequest, ToolResult};

/// Maximum number of steps accepted by one `execute_plan` call.
pub const MAX_PLAN_STEPS: usize = 50;

const ASK_USER: &str = "ask_user";
const EXECUTE_PLAN: &str = "execute_plan";
const EXECUTE_CODE: &str = "execute_code";

/// Dispatches to a plain [`ToolRegistry`] plus the three built-in pseudo-tools
/// (`ask_user`, `execute_plan`, `execute_code`), each gated by whether its
/// collaborator is wired / its toggle is enabled.
#[derive(Clone)]
pub struct CoreDispatcher {
    registry: Arc<ToolRegistry>,
    input_handler: Option<Arc<dyn InputHandler>>,
    code_runner: Option<Arc<dyn CodeRunner>>,
    plan_execution: bool,
    code_execution: bool,
}

impl CoreDispatcher {
    /// Build a dispatcher over `registry`, with built-ins enabled per the
    /// presence of their collaborators / the given toggles.
    #[must_use]
    pub fn new(
        registry: Arc<ToolRegistry>,
        input_handler: Option<Arc<dyn InputHandler>>,
        code_runner: Option<Arc<dyn CodeRunner>>,
        plan_execution: bool,
        code_execution: bool,
    ) -> Self {
        Self {
            registry,
            input_handler,
            code_runner,
            plan_execution,
            code_execution,
        }
    }

    /// Build straight into a [`Dispatcher`] trait object that keeps the
    /// `Arc<CoreDispatcher>` recursion path `execute_plan`/`execute_code`
    /// need (the bare `impl Dispatcher for CoreDispatcher` can't recurse —
    /// see the comment on that impl's `execute_plan`/`execute_code` arms).
    /// Callers that wire a `CoreDispatcher` into a `LoopConfig` (`LLMAgent`,
    /// `Network`) should use this rather than coercing `Arc<CoreDispatcher>`
    /// to `Arc<dyn Dispatcher>` directly.
    #[must_use]
    pub fn new_dyn(
        registry: Arc<ToolRegistry>,
        input_handler: Option<Arc<dyn InputHandler>>,
        code_runner: Option<Arc<dyn CodeRunner>>,
        plan_execution: bool,
        code_execution: bool,
    ) -> Arc<dyn Dispatcher> {
        let core = Arc::new(Self::new(registry, input_handler, code_runner, plan_execution, code_execution));
        Arc::new(core)
    }

    async fn dispatch_ask_user(&self, call: &ToolCall, cx: &DispatchCx) -> ToolResult {
        if cx.in_plan {
            return ToolResult::error(
                call,
                "error: ask_user is unavailable inside execute_plan",
            );
        }
        let Some(handler) = &self.input_handler else {
            return ToolResult::error(call, "error: missing dependency: no input handler configured");
        };

        #[derive(Deserialize)]
        struct Args {
            question: String,
            #[serde(default)]
            options: Vec<String>,
        }
        let args: Args = match serde_json::from_value(call.arguments.clone()) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(call, format!("error: invalid ask_user arguments: {e}")),
        };

        let request = InputRequest {
            question: args.question,
            options: args.options,
        };

        tokio::select! {
            biased;
            () = cx.cancel.cancelled() => {
                let reason = cx.cancel.reason().unwrap_or_else(|| "cancelled".to_string());
                ToolResult::cancelled(call, &reason)
            }
            result = handler.request_input(&request) => match result {
                Ok(resp) => ToolResult::ok(call, resp.answer, Vec::new(), std::time::Duration::ZERO),
                Err(e) => ToolResult::error(call, format!("error: {e}")),
            },
        }
    }

    async fn dispatch_execute_plan(
        self: &Arc<Self>,
        call: &ToolCall,
        cx: &DispatchCx,
    ) -> ToolResult {
        if !self.plan_execution {
            return ToolResult::error(call, format!("error: unknown tool: {}", call.name));
        }
        if cx.in_plan || cx.in_code {
            return ToolResult::error(call, "error: execute_plan does not support recursion");
        }

        #[derive(Deserialize)]
        struct PlanStep {
            tool: String,
            #[serde(default)]
            args: Value,
        }
        #[derive(Deserialize)]
        struct Args {
            steps: Vec<PlanStep>,
        }
        let args: Args = match serde_json::from_value(call.arguments.clone()) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(call, format!("error: invalid execute_plan arguments: {e}")),
        };

        if args.steps.len() > MAX_PLAN_STEPS {
            return ToolResult::error(
                call,
                format!("error: execute_plan accepts at most {MAX_PLAN_STEPS} steps"),
            );
        }
        if let Some(bad) = args
            .steps
            .iter()
            .find(|s| s.tool == EXECUTE_PLAN || s.tool == ASK_USER)
        {
            return ToolResult::error(
                call,
                format!("error: execute_plan cannot include '{}' as a step", bad.tool),
            );
        }

        let calls: Vec<ToolCall> = args
            .steps
            .iter()
            .enumerate()
            .map(|(i, step)| ToolCall::new(format!("{}-step-{i}", call.id), step.tool.clone(), step.args.clone()))
            .collect();

        let nested_cx = cx.nested_in_plan();
        let dispatcher: Arc<dyn Dispatcher> = Arc::clone(self) as Arc<dyn Dispatcher>;
        let results = dispatch_all(dispatcher, &calls, nested_cx).await;

        let mut usage = crate::usage::Usage::zero();
        let mut attachments = Vec::new();
        let mut summary = Vec::with_capacity(results.len());
        for (i, result) in results.iter().enumerate() {
            usage += result.usage;
            attachments.extend(result.attachments.clone());
            let status = if result.is_error { "error" } else { "ok" };
            let mut entry = serde_json::json!({
                "step": i,
                "tool": result.name,
                "status": status,
            });
            if result.is_error {
                entry["error"] = Value::String(result.content.clone());
            } else {
                entry["result"] = Value::String(result.content.clone());
            }
            summary.push(entry);
        }

        let content = serde_json::to_string(&summary).unwrap_or_else(|_| "[]".to_string());
        let mut out = ToolResult::ok(call, content, attachments, std::time::Duration::ZERO);
        out.usage = usage;
        out
    }

    async fn dispatch_execute_code(
        self: &Arc<Self>,
        call: &ToolCall,
        cx: &DispatchCx,
    ) -> ToolResult {
        if !self.code_execution {
            return ToolResult::error(call, format!("error: unknown tool: {}", call.name));
        }
        if cx.in_code {
            return ToolResult::error(call, "error: execute_code does not support recursion");
        }
        let Some(runner) = &self.code_runner else {
            return ToolResult::error(call, "error: missing dependency: no code runner configured");
        };

        #[derive(Deserialize)]
        struct Args {
            code: String,
        }
        let args: Args = match serde_json::from_value(call.arguments.clone()) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(call, format!("error: invalid execute_code arguments: {e}")),
        };

        let nested_cx = cx.nested_in_code();
        let dispatcher: Arc<dyn Dispatcher> = Arc::clone(self) as Arc<dyn Dispatcher>;
        let dispatch_fn: super::ToolDispatchFn = {
            let dispatcher = Arc::clone(&dispatcher);
            let nested_cx = nested_cx.clone();
            Arc::new(move |call: ToolCall| {
                let dispatcher = Arc::clone(&dispatcher);
                let cx = nested_cx.clone();
                Box::pin(async move { dispatcher.dispatch(&call, &cx).await })
            })
        };

        match runner.run(&args.code, dispatch_fn).await {
            Ok(run) => {
                let content = match run.output {
                    Some(output) => {
                        let structured = serde_json::to_string(&output).unwrap_or_default();
                        if run.logs.is_empty() {
                            structured
                        } else {
                            format!("{structured}\n--- logs ---\n{}", run.logs)
                        }
                    }
                    None if run.logs.is_empty() => String::new(),
                    None => run.logs.clone(),
                };
                let is_error = run.error.is_some() || run.exit_code != 0;
                let content = match run.error {
                    Some(err) if content.is_empty() => format!("error: {err}"),
                    Some(err) => format!("{content}\nerror: {err}"),
                    None => content,
                };
                let mut result = ToolResult::ok(call, content, Vec::new(), std::time::Duration::ZERO);
                result.is_error = is_error;
                result
            }
            Err(e) => ToolResult::error(call, format!("error: {e}")),
        }
    }
}

#[async_trait]
impl Dispatcher for CoreDispatcher {
    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs = self.registry.definitions();
        if self.input_handler.is_some() {
            defs.push(ask_user_definition());
        }
        if self.plan_execution {
            defs.push(execute_plan_definition());
        }
        if self.code_execution {
            defs.push(execute_code_definition());
        }
        defs
    }

    async fn dispatch(&self, call: &ToolCall, cx: &DispatchCx) -> ToolResult {
        match call.name.as_str() {
            ASK_USER => self.dispatch_ask_user(call, cx).await,
            // `execute_plan`/`execute_code` need `Arc<Self>` to recurse into
            // `dispatch_all`; this impl only has `&self`, so those branches
            // are implemented on `Arc<CoreDispatcher>` below and routed here
            // only when called directly as `&self` (i.e. never nested).
            EXECUTE_PLAN if self.plan_execution => {
                ToolResult::error(call, "error: internal: execute_plan requires Arc<CoreDispatcher>")
            }
            EXECUTE_CODE if self.code_execution => {
                ToolResult::error(call, "error: internal: execute_code requires Arc<CoreDispatcher>")
            }
            name => {
                let start = Instant::now();
                match self.registry.get(name) {
                    Some(tool) => {
                        let outcome = match (&cx.sink, tool.supports_streaming()) {
                            (Some(sink), true) => tool.execute_stream(name, call.arguments.clone(), sink).await,
                            _ => tool.execute(name, call.arguments.clone()).await,
                        };
                        match outcome {
                            Ok(payload) => {
                                ToolResult::ok(call, payload.content, payload.attachments, start.elapsed())
                            }
                            Err(e) => ToolResult::error(call, format!("error: {e}")),
                        }
                    }
                    None => ToolResult::error(call, format!("error: unknown tool: {name}")),
                }
            }
        }
    }
}

#[async_trait]
impl Dispatcher for Arc<CoreDispatcher> {
    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        CoreDispatcher::tool_definitions(self)
    }

    async fn dispatch(&self, call: &ToolCall, cx: &DispatchCx) -> ToolResult {
        match call.name.as_str() {
            EXECUTE_PLAN if self.plan_execution => self.dispatch_execute_plan(call, cx).await,
            EXECUTE_CODE if self.code_execution => self.dispatch_execute_code(call, cx).await,
            _ => CoreDispatcher::dispatch(self.as_ref(), call, cx).await,
        }
    }
}

fn ask_user_definition() -> ToolDefinition {
    ToolDefinition {
        name: ASK_USER.to_string(),
        description: "Ask the human user a question and wait for their reply.".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "question": {"type": "string", "description": "The question to ask"},
                "options": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Optional suggested answers"
                }
            },
            "required": ["question"]
        }),
    }
}

fn execute_plan_definition() -> ToolDefinition {
    ToolDefinition {
        name: EXECUTE_PLAN.to_string(),
        description: format!(
            "Execute up to {MAX_PLAN_STEPS} tool calls as a plan and return their aggregated results."
        ),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "steps": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "tool": {"type": "string"},
                            "args": {"type": "object"}
                        },
                        "required": ["tool"]
                    }
                }
            },
            "required": ["steps"]
        }),
    }
}

fn execute_code_definition() -> ToolDefinition {
    ToolDefinition {
        name: EXECUTE_CODE.to_string(),
        description: "Execute code in a sandbox, which may call back into other tools.".to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "code": {"type": "string", "description": "The code to execute"}
            },
            "required": ["code"]
        }),
    }
}
