//! `Network` (§4.7): a routing agent whose subagents are exposed to the
//! model as `agent_<name>` pseudo-tools.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use crate::cancel::CancellationToken;
use crate::dispatch::{CoreDispatcher, DispatchCx, Dispatcher, ToolResult};
use crate::engine::{self, Outcome};
use crate::error::Result;
use crate::message::ToolCall;
use crate::stream::{StreamEvent, StreamSink};
use crate::task::{AgentResult, AgentTask, StepKind};
use crate::tool::ToolDefinition;

use super::Agent;

/// Subagent stream-drain watchdog (§4.7, §5): how long a forwarder waits
/// after observing cancellation before force-closing the subagent's
/// internal channel.
const SUBAGENT_DRAIN_TIMEOUT: Duration = Duration::from_secs(60);

const AGENT_TOOL_PREFIX: &str = "agent_";

/// A router whose subagents appear to the model as `agent_<name>` tools. The
/// inner [`Dispatcher`] handles plain tools and the built-ins; subagent
/// routing happens first so `agent_<name>` can never collide with a
/// registered tool name.
pub struct Network {
    name: String,
    description: String,
    provider: Arc<dyn crate::request::Provider>,
    system_prompt: String,
    dispatcher: Arc<NetworkDispatcher>,
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("name", &self.name)
            .field("subagents", &self.dispatcher.subagents.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Network {
    /// Start building a network over `provider` (used for the router's own
    /// "which subagent should answer this" decisions) and `inner`
    /// (typically a [`CoreDispatcher::new_dyn`] instance, but any
    /// dispatcher works).
    #[must_use]
    pub fn builder(
        name: impl Into<String>,
        provider: Arc<dyn crate::request::Provider>,
        system_prompt: impl Into<String>,
        inner: Arc<dyn Dispatcher>,
    ) -> NetworkBuilder {
        NetworkBuilder::new(name, provider, system_prompt, inner)
    }

    /// Await every outstanding subagent that wires its own memory. `Network`
    /// itself has none; this delegates so callers can `drain()` a network
    /// uniformly alongside a bare `LLMAgent`.
    pub async fn drain(&self) {}
}

#[async_trait]
impl Agent for Network {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, task: &AgentTask, cancel: CancellationToken) -> Result<Outcome<AgentResult>> {
        let dispatcher: Arc<dyn Dispatcher> = Arc::clone(&self.dispatcher) as Arc<dyn Dispatcher>;
        let config = crate::config::LoopConfig::builder(Arc::clone(&self.provider), dispatcher)
            .name(self.name.clone())
            .build();
        engine::run(&config, task, &self.system_prompt, cancel, None).await
    }

    fn as_streaming(&self) -> Option<&dyn super::StreamingAgent> {
        Some(self)
    }
}

#[async_trait]
impl super::StreamingAgent for Network {
    async fn execute_stream(
        &self,
        task: &AgentTask,
        cancel: CancellationToken,
        sink: StreamSink,
    ) -> Result<Outcome<AgentResult>> {
        let dispatcher: Arc<dyn Dispatcher> = Arc::clone(&self.dispatcher) as Arc<dyn Dispatcher>;
        let config = crate::config::LoopConfig::builder(Arc::clone(&self.provider), dispatcher)
            .name(self.name.clone())
            .build();
        engine::run(&config, task, &self.system_prompt, cancel, Some(sink)).await
    }
}

/// Fluent builder for [`Network`].
pub struct NetworkBuilder {
    name: String,
    description: String,
    provider: Arc<dyn crate::request::Provider>,
    system_prompt: String,
    inner: Arc<dyn Dispatcher>,
    subagents: BTreeMap<String, Arc<dyn Agent>>,
}

impl NetworkBuilder {
    #[must_use]
    fn new(
        name: impl Into<String>,
        provider: Arc<dyn crate::request::Provider>,
        system_prompt: impl Into<String>,
        inner: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            provider,
            system_prompt: system_prompt.into(),
            inner,
            subagents: BTreeMap::new(),
        }
    }

    /// Set the network's description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Register a subagent, exposed to the router as `agent_<name>`.
    #[must_use]
    pub fn subagent(mut self, name: impl Into<String>, agent: Arc<dyn Agent>) -> Self {
        self.subagents.insert(name.into(), agent);
        self
    }

    /// Finalize the network.
    #[must_use]
    pub fn build(self) -> Network {
        let dispatcher = Arc::new(NetworkDispatcher {
            inner: self.inner,
            subagents: self.subagents,
        });
        Network {
            name: self.name,
            description: self.description,
            provider: self.provider,
            system_prompt: self.system_prompt,
            dispatcher,
        }
    }
}

/// Routes `agent_<name>` pseudo-tool calls to subagents, falling back to
/// `inner` for everything else.
pub struct NetworkDispatcher {
    inner: Arc<dyn Dispatcher>,
    subagents: BTreeMap<String, Arc<dyn Agent>>,
}

impl NetworkDispatcher {
    #[must_use]
    fn agent_tool_name(name: &str) -> String {
        format!("{AGENT_TOOL_PREFIX}{name}")
    }

    async fn dispatch_subagent(&self, name: &str, agent: &Arc<dyn Agent>, call: &ToolCall, cx: &DispatchCx) -> ToolResult {
        #[derive(Deserialize)]
        struct Args {
            task: String,
        }
        let args: Args = match serde_json::from_value(call.arguments.clone()) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(call, format!("error: invalid {} arguments: {e}", call.name)),
        };

        let mut child_task = AgentTask::new(args.task.clone());
        if let Some(parent) = &cx.task {
            child_task.attachments = parent.attachments.clone();
            child_task.context = parent.context.clone();
        }

        if let Some(sink) = &cx.sink {
            sink.send(StreamEvent::AgentStart {
                name: name.to_string(),
                content: args.task.clone(),
            })
            .await;
        }

        let start = Instant::now();
        let agent = Arc::clone(agent);
        let cancel = cx.cancel.clone();
        let child_sink = cx.sink.clone();
        let name_owned = name.to_string();

        let run = tokio::spawn(async move {
            run_subagent(agent.as_ref(), &name_owned, &child_task, cancel, child_sink).await
        });

        let outcome = match run.await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => return ToolResult::error(call, format!("error: {e}")),
            Err(join_err) if join_err.is_cancelled() => {
                let reason = cx.cancel.reason().unwrap_or_else(|| "cancelled".to_string());
                return ToolResult::cancelled(call, &reason);
            }
            Err(join_err) => {
                return ToolResult::error(call, format!("error: subagent {name} panic: {join_err}"));
            }
        };

        let duration = start.elapsed();
        let result = match outcome {
            Outcome::Done(result) => result,
            // `ToolResult` has no way to represent a suspension: a subagent
            // asking to suspend mid-delegation surfaces to the router as a
            // plain tool error rather than propagating the suspension up
            // (see DESIGN.md's "Network subagent suspension" entry).
            Outcome::Suspended(suspended) => {
                suspended.release().await;
                return ToolResult::error(
                    call,
                    format!("error: subagent {name} suspended mid-delegation and cannot be resumed through a network"),
                );
            }
        };

        if let Some(sink) = &cx.sink {
            sink.send(StreamEvent::AgentFinish {
                name: name.to_string(),
                content: result.output.clone(),
                usage: result.usage,
                duration,
            })
            .await;
        }

        ToolResult::ok(call, result.output, result.attachments, duration).into_agent(result.usage, duration)
    }
}

async fn run_subagent(
    agent: &dyn Agent,
    name: &str,
    task: &AgentTask,
    cancel: CancellationToken,
    parent_sink: Option<StreamSink>,
) -> Result<Outcome<AgentResult>> {
    let Some(parent_sink) = parent_sink else {
        return agent.execute(task, cancel).await;
    };
    let Some(streaming) = agent.as_streaming() else {
        return agent.execute(task, cancel).await;
    };

    let (child_sink, mut child_rx) = StreamSink::new();
    let forward_cancel = cancel.clone();
    let name_owned = name.to_string();
    let forwarder = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                () = forward_cancel.cancelled() => {
                    drain_then_close(&mut child_rx, &name_owned).await;
                    return;
                }
                event = child_rx.recv() => {
                    match event {
                        Some(StreamEvent::InputReceived) => {}
                        Some(event) => parent_sink.send(event).await,
                        None => return,
                    }
                }
            }
        }
    });

    let outcome = streaming.execute_stream(task, cancel, child_sink).await;
    forwarder.abort();
    outcome
}

/// Drain whatever the subagent still has buffered, up to
/// [`SUBAGENT_DRAIN_TIMEOUT`], then drop the receiver so any further send
/// from a misbehaving subagent returns `Err` instead of hanging forever.
async fn drain_then_close(rx: &mut tokio::sync::mpsc::Receiver<StreamEvent>, name: &str) {
    let drained = tokio::time::timeout(SUBAGENT_DRAIN_TIMEOUT, async {
        while rx.recv().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(subagent = name, "subagent stream drain timed out after cancellation; force-closing");
    }
}

#[async_trait]
impl Dispatcher for NetworkDispatcher {
    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs = self.inner.tool_definitions();
        for (name, agent) in &self.subagents {
            defs.push(ToolDefinition {
                name: Self::agent_tool_name(name),
                description: format!("Delegate to the '{name}' subagent: {}", agent.description()),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "task": {
                            "type": "string",
                            "description": "the user's original message, copied verbatim"
                        }
                    },
                    "required": ["task"]
                }),
            });
        }
        defs
    }

    async fn dispatch(&self, call: &ToolCall, cx: &DispatchCx) -> ToolResult {
        if let Some(name) = call.name.strip_prefix(AGENT_TOOL_PREFIX) {
            if let Some(agent) = self.subagents.get(name) {
                return self.dispatch_subagent(name, agent, call, cx).await;
            }
        }
        self.inner.dispatch(call, cx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{ChatRequest, ChatResponse};
    use crate::usage::Usage;
    use std::sync::Mutex as StdMutex;

    struct Echo;
    #[async_trait]
    impl Agent for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes the task back"
        }
        async fn execute(&self, task: &AgentTask, _cancel: CancellationToken) -> Result<Outcome<AgentResult>> {
            Ok(Outcome::Done(AgentResult {
                output: format!("echoed: {}", task.input),
                ..Default::default()
            }))
        }
    }

    struct RouterProvider {
        responses: StdMutex<Vec<ChatResponse>>,
    }
    #[async_trait]
    impl crate::request::Provider for RouterProvider {
        async fn chat(&self, _req: &ChatRequest) -> Result<ChatResponse> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(ChatResponse::text("done", Usage::zero()))
            } else {
                Ok(responses.remove(0))
            }
        }
    }

    fn inner_dispatcher() -> Arc<dyn Dispatcher> {
        CoreDispatcher::new_dyn(Arc::new(crate::tool::ToolRegistry::builder().build()), None, None, false, false)
    }

    #[test]
    fn tool_definitions_expose_agent_prefixed_subagent_names_in_name_order() {
        let dispatcher = NetworkDispatcher {
            inner: inner_dispatcher(),
            subagents: {
                let mut m: BTreeMap<String, Arc<dyn Agent>> = BTreeMap::new();
                m.insert("zebra".into(), Arc::new(Echo));
                m.insert("alpha".into(), Arc::new(Echo));
                m
            },
        };
        let names: Vec<String> = dispatcher.tool_definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["agent_alpha", "agent_zebra"]);
    }

    #[tokio::test]
    async fn dispatch_routes_to_named_subagent_and_strips_prefix() {
        let dispatcher = NetworkDispatcher {
            inner: inner_dispatcher(),
            subagents: {
                let mut m: BTreeMap<String, Arc<dyn Agent>> = BTreeMap::new();
                m.insert("echo".into(), Arc::new(Echo));
                m
            },
        };
        let call = ToolCall::new("1", "agent_echo", serde_json::json!({"task": "say hello"}));
        let cx = DispatchCx::new(CancellationToken::new(), None);
        let result = dispatcher.dispatch(&call, &cx).await;
        assert!(!result.is_error);
        assert_eq!(result.content, "echoed: say hello");
        assert_eq!(result.kind, StepKind::Agent);
    }

    #[tokio::test]
    async fn dispatch_falls_through_to_inner_for_non_agent_calls() {
        let dispatcher = NetworkDispatcher {
            inner: inner_dispatcher(),
            subagents: BTreeMap::new(),
        };
        let call = ToolCall::new("1", "nope", serde_json::json!({}));
        let cx = DispatchCx::new(CancellationToken::new(), None);
        let result = dispatcher.dispatch(&call, &cx).await;
        assert!(result.is_error);
        assert!(result.content.contains("unknown tool"));
    }

    #[tokio::test]
    async fn unknown_subagent_name_falls_through_to_inner_as_unknown_tool() {
        let dispatcher = NetworkDispatcher {
            inner: inner_dispatcher(),
            subagents: BTreeMap::new(),
        };
        let call = ToolCall::new("1", "agent_ghost", serde_json::json!({"task": "x"}));
        let cx = DispatchCx::new(CancellationToken::new(), None);
        let result = dispatcher.dispatch(&call, &cx).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn network_execute_runs_router_loop_and_delegates() {
        let call = ToolCall::new("1", "agent_echo", serde_json::json!({"task": "say hello"}));
        let first = ChatResponse {
            tool_calls: vec![call],
            ..Default::default()
        };
        let provider = Arc::new(RouterProvider {
            responses: StdMutex::new(vec![
                first,
                ChatResponse::text("The echo agent said: echoed: say hello", Usage::zero()),
            ]),
        });
        let network = Network::builder(
            "router",
            provider as Arc<dyn crate::request::Provider>,
            "route to the right subagent",
            inner_dispatcher(),
        )
        .subagent("echo", Arc::new(Echo))
        .build();
        let outcome = network
            .execute(&AgentTask::new("say hello"), CancellationToken::new())
            .await
            .unwrap();
        match outcome {
            Outcome::Done(result) => {
                assert_eq!(result.output, "The echo agent said: echoed: say hello");
                assert_eq!(result.steps.len(), 1);
                assert_eq!(result.steps[0].kind, StepKind::Agent);
            }
            Outcome::Suspended(_) => panic!("expected Done"),
        }
    }
}
