//! The shared execution loop (§4.5): the tool-calling iteration every
//! `LLMAgent` and `Network` drives.

pub mod compression;

use std::sync::Arc;

use serde_json::Value;
use tracing::instrument;

use crate::cancel::CancellationToken;
use crate::config::LoopConfig;
use crate::dispatch::{dispatch_all, DispatchCx};
use crate::error::{Error, Result};
use crate::message::{Attachment, ChatMessage};
use crate::processor::ChainOutcome;
use crate::request::ChatRequest;
use crate::stream::{StreamEvent, StreamSink};
use crate::suspend::{ResumeFn, Suspended};
use crate::task::{AgentResult, AgentTask, StepKind, StepTrace};
use crate::text::{char_len, truncate_with_marker};
use crate::tool::ToolPayload;
use crate::usage::Usage;

/// Chars a tool-result message is truncated to before joining the running
/// transcript (§4.5 step 7).
const MESSAGE_TRUNCATE_CHARS: usize = 100_000;

/// Prefix marking the system message a resumed execution injects so
/// processors can observe the data a caller resumed with.
pub const RESUME_DATA_PREFIX: &str = "[resume data]\n";

/// Resolved outcome of one agent execution: either a finished result or a
/// processor-requested suspension. Kept out of [`crate::error::Error`] so a
/// stray `?` can never silently swallow a suspend — see that type's doc
/// comment.
#[derive(Debug)]
pub enum Outcome<T> {
    /// The execution completed normally — including the halted-by-processor
    /// and forced-synthesis-at-`max_iter` paths.
    Done(T),
    /// A processor suspended the execution. Call [`Suspended::resume`] (or
    /// [`Suspended::release`]) to continue or discard it.
    Suspended(Arc<Suspended>),
}

/// Working state threaded through one loop execution.
struct LoopState {
    messages: Vec<ChatMessage>,
    usage: Usage,
    attachments: Vec<Attachment>,
    attachment_bytes: u64,
    steps: Vec<StepTrace>,
    subagent_fallback: Option<String>,
    subagent_already_streamed: bool,
}

impl LoopState {
    fn fresh(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            usage: Usage::zero(),
            attachments: Vec::new(),
            attachment_bytes: 0,
            steps: Vec::new(),
            subagent_fallback: None,
            subagent_already_streamed: false,
        }
    }
}

/// Run the shared loop from a freshly built message sequence: `system_prompt`
/// followed by whatever `config.memory` contributes (facts context, trimmed
/// history, cross-thread recall), followed by the task's input.
#[instrument(skip_all, fields(agent = %config.name))]
pub async fn run(
    config: &LoopConfig,
    task: &AgentTask,
    system_prompt: &str,
    cancel: CancellationToken,
    sink: Option<StreamSink>,
) -> Result<Outcome<AgentResult>> {
    if let Some(sink) = &sink {
        sink.send(StreamEvent::InputReceived).await;
    }
    let messages = build_initial_messages(config, task, system_prompt).await;
    run_from(config, task, cancel, sink, LoopState::fresh(messages)).await
}

/// Resume a previously suspended execution from its captured message
/// snapshot, injecting `resume_data` as an observable system message.
pub async fn resume_from_snapshot(
    config: &LoopConfig,
    task: &AgentTask,
    cancel: CancellationToken,
    sink: Option<StreamSink>,
    mut snapshot_messages: Vec<ChatMessage>,
    resume_data: Value,
) -> Result<Outcome<AgentResult>> {
    snapshot_messages.push(ChatMessage::system(format!("{RESUME_DATA_PREFIX}{resume_data}")));
    run_from(config, task, cancel, sink, LoopState::fresh(snapshot_messages)).await
}

async fn build_initial_messages(config: &LoopConfig, task: &AgentTask, system_prompt: &str) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(system_prompt)];
    if let Some(memory) = &config.memory {
        messages.extend(memory.build_read_context(&task.thread_id(), &task.input).await);
    }
    messages.push(current_user_message(task));
    messages
}

fn current_user_message(task: &AgentTask) -> ChatMessage {
    if task.attachments.is_empty() {
        ChatMessage::user(task.input.clone())
    } else {
        ChatMessage::user_with_attachments(task.input.clone(), task.attachments.clone())
    }
}

async fn run_from(
    config: &LoopConfig,
    task: &AgentTask,
    cancel: CancellationToken,
    sink: Option<StreamSink>,
    mut state: LoopState,
) -> Result<Outcome<AgentResult>> {
    for _iteration in 0..config.budgets.max_iter {
        if cancel.is_cancelled() {
            if let Some(sink) = &sink {
                sink.close().await;
            }
            return Err(Error::cancelled(cancel.reason().unwrap_or_else(|| "cancelled".to_string())));
        }

        let mut req = ChatRequest {
            messages: state.messages.clone(),
            tools: config.dispatcher.tool_definitions(),
            response_schema: config.response_schema.clone(),
            generation_params: config.generation_params,
        };

        match config.processors.run_pre_llm(&mut req).await {
            Ok(ChainOutcome::Continue) => {}
            Ok(ChainOutcome::Halt(result)) => return finish_halted(&sink, result).await,
            Ok(ChainOutcome::Suspend { step, payload }) => {
                return checkpoint_suspend(config, task, &cancel, &sink, &state, step, payload).await;
            }
            Err(e) => return finish_err(&sink, e).await,
        }

        if let Some(sink) = &sink {
            sink.send(StreamEvent::ProcessingStart).await;
        }

        let response_result = if req.tools.is_empty() {
            match &sink {
                Some(sink) => config.provider.chat_stream(&req, sink).await,
                None => config.provider.chat(&req).await,
            }
        } else {
            config.provider.chat(&req).await
        };

        let mut response = match response_result {
            Ok(r) => r,
            Err(e) => return finish_err(&sink, e).await,
        };

        state.usage += response.usage;

        match config.processors.run_post_llm(&mut response).await {
            Ok(ChainOutcome::Continue) => {}
            Ok(ChainOutcome::Halt(result)) => return finish_halted(&sink, result).await,
            Ok(ChainOutcome::Suspend { step, payload }) => {
                return checkpoint_suspend(config, task, &cancel, &sink, &state, step, payload).await;
            }
            Err(e) => return finish_err(&sink, e).await,
        }

        if let Some(thinking) = &response.thinking {
            if let Some(sink) = &sink {
                sink.send(StreamEvent::Thinking { content: thinking.clone() }).await;
            }
        }

        if response.tool_calls.is_empty() {
            let mut output = response.text.clone();
            if output.is_empty() {
                if let Some(fallback) = &state.subagent_fallback {
                    output = fallback.clone();
                }
            }
            if !state.subagent_already_streamed {
                if let Some(sink) = &sink {
                    sink.send(StreamEvent::TextDelta { content: output.clone() }).await;
                }
            }
            let result = AgentResult {
                output,
                thinking: response.thinking.clone(),
                attachments: state.attachments.clone(),
                usage: state.usage,
                steps: state.steps.clone(),
            };
            persist_memory(config, task, &result).await;
            if let Some(sink) = &sink {
                sink.close().await;
            }
            return Ok(Outcome::Done(result));
        }

        state
            .messages
            .push(ChatMessage::assistant_tool_calls(response.text.clone(), response.tool_calls.clone()));

        if let Some(sink) = &sink {
            for call in &response.tool_calls {
                sink.send(StreamEvent::ToolCallStart {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    args: call.arguments.clone(),
                })
                .await;
                if let Some(name) = call.name.strip_prefix("agent_") {
                    sink.send(StreamEvent::RoutingDecision {
                        name: name.to_string(),
                        content: call.arguments.to_string(),
                    })
                    .await;
                }
            }
        }

        let dispatch_cx = DispatchCx::new(cancel.clone(), sink.clone()).with_task(Arc::new(task.clone()));
        let results = dispatch_all(Arc::clone(&config.dispatcher), &response.tool_calls, dispatch_cx).await;

        for (call, mut result) in response.tool_calls.iter().zip(results) {
            if let Some(sink) = &sink {
                sink.send(StreamEvent::ToolCallResult {
                    id: result.call_id.clone(),
                    name: result.name.clone(),
                    content: result.content.clone(),
                    usage: result.usage,
                    duration: result.duration,
                })
                .await;
            }

            state.steps.push(StepTrace::new(
                &result.name,
                result.kind,
                &call.arguments.to_string(),
                &result.content,
                result.usage,
                result.duration,
            ));
            state.usage += result.usage;

            for attachment in result.attachments.drain(..) {
                if state.attachments.len() >= config.budgets.max_accumulated_attachments {
                    break;
                }
                let bytes = attachment.budget_bytes();
                if state.attachment_bytes.saturating_add(bytes) > config.budgets.max_attachment_bytes {
                    continue;
                }
                state.attachment_bytes += bytes;
                state.attachments.push(attachment);
            }

            let mut payload = ToolPayload {
                content: result.content.clone(),
                attachments: Vec::new(),
            };
            match config.processors.run_post_tool(call, &mut payload).await {
                Ok(ChainOutcome::Continue) => {}
                Ok(ChainOutcome::Halt(r)) => return finish_halted(&sink, r).await,
                Ok(ChainOutcome::Suspend { step, payload }) => {
                    return checkpoint_suspend(config, task, &cancel, &sink, &state, step, payload).await;
                }
                Err(e) => return finish_err(&sink, e).await,
            }

            let truncated = truncate_with_marker(&payload.content, MESSAGE_TRUNCATE_CHARS);
            state
                .messages
                .push(ChatMessage::tool_result(result.call_id.clone(), truncated, result.is_error));

            if result.kind == StepKind::Agent && !result.is_error {
                state.subagent_fallback = Some(result.content.clone());
                if sink.is_some() {
                    state.subagent_already_streamed = true;
                }
            }
        }

        let total_chars: usize = state.messages.iter().map(|m| char_len(&m.content)).sum();
        if total_chars > config.budgets.compress_threshold {
            compression::maybe_compress(&mut state.messages, config.compression_provider().as_ref()).await;
        }
    }

    forced_synthesis(config, task, &cancel, &sink, state).await
}

#[instrument(skip_all, fields(agent = %config.name, forced = true))]
async fn forced_synthesis(
    config: &LoopConfig,
    task: &AgentTask,
    cancel: &CancellationToken,
    sink: &Option<StreamSink>,
    mut state: LoopState,
) -> Result<Outcome<AgentResult>> {
    state.messages.push(ChatMessage::user(
        "You have used all available tool calls. Summarize what you found and give your final answer now.",
    ));

    let req = ChatRequest {
        messages: state.messages.clone(),
        tools: Vec::new(),
        response_schema: config.response_schema.clone(),
        generation_params: config.generation_params,
    };
    let response_result = match sink {
        Some(sink) => config.provider.chat_stream(&req, sink).await,
        None => config.provider.chat(&req).await,
    };
    let mut response = match response_result {
        Ok(r) => r,
        Err(e) => return finish_err(sink, e).await,
    };
    state.usage += response.usage;

    match config.processors.run_post_llm(&mut response).await {
        Ok(ChainOutcome::Continue) => {}
        Ok(ChainOutcome::Halt(result)) => return finish_halted(sink, result).await,
        Ok(ChainOutcome::Suspend { step, payload }) => {
            return checkpoint_suspend(config, task, cancel, sink, &state, step, payload).await;
        }
        Err(e) => return finish_err(sink, e).await,
    }

    let mut output = response.text.clone();
    if output.is_empty() {
        if let Some(fallback) = &state.subagent_fallback {
            output = fallback.clone();
        }
    }
    if !state.subagent_already_streamed {
        if let Some(sink) = sink {
            sink.send(StreamEvent::TextDelta { content: output.clone() }).await;
        }
    }

    let result = AgentResult {
        output,
        thinking: response.thinking.clone(),
        attachments: state.attachments.clone(),
        usage: state.usage,
        steps: state.steps.clone(),
    };
    persist_memory(config, task, &result).await;
    if let Some(sink) = sink {
        sink.close().await;
    }
    Ok(Outcome::Done(result))
}

async fn checkpoint_suspend(
    config: &LoopConfig,
    task: &AgentTask,
    cancel: &CancellationToken,
    sink: &Option<StreamSink>,
    state: &LoopState,
    step: String,
    payload: Value,
) -> Result<Outcome<AgentResult>> {
    let snapshot = state.messages.clone();
    let snapshot_bytes: u64 = snapshot.iter().map(|m| m.byte_size() as u64).sum();
    let budgets = &config.budgets;

    if !config
        .suspend_budget
        .try_reserve(snapshot_bytes, budgets.max_suspend_snapshots, budgets.max_suspend_bytes)
    {
        return finish_err(sink, Error::internal(format!("suspend budget exceeded at step '{step}'"))).await;
    }

    let config_clone = config.clone();
    let task_clone = task.clone();
    let cancel_clone = cancel.clone();
    let sink_clone = sink.clone();
    let resume_fn: ResumeFn = Box::new(move |data: Value| {
        Box::pin(async move {
            resume_from_snapshot(&config_clone, &task_clone, cancel_clone, sink_clone, snapshot, data).await
        })
    });

    let suspended = Suspended::new(step, payload, snapshot_bytes, resume_fn, Arc::clone(&config.suspend_budget));
    if let Some(ttl) = config.budgets.suspend_ttl {
        suspended.with_suspend_ttl(ttl);
    }
    if let Some(sink) = sink {
        sink.close().await;
    }
    Ok(Outcome::Suspended(suspended))
}

async fn persist_memory(config: &LoopConfig, task: &AgentTask, result: &AgentResult) {
    let Some(memory) = &config.memory else {
        return;
    };
    memory
        .spawn_write(
            task.thread_id(),
            current_user_message(task),
            ChatMessage::assistant(result.output.clone()),
            result.attachments.clone(),
        )
        .await;
}

async fn finish_halted(sink: &Option<StreamSink>, result: AgentResult) -> Result<Outcome<AgentResult>> {
    if let Some(sink) = sink {
        sink.close().await;
    }
    Ok(Outcome::Done(result))
}

async fn finish_err(sink: &Option<StreamSink>, err: Error) -> Result<Outcome<AgentResult>> {
    if let Some(sink) = sink {
        sink.close().await;
    }
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Budgets, LoopConfig};
    use crate::dispatch::CoreDispatcher;
    use crate::message::{Role, ToolCall};
    use crate::request::{ChatResponse, Provider};
    use crate::tool::{Tool, ToolDefinition, ToolError, ToolPayload as Payload, ToolRegistry};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    struct ScriptedProvider {
        responses: StdMutex<Vec<ChatResponse>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<ChatResponse>) -> Self {
            Self {
                responses: StdMutex::new(responses),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn chat(&self, _req: &ChatRequest) -> Result<ChatResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(ChatResponse::text("done", Usage::zero()))
            } else {
                Ok(responses.remove(0))
            }
        }
    }

    struct Echo;
    #[async_trait]
    impl Tool for Echo {
        fn definitions(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition {
                name: "echo".into(),
                description: "echo".into(),
                parameters: serde_json::json!({"type": "object"}),
            }]
        }
        async fn execute(&self, _name: &str, args: Value) -> std::result::Result<Payload, ToolError> {
            Ok(Payload::text(args.to_string()))
        }
    }

    fn dispatcher_with_echo() -> Arc<dyn crate::dispatch::Dispatcher> {
        let registry = Arc::new(ToolRegistry::builder().tool(Arc::new(Echo)).build());
        Arc::new(CoreDispatcher::new(registry, None, None, false, false))
    }

    #[tokio::test]
    async fn happy_path_returns_final_text_with_no_tool_calls() {
        let provider = Arc::new(ScriptedProvider::new(vec![ChatResponse::text("hello there", Usage::new(3, 4))]));
        let config = LoopConfig::builder(provider, dispatcher_with_echo()).build();
        let task = AgentTask::new("hi");
        let outcome = run(&config, &task, "you are helpful", CancellationToken::new(), None)
            .await
            .unwrap();
        match outcome {
            Outcome::Done(result) => {
                assert_eq!(result.output, "hello there");
                assert_eq!(result.usage, Usage::new(3, 4));
            }
            Outcome::Suspended(_) => panic!("expected Done"),
        }
    }

    #[tokio::test]
    async fn tool_call_round_trip_then_final_answer() {
        let call = ToolCall::new("1", "echo", serde_json::json!({"x": 1}));
        let first = ChatResponse {
            tool_calls: vec![call],
            usage: Usage::new(1, 1),
            ..Default::default()
        };
        let second = ChatResponse::text("final answer", Usage::new(2, 2));
        let provider = Arc::new(ScriptedProvider::new(vec![first, second]));
        let config = LoopConfig::builder(provider, dispatcher_with_echo()).build();
        let task = AgentTask::new("do it");
        let outcome = run(&config, &task, "sys", CancellationToken::new(), None).await.unwrap();
        match outcome {
            Outcome::Done(result) => {
                assert_eq!(result.output, "final answer");
                assert_eq!(result.steps.len(), 1);
                assert_eq!(result.usage, Usage::new(3, 3));
            }
            Outcome::Suspended(_) => panic!("expected Done"),
        }
    }

    #[tokio::test]
    async fn max_iterations_forces_synthesis() {
        let call = ToolCall::new("1", "echo", serde_json::json!({}));
        let looping_response = || ChatResponse {
            tool_calls: vec![call.clone()],
            ..Default::default()
        };
        let mut responses: Vec<ChatResponse> = std::iter::repeat_with(looping_response).take(3).collect();
        responses.push(ChatResponse::text("done", Usage::zero()));
        let provider = Arc::new(ScriptedProvider::new(responses));
        let config = LoopConfig::builder(
            provider,
            dispatcher_with_echo(),
        )
        .budgets(Budgets {
            max_iter: 3,
            ..Budgets::default()
        })
        .build();
        let task = AgentTask::new("loop forever");
        let outcome = run(&config, &task, "sys", CancellationToken::new(), None).await.unwrap();
        match outcome {
            Outcome::Done(result) => assert_eq!(result.output, "done"),
            Outcome::Suspended(_) => panic!("expected Done"),
        }
    }

    #[tokio::test]
    async fn cancellation_before_first_iteration_errors() {
        let provider = Arc::new(ScriptedProvider::new(vec![ChatResponse::text("never", Usage::zero())]));
        let config = LoopConfig::builder(provider, dispatcher_with_echo()).build();
        let task = AgentTask::new("hi");
        let cancel = CancellationToken::new();
        cancel.cancel("shutting down");
        let result = run(&config, &task, "sys", cancel, None).await;
        assert!(matches!(result, Err(Error::Cancelled { .. })));
    }

    #[tokio::test]
    async fn suspend_from_post_llm_returns_suspended_outcome() {
        use crate::processor::{suspend, ProcessorOutcome};
        use crate::request::ChatResponse as Resp;

        struct Suspender;
        #[async_trait]
        impl crate::processor::Processor for Suspender {
            fn name(&self) -> &str {
                "approval"
            }
            async fn post_llm(&self, _resp: &mut Resp) -> Result<Option<ProcessorOutcome>> {
                Ok(Some(suspend(serde_json::json!({"confirm": "proceed?"}))))
            }
        }

        let provider = Arc::new(ScriptedProvider::new(vec![ChatResponse::text("about to act", Usage::zero())]));
        let config = LoopConfig::builder(provider, dispatcher_with_echo())
            .processors(crate::processor::ProcessorChain::new(vec![Arc::new(Suspender)]))
            .build();
        let task = AgentTask::new("do the risky thing");
        let outcome = run(&config, &task, "sys", CancellationToken::new(), None).await.unwrap();
        match outcome {
            Outcome::Suspended(suspended) => {
                assert_eq!(suspended.step(), "approval");
                assert_eq!(suspended.payload()["confirm"], "proceed?");
            }
            Outcome::Done(_) => panic!("expected Suspended"),
        }
    }

    #[tokio::test]
    async fn resuming_continues_from_the_snapshot() {
        use crate::processor::{suspend, ProcessorOutcome};
        use crate::request::ChatResponse as Resp;
        use std::sync::atomic::AtomicBool;

        struct SuspendOnce {
            fired: AtomicBool,
        }
        #[async_trait]
        impl crate::processor::Processor for SuspendOnce {
            fn name(&self) -> &str {
                "approval"
            }
            async fn post_llm(&self, _resp: &mut Resp) -> Result<Option<ProcessorOutcome>> {
                if self.fired.swap(true, Ordering::SeqCst) {
                    Ok(None)
                } else {
                    Ok(Some(suspend(serde_json::json!({"confirm": "proceed?"}))))
                }
            }
        }

        let provider = Arc::new(ScriptedProvider::new(vec![
            ChatResponse::text("about to act", Usage::zero()),
            ChatResponse::text("resumed and done", Usage::zero()),
        ]));
        let config = LoopConfig::builder(provider, dispatcher_with_echo())
            .processors(crate::processor::ProcessorChain::new(vec![Arc::new(SuspendOnce {
                fired: AtomicBool::new(false),
            })]))
            .build();
        let task = AgentTask::new("do the risky thing");
        let outcome = run(&config, &task, "sys", CancellationToken::new(), None).await.unwrap();
        let suspended = match outcome {
            Outcome::Suspended(s) => s,
            Outcome::Done(_) => panic!("expected Suspended"),
        };
        let resumed = suspended.resume(serde_json::json!("approved")).await.unwrap();
        match resumed {
            Outcome::Done(result) => assert_eq!(result.output, "resumed and done"),
            Outcome::Suspended(_) => panic!("expected Done after resume"),
        }
    }

    #[tokio::test]
    async fn parallel_tool_calls_are_recorded_in_original_order() {
        let calls = vec![
            ToolCall::new("1", "echo", serde_json::json!({"n": 1})),
            ToolCall::new("2", "echo", serde_json::json!({"n": 2})),
            ToolCall::new("3", "echo", serde_json::json!({"n": 3})),
        ];
        let first = ChatResponse {
            tool_calls: calls,
            ..Default::default()
        };
        let provider = Arc::new(ScriptedProvider::new(vec![first, ChatResponse::text("ok", Usage::zero())]));
        let config = LoopConfig::builder(provider, dispatcher_with_echo()).build();
        let task = AgentTask::new("fan out");
        let outcome = run(&config, &task, "sys", CancellationToken::new(), None).await.unwrap();
        match outcome {
            Outcome::Done(result) => {
                assert_eq!(result.steps.len(), 3);
                assert!(result.steps[0].input.contains("\"n\":1"));
                assert!(result.steps[2].input.contains("\"n\":3"));
            }
            Outcome::Suspended(_) => panic!("expected Done"),
        }
    }

    #[test]
    fn current_user_message_role_is_user() {
        let task = AgentTask::new("hi");
        assert_eq!(current_user_message(&task).role, Role::User);
    }

    struct BigAttachment;
    #[async_trait]
    impl Tool for BigAttachment {
        fn definitions(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition {
                name: "big_attachment".into(),
                description: "returns an oversized attachment".into(),
                parameters: serde_json::json!({"type": "object"}),
            }]
        }
        async fn execute(&self, _name: &str, _args: Value) -> std::result::Result<Payload, ToolError> {
            let bytes = vec![0u8; 600 * 1024];
            let mut payload = Payload::text("see attached");
            payload.attachments.push(crate::message::Attachment::bytes("image/png", bytes));
            Ok(payload)
        }
    }

    /// §8 scenario 6: three 600 KiB attachments against a 1 MiB budget must
    /// collapse to exactly one retained attachment, not three.
    #[tokio::test]
    async fn attachment_byte_budget_caps_accumulated_attachments() {
        let calls = vec![
            ToolCall::new("1", "big_attachment", serde_json::json!({})),
            ToolCall::new("2", "big_attachment", serde_json::json!({})),
            ToolCall::new("3", "big_attachment", serde_json::json!({})),
        ];
        let first = ChatResponse {
            tool_calls: calls,
            ..Default::default()
        };
        let provider = Arc::new(ScriptedProvider::new(vec![first, ChatResponse::text("ok", Usage::zero())]));
        let registry = Arc::new(ToolRegistry::builder().tool(Arc::new(BigAttachment)).build());
        let dispatcher = Arc::new(CoreDispatcher::new(registry, None, None, false, false));
        let config = LoopConfig::builder(provider, dispatcher)
            .budgets(Budgets {
                max_attachment_bytes: 1024 * 1024,
                ..Budgets::default()
            })
            .build();
        let task = AgentTask::new("fetch the charts");
        let outcome = run(&config, &task, "sys", CancellationToken::new(), None).await.unwrap();
        match outcome {
            Outcome::Done(result) => assert_eq!(result.attachments.len(), 1),
            Outcome::Suspended(_) => panic!("expected Done"),
        }
    }
}
