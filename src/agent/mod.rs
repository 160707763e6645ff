//! The `Agent` capability every leaf ([`LLMAgent`](llm_agent::LLMAgent)) and
//! routing ([`Network`](network::Network)) topology implements, and the
//! optional `StreamingAgent` facet a caller can query for (§9 "dynamic
//! interface satisfaction via type assertion" — modeled here as an
//! enumerated capability rather than `dyn Any` downcasting).

pub mod llm_agent;
pub mod network;

pub use llm_agent::LLMAgent;
pub use network::Network;

pub use crate::engine::Outcome;

use async_trait::async_trait;

use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::stream::StreamSink;
use crate::task::{AgentResult, AgentTask};

/// A composable unit of execution: something with a `name`, a
/// `description`, and an `execute(task) -> Outcome<AgentResult>` operation.
///
/// Implemented by [`LLMAgent`] (a leaf agent driving the shared loop
/// directly) and [`Network`] (a router whose subagents are exposed to the
/// model as `agent_<name>` pseudo-tools).
#[async_trait]
pub trait Agent: Send + Sync {
    /// The agent's name, as it should appear in logs, traces, and (for a
    /// `Network` subagent) the `agent_<name>` pseudo-tool.
    fn name(&self) -> &str;

    /// A human-readable description of what this agent does, surfaced in
    /// the pseudo-tool definition when this agent is a `Network` subagent.
    fn description(&self) -> &str;

    /// Run one execution to completion (or suspension). Blocking: no stream
    /// events are emitted. See [`Agent::as_streaming`] for a variant that
    /// does.
    async fn execute(&self, task: &AgentTask, cancel: CancellationToken) -> Result<Outcome<AgentResult>>;

    /// Returns `Some(self)` when this agent also implements
    /// [`StreamingAgent`]. The default `None` is correct for any agent with
    /// no meaningfully different streaming path.
    fn as_streaming(&self) -> Option<&dyn StreamingAgent> {
        None
    }
}

/// The streaming capability facet of [`Agent`]: the same execution, but
/// emitting [`crate::stream::StreamEvent`]s into `sink` as it progresses.
#[async_trait]
pub trait StreamingAgent: Agent {
    /// Run one execution to completion (or suspension), emitting stream
    /// events into `sink`. `sink` is closed exactly once on every exit path.
    async fn execute_stream(
        &self,
        task: &AgentTask,
        cancel: CancellationToken,
        sink: StreamSink,
    ) -> Result<Outcome<AgentResult>>;
}
