//! oasis: a library for composing LLM-backed agents.
//!
//! The crate's core is a single shared tool-calling loop ([`engine::run`])
//! driven by two topologies: [`agent::LLMAgent`], a leaf agent with a tool
//! registry and memory wiring, and [`agent::Network`], a router whose
//! subagents are exposed to the model as `agent_<name>` pseudo-tools. Both
//! implement the [`agent::Agent`] capability, and optionally
//! [`agent::StreamingAgent`] for incremental [`stream::StreamEvent`]
//! delivery.
//!
//! Execution can suspend mid-loop (a [`processor::Processor`] asks a human
//! to approve a step, say) and resume later from a [`suspend::Suspended`]
//! handle; see [`engine::Outcome`].
//!
//! Collaborators — the LLM wire protocol ([`request::Provider`]), tool
//! execution ([`tool::Tool`]), conversation storage
//! ([`memory::Store`]/[`memory::MemoryStore`]), human input
//! ([`dispatch::InputHandler`]), and sandboxed code execution
//! ([`dispatch::CodeRunner`]) — are all `#[async_trait]` contracts this
//! crate consumes but does not implement.

#![warn(missing_docs)]

pub mod agent;
pub mod cancel;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod memory;
pub mod message;
pub mod processor;
pub mod request;
pub mod stream;
pub mod suspend;
pub mod task;
mod text;
pub mod tool;
pub mod usage;

pub use agent::{Agent, StreamingAgent};
pub use config::{Budgets, LoopConfig};
pub use engine::Outcome;
pub use error::{Error, Result};
pub use task::{AgentResult, AgentTask, StepKind, StepTrace};
