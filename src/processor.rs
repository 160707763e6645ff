//! Processor chain (§4.2): ordered pre/post/post-tool hooks that can mutate,
//! halt, or suspend an execution.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::message::ToolCall;
use crate::request::{ChatRequest, ChatResponse};
use crate::task::AgentResult;
use crate::tool::ToolPayload;

/// What a processor hook asked the loop to do, besides continuing normally.
#[derive(Debug, Clone)]
pub enum ProcessorOutcome {
    /// Stop the chain and return `response` as the final agent output,
    /// gracefully — no error surfaces to the caller.
    Halt(AgentResult),
    /// Stop execution and surface a new suspension carrying `payload`.
    /// Only ever produced by the [`suspend`] helper.
    Suspend(Value),
}

/// Build a [`ProcessorOutcome::Suspend`]. The dedicated helper (rather than
/// a bare enum variant) exists so grep/documentation can treat "suspend" as
/// a single well-known operation, matching §4.2's "produced only by the
/// `Suspend(payload)` helper" framing.
#[must_use]
pub fn suspend(payload: Value) -> ProcessorOutcome {
    ProcessorOutcome::Suspend(payload)
}

/// Build a [`ProcessorOutcome::Halt`].
#[must_use]
pub fn halt(result: AgentResult) -> ProcessorOutcome {
    ProcessorOutcome::Halt(result)
}

/// A hook invoked at a fixed phase of each loop iteration.
///
/// Every method defaults to a no-op `Ok(None)`, so a processor implementing
/// only one phase pays nothing for the others — there is no runtime
/// type-assertion step to "skip" the way a dynamically-typed host language
/// would need.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Name used in tracing spans and in a `Suspended`'s `step` field.
    fn name(&self) -> &str;

    /// Runs before the request is sent to the provider; may mutate it.
    async fn pre_llm(&self, _req: &mut ChatRequest) -> Result<Option<ProcessorOutcome>> {
        Ok(None)
    }

    /// Runs after a provider response arrives; may mutate it (mask content,
    /// strip tool calls, inject thinking).
    async fn post_llm(&self, _resp: &mut ChatResponse) -> Result<Option<ProcessorOutcome>> {
        Ok(None)
    }

    /// Runs after a tool call result is produced; may mutate it.
    async fn post_tool(
        &self,
        _call: &ToolCall,
        _result: &mut ToolPayload,
    ) -> Result<Option<ProcessorOutcome>> {
        Ok(None)
    }
}

/// What the chain did after running every processor for a phase.
pub enum ChainOutcome {
    /// All processors ran; the phase's in/out value may have been mutated.
    Continue,
    /// A processor halted the execution.
    Halt(AgentResult),
    /// A processor requested a suspension.
    Suspend {
        /// Name of the processor (and hook phase) that suspended.
        step: String,
        /// The JSON payload it attached.
        payload: Value,
    },
}

/// An ordered, immutable sequence of [`Processor`]s.
#[derive(Clone, Default)]
pub struct ProcessorChain {
    processors: Vec<std::sync::Arc<dyn Processor>>,
}

impl std::fmt::Debug for ProcessorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.processors.iter().map(|p| p.name()))
            .finish()
    }
}

impl ProcessorChain {
    /// Build a chain from an ordered list of processors.
    #[must_use]
    pub fn new(processors: Vec<std::sync::Arc<dyn Processor>>) -> Self {
        Self { processors }
    }

    /// Whether the chain has no processors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Run every processor's `pre_llm` hook in order.
    pub async fn run_pre_llm(&self, req: &mut ChatRequest) -> Result<ChainOutcome> {
        for processor in &self.processors {
            if let Some(outcome) = processor.pre_llm(req).await? {
                return Ok(Self::classify(processor.name(), outcome));
            }
        }
        Ok(ChainOutcome::Continue)
    }

    /// Run every processor's `post_llm` hook in order.
    pub async fn run_post_llm(&self, resp: &mut ChatResponse) -> Result<ChainOutcome> {
        for processor in &self.processors {
            if let Some(outcome) = processor.post_llm(resp).await? {
                return Ok(Self::classify(processor.name(), outcome));
            }
        }
        Ok(ChainOutcome::Continue)
    }

    /// Run every processor's `post_tool` hook in order.
    pub async fn run_post_tool(
        &self,
        call: &ToolCall,
        result: &mut ToolPayload,
    ) -> Result<ChainOutcome> {
        for processor in &self.processors {
            if let Some(outcome) = processor.post_tool(call, result).await? {
                return Ok(Self::classify(processor.name(), outcome));
            }
        }
        Ok(ChainOutcome::Continue)
    }

    fn classify(step: &str, outcome: ProcessorOutcome) -> ChainOutcome {
        match outcome {
            ProcessorOutcome::Halt(result) => ChainOutcome::Halt(result),
            ProcessorOutcome::Suspend(payload) => ChainOutcome::Suspend {
                step: step.to_string(),
                payload,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ChatMessage;
    use std::sync::Arc;

    struct Noop;
    #[async_trait]
    impl Processor for Noop {
        fn name(&self) -> &str {
            "noop"
        }
    }

    struct Suspender;
    #[async_trait]
    impl Processor for Suspender {
        fn name(&self) -> &str {
            "suspender"
        }
        async fn post_llm(&self, _resp: &mut ChatResponse) -> Result<Option<ProcessorOutcome>> {
            Ok(Some(suspend(serde_json::json!({"confirm": "delete?"}))))
        }
    }

    #[tokio::test]
    async fn processor_with_no_matching_phase_is_a_free_no_op() {
        let chain = ProcessorChain::new(vec![Arc::new(Noop)]);
        let mut req = ChatRequest::new(vec![ChatMessage::user("hi")]);
        assert!(matches!(chain.run_pre_llm(&mut req).await.unwrap(), ChainOutcome::Continue));
    }

    #[tokio::test]
    async fn suspend_outcome_carries_processor_name_as_step() {
        let chain = ProcessorChain::new(vec![Arc::new(Noop), Arc::new(Suspender)]);
        let mut resp = ChatResponse::default();
        match chain.run_post_llm(&mut resp).await.unwrap() {
            ChainOutcome::Suspend { step, payload } => {
                assert_eq!(step, "suspender");
                assert_eq!(payload["confirm"], "delete?");
            }
            _ => panic!("expected suspend"),
        }
    }
}
