//! `LLMAgent` (§4.6): a leaf agent built on the shared loop, owning a tool
//! registry, processor chain, `ask_user`/plan/code wiring, and memory.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cancel::CancellationToken;
use crate::config::{Budgets, LoopConfig};
use crate::dispatch::{CodeRunner, CoreDispatcher, Dispatcher, InputHandler};
use crate::engine::{self, Outcome};
use crate::error::Result;
use crate::memory::AgentMemory;
use crate::processor::ProcessorChain;
use crate::request::{GenerationParams, Provider, ResponseSchema};
use crate::stream::StreamSink;
use crate::suspend::SuspendBudget;
use crate::task::{AgentResult, AgentTask};
use crate::tool::{Tool, ToolRegistry};

use super::{Agent, StreamingAgent};

/// Per-execution override resolved from the task, falling back to the
/// static default when it returns `None` — the "optional dynamic overrides
/// for prompt/model/tools (resolved per-execution from the task)" of §4.6.
pub type PromptResolver = Arc<dyn Fn(&AgentTask) -> Option<String> + Send + Sync>;
/// Per-execution provider ("model") override.
pub type ProviderResolver = Arc<dyn Fn(&AgentTask) -> Option<Arc<dyn Provider>> + Send + Sync>;
/// Per-execution tool-registry override.
pub type ToolsResolver = Arc<dyn Fn(&AgentTask) -> Option<Arc<ToolRegistry>> + Send + Sync>;

/// A leaf agent driving [`engine::run`] directly.
pub struct LLMAgent {
    name: String,
    description: String,
    provider: Arc<dyn Provider>,
    compression_provider: Option<Arc<dyn Provider>>,
    system_prompt: String,
    input_handler: Option<Arc<dyn InputHandler>>,
    code_runner: Option<Arc<dyn CodeRunner>>,
    processors: ProcessorChain,
    memory: Option<Arc<AgentMemory>>,
    budgets: Budgets,
    suspend_budget: Arc<SuspendBudget>,
    response_schema: Option<ResponseSchema>,
    generation_params: Option<GenerationParams>,
    /// Pre-cached at construction (§4.6) when no `tools_resolver` is set —
    /// most executions reuse this `Arc` rather than rebuilding a registry
    /// and dispatcher per call.
    base_dispatcher: Arc<dyn Dispatcher>,
    prompt_resolver: Option<PromptResolver>,
    provider_resolver: Option<ProviderResolver>,
    tools_resolver: Option<ToolsResolver>,
}

impl std::fmt::Debug for LLMAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LLMAgent")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl LLMAgent {
    /// Start building an agent around `provider` and `system_prompt`.
    #[must_use]
    pub fn builder(provider: Arc<dyn Provider>, system_prompt: impl Into<String>) -> LLMAgentBuilder {
        LLMAgentBuilder::new(provider, system_prompt)
    }

    /// This agent's configured budgets (read-only; set via the builder).
    #[must_use]
    pub fn budgets(&self) -> &Budgets {
        &self.budgets
    }

    /// Await every outstanding memory-writer task. Call on shutdown.
    pub async fn drain(&self) {
        if let Some(memory) = &self.memory {
            memory.drain().await;
        }
    }

    fn resolve_prompt(&self, task: &AgentTask) -> String {
        self.prompt_resolver
            .as_ref()
            .and_then(|resolve| resolve(task))
            .unwrap_or_else(|| self.system_prompt.clone())
    }

    fn resolve_dispatcher(&self, task: &AgentTask) -> Arc<dyn Dispatcher> {
        let Some(resolve) = &self.tools_resolver else {
            return Arc::clone(&self.base_dispatcher);
        };
        let Some(registry) = resolve(task) else {
            return Arc::clone(&self.base_dispatcher);
        };
        CoreDispatcher::new_dyn(
            registry,
            self.input_handler.clone(),
            self.code_runner.clone(),
            self.budgets.plan_execution,
            self.budgets.code_execution,
        )
    }

    fn resolve_config(&self, task: &AgentTask) -> LoopConfig {
        let provider = self
            .provider_resolver
            .as_ref()
            .and_then(|resolve| resolve(task))
            .unwrap_or_else(|| Arc::clone(&self.provider));

        let mut builder = LoopConfig::builder(provider, self.resolve_dispatcher(task))
            .processors(self.processors.clone())
            .budgets(self.budgets.clone())
            .suspend_budget(Arc::clone(&self.suspend_budget))
            .name(self.name.clone());
        if let Some(compression_provider) = &self.compression_provider {
            builder = builder.compression_provider(Arc::clone(compression_provider));
        }
        if let Some(memory) = &self.memory {
            builder = builder.memory(Arc::clone(memory));
        }
        if let Some(schema) = &self.response_schema {
            builder = builder.response_schema(schema.clone());
        }
        if let Some(params) = self.generation_params {
            builder = builder.generation_params(params);
        }
        builder.build()
    }
}

#[async_trait]
impl Agent for LLMAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, task: &AgentTask, cancel: CancellationToken) -> Result<Outcome<AgentResult>> {
        let config = self.resolve_config(task);
        let prompt = self.resolve_prompt(task);
        engine::run(&config, task, &prompt, cancel, None).await
    }

    fn as_streaming(&self) -> Option<&dyn StreamingAgent> {
        Some(self)
    }
}

#[async_trait]
impl StreamingAgent for LLMAgent {
    async fn execute_stream(
        &self,
        task: &AgentTask,
        cancel: CancellationToken,
        sink: StreamSink,
    ) -> Result<Outcome<AgentResult>> {
        let config = self.resolve_config(task);
        let prompt = self.resolve_prompt(task);
        engine::run(&config, task, &prompt, cancel, Some(sink)).await
    }
}

/// Fluent builder for [`LLMAgent`].
pub struct LLMAgentBuilder {
    name: String,
    description: String,
    provider: Arc<dyn Provider>,
    compression_provider: Option<Arc<dyn Provider>>,
    system_prompt: String,
    tools: crate::tool::ToolRegistryBuilder,
    input_handler: Option<Arc<dyn InputHandler>>,
    code_runner: Option<Arc<dyn CodeRunner>>,
    processors: ProcessorChain,
    memory: Option<Arc<AgentMemory>>,
    budgets: Budgets,
    suspend_budget: Arc<SuspendBudget>,
    response_schema: Option<ResponseSchema>,
    generation_params: Option<GenerationParams>,
    prompt_resolver: Option<PromptResolver>,
    provider_resolver: Option<ProviderResolver>,
    tools_resolver: Option<ToolsResolver>,
}

impl LLMAgentBuilder {
    /// Start a builder with the required provider and static system prompt;
    /// everything else defaults (no tools, no processors, no memory,
    /// default budgets, a fresh suspend budget, name `"agent"`).
    #[must_use]
    pub fn new(provider: Arc<dyn Provider>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: "agent".to_string(),
            description: String::new(),
            provider,
            compression_provider: None,
            system_prompt: system_prompt.into(),
            tools: ToolRegistry::builder(),
            input_handler: None,
            code_runner: None,
            processors: ProcessorChain::default(),
            memory: None,
            budgets: Budgets::default(),
            suspend_budget: Arc::new(SuspendBudget::new()),
            response_schema: None,
            generation_params: None,
            prompt_resolver: None,
            provider_resolver: None,
            tools_resolver: None,
        }
    }

    /// Set the agent's name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the agent's description (surfaced when this agent is a `Network`
    /// subagent).
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Register a callable tool.
    #[must_use]
    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools = self.tools.tool(tool);
        self
    }

    /// Use a separate provider for compression summarization calls.
    #[must_use]
    pub fn compression_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.compression_provider = Some(provider);
        self
    }

    /// Wire an `InputHandler`, enabling the `ask_user` built-in.
    #[must_use]
    pub fn input_handler(mut self, handler: Arc<dyn InputHandler>) -> Self {
        self.input_handler = Some(handler);
        self
    }

    /// Wire a `CodeRunner` for the `execute_code` built-in.
    #[must_use]
    pub fn code_runner(mut self, runner: Arc<dyn CodeRunner>) -> Self {
        self.code_runner = Some(runner);
        self
    }

    /// Set the processor chain.
    #[must_use]
    pub fn processors(mut self, processors: ProcessorChain) -> Self {
        self.processors = processors;
        self
    }

    /// Wire conversation memory.
    #[must_use]
    pub fn memory(mut self, memory: Arc<AgentMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Override the default budgets (including the `plan_execution` /
    /// `code_execution` toggles).
    #[must_use]
    pub fn budgets(mut self, budgets: Budgets) -> Self {
        self.budgets = budgets;
        self
    }

    /// Share a suspend budget across multiple agents instead of each
    /// getting its own counters (e.g. sibling subagents in a `Network`).
    #[must_use]
    pub fn suspend_budget(mut self, suspend_budget: Arc<SuspendBudget>) -> Self {
        self.suspend_budget = suspend_budget;
        self
    }

    /// Require structured output conforming to `schema`.
    #[must_use]
    pub fn response_schema(mut self, schema: ResponseSchema) -> Self {
        self.response_schema = Some(schema);
        self
    }

    /// Set generation parameters.
    #[must_use]
    pub fn generation_params(mut self, params: GenerationParams) -> Self {
        self.generation_params = Some(params);
        self
    }

    /// Resolve the system prompt per-execution from the task, falling back
    /// to the static prompt when the closure returns `None`.
    #[must_use]
    pub fn prompt_resolver(mut self, resolver: PromptResolver) -> Self {
        self.prompt_resolver = Some(resolver);
        self
    }

    /// Resolve the provider ("model") per-execution from the task.
    #[must_use]
    pub fn provider_resolver(mut self, resolver: ProviderResolver) -> Self {
        self.provider_resolver = Some(resolver);
        self
    }

    /// Resolve the tool registry per-execution from the task. When set, the
    /// agent rebuilds its dispatcher for every execution instead of reusing
    /// the one pre-cached at construction.
    #[must_use]
    pub fn tools_resolver(mut self, resolver: ToolsResolver) -> Self {
        self.tools_resolver = Some(resolver);
        self
    }

    /// Finalize the agent, pre-building its dispatcher from the registered
    /// tools and built-in toggles.
    #[must_use]
    pub fn build(self) -> LLMAgent {
        let registry = Arc::new(self.tools.build());
        let base_dispatcher = CoreDispatcher::new_dyn(
            registry,
            self.input_handler.clone(),
            self.code_runner.clone(),
            self.budgets.plan_execution,
            self.budgets.code_execution,
        );
        LLMAgent {
            name: self.name,
            description: self.description,
            provider: self.provider,
            compression_provider: self.compression_provider,
            system_prompt: self.system_prompt,
            input_handler: self.input_handler,
            code_runner: self.code_runner,
            processors: self.processors,
            memory: self.memory,
            budgets: self.budgets,
            suspend_budget: self.suspend_budget,
            response_schema: self.response_schema,
            generation_params: self.generation_params,
            base_dispatcher,
            prompt_resolver: self.prompt_resolver,
            provider_resolver: self.provider_resolver,
            tools_resolver: self.tools_resolver,
        }
    }
}
