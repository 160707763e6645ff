//! `AgentTask` / `AgentResult` / `StepTrace`: the engine's outward-facing
//! per-execution data.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::Attachment;
use crate::text::truncate_chars;
use crate::usage::Usage;

/// Reserved [`AgentTask::context`] key for the logical conversation id.
pub const CONTEXT_THREAD_ID: &str = "thread_id";
/// Reserved [`AgentTask::context`] key for the calling user's id.
pub const CONTEXT_USER_ID: &str = "user_id";
/// Reserved [`AgentTask::context`] key for the calling chat/channel id.
pub const CONTEXT_CHAT_ID: &str = "chat_id";

/// Maximum chars kept for a [`StepTrace::input`] summary.
pub const STEP_INPUT_CHARS: usize = 200;
/// Maximum chars kept for a [`StepTrace::output`] summary.
pub const STEP_OUTPUT_CHARS: usize = 500;

/// A caller's request to an [`crate::agent::Agent`]. Immutable for the
/// duration of one execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentTask {
    /// The user-facing input text.
    pub input: String,
    /// Attachments accompanying the input.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Freeform context, including the reserved `thread_id`/`user_id`/`chat_id` keys.
    #[serde(default)]
    pub context: HashMap<String, Value>,
}

impl AgentTask {
    /// Build a task from input text alone.
    #[must_use]
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            attachments: Vec::new(),
            context: HashMap::new(),
        }
    }

    /// Attach files to this task (builder-style).
    #[must_use]
    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Set a context entry (builder-style).
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// The `thread_id` context key, read as `""` if absent or non-string.
    #[must_use]
    pub fn thread_id(&self) -> String {
        self.context_str(CONTEXT_THREAD_ID)
    }

    /// The `user_id` context key, read as `""` if absent or non-string.
    #[must_use]
    pub fn user_id(&self) -> String {
        self.context_str(CONTEXT_USER_ID)
    }

    /// The `chat_id` context key, read as `""` if absent or non-string.
    #[must_use]
    pub fn chat_id(&self) -> String {
        self.context_str(CONTEXT_CHAT_ID)
    }

    fn context_str(&self, key: &str) -> String {
        match self.context.get(key) {
            Some(Value::String(s)) => s.clone(),
            _ => String::new(),
        }
    }
}

/// What kind of unit a [`StepTrace`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// A plain tool call.
    Tool,
    /// A subagent delegation.
    Agent,
}

/// A record of one tool/subagent call made during an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepTrace {
    /// Tool or subagent name.
    pub name: String,
    /// Which kind of step this was.
    pub kind: StepKind,
    /// Truncated view of the call's input (≤ [`STEP_INPUT_CHARS`] chars).
    pub input: String,
    /// Truncated view of the call's output (≤ [`STEP_OUTPUT_CHARS`] chars).
    pub output: String,
    /// Usage attributable to this step (zero for plain tools with no model call).
    pub usage: Usage,
    /// Wall-clock duration of the call.
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

impl StepTrace {
    /// Build a trace, truncating `input`/`output` to their budgeted lengths.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        kind: StepKind,
        input: &str,
        output: &str,
        usage: Usage,
        duration: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            input: truncate_chars(input, STEP_INPUT_CHARS),
            output: truncate_chars(output, STEP_OUTPUT_CHARS),
            usage,
            duration,
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u128(d.as_millis())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

/// The final output of one agent execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentResult {
    /// The final answer text.
    pub output: String,
    /// Optional "thinking"/reasoning trace from the last provider response that carried one.
    pub thinking: Option<String>,
    /// Attachments accumulated across the execution.
    pub attachments: Vec<Attachment>,
    /// Usage accumulated across every provider call in the execution.
    pub usage: Usage,
    /// Per-call step traces, in call order.
    pub steps: Vec<StepTrace>,
}
