//! `ChatRequest`/`ChatResponse` and the `Provider` contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::message::{Attachment, ChatMessage, ToolCall};
use crate::stream::{StreamEvent, StreamSink};
use crate::tool::ToolDefinition;
use crate::usage::Usage;

/// A JSON-Schema response format the model should conform to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseSchema {
    /// Name of the schema (providers vary in whether this is required).
    pub name: String,
    /// The JSON Schema itself.
    pub schema: Value,
}

/// Optional generation parameters. Every field is independently optional so
/// "explicitly zero" and "unset" stay distinguishable (§3).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold.
    pub top_p: Option<f64>,
    /// Top-k sampling cutoff.
    pub top_k: Option<u32>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
}

/// A request for one provider call.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// The full message history for this call.
    pub messages: Vec<ChatMessage>,
    /// Tool definitions available to the model this call.
    pub tools: Vec<ToolDefinition>,
    /// Structured output schema, if any.
    pub response_schema: Option<ResponseSchema>,
    /// Generation parameters, if any.
    pub generation_params: Option<GenerationParams>,
}

impl ResponseSchema {
    /// Derive a response schema from `T`'s [`schemars::JsonSchema`] impl,
    /// matching the teacher's structured-output agents (§4.3 of
    /// `request.rs`'s grounding entry in `DESIGN.md`).
    #[must_use]
    pub fn from_type<T: schemars::JsonSchema>(name: impl Into<String>) -> Self {
        let schema = schemars::schema_for!(T);
        Self {
            name: name.into(),
            schema: serde_json::to_value(schema).unwrap_or(Value::Null),
        }
    }
}

impl ChatRequest {
    /// Build a request from messages alone.
    #[must_use]
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
            response_schema: None,
            generation_params: None,
        }
    }
}

/// A completed provider response for one call.
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    /// Final text content (possibly empty if the response is all tool calls).
    pub text: String,
    /// Optional "thinking"/reasoning trace, shown to the user as a distinct stream event.
    pub thinking: Option<String>,
    /// Attachments returned by the model.
    pub attachments: Vec<Attachment>,
    /// Tool calls requested by the model.
    pub tool_calls: Vec<ToolCall>,
    /// Usage for this one call.
    pub usage: Usage,
}

impl ChatResponse {
    /// A plain text-only response with the given usage.
    #[must_use]
    pub fn text(text: impl Into<String>, usage: Usage) -> Self {
        Self {
            text: text.into(),
            usage,
            ..Default::default()
        }
    }
}

/// The LLM wire-protocol contract the engine consumes. Concrete vendor
/// transports (OpenAI, Anthropic, local models, ...) live outside this
/// crate and implement this trait.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Perform one blocking chat call.
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse>;

    /// Perform one streaming chat call, emitting `StreamEvent::TextDelta` (and
    /// friends) into `sink` as they arrive, then returning the final response
    /// with accumulated usage.
    ///
    /// The default implementation falls back to [`Provider::chat`] and emits
    /// a single `TextDelta` with the complete text — adequate for providers
    /// with no true token streaming.
    async fn chat_stream(&self, req: &ChatRequest, sink: &StreamSink) -> Result<ChatResponse> {
        let response = self.chat(req).await?;
        if !response.text.is_empty() {
            sink.send(StreamEvent::TextDelta {
                content: response.text.clone(),
            })
            .await;
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct EchoProvider;

    #[async_trait]
    impl Provider for EchoProvider {
        async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
            let last = req.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(ChatResponse::text(last, Usage::new(1, 1)))
        }
    }

    #[tokio::test]
    async fn default_chat_stream_falls_back_to_chat_and_emits_one_delta() {
        let provider: Arc<dyn Provider> = Arc::new(EchoProvider);
        let (sink, mut rx) = StreamSink::new();
        let req = ChatRequest::new(vec![ChatMessage::user("hello")]);
        let resp = provider.chat_stream(&req, &sink).await.unwrap();
        assert_eq!(resp.text, "hello");
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, StreamEvent::TextDelta { content } if content == "hello"));
    }

    #[derive(serde::Deserialize, schemars::JsonSchema)]
    #[allow(dead_code)]
    struct Verdict {
        approved: bool,
        reason: String,
    }

    #[test]
    fn response_schema_from_type_derives_schema_from_the_type() {
        let schema = ResponseSchema::from_type::<Verdict>("verdict");
        assert_eq!(schema.name, "verdict");
        let props = schema.schema["properties"].as_object().expect("object schema");
        assert!(props.contains_key("approved"));
        assert!(props.contains_key("reason"));
    }
}
