//! Context compression (§4.5.1): collapse old tool-result chatter into one
//! summary message once the running transcript grows past budget.

use std::collections::HashSet;

use tracing::warn;

use crate::message::{ChatMessage, Role};
use crate::request::{ChatRequest, Provider};

/// How many trailing assistant-with-tool-calls iterations are always kept
/// untouched, never eligible for compression.
const PRESERVE_ITERATIONS: usize = 2;

/// Prefix marking a message as a previously-produced compression summary.
pub const SUMMARY_PREFIX: &str = "[Summary of earlier tool results]\n";

const SUMMARIZATION_SYSTEM_PROMPT: &str = "\
Summarize the following tool results and prior summaries into a compact \
paragraph that preserves every fact a later step might need. Do not add \
commentary about the summarization itself.";

fn is_tool_result_with_content(message: &ChatMessage) -> bool {
    message.role == Role::Tool && !message.content.is_empty()
}

fn is_prior_summary(message: &ChatMessage, index: usize) -> bool {
    index != 0 && message.role == Role::User && message.content.starts_with(SUMMARY_PREFIX)
}

fn compression_boundary(messages: &[ChatMessage]) -> usize {
    let mut seen = 0;
    for (i, message) in messages.iter().enumerate().rev() {
        if message.has_tool_calls() {
            seen += 1;
            if seen == PRESERVE_ITERATIONS {
                return i;
            }
        }
    }
    0
}

fn eligible_indices(messages: &[ChatMessage], boundary: usize) -> Vec<usize> {
    (1..boundary)
        .filter(|&i| is_tool_result_with_content(&messages[i]) || is_prior_summary(&messages[i], i))
        .collect()
}

/// If `messages` has earlier tool-result chatter outside the preserved
/// trailing window, summarize it via `provider` and replace it with one
/// summary message. On any failure, leaves `messages` untouched and logs a
/// warning — compression degrades gracefully rather than aborting the loop.
pub async fn maybe_compress(messages: &mut Vec<ChatMessage>, provider: &dyn Provider) {
    let boundary = compression_boundary(messages);
    let eligible = eligible_indices(messages, boundary);
    if eligible.is_empty() {
        return;
    }

    let concatenated = eligible
        .iter()
        .map(|&i| messages[i].content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let request = ChatRequest::new(vec![
        ChatMessage::system(SUMMARIZATION_SYSTEM_PROMPT),
        ChatMessage::user(concatenated),
    ]);

    let summary = match provider.chat(&request).await {
        Ok(response) => response.text,
        Err(e) => {
            warn!(error = %e, "context compression failed, keeping original messages");
            return;
        }
    };

    let eligible_set: HashSet<usize> = eligible.into_iter().collect();
    let summary_message = ChatMessage::user(format!("{SUMMARY_PREFIX}{summary}"));

    let mut replaced = Vec::with_capacity(messages.len());
    let mut inserted = false;
    for (i, message) in messages.drain(..).enumerate() {
        if eligible_set.contains(&i) {
            if !inserted {
                replaced.push(summary_message.clone());
                inserted = true;
            }
        } else {
            replaced.push(message);
        }
    }
    *messages = replaced;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::message::ToolCall;
    use crate::request::ChatResponse;
    use crate::usage::Usage;
    use async_trait::async_trait;

    struct FakeSummarizer {
        summary: &'static str,
    }

    #[async_trait]
    impl Provider for FakeSummarizer {
        async fn chat(&self, _req: &ChatRequest) -> Result<ChatResponse> {
            Ok(ChatResponse::text(self.summary, Usage::zero()))
        }
    }

    struct FailingProvider;
    #[async_trait]
    impl Provider for FailingProvider {
        async fn chat(&self, _req: &ChatRequest) -> Result<ChatResponse> {
            Err(crate::error::Error::provider("boom", Usage::zero()))
        }
    }

    fn tool_iteration(call_id: &str) -> Vec<ChatMessage> {
        let call = ToolCall::new(call_id, "search", serde_json::json!({}));
        vec![
            ChatMessage::assistant_tool_calls("", vec![call]),
            ChatMessage::tool_result(call_id, "some result content", false),
        ]
    }

    #[tokio::test]
    async fn compresses_messages_outside_the_preserved_window() {
        let mut messages = vec![ChatMessage::system("sys")];
        messages.extend(tool_iteration("old-1"));
        messages.extend(tool_iteration("old-2"));
        messages.extend(tool_iteration("keep-1"));
        messages.extend(tool_iteration("keep-2"));

        let provider = FakeSummarizer { summary: "condensed" };
        maybe_compress(&mut messages, &provider).await;

        let summary_count = messages.iter().filter(|m| m.content.starts_with(SUMMARY_PREFIX)).count();
        assert_eq!(summary_count, 1);
        assert!(messages.iter().any(|m| m.content.contains("condensed")));
        // the last two iterations (4 messages) must remain untouched
        assert!(messages.iter().any(|m| m.tool_call_id.as_deref() == Some("keep-1")));
        assert!(messages.iter().any(|m| m.tool_call_id.as_deref() == Some("keep-2")));
    }

    #[tokio::test]
    async fn no_eligible_messages_is_a_noop() {
        let mut messages = vec![ChatMessage::system("sys"), ChatMessage::user("hi")];
        let original = messages.clone();
        let provider = FakeSummarizer { summary: "condensed" };
        maybe_compress(&mut messages, &provider).await;
        assert_eq!(messages.len(), original.len());
    }

    #[tokio::test]
    async fn provider_failure_leaves_messages_untouched() {
        let mut messages = vec![ChatMessage::system("sys")];
        messages.extend(tool_iteration("old-1"));
        messages.extend(tool_iteration("keep-1"));
        messages.extend(tool_iteration("keep-2"));
        let before = messages.clone();

        maybe_compress(&mut messages, &FailingProvider).await;
        assert_eq!(messages.len(), before.len());
        assert!(!messages.iter().any(|m| m.content.starts_with(SUMMARY_PREFIX)));
    }
}
