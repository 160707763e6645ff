//! Conversation message types: `ChatMessage`, `ToolCall`, `Attachment`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The role of a [`ChatMessage`] in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt / instructions.
    System,
    /// A human (or upstream caller) turn.
    User,
    /// A model turn, possibly carrying tool calls.
    Assistant,
    /// A tool-result turn, answering one `ToolCall` by id.
    Tool,
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Stable id assigned by the provider; tool-result messages reference it.
    pub id: String,
    /// Name of the tool (or `agent_<name>` / built-in pseudo-tool) to invoke.
    pub name: String,
    /// JSON arguments for the call.
    pub arguments: Value,
    /// Opaque provider metadata carried through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ToolCall {
    /// Build a new tool call with no metadata.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            metadata: None,
        }
    }

    /// Rough byte size of this call, for suspend-snapshot accounting: the
    /// serialized arguments plus metadata.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        let args = serde_json::to_vec(&self.arguments).map(|v| v.len()).unwrap_or(0);
        let meta = self
            .metadata
            .as_ref()
            .and_then(|m| serde_json::to_vec(m).ok())
            .map_or(0, |v| v.len());
        args + meta
    }
}

/// An inline-bytes or remote-URL attachment. When both `url` and `bytes` are
/// present, `url` takes priority (§3 "priority URL > bytes") — callers that
/// serialize an attachment for a provider should prefer `url` first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    /// MIME type, e.g. `image/png`.
    pub mime_type: String,
    /// Remote URL, preferred over `bytes` when both are set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Inline bytes, used when `url` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<Vec<u8>>,
}

impl Attachment {
    /// Build a remote-URL attachment.
    #[must_use]
    pub fn url(mime_type: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            url: Some(url.into()),
            bytes: None,
        }
    }

    /// Build an inline-bytes attachment.
    #[must_use]
    pub fn bytes(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            url: None,
            bytes: Some(bytes),
        }
    }

    /// The effective source: `url` wins over `bytes` when both are set.
    #[must_use]
    pub fn source(&self) -> AttachmentSource<'_> {
        match (&self.url, &self.bytes) {
            (Some(url), _) => AttachmentSource::Url(url),
            (None, Some(bytes)) => AttachmentSource::Bytes(bytes),
            (None, None) => AttachmentSource::Empty,
        }
    }

    /// Byte-budget weight of this attachment: the inline byte count, or the
    /// length of the URL string when there are no inline bytes (a URL still
    /// costs something against `max_attachment_bytes`, just far less).
    #[must_use]
    pub fn budget_bytes(&self) -> u64 {
        match self.source() {
            AttachmentSource::Bytes(b) => b.len() as u64,
            AttachmentSource::Url(u) => u.len() as u64,
            AttachmentSource::Empty => 0,
        }
    }

    /// Wire-safe base64 encoding of the inline bytes, if any.
    #[must_use]
    pub fn to_base64(&self) -> Option<String> {
        use base64::Engine as _;
        self.bytes
            .as_ref()
            .map(|b| base64::engine::general_purpose::STANDARD.encode(b))
    }
}

/// The resolved source of an [`Attachment`].
#[derive(Debug, Clone, Copy)]
pub enum AttachmentSource<'a> {
    /// A remote URL.
    Url(&'a str),
    /// Inline bytes.
    Bytes(&'a [u8]),
    /// Neither was set.
    Empty,
}

/// One turn in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who produced this turn.
    pub role: Role,
    /// Text content. Empty for pure tool-call assistant turns.
    #[serde(default)]
    pub content: String,
    /// Tool calls requested by this (assistant) turn.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// For `Role::Tool` messages, the id of the call being answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Whether this tool-result message represents a failed call.
    #[serde(default)]
    pub is_error: bool,
    /// Opaque provider metadata, carried through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Attachments carried by this turn.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl ChatMessage {
    /// Build a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    /// Build a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    /// Build a user message carrying attachments.
    #[must_use]
    pub fn user_with_attachments(content: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        let mut msg = Self::plain(Role::User, content);
        msg.attachments = attachments;
        msg
    }

    /// Build a plain assistant message (no tool calls).
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// Build an assistant message carrying tool calls.
    #[must_use]
    pub fn assistant_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::plain(Role::Assistant, content);
        msg.tool_calls = tool_calls;
        msg
    }

    /// Build an assistant message carrying attachments accumulated over the
    /// execution that produced it.
    #[must_use]
    pub fn assistant_with_attachments(content: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        let mut msg = Self::plain(Role::Assistant, content);
        msg.attachments = attachments;
        msg
    }

    /// Build a tool-result message answering `tool_call_id`.
    #[must_use]
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
            is_error,
            metadata: None,
            attachments: Vec::new(),
        }
    }

    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            is_error: false,
            metadata: None,
            attachments: Vec::new(),
        }
    }

    /// Whether this is an assistant message that requested tool calls.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        self.role == Role::Assistant && !self.tool_calls.is_empty()
    }

    /// Rough byte size for suspend-snapshot accounting: content + metadata +
    /// the byte size of every tool call (§4.9 step 2).
    #[must_use]
    pub fn byte_size(&self) -> usize {
        let meta = self
            .metadata
            .as_ref()
            .and_then(|m| serde_json::to_vec(m).ok())
            .map_or(0, |v| v.len());
        self.content.len() + meta + self.tool_calls.iter().map(ToolCall::byte_size).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_source_prefers_url_over_bytes() {
        let mut att = Attachment::bytes("image/png", vec![1, 2, 3]);
        att.url = Some("https://example.com/a.png".into());
        assert!(matches!(att.source(), AttachmentSource::Url(_)));
    }

    #[test]
    fn tool_result_message_carries_call_id_and_error_flag() {
        let msg = ChatMessage::tool_result("call-1", "error: boom", true);
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call-1"));
        assert!(msg.is_error);
    }

    #[test]
    fn assistant_with_attachments_carries_them_through() {
        let att = Attachment::url("image/png", "https://example.com/a.png");
        let msg = ChatMessage::assistant_with_attachments("here you go", vec![att.clone()]);
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.attachments, vec![att]);
    }

    #[test]
    fn has_tool_calls_requires_assistant_role() {
        let call = ToolCall::new("1", "greet", serde_json::json!({}));
        let msg = ChatMessage::assistant_tool_calls("", vec![call]);
        assert!(msg.has_tool_calls());
        assert!(!ChatMessage::user("hi").has_tool_calls());
    }
}
