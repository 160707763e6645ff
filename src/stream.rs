//! Streaming event pipeline.

use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;

use crate::usage::Usage;

/// Default channel capacity for a fresh [`StreamSink`].
const CHANNEL_CAPACITY: usize = 64;

/// One event emitted by the engine during a streaming execution (§6).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// The task's input has been received and the run is starting.
    InputReceived,
    /// The loop is about to make its first provider call.
    ProcessingStart,
    /// A chunk of "thinking"/reasoning text.
    Thinking {
        /// Thinking content.
        content: String,
    },
    /// A tool call is about to be dispatched.
    ToolCallStart {
        /// Call id.
        id: String,
        /// Tool name.
        name: String,
        /// JSON arguments.
        args: serde_json::Value,
    },
    /// A tool call has completed.
    ToolCallResult {
        /// Call id.
        id: String,
        /// Tool name.
        name: String,
        /// Result content (already truncated for display if applicable).
        content: String,
        /// Usage attributable to this call, if any.
        usage: Usage,
        /// Wall-clock duration of the call.
        #[serde(with = "duration_millis")]
        duration: Duration,
    },
    /// A Network's routing summary for the step just taken.
    RoutingDecision {
        /// Subagent name chosen.
        name: String,
        /// Free-form summary content.
        content: String,
    },
    /// A subagent delegation is starting.
    AgentStart {
        /// Subagent name.
        name: String,
        /// The task text forwarded to it.
        content: String,
    },
    /// A subagent delegation has completed.
    AgentFinish {
        /// Subagent name.
        name: String,
        /// The subagent's output text.
        content: String,
        /// Usage accumulated by the subagent run.
        usage: Usage,
        /// Wall-clock duration of the delegation.
        #[serde(with = "duration_millis")]
        duration: Duration,
    },
    /// Incremental or final text content for the user-visible answer.
    TextDelta {
        /// Text content.
        content: String,
    },
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u128(d.as_millis())
    }
}

/// A single-close, multi-producer handle for pushing [`StreamEvent`]s to a
/// caller-held receiver.
///
/// Closing is idempotent: the underlying sender lives behind a
/// `Mutex<Option<_>>`, and `close` simply takes it, so a concurrent close
/// from a provider racing the engine's own close is a harmless no-op rather
/// than the double-close panic the source process guards against.
#[derive(Clone)]
pub struct StreamSink {
    tx: Arc<Mutex<Option<mpsc::Sender<StreamEvent>>>>,
}

impl std::fmt::Debug for StreamSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSink").finish_non_exhaustive()
    }
}

impl StreamSink {
    /// Create a sink/receiver pair with the default channel capacity.
    #[must_use]
    pub fn new() -> (Self, mpsc::Receiver<StreamEvent>) {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    /// Create a sink/receiver pair with an explicit channel capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Send an event. Silently dropped if the sink is closed or the
    /// receiver has gone away.
    pub async fn send(&self, event: StreamEvent) {
        let maybe_tx = self.tx.lock().await.clone();
        if let Some(tx) = maybe_tx {
            let _ = tx.send(event).await;
        }
    }

    /// Close the sink. Idempotent — a second call is a no-op.
    pub async fn close(&self) {
        self.tx.lock().await.take();
    }

    /// Whether the sink has already been closed.
    pub async fn is_closed(&self) -> bool {
        self.tx.lock().await.is_none()
    }

    /// Adapt the receiver half into a [`Stream`] for callers that want to
    /// `.next().await` or combinator-chain events rather than calling
    /// `recv` directly.
    #[must_use]
    pub fn into_stream(rx: mpsc::Receiver<StreamEvent>) -> impl Stream<Item = StreamEvent> {
        ReceiverStream::new(rx)
    }
}
