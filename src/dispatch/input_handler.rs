//! `InputHandler`: the `ask_user` built-in's collaborator contract.

use async_trait::async_trait;

use crate::error::Result;

/// A question (optionally multiple-choice) posed to a human.
#[derive(Debug, Clone)]
pub struct InputRequest {
    /// The question text.
    pub question: String,
    /// Suggested options, if any (empty for free-text answers).
    pub options: Vec<String>,
}

/// A human's answer to an [`InputRequest`].
#[derive(Debug, Clone)]
pub struct InputResponse {
    /// The answer text (one of `options`, or free text).
    pub answer: String,
}

/// Forwards `ask_user` questions to a human and blocks until they answer or
/// the execution is cancelled.
#[async_trait]
pub trait InputHandler: Send + Sync {
    /// Request input, blocking until a human replies or cancellation fires.
    async fn request_input(&self, req: &InputRequest) -> Result<InputResponse>;
}
