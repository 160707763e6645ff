//! Error types for the oasis agent execution engine.

use crate::usage::Usage;
use thiserror::Error;

/// A type alias for `Result<T, Error>` used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for agent execution.
///
/// Processor halt and suspend are deliberately *not* variants here: they are
/// not failures, and folding them into this enum would let a stray `?`
/// silently treat a suspend as an error. They are carried instead by
/// [`crate::engine::Outcome`].
#[derive(Debug, Error)]
pub enum Error {
    /// The provider failed to produce a response; the execution is aborted.
    #[error("provider error: {message}")]
    Provider {
        /// Underlying provider error message.
        message: String,
        /// Usage accumulated before the failure.
        usage: Usage,
    },

    /// A processor returned an error other than halt or suspend.
    #[error("processor '{processor}' error: {message}")]
    Processor {
        /// Name of the processor that failed.
        processor: String,
        /// The error message.
        message: String,
    },

    /// The execution was cancelled before it could complete.
    #[error("execution cancelled: {reason}")]
    Cancelled {
        /// Human-readable cancellation reason.
        reason: String,
    },

    /// A `resume` was attempted on a [`crate::suspend::Suspended`] whose
    /// closure had already fired (via `resume`, `release`, or TTL).
    #[error("resume already consumed for step '{step}'")]
    ResumeAlreadyConsumed {
        /// Name of the step the suspension was created at.
        step: String,
    },

    /// Invalid engine configuration (budgets, missing required wiring).
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration issue.
        message: String,
    },

    /// JSON encoding/decoding failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A dependency required for a requested operation was not wired
    /// (e.g. calling `ask_user` with no `InputHandler` configured).
    #[error("missing dependency: {0}")]
    MissingDependency(String),

    /// Generic internal error for conditions not covered above.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a [`Error::Provider`] error.
    #[must_use]
    pub fn provider(message: impl Into<String>, usage: Usage) -> Self {
        Self::Provider {
            message: message.into(),
            usage,
        }
    }

    /// Build a [`Error::Processor`] error.
    #[must_use]
    pub fn processor(processor: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Processor {
            processor: processor.into(),
            message: message.into(),
        }
    }

    /// Build a [`Error::Cancelled`] error.
    #[must_use]
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    /// Build a [`Error::Configuration`] error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Build a [`Error::Internal`] error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}
