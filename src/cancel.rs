//! Cooperative cancellation token.
//!
//! The teacher crate's HTTP/session layers thread a `tokio_util`
//! `CancellationToken`-shaped primitive through long-running calls, but the
//! engine's dependency surface does not pull in `tokio-util`. `CancellationToken`
//! here is a thin newtype over a `tokio::sync::watch<Option<String>>` channel
//! that gives the same observable behavior (cheap clone, `is_cancelled`,
//! an awaitable `cancelled()`) without the extra crate.

use tokio::sync::watch;

/// A cheaply-cloneable cooperative cancellation signal.
///
/// Cancelling carries a human-readable reason, surfaced by the engine as
/// `Error::Cancelled { reason }` and as the text of cancellation-marker tool
/// results (§4.3, §7).
#[derive(Debug, Clone)]
pub struct CancellationToken {
    tx: std::sync::Arc<watch::Sender<Option<String>>>,
    rx: watch::Receiver<Option<String>>,
}

impl CancellationToken {
    /// Create a new, not-yet-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(None);
        Self {
            tx: std::sync::Arc::new(tx),
            rx,
        }
    }

    /// Cancel the token, recording `reason`. Idempotent: the first reason
    /// wins if called more than once.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self.rx.borrow().is_none() {
            let _ = self.tx.send(Some(reason.into()));
        }
    }

    /// Whether the token has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// The cancellation reason, if cancelled.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.rx.borrow().clone()
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.borrow().is_some() {
            return;
        }
        while rx.changed().await.is_ok() {
            if rx.borrow().is_some() {
                return;
            }
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_resolves_after_cancel() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        token.cancel("shutdown");
        handle.await.unwrap();
        assert!(token.is_cancelled());
        assert_eq!(token.reason().as_deref(), Some("shutdown"));
    }

    #[test]
    fn first_cancel_reason_wins() {
        let token = CancellationToken::new();
        token.cancel("first");
        token.cancel("second");
        assert_eq!(token.reason().as_deref(), Some("first"));
    }

    #[test]
    fn cancelled_is_pending_until_cancel_then_ready() {
        let token = CancellationToken::new();
        let mut fut = tokio_test::task::spawn(token.cancelled());
        tokio_test::assert_pending!(fut.poll());
        token.cancel("shutdown");
        tokio_test::assert_ready!(fut.poll());
    }
}
