//! Suspend/resume (§4.9): deep-copied message snapshots, single-use resume
//! closures, TTL auto-release, and the global snapshot count/byte budget.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;

use crate::engine::Outcome;
use crate::error::{Error, Result};
use crate::task::AgentResult;

/// A boxed, once-callable resume continuation.
pub type ResumeFn =
    Box<dyn FnOnce(Value) -> Pin<Box<dyn Future<Output = Result<Outcome<AgentResult>>> + Send>> + Send>;

/// Global cap on outstanding suspended executions: a (count, bytes) pair of
/// atomics. The check-then-increment across the pair is deliberately not a
/// single atomic operation (see `DESIGN.md`'s "Suspend budget" entry) — under
/// extreme contention a tiny overshoot is possible and accepted.
#[derive(Debug, Default)]
pub struct SuspendBudget {
    count: AtomicUsize,
    bytes: AtomicU64,
}

impl SuspendBudget {
    /// Build an empty budget tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to reserve room for one more snapshot of `size` bytes against
    /// `max_count`/`max_bytes`. Returns `false` (reserving nothing) if either
    /// cap would be exceeded.
    pub fn try_reserve(&self, size: u64, max_count: usize, max_bytes: u64) -> bool {
        let current_count = self.count.load(Ordering::SeqCst);
        if current_count + 1 > max_count {
            return false;
        }
        let current_bytes = self.bytes.load(Ordering::SeqCst);
        if current_bytes.saturating_add(size) > max_bytes {
            return false;
        }
        self.count.fetch_add(1, Ordering::SeqCst);
        self.bytes.fetch_add(size, Ordering::SeqCst);
        true
    }

    /// Release a previously reserved snapshot of `size` bytes.
    pub fn release(&self, size: u64) {
        self.count.fetch_sub(1, Ordering::SeqCst);
        self.bytes.fetch_sub(size, Ordering::SeqCst);
    }

    /// Current live snapshot count.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Current live snapshot bytes.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::SeqCst)
    }
}

/// A suspended execution: a processor asked to stop, and the loop captured
/// an immutable snapshot of working state so the caller can resume later.
///
/// Single-use: the first of `resume`, `release`, or TTL expiry wins. A
/// second `resume` returns [`Error::ResumeAlreadyConsumed`].
pub struct Suspended {
    step: String,
    payload: Value,
    snapshot_bytes: u64,
    resume_fn: Mutex<Option<ResumeFn>>,
    budget: Arc<SuspendBudget>,
    consumed: std::sync::atomic::AtomicBool,
    ttl_handle: Mutex<Option<AbortHandle>>,
}

impl std::fmt::Debug for Suspended {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Suspended")
            .field("step", &self.step)
            .field("payload", &self.payload)
            .field("snapshot_bytes", &self.snapshot_bytes)
            .finish_non_exhaustive()
    }
}

impl Suspended {
    /// Build a new suspension. `budget` has already had `snapshot_bytes`
    /// reserved against it by the caller (the loop, at the checkpoint).
    pub(crate) fn new(
        step: impl Into<String>,
        payload: Value,
        snapshot_bytes: u64,
        resume_fn: ResumeFn,
        budget: Arc<SuspendBudget>,
    ) -> Arc<Self> {
        Arc::new(Self {
            step: step.into(),
            payload,
            snapshot_bytes,
            resume_fn: Mutex::new(Some(resume_fn)),
            budget,
            consumed: std::sync::atomic::AtomicBool::new(false),
            ttl_handle: Mutex::new(None),
        })
    }

    /// Name of the processor (and phase) that suspended execution.
    #[must_use]
    pub fn step(&self) -> &str {
        &self.step
    }

    /// The JSON payload the processor attached.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Estimated byte size of the captured snapshot.
    #[must_use]
    pub fn snapshot_bytes(&self) -> u64 {
        self.snapshot_bytes
    }

    /// Resume execution, feeding `data` into the resumed loop as the
    /// caller's processors can observe it. Consumes the resume closure: a
    /// second call (from this or another handle to the same `Arc`) fails
    /// with [`Error::ResumeAlreadyConsumed`].
    pub async fn resume(&self, data: Value) -> Result<Outcome<AgentResult>> {
        let resume_fn = self.resume_fn.lock().await.take();
        let Some(resume_fn) = resume_fn else {
            return Err(Error::ResumeAlreadyConsumed {
                step: self.step.clone(),
            });
        };
        self.mark_consumed();
        resume_fn(data).await
    }

    /// Release the suspension without resuming, returning its budget.
    /// Idempotent.
    pub async fn release(&self) {
        if self.resume_fn.lock().await.take().is_some() {
            self.mark_consumed();
        }
        // Idempotent even if the closure was already taken by `resume`:
        // `mark_consumed` only decrements the budget on the first call.
    }

    /// Arrange for `release` to fire automatically after `ttl` if nobody has
    /// consumed the suspension by then. Calling this again cancels the
    /// previous timer.
    pub fn with_suspend_ttl(self: &Arc<Self>, ttl: Duration) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            this.release().await;
        });
        let abort = handle.abort_handle();
        let prior = self.ttl_handle.try_lock();
        // try_lock always succeeds here: with_suspend_ttl is only ever called
        // right after construction or from a single owning task, never
        // concurrently with itself.
        if let Ok(mut guard) = prior {
            if let Some(old) = guard.replace(abort) {
                old.abort();
            }
        }
    }

    fn mark_consumed(&self) {
        if !self.consumed.swap(true, Ordering::SeqCst) {
            self.budget.release(self.snapshot_bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_resume() -> ResumeFn {
        Box::new(|_data| Box::pin(async move { Ok(Outcome::Done(AgentResult::default())) }))
    }

    #[tokio::test]
    async fn second_resume_fails_after_first_succeeds() {
        let budget = Arc::new(SuspendBudget::new());
        assert!(budget.try_reserve(10, 5, 1000));
        let suspended = Suspended::new("delete", serde_json::json!({}), 10, fake_resume(), Arc::clone(&budget));

        let first = suspended.resume(serde_json::json!("approved")).await;
        assert!(first.is_ok());
        let second = suspended.resume(serde_json::json!("approved")).await;
        assert!(matches!(second, Err(Error::ResumeAlreadyConsumed { .. })));
        assert_eq!(budget.count(), 0);
        assert_eq!(budget.bytes(), 0);
    }

    #[tokio::test]
    async fn release_then_resume_fails() {
        let budget = Arc::new(SuspendBudget::new());
        budget.try_reserve(10, 5, 1000);
        let suspended = Suspended::new("delete", serde_json::json!({}), 10, fake_resume(), Arc::clone(&budget));
        suspended.release().await;
        suspended.release().await; // idempotent
        let result = suspended.resume(serde_json::json!("x")).await;
        assert!(matches!(result, Err(Error::ResumeAlreadyConsumed { .. })));
        assert_eq!(budget.count(), 0);
    }

    #[test]
    fn budget_refuses_when_count_exceeded() {
        let budget = SuspendBudget::new();
        assert!(budget.try_reserve(1, 1, 1_000_000));
        assert!(!budget.try_reserve(1, 1, 1_000_000));
    }

    #[test]
    fn budget_refuses_when_bytes_exceeded() {
        let budget = SuspendBudget::new();
        assert!(!budget.try_reserve(2_000_000, 10, 1_000_000));
    }

    #[tokio::test]
    async fn ttl_auto_releases_when_unconsumed() {
        let budget = Arc::new(SuspendBudget::new());
        budget.try_reserve(10, 5, 1000);
        let suspended = Suspended::new("delete", serde_json::json!({}), 10, fake_resume(), Arc::clone(&budget));
        suspended.with_suspend_ttl(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(budget.count(), 0);
        let result = suspended.resume(serde_json::json!("late")).await;
        assert!(matches!(result, Err(Error::ResumeAlreadyConsumed { .. })));
    }
}
