//! Cooperative cancellation for rule evaluation.
//!
//! ## Design
//!
//! Uses a combination of:
//! - Atomic flag for cooperative cancellation
//! - An optional deadline checked on demand
//! - A parent link so cancelling an ancestor context is visible to every
//!   descendant without having to walk down and cancel each one explicitly
//!
//! The evaluator checks a context at node and batch boundaries; it never
//! preempts a backend call already in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Raised when an [`EvalContext`] reports cancelled or past its deadline.
#[derive(Debug, Clone, thiserror::Error)]
#[error("evaluation cancelled (deadline_exceeded={deadline_exceeded})")]
pub struct CancelledError {
    pub deadline_exceeded: bool,
}

/// A hierarchical, cheap-to-clone cancellation/deadline carrier.
///
/// Evaluator and vault code check `ctx.check()` at node and batch
/// boundaries. Cancelling a context also cancels every context created from
/// it with [`EvalContext::child`], but never reaches upward to its own
/// parent or to sibling subtrees.
#[derive(Clone)]
pub struct EvalContext {
    cancelled: Arc<AtomicBool>,
    parent: Option<Arc<EvalContext>>,
    start: Instant,
    deadline: Option<Duration>,
}

impl EvalContext {
    /// A context with no deadline and no parent.
    pub fn new() -> Self {
        EvalContext {
            cancelled: Arc::new(AtomicBool::new(false)),
            parent: None,
            start: Instant::now(),
            deadline: None,
        }
    }

    /// A context that cancels itself once `deadline` has elapsed.
    pub fn with_deadline(deadline: Duration) -> Self {
        EvalContext {
            cancelled: Arc::new(AtomicBool::new(false)),
            parent: None,
            start: Instant::now(),
            deadline: Some(deadline),
        }
    }

    /// A child-scoped context: observes this context's (and its ancestors')
    /// cancellation, but can be cancelled on its own without affecting the
    /// parent or sibling subtrees.
    pub fn child(&self) -> EvalContext {
        EvalContext {
            cancelled: Arc::new(AtomicBool::new(false)),
            parent: Some(Arc::new(self.clone())),
            start: self.start,
            deadline: self.deadline,
        }
    }

    /// Cancel this context and every context derived from it via `child()`.
    /// Does not affect the parent context it was derived from.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// True if this context, or any ancestor, has been cancelled or has
    /// passed its deadline.
    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::Relaxed) {
            return true;
        }
        if let Some(deadline) = self.deadline {
            if self.start.elapsed() > deadline {
                return true;
            }
        }
        match &self.parent {
            Some(parent) => parent.is_cancelled(),
            None => false,
        }
    }

    /// Convenience for evaluator/vault code: returns an error if cancelled.
    pub fn check(&self) -> Result<(), CancelledError> {
        if self.is_cancelled() {
            let deadline_exceeded = self
                .deadline
                .is_some_and(|d| self.start.elapsed() > d);
            return Err(CancelledError { deadline_exceeded });
        }
        Ok(())
    }

    /// A handle that can cancel this context from another thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancelled: Arc::clone(&self.cancelled),
        }
    }
}

impl Default for EvalContext {
    fn default() -> Self {
        EvalContext::new()
    }
}

/// A detached handle that can cancel an [`EvalContext`] from another thread.
#[derive(Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn fresh_context_is_not_cancelled() {
        let ctx = EvalContext::new();
        assert!(ctx.check().is_ok());
    }

    #[test]
    fn cancel_is_observed() {
        let ctx = EvalContext::new();
        ctx.cancel();
        assert!(ctx.is_cancelled());
        assert!(ctx.check().is_err());
    }

    #[test]
    fn child_observes_parent_cancellation() {
        let parent = EvalContext::new();
        let child = parent.child();
        assert!(!child.is_cancelled());
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn cancelling_child_does_not_cancel_parent() {
        let parent = EvalContext::new();
        let child = parent.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn deadline_expires() {
        let ctx = EvalContext::with_deadline(Duration::from_millis(10));
        assert!(ctx.check().is_ok());
        thread::sleep(Duration::from_millis(50));
        let err = ctx.check().unwrap_err();
        assert!(err.deadline_exceeded);
    }

    #[test]
    fn cancel_handle_cancels_origin_context() {
        let ctx = EvalContext::new();
        let handle = ctx.cancel_handle();
        handle.cancel();
        assert!(ctx.is_cancelled());
        assert!(handle.is_cancelled());
    }
}
