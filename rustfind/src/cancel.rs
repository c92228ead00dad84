use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::errors::{FindError, FindResult};

/// Cooperative cancellation shared by every worker of a run.
///
/// A token may carry a wall-clock deadline; once it passes the token reports
/// itself cancelled exactly as if [`CancellationToken::cancel`] was called.
/// A child token is also cancelled whenever its parent is.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<TokenState>,
}

#[derive(Debug)]
struct TokenState {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
    parent: Option<CancellationToken>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::build(None, None)
    }

    /// Creates a token that cancels itself once `timeout` has elapsed
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::build(Instant::now().checked_add(timeout), None)
    }

    /// Creates a token cancelled by this one, with an optional deadline of
    /// its own starting now
    pub fn child(&self, timeout: Option<Duration>) -> Self {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        Self::build(deadline, Some(self.clone()))
    }

    fn build(deadline: Option<Instant>, parent: Option<CancellationToken>) -> Self {
        Self {
            inner: Arc::new(TokenState {
                cancelled: AtomicBool::new(false),
                deadline,
                parent,
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.inner.cancelled.load(Ordering::Relaxed) {
            return true;
        }
        let expired = self.inner.deadline.is_some_and(|d| Instant::now() >= d);
        let parent = self.inner.parent.as_ref().is_some_and(|p| p.is_cancelled());
        if expired || parent {
            self.inner.cancelled.store(true, Ordering::SeqCst);
        }
        expired || parent
    }

    /// Returns `Err(FindError::Cancelled)` once cancellation has fired
    pub fn check(&self) -> FindResult<()> {
        if self.is_cancelled() {
            Err(FindError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
