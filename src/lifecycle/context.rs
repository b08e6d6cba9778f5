//! Deadline-bearing cancellation context handed to shutdown calls.
//!
//! A context is done when its parent token is cancelled, when [`ShutdownContext::cancel`]
//! is called, or when its deadline passes. The first observed cause is
//! recorded and reported by [`ShutdownContext::err`] from then on.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

// Stand-in for "no deadline" when a timeout overflows the clock.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("context canceled")]
    Canceled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Debug)]
struct Inner {
    token: CancellationToken,
    deadline: Instant,
    cause: OnceLock<ContextError>,
}

#[derive(Debug, Clone)]
pub struct ShutdownContext {
    inner: Arc<Inner>,
}

impl ShutdownContext {
    /// Child of `parent` that also expires `timeout` from now.
    ///
    /// A zero timeout yields a context that is already expired.
    pub fn with_timeout(parent: &CancellationToken, timeout: Duration) -> Self {
        let now = Instant::now();
        let deadline = now
            .checked_add(timeout)
            .unwrap_or_else(|| now + FAR_FUTURE);

        Self {
            inner: Arc::new(Inner {
                token: parent.child_token(),
                deadline,
                cause: OnceLock::new(),
            }),
        }
    }

    /// Context derived from a fresh root, unaffected by any earlier cancellation.
    pub fn background(timeout: Duration) -> Self {
        Self::with_timeout(&CancellationToken::new(), timeout)
    }

    pub fn deadline(&self) -> Instant {
        self.inner.deadline
    }

    /// `None` while the context is live, otherwise why it is done.
    pub fn err(&self) -> Option<ContextError> {
        if let Some(cause) = self.inner.cause.get() {
            return Some(*cause);
        }

        let cause = if Instant::now() >= self.inner.deadline {
            ContextError::DeadlineExceeded
        } else if self.inner.token.is_cancelled() {
            ContextError::Canceled
        } else {
            return None;
        };

        let cause = *self.inner.cause.get_or_init(|| cause);
        self.inner.token.cancel();
        Some(cause)
    }

    /// Resolve once the context is done.
    pub async fn done(&self) -> ContextError {
        tokio::select! {
            _ = self.inner.token.cancelled() => {}
            _ = tokio::time::sleep_until(self.inner.deadline) => {}
        }
        self.err().unwrap_or(ContextError::Canceled)
    }

    /// Release the context. Reports `Canceled` unless the deadline already passed.
    pub fn cancel(&self) {
        if self.err().is_none() {
            let _ = self.inner.cause.set(ContextError::Canceled);
            self.inner.token.cancel();
        }
    }
}
