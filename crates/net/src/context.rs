//! Per-call context: an optional absolute deadline plus a cancellation token.

use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Why a context finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneCause {
    /// The token was cancelled explicitly.
    Canceled,
    /// The deadline passed.
    DeadlineExceeded,
}

/// Deadline and cancellation for one call (or a tree of calls).
///
/// Cloning shares the same token; [`CallContext::child`] derives a context
/// that is cancelled with its parent but can be cancelled on its own.
#[derive(Debug, Clone)]
pub struct CallContext {
    deadline: Option<Instant>,
    token: CancellationToken,
}

impl Default for CallContext {
    fn default() -> Self {
        Self::background()
    }
}

impl CallContext {
    /// No deadline, never cancelled unless [`cancel`](Self::cancel) is called.
    pub fn background() -> Self {
        Self {
            deadline: None,
            token: CancellationToken::new(),
        }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            token: CancellationToken::new(),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Wrap an existing token, e.g. one cancelled by a signal handler.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            deadline: None,
            token,
        }
    }

    /// A context cancelled together with `self`, with the same deadline.
    pub fn child(&self) -> Self {
        Self {
            deadline: self.deadline,
            token: self.token.child_token(),
        }
    }

    /// A child whose deadline is the earlier of `deadline` and the parent's.
    pub fn child_with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) => parent.min(deadline),
            None => deadline,
        };
        Self {
            deadline: Some(deadline),
            token: self.token.child_token(),
        }
    }

    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        self.child_with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; zero once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Non-blocking check: `Some(cause)` if the context is already done.
    pub fn cause(&self) -> Option<DoneCause> {
        if matches!(self.deadline, Some(d) if d <= Instant::now()) {
            return Some(DoneCause::DeadlineExceeded);
        }
        if self.token.is_cancelled() {
            return Some(DoneCause::Canceled);
        }
        None
    }

    /// Resolves when the deadline passes or the token is cancelled.
    ///
    /// Without a deadline this only resolves on cancellation.
    pub async fn done(&self) -> DoneCause {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = tokio::time::sleep_until(deadline) => DoneCause::DeadlineExceeded,
                _ = self.token.cancelled() => DoneCause::Canceled,
            },
            None => {
                self.token.cancelled().await;
                DoneCause::Canceled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_done_on_deadline() {
        let ctx = CallContext::with_timeout(Duration::from_millis(50));
        assert_eq!(ctx.cause(), None);

        let start = Instant::now();
        assert_eq!(ctx.done().await, DoneCause::DeadlineExceeded);
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(ctx.cause(), Some(DoneCause::DeadlineExceeded));
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }

    #[tokio::test]
    async fn test_done_on_cancel() {
        let ctx = CallContext::background();
        let waiter = ctx.clone();
        let handle = tokio::spawn(async move { waiter.done().await });
        ctx.cancel();
        assert_eq!(handle.await.unwrap(), DoneCause::Canceled);
        assert_eq!(ctx.cause(), Some(DoneCause::Canceled));
    }

    #[tokio::test]
    async fn test_child_cancelled_with_parent() {
        let parent = CallContext::background();
        let child = parent.child();
        parent.cancel();
        assert_eq!(child.done().await, DoneCause::Canceled);
    }

    #[tokio::test]
    async fn test_child_cancel_does_not_reach_parent() {
        let parent = CallContext::background();
        let child = parent.child();
        child.cancel();
        assert_eq!(child.cause(), Some(DoneCause::Canceled));
        assert_eq!(parent.cause(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_deadline_never_extends_parent() {
        let parent = CallContext::with_timeout(Duration::from_secs(1));
        let child = parent.child_with_timeout(Duration::from_secs(10));
        assert_eq!(child.deadline(), parent.deadline());

        let shorter = parent.child_with_timeout(Duration::from_millis(100));
        assert!(shorter.deadline().unwrap() < parent.deadline().unwrap());
    }

    #[test]
    fn test_background_has_no_deadline() {
        let ctx = CallContext::default();
        assert!(ctx.deadline().is_none());
        assert!(ctx.remaining().is_none());
        assert!(ctx.cause().is_none());
    }
}
