//! # Cancellation context with a recorded cause.
//!
//! [`TaskContext`] pairs a [`CancellationToken`] with a set-once cause cell.
//! The cause is written **before** the token is triggered and never changes
//! afterwards, so every reader that observes cancellation also observes why.
//!
//! ```text
//! root ctx ──child()──► job ctx ──child()──► task ctx
//!    │                     │                    │
//!    cancel(Exit)          (no own cause)       (no own cause)
//!                          cause() = Exit ◄──── cause() = Exit
//! ```
//!
//! Contexts form a chain: cancelling a parent cancels every descendant token
//! (tokio-util propagation), and a descendant without its own cause reports the
//! nearest ancestor's cause.

use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

/// Cancellable context carrying a typed cause.
#[derive(Clone, Debug)]
pub struct TaskContext {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    token: CancellationToken,
    cause: OnceLock<TaskError>,
    parent: Option<TaskContext>,
}

impl TaskContext {
    /// A top-level context, cancelled only explicitly.
    pub fn background() -> Self {
        Self::from_token(CancellationToken::new())
    }

    /// Wraps an existing token (e.g. one owned by the embedding application).
    ///
    /// If the token is cancelled from outside, [`cause`](Self::cause) reports
    /// [`TaskError::Canceled`].
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            inner: Arc::new(Inner {
                token,
                cause: OnceLock::new(),
                parent: None,
            }),
        }
    }

    /// Derives a child context.
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(Inner {
                token: self.inner.token.child_token(),
                cause: OnceLock::new(),
                parent: Some(self.clone()),
            }),
        }
    }

    /// Cancels with `cause`. Returns `false` if the context was already cancelled.
    pub fn cancel(&self, cause: TaskError) -> bool {
        if self.inner.token.is_cancelled() || self.inner.cause.set(cause).is_err() {
            return false;
        }
        self.inner.token.cancel();
        true
    }

    /// True once this context (or an ancestor) is cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// The cause of cancellation, `None` while the context is live.
    pub fn cause(&self) -> Option<TaskError> {
        if !self.inner.token.is_cancelled() {
            return None;
        }
        let mut cur = Some(self);
        while let Some(ctx) = cur {
            if let Some(cause) = ctx.inner.cause.get() {
                return Some(cause.clone());
            }
            cur = ctx.inner.parent.as_ref();
        }
        Some(TaskError::Canceled)
    }

    /// Completes when the context is cancelled.
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await
    }

    /// The underlying token, for APIs that take a plain `CancellationToken`.
    pub fn token(&self) -> &CancellationToken {
        &self.inner.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_cause_wins() {
        let ctx = TaskContext::background();
        assert!(ctx.cause().is_none());
        assert!(ctx.cancel(TaskError::fail("first")));
        assert!(!ctx.cancel(TaskError::fail("second")));
        assert_eq!(ctx.cause(), Some(TaskError::fail("first")));
    }

    #[test]
    fn child_inherits_parent_cause() {
        let root = TaskContext::background();
        let job = root.child();
        let task = job.child();

        root.cancel(TaskError::Exit);
        assert!(task.is_cancelled());
        assert_eq!(task.cause(), Some(TaskError::Exit));
        assert!(!task.cancel(TaskError::fail("late")), "already cancelled through parent");
        assert_eq!(task.cause(), Some(TaskError::Exit));
    }

    #[test]
    fn child_cancel_does_not_touch_parent() {
        let root = TaskContext::background();
        let task = root.child();
        task.cancel(TaskError::Complete);
        assert!(!root.is_cancelled());
        assert_eq!(task.cause(), Some(TaskError::Complete));
    }

    #[test]
    fn external_token_cancel_reports_canceled() {
        let token = CancellationToken::new();
        let ctx = TaskContext::from_token(token.clone()).child();
        token.cancel();
        assert_eq!(ctx.cause(), Some(TaskError::Canceled));
    }
}
