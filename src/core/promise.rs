//! # One-shot promise.
//!
//! [`Promise`] is resolved exactly once with `Ok(())` or a [`TaskError`]; any
//! number of waiters observe the same outcome. Tasks own two of them: one for
//! "started" and one for "stopped".
//!
//! Built on [`tokio::sync::watch`]: the slot starts as `None`, the first
//! `resolve` stores `Some(outcome)`, later calls are ignored.

use std::sync::Arc;

use tokio::sync::watch;

use crate::core::TaskContext;
use crate::error::TaskError;

type Outcome = Result<(), TaskError>;

/// One-shot, multi-waiter future.
#[derive(Clone, Debug)]
pub struct Promise {
    tx: Arc<watch::Sender<Option<Outcome>>>,
}

impl Default for Promise {
    fn default() -> Self {
        Self::new()
    }
}

impl Promise {
    /// Creates an unresolved promise.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Resolves the promise. Returns `false` if it was already resolved.
    pub fn resolve(&self, outcome: Outcome) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        })
    }

    /// True once resolved.
    pub fn is_resolved(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// The outcome, if resolved.
    pub fn outcome(&self) -> Option<Outcome> {
        (*self.tx.borrow()).clone()
    }

    /// Waits for the outcome.
    pub async fn wait(&self) -> Outcome {
        let mut rx = self.tx.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(slot) => (*slot).clone().unwrap_or(Ok(())),
            // The sender lives in `self`, so the channel cannot close under us.
            Err(_) => Err(TaskError::Canceled),
        }
    }

    /// Waits for the outcome or for `ctx` to be cancelled, whichever comes first.
    pub async fn wait_until(&self, ctx: &TaskContext) -> Outcome {
        tokio::select! {
            outcome = self.wait() => outcome,
            _ = ctx.cancelled() => Err(ctx.cause().unwrap_or(TaskError::Canceled)),
        }
    }
}
