//! # Task handler trait.
//!
//! A handler is the user-owned half of a task: the framework owns the lifecycle
//! ([`TaskHandle`]), the handler supplies behaviour through optional hooks.
//! Every hook has a default, so a handler implements only what it needs.
//!
//! ```text
//! start()  ──► Ok ──► mode():
//!                      Passive    → nothing; lives until stopped
//!                      Blocking   → run() awaited on the parent's dispatch loop
//!                      Background → run() spawned as its own tokio task
//! stopped  ──► dispose(reason)
//! ```
//!
//! Which mode to pick:
//! - `Blocking` for short synchronous-style work. The parent job admits no other
//!   child and disposes no other child until `run` returns.
//! - `Background` for anything long-lived (network loops, timers).
//! - `Passive` when progress is made elsewhere (e.g. by a job's own children).

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::TaskHandle;
use crate::error::TaskError;

/// How (and whether) the [`Task::run`] hook is driven.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TaskMode {
    /// No `run` hook; the task relies on external cancellation.
    #[default]
    Passive,
    /// `run` is awaited on the admitting dispatch loop.
    Blocking,
    /// `run` is spawned on its own tokio task after admission.
    Background,
}

/// Shared reference to a task handler.
pub type TaskRef = Arc<dyn Task>;

/// # Task handler with optional lifecycle hooks.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use tasktree::{Task, TaskError, TaskHandle, TaskMode};
///
/// struct Ticker;
///
/// #[async_trait]
/// impl Task for Ticker {
///     fn name(&self) -> &str { "ticker" }
///     fn mode(&self) -> TaskMode { TaskMode::Background }
///
///     async fn run(&self, task: &TaskHandle) -> Result<(), TaskError> {
///         loop {
///             tokio::select! {
///                 _ = task.cancelled() => return Ok(()),
///                 _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => {}
///             }
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Task: Send + Sync + 'static {
    /// Human-readable name used in logs and events.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// How the `run` hook is driven.
    fn mode(&self) -> TaskMode {
        TaskMode::Passive
    }

    /// Only meaningful for jobs: stay alive with zero children.
    fn keepalive(&self) -> bool {
        false
    }

    /// Called once per attempt before the task is admitted.
    ///
    /// An error is offered to the retry policy; panics are recovered.
    async fn start(&self, _task: &TaskHandle) -> Result<(), TaskError> {
        Ok(())
    }

    /// The task's useful life. `Ok(())` means "done" and is never retried.
    async fn run(&self, task: &TaskHandle) -> Result<(), TaskError> {
        task.cancelled().await;
        Ok(())
    }

    /// Called once per started attempt after the task stopped.
    async fn dispose(&self, _reason: &TaskError) {}
}
