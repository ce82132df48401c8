//! # Function-backed task (`TaskFn`)
//!
//! [`TaskFn`] wraps a closure `F: Fn(TaskHandle) -> Fut` used as the `run` hook.
//! A fresh future is created per attempt, so restarts never share hidden state;
//! shared state goes into an explicit `Arc<...>` captured by the closure.
//!
//! ## Example
//! ```rust
//! use tasktree::{TaskFn, TaskHandle, TaskMode, TaskRef, TaskError};
//!
//! let t: TaskRef = TaskFn::arc("worker", |task: TaskHandle| async move {
//!     task.cancelled().await;
//!     Ok::<_, TaskError>(())
//! });
//!
//! assert_eq!(t.name(), "worker");
//! assert_eq!(t.mode(), TaskMode::Background);
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::TaskHandle;
use crate::error::TaskError;
use crate::tasks::task::{Task, TaskMode};

/// Function-backed task implementation.
#[derive(Debug)]
pub struct TaskFn<F> {
    name: Cow<'static, str>,
    mode: TaskMode,
    f: F,
}

impl<F> TaskFn<F> {
    /// Creates a background task (its own tokio task).
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            mode: TaskMode::Background,
            f,
        }
    }

    /// Creates a task whose closure runs on the parent's dispatch loop.
    pub fn blocking(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            mode: TaskMode::Blocking,
            f,
        }
    }

    /// Creates a background task and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Task for TaskFn<F>
where
    F: Fn(TaskHandle) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn mode(&self) -> TaskMode {
        self.mode
    }

    async fn run(&self, task: &TaskHandle) -> Result<(), TaskError> {
        (self.f)(task.clone()).await
    }
}
