//! # Admission options.
//!
//! [`TaskOptions`] is passed alongside a handler to
//! [`Job::add_task`](crate::Job::add_task) and configures the new node:
//! - an explicit parent context (instead of the job's own context),
//! - initial description entries,
//! - a retry policy (falls back to [`Config::retry`](crate::Config)),
//! - a `tracing` span used for every log line of the task.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use tasktree::{RetryPolicy, TaskOptions};
//!
//! let opts = TaskOptions::new()
//!     .with_description("url", "rtsp://camera-1/stream")
//!     .with_retry(RetryPolicy::new(3, Duration::from_secs(1)));
//! assert_eq!(opts.retry().map(|r| r.max_retry), Some(3));
//! ```

use std::collections::BTreeMap;

use crate::core::TaskContext;
use crate::policies::RetryPolicy;

/// Options applied when a task is admitted.
#[derive(Clone, Debug, Default)]
pub struct TaskOptions {
    pub(crate) context: Option<TaskContext>,
    pub(crate) description: BTreeMap<String, String>,
    pub(crate) retry: Option<RetryPolicy>,
    pub(crate) span: Option<tracing::Span>,
}

impl TaskOptions {
    /// Empty options: parent context, config retry, default span.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives the task's context from `ctx` instead of the parent job's context.
    pub fn with_context(mut self, ctx: TaskContext) -> Self {
        self.context = Some(ctx);
        self
    }

    /// Adds one description entry.
    pub fn with_description(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.description.insert(key.into(), value.to_string());
        self
    }

    /// Overrides the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Logs the task's lifecycle inside `span`.
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Returns the retry override, if any.
    pub fn retry(&self) -> Option<RetryPolicy> {
        self.retry
    }
}
