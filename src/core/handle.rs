//! # Public handle to a live task.
//!
//! [`TaskHandle`] is a cheap clone (`Arc`) around a node. It is what hooks
//! receive, what [`Job::add_task`](crate::Job::add_task) returns, and what
//! listeners are called with.
//!
//! Handles are compared by identity: two handles are equal when they point at
//! the same task.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::core::node::{Listener, Node, TaskState};
use crate::core::{Job, TaskContext};
use crate::error::TaskError;
use crate::policies::RetryPolicy;
use crate::tasks::TaskRef;

/// Handle to a task in the tree.
#[derive(Clone)]
pub struct TaskHandle {
    node: Arc<Node>,
}

impl TaskHandle {
    pub(crate) fn new(node: Arc<Node>) -> Self {
        Self { node }
    }

    pub(crate) fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// Unique id within the tree (the root is 0).
    pub fn id(&self) -> u64 {
        self.node.id
    }

    /// Handler name.
    pub fn name(&self) -> &str {
        self.node.handler.name()
    }

    /// Depth in the tree (the root is 0).
    pub fn level(&self) -> u32 {
        self.node.level
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        self.node.state()
    }

    /// When the current attempt began starting.
    pub fn start_time(&self) -> Option<Instant> {
        self.node.started_at()
    }

    /// The handler this task was admitted with.
    pub fn handler(&self) -> &TaskRef {
        &self.node.handler
    }

    /// Snapshot of the free-form description map.
    pub fn description(&self) -> BTreeMap<String, String> {
        self.node.description()
    }

    /// Sets one description entry.
    pub fn set_description(&self, key: impl Into<String>, value: impl ToString) {
        self.node.set_description(key, value);
    }

    /// The job that owns this task; `None` for the root.
    pub fn parent(&self) -> Option<Job> {
        self.node
            .parent
            .as_ref()
            .map(|p| Job::from_node(Arc::clone(p)))
    }

    /// True if this task can own children.
    pub fn is_job(&self) -> bool {
        self.node.job.is_some()
    }

    /// This task viewed as a job, if it is one.
    pub fn as_job(&self) -> Option<Job> {
        self.is_job().then(|| Job::from_node(Arc::clone(&self.node)))
    }

    // ---------------------------
    // Cancellation
    // ---------------------------

    /// The current attempt's context.
    pub fn context(&self) -> TaskContext {
        self.node.context()
    }

    /// Completes when the current attempt's context is cancelled.
    pub async fn cancelled(&self) {
        self.context().cancelled().await
    }

    /// Requests a stop with `reason`. Returns `false` if already stopped.
    ///
    /// Idempotent: the first reason wins and is what descendants observe.
    pub fn stop(&self, reason: impl Into<TaskError>) -> bool {
        self.node.stop(reason.into())
    }

    /// True once the current attempt is stopped.
    pub fn is_stopped(&self) -> bool {
        self.node.is_stopped()
    }

    /// The stop reason, `None` while live.
    pub fn stop_reason(&self) -> Option<TaskError> {
        self.node.stop_reason()
    }

    // ---------------------------
    // Retry
    // ---------------------------

    /// Sets a fixed-interval retry policy.
    ///
    /// `max_retry`: `0` never, `< 0` unlimited, `n` up to `n` retries.
    /// Call it before admission ([`TaskOptions::with_retry`](crate::TaskOptions::with_retry))
    /// or from the start hook; a later call only affects later failures.
    pub fn set_retry(&self, max_retry: i32, interval: Duration) {
        self.node
            .set_retry_policy(RetryPolicy::new(max_retry, interval));
    }

    /// Replaces the whole retry policy.
    pub fn set_retry_policy(&self, policy: RetryPolicy) {
        self.node.set_retry_policy(policy);
    }

    /// Current retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.node.retry_policy()
    }

    /// Retries consumed so far; cleared when a fresh admission starts successfully.
    pub fn retry_count(&self) -> u32 {
        self.node.retry_count()
    }

    // ---------------------------
    // Waiting
    // ---------------------------

    /// Waits until the task is admitted (`Ok`) or refused for good (`Err`).
    pub async fn wait_started(&self) -> Result<(), TaskError> {
        self.node.startup.wait().await
    }

    /// Waits until the task is disposed for good and returns the final reason.
    ///
    /// A task that never started reports the reason it was refused with.
    pub async fn wait_stopped(&self) -> TaskError {
        if let Err(reason) = self.node.startup.wait().await {
            return reason;
        }
        match self.node.shutdown.wait().await {
            Err(reason) => reason,
            Ok(()) => TaskError::Complete,
        }
    }

    // ---------------------------
    // Listeners
    // ---------------------------

    /// Called after every successful start, in registration order.
    pub fn on_start(&self, f: impl Fn(&TaskHandle) + Send + Sync + 'static) {
        self.node.listeners().start.push(Arc::new(f) as Listener);
    }

    /// Called when disposal begins, before children are torn down.
    pub fn on_before_dispose(&self, f: impl Fn(&TaskHandle) + Send + Sync + 'static) {
        self.node
            .listeners()
            .before_dispose
            .push(Arc::new(f) as Listener);
    }

    /// Called after the dispose hook, in registration order.
    pub fn on_dispose(&self, f: impl Fn(&TaskHandle) + Send + Sync + 'static) {
        self.node.listeners().dispose.push(Arc::new(f) as Listener);
    }
}

impl PartialEq for TaskHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }
}

impl Eq for TaskHandle {}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("level", &self.level())
            .field("state", &self.state())
            .finish()
    }
}
