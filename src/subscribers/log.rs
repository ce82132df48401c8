//! # LogWriter — events as `tracing` records
//!
//! A subscriber that renders every [`Event`] as one `tracing` record, at a level
//! matching the event: failures and overflows at `warn`, panics at `error`,
//! regular lifecycle traffic at `debug`/`info`.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! DEBUG tasktree: starting task="rtsp-pull" id=4 retry=0
//!  WARN tasktree: retry scheduled task="rtsp-pull" id=4 retry=1 delay_ms=1000 reason="execution failed: refused"
//!  INFO tasktree: disposed task="rtsp-pull" id=4 reason="retries exhausted after 3 retries: ..."
//! ```

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;
use async_trait::async_trait;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let task = e.task.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::TaskStarting => {
                tracing::debug!(target: "tasktree", task, id = e.task_id, retry = e.retry, "starting");
            }
            EventKind::TaskStarted => {
                tracing::debug!(target: "tasktree", task, id = e.task_id, level = e.level, "started");
            }
            EventKind::RetryScheduled => {
                tracing::warn!(
                    target: "tasktree",
                    task, id = e.task_id, retry = e.retry, delay_ms = e.delay_ms, reason,
                    "retry scheduled"
                );
            }
            EventKind::TaskStopped => {
                tracing::debug!(target: "tasktree", task, id = e.task_id, label = e.label, reason, "stopped");
            }
            EventKind::TaskDisposed => {
                tracing::info!(target: "tasktree", task, id = e.task_id, label = e.label, reason, "disposed");
            }
            EventKind::TaskRejected => {
                tracing::warn!(target: "tasktree", task, id = e.task_id, reason, "rejected");
            }
            EventKind::JobPanicked => {
                tracing::error!(target: "tasktree", task, id = e.task_id, reason, "job panicked");
            }
            EventKind::ShutdownRequested => {
                tracing::info!(target: "tasktree", reason, "shutdown requested");
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(target: "tasktree", subscriber = task, reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                tracing::error!(target: "tasktree", subscriber = task, reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
