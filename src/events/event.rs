//! # Lifecycle events emitted by the task tree.
//!
//! The [`EventKind`] enum classifies events across three categories:
//! - **Lifecycle events**: a task starting, started, stopped, disposed, retried
//! - **Tree events**: admission rejected, dispatch panic, shutdown requested
//! - **Subscriber events**: a subscriber overflowed or panicked
//!
//! The [`Event`] struct carries the task identity (id, name, depth in the tree)
//! and kind-specific metadata such as the stop reason and retry pause.
//!
//! ## Ordering guarantees
//! Each event gets a sequence number from the [`Bus`](super::Bus) that published it.
//! Sequence numbers are monotonic per tree.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use tasktree::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::RetryScheduled)
//!     .with_task(7, "rtsp-pull", 2)
//!     .with_reason("connection refused")
//!     .with_retry(3)
//!     .with_delay(Duration::from_secs(1));
//!
//! assert_eq!(ev.kind, EventKind::RetryScheduled);
//! assert_eq!(ev.task.as_deref(), Some("rtsp-pull"));
//! assert_eq!(ev.delay_ms, Some(1000));
//! ```

use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Classification of tree events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `task` (subscriber name), `reason` (panic message).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `task` (subscriber name), `reason` (`full` / `closed`).
    SubscriberOverflow,

    // === Tree events ===
    /// Root shutdown was requested (explicit call or OS signal).
    ShutdownRequested,

    /// A job's dispatch loop recovered a panic and stopped the job.
    ///
    /// Sets: task identity, `reason`.
    JobPanicked,

    /// A task was refused: its parent was stopped, or its start failed for good.
    ///
    /// Sets: task identity, `reason`.
    TaskRejected,

    // === Task lifecycle events ===
    /// The start hook is about to run.
    ///
    /// Sets: task identity, `retry` (retries performed so far).
    TaskStarting,

    /// The start hook succeeded; the task is admitted.
    TaskStarted,

    /// A failed attempt will be retried after a pause.
    ///
    /// Sets: task identity, `retry`, `delay_ms`, `reason`.
    RetryScheduled,

    /// The task's context was cancelled.
    ///
    /// Sets: task identity, `reason`.
    TaskStopped,

    /// The task was disposed for good (no restart follows).
    ///
    /// Sets: task identity, `reason`.
    TaskDisposed,
}

/// Tree event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Per-bus monotonic sequence number (assigned on publish).
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Task id, if applicable.
    pub task_id: Option<u64>,
    /// Task (or subscriber) name, if applicable.
    pub task: Option<Arc<str>>,
    /// Depth in the tree (root = 0).
    pub level: Option<u32>,
    /// Human-readable reason (stop cause, failure, overflow details).
    pub reason: Option<Arc<str>>,
    /// Stable label of the stop reason.
    pub label: Option<&'static str>,
    /// Retry counter of the task.
    pub retry: Option<u32>,
    /// Pause before the next attempt in milliseconds.
    pub delay_ms: Option<u32>,
}

impl Event {
    /// Creates an event of the given kind stamped with the current time.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: 0,
            at: SystemTime::now(),
            kind,
            task_id: None,
            task: None,
            level: None,
            reason: None,
            label: None,
            retry: None,
            delay_ms: None,
        }
    }

    /// Attaches task identity.
    #[inline]
    pub fn with_task(mut self, id: u64, name: impl Into<Arc<str>>, level: u32) -> Self {
        self.task_id = Some(id);
        self.task = Some(name.into());
        self.level = Some(level);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a stop reason: its message and its label.
    #[inline]
    pub fn with_error(mut self, err: &crate::TaskError) -> Self {
        self.reason = Some(err.to_string().into());
        self.label = Some(err.as_label());
        self
    }

    /// Attaches a retry counter.
    #[inline]
    pub fn with_retry(mut self, retry: u32) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Attaches a pause (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(d.as_millis().min(u128::from(u32::MAX)) as u32);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        let mut ev = Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"));
        ev.task = Some(subscriber.into());
        ev
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        let mut ev = Event::new(EventKind::SubscriberPanicked).with_reason(info);
        ev.task = Some(subscriber.into());
        ev
    }
}
