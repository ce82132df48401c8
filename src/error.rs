//! Error types used by the task tree and by task hooks.
//!
//! This module defines two main error enums:
//!
//! - [`TaskError`] — stop reasons and hook failures. Every stopped task carries one.
//! - [`RuntimeError`] — errors raised by the tree root itself.
//!
//! Both types provide `as_label` for logs and event payloads. [`TaskError`] is
//! `Clone` because a single stop reason is observed by many readers: the task
//! itself, its descendants (through the context chain) and every waiter.

use std::time::Duration;
use thiserror::Error;

/// # Stop reasons and hook errors.
///
/// The kinds split into two groups:
/// - **terminal by design**: [`Complete`](TaskError::Complete), [`AutoStop`](TaskError::AutoStop),
///   [`Exit`](TaskError::Exit), [`Canceled`](TaskError::Canceled), [`Fatal`](TaskError::Fatal);
/// - **retryable**: [`Fail`](TaskError::Fail), [`Timeout`](TaskError::Timeout), [`Panic`](TaskError::Panic).
///
/// [`RetryExhausted`](TaskError::RetryExhausted) wraps the last retryable error once
/// the retry budget of a task is spent.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The task finished its work on its own. Never retried.
    #[error("task complete")]
    Complete,

    /// A job without keepalive ran out of children.
    #[error("auto stop: no children left")]
    AutoStop,

    /// Deliberate shutdown of the tree (root shutdown or OS signal).
    #[error("exit")]
    Exit,

    /// The context was cancelled without a recorded cause.
    #[error("context cancelled")]
    Canceled,

    /// Retry budget consumed; `last` is the error of the final attempt.
    #[error("retries exhausted after {retries} retries: {last}")]
    RetryExhausted {
        /// Number of retries performed.
        retries: u32,
        /// The error that ended the last attempt.
        #[source]
        last: Box<TaskError>,
    },

    /// A recovered panic, optionally joined with the reason already in effect.
    #[error("panic: {message}")]
    Panic {
        /// Panic payload rendered as text.
        message: String,
        /// Stop reason that was already recorded when the panic happened.
        cause: Option<Box<TaskError>>,
    },

    /// Hook failed but may succeed if retried.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Non-recoverable hook error (never retried).
    #[error("fatal error (no retry): {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// A task-level watchdog gave up waiting.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The timeout that was exceeded.
        timeout: Duration,
    },

    /// A keyed manager already holds a live child with this key.
    #[error("duplicate key: {key}")]
    DuplicateKey {
        /// Debug rendering of the key.
        key: String,
    },
}

impl TaskError {
    /// Shorthand for [`TaskError::Fail`].
    pub fn fail(error: impl std::fmt::Display) -> Self {
        TaskError::Fail {
            error: error.to_string(),
        }
    }

    /// Shorthand for [`TaskError::Fatal`].
    pub fn fatal(error: impl std::fmt::Display) -> Self {
        TaskError::Fatal {
            error: error.to_string(),
        }
    }

    /// Builds a panic reason joined with the reason that was already in effect.
    pub fn panic(message: impl Into<String>, cause: Option<TaskError>) -> Self {
        TaskError::Panic {
            message: message.into(),
            cause: cause.map(Box::new),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/events.
    ///
    /// # Example
    /// ```
    /// use tasktree::TaskError;
    ///
    /// assert_eq!(TaskError::AutoStop.as_label(), "task_auto_stop");
    /// assert_eq!(TaskError::fail("boom").as_label(), "task_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Complete => "task_complete",
            TaskError::AutoStop => "task_auto_stop",
            TaskError::Exit => "task_exit",
            TaskError::Canceled => "task_canceled",
            TaskError::RetryExhausted { .. } => "task_retry_exhausted",
            TaskError::Panic { .. } => "task_panic",
            TaskError::Fail { .. } => "task_failed",
            TaskError::Fatal { .. } => "task_fatal",
            TaskError::Timeout { .. } => "task_timeout",
            TaskError::DuplicateKey { .. } => "task_duplicate_key",
        }
    }

    /// Indicates whether a retry policy may absorb this error.
    ///
    /// # Example
    /// ```
    /// use tasktree::TaskError;
    ///
    /// assert!(TaskError::fail("boom").is_retryable());
    /// assert!(!TaskError::Complete.is_retryable());
    /// assert!(!TaskError::fatal("nope").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TaskError::Fail { .. } | TaskError::Timeout { .. } | TaskError::Panic { .. }
        )
    }

    /// True for normal completion.
    pub fn is_complete(&self) -> bool {
        matches!(self, TaskError::Complete)
    }

    /// True if the retry budget was consumed.
    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, TaskError::RetryExhausted { .. })
    }

    /// Unwraps retry-exhaustion and panic joins down to the innermost reason.
    pub fn root_cause(&self) -> &TaskError {
        match self {
            TaskError::RetryExhausted { last, .. } => last.root_cause(),
            TaskError::Panic {
                cause: Some(cause), ..
            } => cause.root_cause(),
            other => other,
        }
    }
}

impl From<&str> for TaskError {
    fn from(error: &str) -> Self {
        TaskError::fail(error)
    }
}

impl From<String> for TaskError {
    fn from(error: String) -> Self {
        TaskError::Fail { error }
    }
}

/// # Errors produced by the tree root.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown did not finish within the grace period.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Names of root children that were still registered.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(TaskError::fail("x").is_retryable());
        assert!(
            TaskError::Timeout {
                timeout: Duration::from_secs(1)
            }
            .is_retryable()
        );
        assert!(TaskError::panic("boom", None).is_retryable());

        for terminal in [
            TaskError::Complete,
            TaskError::AutoStop,
            TaskError::Exit,
            TaskError::Canceled,
            TaskError::fatal("x"),
        ] {
            assert!(!terminal.is_retryable(), "{terminal:?}");
        }
    }

    #[test]
    fn exhausted_keeps_last_error_as_source() {
        let err = TaskError::RetryExhausted {
            retries: 3,
            last: Box::new(TaskError::fail("dial")),
        };
        assert!(err.is_retry_exhausted());
        assert!(!err.is_retryable());
        assert_eq!(err.root_cause(), &TaskError::fail("dial"));

        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("execution failed: dial"));
    }

    #[test]
    fn panic_joins_previous_reason() {
        let err = TaskError::panic("index out of bounds", Some(TaskError::Exit));
        assert_eq!(err.root_cause(), &TaskError::Exit);
        assert_eq!(err.to_string(), "panic: index out of bounds");
    }

    #[test]
    fn strings_convert_to_fail() {
        let err: TaskError = "refused".into();
        assert_eq!(err, TaskError::fail("refused"));
    }
}
