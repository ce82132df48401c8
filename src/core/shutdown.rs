//! # Cross-platform OS signal handling.
//!
//! Provides [`wait_for_shutdown_signal`], an async helper that completes when the
//! process receives a termination signal, and the `OsSignal` background task
//! that turns such a signal into a root shutdown with [`TaskError::Exit`].
//!
//! ## Signals
//! **Unix platforms:**
//! - `SIGINT` (Ctrl-C in terminal)
//! - `SIGTERM` (default kill signal, used by systemd/Kubernetes)
//! - `SIGQUIT` (quit signal, often used for core dumps or hard stop)
//!
//! **Windows platforms:**
//! - `Ctrl-C` via [`tokio::signal::ctrl_c`]

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{Job, TaskHandle};
use crate::error::TaskError;
use crate::events::{Event, EventKind};
use crate::tasks::{Task, TaskMode};

/// Waits for a termination signal.
///
/// Each call creates independent signal listeners.
///
/// Returns `Ok(())` when any signal is received, or `Err` if signal registration fails.
#[cfg(unix)]
pub(crate) async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

/// Waits for a termination signal.
///
/// Each call creates independent signal listeners.
///
/// Returns `Ok(())` when any signal is received, or `Err` if signal registration fails.
#[cfg(not(unix))]
pub(crate) async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Background task installed under the root when `Config::signals` is set.
pub(crate) struct OsSignal {
    root: Job,
}

impl OsSignal {
    pub(crate) fn new(root: Job) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Task for OsSignal {
    fn name(&self) -> &str {
        "os-signal"
    }

    fn mode(&self) -> TaskMode {
        TaskMode::Background
    }

    async fn run(&self, task: &TaskHandle) -> Result<(), TaskError> {
        tokio::select! {
            _ = task.cancelled() => Ok(()),
            res = wait_for_shutdown_signal() => {
                res.map_err(|e| TaskError::fatal(format!("signal registration failed: {e}")))?;
                tracing::info!("termination signal received");
                let root = Arc::clone(self.root.node());
                root.publish(Event::new(EventKind::ShutdownRequested));
                root.shutdown(TaskError::Exit).await;
                Ok(())
            }
        }
    }
}
