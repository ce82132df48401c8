//! Fixtures shared by the core unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::{Config, RootManager, TaskHandle};
use crate::error::TaskError;
use crate::tasks::{Task, TaskMode};

pub(crate) fn config() -> Config {
    Config {
        signals: false,
        grace: Duration::from_secs(5),
        ..Config::default()
    }
}

pub(crate) fn root() -> RootManager {
    RootManager::new(config())
}

/// Ordered record of what listeners and hooks saw.
#[derive(Clone, Default)]
pub(crate) struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub(crate) fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// Listener that records `entry`.
    pub(crate) fn record(&self, entry: &'static str) -> impl Fn(&TaskHandle) + Send + Sync + 'static {
        let journal = self.clone();
        move |_| journal.push(entry)
    }
}

/// Passive handler; as a job it keeps or drops itself per `keepalive`.
pub(crate) struct Idle {
    pub(crate) name: &'static str,
    pub(crate) keepalive: bool,
}

impl Idle {
    pub(crate) fn arc(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            keepalive: false,
        })
    }

    pub(crate) fn keepalive(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            keepalive: true,
        })
    }
}

#[async_trait]
impl Task for Idle {
    fn name(&self) -> &str {
        self.name
    }

    fn keepalive(&self) -> bool {
        self.keepalive
    }
}

/// Start hook that fails its first `failures` attempts.
pub(crate) struct Flaky {
    pub(crate) failures: u32,
    pub(crate) error: TaskError,
    pub(crate) starts: AtomicU32,
}

impl Flaky {
    pub(crate) fn always(error: TaskError) -> Arc<Self> {
        Self::times(u32::MAX, error)
    }

    pub(crate) fn times(failures: u32, error: TaskError) -> Arc<Self> {
        Arc::new(Self {
            failures,
            error,
            starts: AtomicU32::new(0),
        })
    }

    pub(crate) fn starts(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Task for Flaky {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn start(&self, _task: &TaskHandle) -> Result<(), TaskError> {
        let n = self.starts.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(self.error.clone());
        }
        Ok(())
    }
}

/// Blocking run that ignores cancellation for `hold`.
pub(crate) struct Stubborn {
    pub(crate) hold: Duration,
}

#[async_trait]
impl Task for Stubborn {
    fn name(&self) -> &str {
        "stubborn"
    }

    fn mode(&self) -> TaskMode {
        TaskMode::Blocking
    }

    async fn run(&self, _task: &TaskHandle) -> Result<(), TaskError> {
        tokio::time::sleep(self.hold).await;
        Ok(())
    }
}

/// Background run that fails every time; counts runs.
pub(crate) struct FailingRun {
    pub(crate) runs: AtomicU32,
}

impl FailingRun {
    pub(crate) fn arc() -> Arc<Self> {
        Arc::new(Self {
            runs: AtomicU32::new(0),
        })
    }

    pub(crate) fn runs(&self) -> u32 {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Task for FailingRun {
    fn name(&self) -> &str {
        "failing-run"
    }

    fn mode(&self) -> TaskMode {
        TaskMode::Background
    }

    async fn run(&self, _task: &TaskHandle) -> Result<(), TaskError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Err(TaskError::fail("stream dropped"))
    }
}
