//! Transient tasks created by [`Job::post`](crate::Job::post) and
//! [`Job::call`](crate::Job::call).
//!
//! The callback runs as the start hook, on the job's dispatch loop, and the task
//! completes right after it. A second attempt (if a retry policy were applied)
//! finds the callback already consumed and succeeds without running it again.

use std::future::Future;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::TaskHandle;
use crate::error::TaskError;
use crate::tasks::task::{Task, TaskMode};

pub(crate) struct CallbackTask<F> {
    callback: Mutex<Option<F>>,
}

impl<F> CallbackTask<F> {
    pub(crate) fn new(callback: F) -> Self {
        Self {
            callback: Mutex::new(Some(callback)),
        }
    }
}

#[async_trait]
impl<F, Fut> Task for CallbackTask<F>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    fn name(&self) -> &str {
        "callback"
    }

    fn mode(&self) -> TaskMode {
        TaskMode::Blocking
    }

    async fn start(&self, _task: &TaskHandle) -> Result<(), TaskError> {
        let callback = self.callback.lock().take();
        match callback {
            Some(f) => f().await,
            None => Ok(()),
        }
    }

    async fn run(&self, _task: &TaskHandle) -> Result<(), TaskError> {
        Ok(())
    }
}
