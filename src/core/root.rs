//! # Root of a task tree.
//!
//! [`RootManager`] owns one tree: the shared event bus and id counter, a
//! keepalive root job (always started, never retried), the subscriber fan-out
//! and, optionally, the `OsSignal` task.
//!
//! ```text
//! RootBuilder::build()
//!   ├─ Shared { ids, Bus, Config }
//!   ├─ root node "root" (job, keepalive, STARTED immediately)
//!   ├─ forwarder: Bus.subscribe() ─► SubscriberSet::emit(&Event)
//!   └─ cfg.signals? add_task(OsSignal)      (background, never retried)
//!
//! shutdown()
//!   ├─ Bus.publish(ShutdownRequested)
//!   ├─ spawn: root.stop(Exit) → root.dispose() (children drained level by level)
//!   ├─ wait_stopped() within cfg.grace
//!   │     ├─ Ok      → Ok(reason), forwarder drained
//!   │     └─ timeout → Err(GraceExceeded { stuck })
//! ```

use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::core::node::Node;
use crate::core::shared::Shared;
use crate::core::shutdown::OsSignal;
use crate::core::{Config, Job, Manager, Promise, TaskContext};
use crate::error::{RuntimeError, TaskError};
use crate::events::{Bus, Event, EventKind};
use crate::policies::RetryPolicy;
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::tasks::{Task, TaskOptions};

/// Handler of the root job.
struct RootTask;

#[async_trait]
impl Task for RootTask {
    fn name(&self) -> &str {
        "root"
    }

    fn keepalive(&self) -> bool {
        true
    }
}

/// Builder for a [`RootManager`] with optional subscribers and parent context.
pub struct RootBuilder<K = String, T = ()> {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
    context: Option<TaskContext>,
    _marker: PhantomData<fn() -> (K, T)>,
}

impl<K, T> RootBuilder<K, T> {
    /// Creates a builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            context: None,
            _marker: PhantomData,
        }
    }

    /// Sets event subscribers.
    ///
    /// Each subscriber gets its own bounded queue and worker.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Derives the root context from `ctx`: cancelling it stops the whole tree.
    pub fn with_context(mut self, ctx: TaskContext) -> Self {
        self.context = Some(ctx);
        self
    }

    /// Builds the tree. Must be called inside a tokio runtime.
    pub fn build(self) -> RootManager<K, T> {
        let shared = Arc::new(Shared::new(self.cfg));

        let mut opts = TaskOptions::new().with_retry(RetryPolicy::never());
        if let Some(ctx) = self.context {
            opts = opts.with_context(ctx);
        }
        let node = Node::new(Arc::new(RootTask), None, Arc::clone(&shared), opts, true);
        node.mark_started();

        let forwarder = (!self.subscribers.is_empty()).then(|| {
            spawn_forwarder(&shared.bus, self.subscribers, node.shutdown.clone())
        });

        let job = Job::from_node(node);
        if shared.config.signals {
            job.add_task(
                Arc::new(OsSignal::new(job.clone())),
                TaskOptions::new().with_retry(RetryPolicy::never()),
            );
        }

        RootManager {
            manager: Manager::new(job),
            shared,
            forwarder: Mutex::new(forwarder),
        }
    }
}

/// Forwards bus events to the subscriber set until the root is disposed.
fn spawn_forwarder(bus: &Bus, subscribers: Vec<Arc<dyn Subscribe>>, done: Promise) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    let set = SubscriberSet::new(subscribers, bus.clone());
    tokio::spawn(async move {
        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Ok(ev) => set.emit(&ev),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event forwarder lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = done.wait() => {
                    while let Ok(ev) = rx.try_recv() {
                        set.emit(&ev);
                    }
                    break;
                }
            }
        }
        set.shutdown().await;
    })
}

/// # Root of a task tree.
///
/// Derefs to a [`Manager`] over the root job, so children are added with
/// [`add_task`](Job::add_task) / [`add_job`](Job::add_job), or by key with
/// [`add`](Manager::add) when `T` is a keyed handler type.
pub struct RootManager<K = String, T = ()> {
    manager: Manager<K, T>,
    shared: Arc<Shared>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl<K, T> Deref for RootManager<K, T> {
    type Target = Manager<K, T>;

    fn deref(&self) -> &Self::Target {
        &self.manager
    }
}

impl<K, T> RootManager<K, T> {
    /// Builder with optional subscribers.
    pub fn builder(cfg: Config) -> RootBuilder<K, T> {
        RootBuilder::new(cfg)
    }

    /// Tree without subscribers.
    pub fn new(cfg: Config) -> Self {
        RootBuilder::new(cfg).build()
    }

    /// The keyed manager over the root job.
    pub fn manager(&self) -> &Manager<K, T> {
        &self.manager
    }

    /// Configuration the tree was built with.
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Subscribes to raw bus events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.shared.bus.subscribe()
    }

    /// Stops the tree with [`TaskError::Exit`] and waits for every task to be
    /// disposed, at most [`Config::grace`].
    ///
    /// Returns the root's final stop reason. Calling it again waits for the
    /// same outcome.
    pub async fn shutdown(&self) -> Result<TaskError, RuntimeError> {
        let node = Arc::clone(self.job().node());
        if !node.is_stopped() {
            tracing::info!("shutdown requested");
            node.publish(Event::new(EventKind::ShutdownRequested));
        }
        let disposer = Arc::clone(&node);
        tokio::spawn(async move {
            disposer.shutdown(TaskError::Exit).await;
        });

        let stopped = self.job().wait_stopped();
        let reason = match self.config().grace_period() {
            Some(grace) => match tokio::time::timeout(grace, stopped).await {
                Ok(reason) => reason,
                Err(_) => {
                    let stuck = self.stuck();
                    tracing::error!(?grace, ?stuck, "shutdown grace exceeded");
                    return Err(RuntimeError::GraceExceeded { grace, stuck });
                }
            },
            None => stopped.await,
        };

        let forwarder = self.forwarder.lock().take();
        if let Some(forwarder) = forwarder {
            let _ = forwarder.await;
        }
        tracing::info!(reason = %reason, "tree stopped");
        Ok(reason)
    }

    /// Waits until the root is stopped (by a signal, an external context or
    /// any task), then completes the shutdown.
    pub async fn wait(&self) -> Result<TaskError, RuntimeError> {
        self.job().cancelled().await;
        self.shutdown().await
    }

    fn stuck(&self) -> Vec<String> {
        let mut stuck: Vec<String> = self
            .job()
            .children()
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        if let Some(blocked) = self.job().blocked() {
            stuck.push(blocked.name().to_string());
        }
        stuck
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::core::TaskHandle;
    use crate::core::testing::{Flaky, Idle, Stubborn, config, root};

    #[derive(Default)]
    struct Collect(Mutex<Vec<EventKind>>);

    #[async_trait]
    impl Subscribe for Collect {
        async fn on_event(&self, event: &Event) {
            self.0.lock().push(event.kind);
        }

        fn name(&self) -> &'static str {
            "collect"
        }
    }

    #[tokio::test]
    async fn shutdown_stops_every_task_with_exit() {
        let root = root();
        let task = root.add_task(Idle::arc("worker"), TaskOptions::new());
        let job = root.add_job(Idle::keepalive("group"), TaskOptions::new());
        let leaf = job.add_task(Idle::arc("leaf"), TaskOptions::new());
        leaf.wait_started().await.unwrap();
        task.wait_started().await.unwrap();

        assert_eq!(root.shutdown().await.unwrap(), TaskError::Exit);
        for t in [&task, job.as_task(), &leaf] {
            assert_eq!(t.wait_stopped().await, TaskError::Exit, "{}", t.name());
        }
        assert_eq!(root.shutdown().await.unwrap(), TaskError::Exit, "idempotent");
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_reports_stuck_tasks_after_grace() {
        let root: RootManager = RootManager::new(Config {
            grace: Duration::from_secs(2),
            ..config()
        });
        root.add_task(
            Arc::new(Stubborn {
                hold: Duration::from_secs(3600),
            }),
            TaskOptions::new(),
        );
        tokio::time::sleep(Duration::from_millis(10)).await;

        match root.shutdown().await {
            Err(RuntimeError::GraceExceeded { grace, stuck }) => {
                assert_eq!(grace, Duration::from_secs(2));
                assert_eq!(stuck, ["stubborn"]);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn subscribers_see_the_whole_lifecycle() {
        let collect = Arc::new(Collect::default());
        let root: RootManager = RootManager::builder(config())
            .with_subscribers(vec![collect.clone() as Arc<dyn Subscribe>])
            .build();

        let task = root.add_task(
            Flaky::times(1, TaskError::fail("warming up")),
            TaskOptions::new().with_retry(RetryPolicy::new(1, Duration::from_millis(1))),
        );
        task.wait_started().await.unwrap();
        root.shutdown().await.unwrap();

        let kinds = collect.0.lock().clone();
        for expected in [
            EventKind::TaskStarting,
            EventKind::RetryScheduled,
            EventKind::TaskStarted,
            EventKind::ShutdownRequested,
            EventKind::TaskStopped,
            EventKind::TaskDisposed,
        ] {
            assert!(kinds.contains(&expected), "missing {expected:?} in {kinds:?}");
        }
    }

    #[tokio::test]
    async fn external_context_stops_the_tree() {
        let upstream = TaskContext::background();
        let root: RootManager = RootManager::builder(config())
            .with_context(upstream.clone())
            .build();
        let task = root.add_task(Idle::arc("worker"), TaskOptions::new());
        task.wait_started().await.unwrap();

        upstream.cancel(TaskError::fatal("upstream gone"));

        assert_eq!(root.wait().await.unwrap(), TaskError::fatal("upstream gone"));
        assert_eq!(task.wait_stopped().await, TaskError::fatal("upstream gone"));
    }

    #[tokio::test]
    async fn raw_bus_subscription() {
        let root = root();
        let mut rx = root.subscribe();

        let task: TaskHandle = root.add_task(Idle::arc("worker"), TaskOptions::new());
        task.wait_started().await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if ev.task_id == Some(task.id()) {
                kinds.push(ev.kind);
            }
        }
        assert_eq!(kinds, [EventKind::TaskStarting, EventKind::TaskStarted]);
    }
}
