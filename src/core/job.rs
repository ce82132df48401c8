//! # Job: a task that owns children.
//!
//! Every job runs a single **dispatch loop** (one tokio task) that serializes
//! the lifecycle of its direct children. The loop is spawned once the job has
//! started; children registered earlier are queued. It multiplexes two sources:
//!
//! ```text
//!   add_task ──► gate (mpsc) ──┐
//!                              ├─► select! ─► admit:   child.start()  (blocked = child)
//!   child ctx cancelled ───────┘              stopped: listeners → child.dispose()
//!   (FuturesUnordered)                                  restarted? watch again : forget
//!
//!   after each step: !keepalive && no children && nothing queued → stop(AutoStop)
//!   gate closed (job disposing) → drain: stop + dispose every remaining child
//! ```
//!
//! ## Rules
//! - Children are started and disposed one at a time, on the loop.
//! - A blocking child holds the loop for the whole of its `run` hook; the job is
//!   reported as [`blocked`](Job::blocked) meanwhile.
//! - A panic inside one loop step stops the job with [`TaskError::Panic`]; the
//!   loop itself keeps going so remaining children are still disposed.
//! - Registrations against a stopped job are rejected with the job's reason.
//!
//! Calling [`Job::call`] (or awaiting a child's startup) from a blocking hook
//! that runs on the same job's loop never completes.

use std::future::Future;
use std::ops::Deref;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::core::node::{Listener, Node, TaskState, panic_message};
use crate::core::{Promise, TaskHandle};
use crate::error::TaskError;
use crate::events::{Event, EventKind};
use crate::policies::RetryPolicy;
use crate::tasks::callback::CallbackTask;
use crate::tasks::{TaskOptions, TaskRef};

struct Gate {
    tx: Option<mpsc::UnboundedSender<Arc<Node>>>,
    rx: Option<mpsc::UnboundedReceiver<Arc<Node>>>,
    drained: Option<Promise>,
}

impl Gate {
    fn open() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: Some(tx),
            rx: Some(rx),
            drained: None,
        }
    }
}

/// Job-only part of a node.
pub(crate) struct JobCore {
    gate: Mutex<Gate>,
    children: RwLock<Vec<Arc<Node>>>,
    dispose_listeners: Mutex<Vec<Listener>>,
    blocked: Mutex<Option<Arc<Node>>>,
}

impl JobCore {
    pub(crate) fn new() -> Self {
        Self {
            gate: Mutex::new(Gate::open()),
            children: RwLock::new(Vec::new()),
            dispose_listeners: Mutex::new(Vec::new()),
            blocked: Mutex::new(None),
        }
    }

    /// Fresh gate for a restarted job.
    pub(crate) fn reset(&self) {
        *self.gate.lock() = Gate::open();
    }

    /// Refuses further registrations; the loop drains and exits.
    ///
    /// Children still queued on a loop that never ran are rejected with `reason`.
    pub(crate) fn close(&self, reason: &TaskError) -> Option<Promise> {
        let (queued, drained) = {
            let mut gate = self.gate.lock();
            gate.tx = None;
            (gate.rx.take(), gate.drained.clone())
        };
        if let Some(mut rx) = queued {
            while let Ok(child) = rx.try_recv() {
                child.reject(reason.clone());
            }
        }
        drained
    }

    /// Closes the gate and waits until every child is disposed.
    pub(crate) async fn close_and_drain(&self, reason: &TaskError) {
        if let Some(drained) = self.close(reason) {
            let _ = drained.wait().await;
        }
    }
}

fn core_of(node: &Node) -> &JobCore {
    match &node.job {
        Some(core) => core,
        None => unreachable!("job operation on a plain task node"),
    }
}

/// Hands `child` to `job`'s dispatch loop, spawning the loop on first use.
fn submit(job: &Arc<Node>, child: Arc<Node>) {
    if let Some(reason) = job.stop_reason() {
        child.reject(reason);
        return;
    }

    let core = core_of(job);
    let mut gate = core.gate.lock();
    let sent = gate
        .tx
        .as_ref()
        .is_some_and(|tx| tx.send(Arc::clone(&child)).is_ok());
    if !sent {
        drop(gate);
        child.reject(job.stop_reason().unwrap_or(TaskError::Canceled));
        return;
    }
    // Children queued on a job that is still (re)starting wait for its loop.
    if (TaskState::Started..TaskState::Disposing).contains(&job.state()) {
        open_loop(job, &mut gate);
    }
}

/// Spawns the dispatch loop of a job that just started, if not running yet.
pub(crate) fn spawn_dispatch(job: &Arc<Node>) {
    let mut gate = core_of(job).gate.lock();
    open_loop(job, &mut gate);
}

fn open_loop(job: &Arc<Node>, gate: &mut Gate) {
    if let Some(rx) = gate.rx.take() {
        let drained = Promise::new();
        gate.drained = Some(drained.clone());
        tokio::spawn(dispatch(Arc::clone(job), rx, drained).instrument(job.span.clone()));
    }
}

enum Signal {
    Admit(Arc<Node>),
    Stopped(Arc<Node>),
}

fn watch(child: Arc<Node>) -> BoxFuture<'static, Arc<Node>> {
    let ctx = child.context();
    async move {
        ctx.cancelled().await;
        child
    }
    .boxed()
}

async fn dispatch(job: Arc<Node>, mut rx: mpsc::UnboundedReceiver<Arc<Node>>, drained: Promise) {
    let core = core_of(&job);
    let mut watching: FuturesUnordered<BoxFuture<'static, Arc<Node>>> = FuturesUnordered::new();
    tracing::trace!("dispatch loop started");

    loop {
        let signal = tokio::select! {
            msg = rx.recv() => match msg {
                Some(child) => Signal::Admit(child),
                None => break,
            },
            Some(child) = watching.next(), if !watching.is_empty() => Signal::Stopped(child),
        };

        let outcome = AssertUnwindSafe(step(&job, core, signal, &mut watching))
            .catch_unwind()
            .await;
        if let Err(payload) = outcome {
            *core.blocked.lock() = None;
            loop_panicked(&job, panic_message(&*payload));
        }

        if !job.handler.keepalive()
            && rx.is_empty()
            && core.children.read().is_empty()
            && !job.is_stopped()
        {
            tracing::debug!("no children left, auto stopping");
            job.stop(TaskError::AutoStop);
        }
    }

    if let Err(payload) = AssertUnwindSafe(drain(&job, core)).catch_unwind().await {
        loop_panicked(&job, panic_message(&*payload));
    }
    tracing::trace!("dispatch loop drained");
    drained.resolve(Ok(()));
}

async fn step(
    job: &Arc<Node>,
    core: &JobCore,
    signal: Signal,
    watching: &mut FuturesUnordered<BoxFuture<'static, Arc<Node>>>,
) {
    match signal {
        Signal::Admit(child) => {
            let owned = child.parent.as_ref().is_some_and(|p| Arc::ptr_eq(p, job));
            if !owned {
                tracing::error!(child = child.id, "child registered on a foreign job");
                child.reject(TaskError::fatal("registered on a foreign job"));
                return;
            }
            if let Some(reason) = job.stop_reason() {
                child.reject(reason);
                return;
            }

            *core.blocked.lock() = Some(Arc::clone(&child));
            let admitted = child.start().await;
            *core.blocked.lock() = None;

            if admitted {
                core.children.write().push(Arc::clone(&child));
                watching.push(watch(child));
            }
        }
        Signal::Stopped(child) => {
            notify_child_dispose(job, &child);
            if child.dispose().await {
                watching.push(watch(child));
            } else {
                core.children.write().retain(|c| !Arc::ptr_eq(c, &child));
            }
        }
    }
}

/// Stops and disposes every remaining child with the job's own reason.
async fn drain(job: &Arc<Node>, core: &JobCore) {
    let children = std::mem::take(&mut *core.children.write());
    if children.is_empty() {
        return;
    }
    let reason = job.stop_reason().unwrap_or(TaskError::Canceled);
    for child in &children {
        child.stop(reason.clone());
    }
    for child in children {
        let notified = std::panic::catch_unwind(AssertUnwindSafe(|| notify_child_dispose(job, &child)));
        if let Err(payload) = notified {
            loop_panicked(job, panic_message(&*payload));
        }
        child.dispose().await;
    }
}

fn loop_panicked(job: &Arc<Node>, message: String) {
    let reason = TaskError::panic(message, job.stop_reason());
    tracing::error!(reason = %reason, "dispatch loop step panicked");
    job.publish(Event::new(EventKind::JobPanicked).with_error(&reason));
    job.stop(reason);
}

/// Runs child-dispose listeners of `job` and of every ancestor job.
fn notify_child_dispose(job: &Arc<Node>, child: &Arc<Node>) {
    let handle = TaskHandle::new(Arc::clone(child));
    let mut cur: Option<&Arc<Node>> = Some(job);
    while let Some(node) = cur {
        if let Some(core) = &node.job {
            let snapshot: Vec<Listener> = core.dispose_listeners.lock().clone();
            for listener in snapshot {
                listener(&handle);
            }
        }
        cur = node.parent.as_ref();
    }
}

/// # A task that owns children.
///
/// Derefs to [`TaskHandle`], so every task operation is available on a job.
///
/// # Example
/// ```
/// use tasktree::{Config, RootManager, TaskError, TaskFn, TaskHandle, TaskOptions};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let root: RootManager = RootManager::new(Config { signals: false, ..Config::default() });
///
/// let worker = root.add_task(
///     TaskFn::arc("worker", |task: TaskHandle| async move {
///         task.cancelled().await;
///         Ok::<_, TaskError>(())
///     }),
///     TaskOptions::new(),
/// );
/// worker.wait_started().await.unwrap();
///
/// let reason = root.shutdown().await.unwrap();
/// assert_eq!(reason, TaskError::Exit);
/// assert_eq!(worker.wait_stopped().await, TaskError::Exit);
/// # }
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Job {
    task: TaskHandle,
}

impl Deref for Job {
    type Target = TaskHandle;

    fn deref(&self) -> &Self::Target {
        &self.task
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("task", &self.task)
            .field("children", &self.child_count())
            .finish()
    }
}

impl Job {
    pub(crate) fn from_node(node: Arc<Node>) -> Self {
        debug_assert!(node.job.is_some(), "job handle over a plain task");
        Self {
            task: TaskHandle::new(node),
        }
    }

    fn core(&self) -> &JobCore {
        core_of(self.task.node())
    }

    /// The job as a plain task handle.
    pub fn as_task(&self) -> &TaskHandle {
        &self.task
    }

    // ---------------------------
    // Registration
    // ---------------------------

    /// Registers a child task and returns immediately.
    ///
    /// The child starts asynchronously on this job's dispatch loop; use
    /// [`TaskHandle::wait_started`] to wait for admission.
    pub fn add_task(&self, handler: TaskRef, opts: TaskOptions) -> TaskHandle {
        self.add_task_with(handler, opts, |_| {})
    }

    /// Like [`add_task`](Self::add_task), running `prepare` on the handle before
    /// the dispatch loop can see the child. Use it to register listeners that
    /// must not miss the first start.
    pub fn add_task_with(
        &self,
        handler: TaskRef,
        opts: TaskOptions,
        prepare: impl FnOnce(&TaskHandle),
    ) -> TaskHandle {
        self.register(handler, opts, false, prepare)
    }

    /// Registers a child job.
    pub fn add_job(&self, handler: TaskRef, opts: TaskOptions) -> Job {
        self.add_job_with(handler, opts, |_| {})
    }

    /// Like [`add_job`](Self::add_job) with a `prepare` step.
    pub fn add_job_with(
        &self,
        handler: TaskRef,
        opts: TaskOptions,
        prepare: impl FnOnce(&TaskHandle),
    ) -> Job {
        let task = self.register(handler, opts, true, prepare);
        Job::from_node(Arc::clone(task.node()))
    }

    fn register(
        &self,
        handler: TaskRef,
        opts: TaskOptions,
        is_job: bool,
        prepare: impl FnOnce(&TaskHandle),
    ) -> TaskHandle {
        let parent = self.task.node();
        let node = Node::new(handler, Some(parent), Arc::clone(&parent.shared), opts, is_job);
        let handle = TaskHandle::new(Arc::clone(&node));
        prepare(&handle);
        submit(parent, node);
        handle
    }

    /// Builds a child that is refused with `reason` without touching the loop.
    pub(crate) fn refuse(
        &self,
        handler: TaskRef,
        opts: TaskOptions,
        reason: TaskError,
        is_job: bool,
    ) -> TaskHandle {
        let parent = self.task.node();
        let node = Node::new(handler, Some(parent), Arc::clone(&parent.shared), opts, is_job);
        node.reject(reason);
        TaskHandle::new(node)
    }

    /// Runs `callback` on this job's dispatch loop as a transient child.
    ///
    /// The returned handle resolves its startup with the callback's result.
    pub fn post<F, Fut>(&self, callback: F) -> TaskHandle
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        self.add_task(
            Arc::new(CallbackTask::new(callback)),
            TaskOptions::new().with_retry(RetryPolicy::never()),
        )
    }

    /// Like [`post`](Self::post), waiting for the callback to finish.
    ///
    /// Returns the job's stop reason if the job is already stopped.
    pub async fn call<F, Fut>(&self, callback: F) -> Result<(), TaskError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        self.post(callback).wait_started().await
    }

    // ---------------------------
    // Children
    // ---------------------------

    /// Visits live children in admission order until `f` returns `false`.
    pub fn range_sub_task(&self, mut f: impl FnMut(&TaskHandle) -> bool) {
        let snapshot: Vec<Arc<Node>> = self.core().children.read().clone();
        for child in snapshot {
            if !f(&TaskHandle::new(child)) {
                break;
            }
        }
    }

    /// Snapshot of live children.
    pub fn children(&self) -> Vec<TaskHandle> {
        self.core()
            .children
            .read()
            .iter()
            .map(|c| TaskHandle::new(Arc::clone(c)))
            .collect()
    }

    /// Number of live children.
    pub fn child_count(&self) -> usize {
        self.core().children.read().len()
    }

    /// Registers a listener for child disposal (this job's children and every
    /// descendant's), called on the disposing child's loop.
    pub fn on_child_dispose(&self, f: impl Fn(&TaskHandle) + Send + Sync + 'static) {
        self.core().dispose_listeners.lock().push(Arc::new(f));
    }

    /// The child currently holding the dispatch loop, if any.
    pub fn blocked(&self) -> Option<TaskHandle> {
        self.core()
            .blocked
            .lock()
            .as_ref()
            .map(|c| TaskHandle::new(Arc::clone(c)))
    }

    /// True while a child's start or blocking run holds the dispatch loop.
    pub fn is_blocked(&self) -> bool {
        self.core().blocked.lock().is_some()
    }
}
