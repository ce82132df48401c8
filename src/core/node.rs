//! # Task node: one supervised unit and its state machine.
//!
//! A [`Node`] is the framework-owned half of a task. It holds the handler, the
//! current [`TaskContext`], the two [`Promise`]s, retry state and listeners.
//! Public access goes through [`TaskHandle`] and [`Job`](crate::Job).
//!
//! ## States
//! ```text
//! INIT ─► STARTING ─► STARTED ─┬─► RUNNING (blocking run on the parent loop)
//!            ▲                 ├─► GOING   (background run on its own tokio task)
//!            │                 └─► (passive)
//!            │                          │ context cancelled
//!            │                          ▼
//!            └── restart ◄── DISPOSED ◄─ DISPOSING
//! ```
//!
//! ## Start
//! ```text
//! loop {
//!   ├─► already cancelled?        → reject(cause), not admitted
//!   ├─► STARTING, start hook (panic → TaskError::Panic)
//!   │     ├─ Ok  → STARTED, startup = Ok, on_start listeners
//!   │     │        retry count = 0 (kept when restarting in place)
//!   │     │        Blocking:   run hook now → stop(Complete | err)
//!   │     │        Background: spawn run hook → stop(Complete | err) when it returns
//!   │     │        admitted
//!   │     └─ Err → check_retry:
//!   │              ├─ retry   → pause, continue (same context, queued children kept)
//!   │              └─ give up → reject(reason), not admitted
//! }
//! ```
//!
//! ## Dispose
//! ```text
//! DISPOSING → on_before_dispose → (job: close + drain children) → dispose hook
//!           → check_retry(stop reason):
//!               ├─ retry   → on_dispose, DISPOSED, fresh context, start() again
//!               └─ give up → shutdown = reason, on_dispose, DISPOSED
//! ```
//!
//! ## Rules
//! - The stop reason is written once, before the context is cancelled.
//! - `startup` and `shutdown` resolve once per task, never per attempt: waiters
//!   only see the final outcome of a retried task.
//! - Retries never happen once the parent is stopped.

use std::any::Any;
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;

use crate::core::job::{self, JobCore};
use crate::core::shared::Shared;
use crate::core::{Promise, TaskContext, TaskHandle};
use crate::error::TaskError;
use crate::events::{Event, EventKind};
use crate::policies::RetryPolicy;
use crate::tasks::{TaskMode, TaskOptions, TaskRef};

/// Lifecycle state of a task.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskState {
    /// Created, not yet seen by the parent's dispatch loop.
    Init = 0,
    /// Start hook in progress (or waiting to retry it).
    Starting = 1,
    /// Admitted; passive tasks stay here.
    Started = 2,
    /// Blocking `run` hook in progress.
    Running = 3,
    /// Background `run` hook in progress.
    Going = 4,
    /// Dispose sequence in progress.
    Disposing = 5,
    /// Disposed; terminal unless a restart follows.
    Disposed = 6,
}

impl TaskState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => TaskState::Init,
            1 => TaskState::Starting,
            2 => TaskState::Started,
            3 => TaskState::Running,
            4 => TaskState::Going,
            5 => TaskState::Disposing,
            _ => TaskState::Disposed,
        }
    }

    /// Short lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Init => "init",
            TaskState::Starting => "starting",
            TaskState::Started => "started",
            TaskState::Running => "running",
            TaskState::Going => "going",
            TaskState::Disposing => "disposing",
            TaskState::Disposed => "disposed",
        }
    }
}

pub(crate) type Listener = Arc<dyn Fn(&TaskHandle) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Listeners {
    pub(crate) start: Vec<Listener>,
    pub(crate) before_dispose: Vec<Listener>,
    pub(crate) dispose: Vec<Listener>,
}

struct Lifecycle {
    ctx: TaskContext,
    started_at: Option<Instant>,
    final_reason: Option<TaskError>,
}

struct RetryState {
    policy: RetryPolicy,
    count: u32,
    // Set while restarting in place after a dispose; the count carries over.
    restarting: bool,
}

enum Verdict {
    Retry,
    GiveUp(TaskError),
}

pub(crate) struct Node {
    pub(crate) id: u64,
    pub(crate) level: u32,
    pub(crate) handler: TaskRef,
    pub(crate) parent: Option<Arc<Node>>,
    pub(crate) shared: Arc<Shared>,
    pub(crate) job: Option<JobCore>,
    pub(crate) span: tracing::Span,
    pub(crate) startup: Promise,
    pub(crate) shutdown: Promise,
    context_override: Option<TaskContext>,
    state: AtomicU8,
    lifecycle: Mutex<Lifecycle>,
    retry: Mutex<RetryState>,
    description: Mutex<BTreeMap<String, String>>,
    listeners: Mutex<Listeners>,
    background: Mutex<Option<JoinHandle<()>>>,
}

impl Node {
    /// Creates a node. The context is established here, so the task can be
    /// stopped before its parent's dispatch loop ever sees it.
    pub(crate) fn new(
        handler: TaskRef,
        parent: Option<&Arc<Node>>,
        shared: Arc<Shared>,
        opts: TaskOptions,
        is_job: bool,
    ) -> Arc<Self> {
        let id = shared.next_id();
        let level = parent.map_or(0, |p| p.level + 1);
        let ctx = match (&opts.context, parent) {
            (Some(base), _) => base.child(),
            (None, Some(parent)) => parent.context().child(),
            (None, None) => TaskContext::background(),
        };
        let span = opts
            .span
            .unwrap_or_else(|| tracing::info_span!("task", id, name = handler.name(), level));
        let retry = opts.retry.unwrap_or(shared.config.retry);

        Arc::new(Self {
            id,
            level,
            parent: parent.cloned(),
            shared,
            job: is_job.then(JobCore::new),
            span,
            startup: Promise::new(),
            shutdown: Promise::new(),
            context_override: opts.context,
            state: AtomicU8::new(TaskState::Init as u8),
            lifecycle: Mutex::new(Lifecycle {
                ctx,
                started_at: None,
                final_reason: None,
            }),
            retry: Mutex::new(RetryState {
                policy: retry,
                count: 0,
                restarting: false,
            }),
            description: Mutex::new(opts.description),
            listeners: Mutex::new(Listeners::default()),
            background: Mutex::new(None),
            handler,
        })
    }

    /// Marks a parentless node as started: nothing else will admit it.
    pub(crate) fn mark_started(&self) {
        self.lifecycle.lock().started_at = Some(Instant::now());
        self.set_state(TaskState::Started);
        self.startup.resolve(Ok(()));
    }

    // ---------------------------
    // Accessors
    // ---------------------------

    pub(crate) fn context(&self) -> TaskContext {
        self.lifecycle.lock().ctx.clone()
    }

    pub(crate) fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: TaskState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn started_at(&self) -> Option<Instant> {
        self.lifecycle.lock().started_at
    }

    /// Final reason once disposed, the context's cause while stopping.
    pub(crate) fn stop_reason(&self) -> Option<TaskError> {
        let lc = self.lifecycle.lock();
        lc.final_reason.clone().or_else(|| lc.ctx.cause())
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.lifecycle.lock().ctx.is_cancelled()
    }

    pub(crate) fn retry_count(&self) -> u32 {
        self.retry.lock().count
    }

    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        self.retry.lock().policy
    }

    pub(crate) fn set_retry_policy(&self, policy: RetryPolicy) {
        self.retry.lock().policy = policy;
    }

    pub(crate) fn description(&self) -> BTreeMap<String, String> {
        self.description.lock().clone()
    }

    pub(crate) fn set_description(&self, key: impl Into<String>, value: impl ToString) {
        self.description.lock().insert(key.into(), value.to_string());
    }

    pub(crate) fn listeners(&self) -> parking_lot::MutexGuard<'_, Listeners> {
        self.listeners.lock()
    }

    pub(crate) fn publish(&self, ev: Event) {
        self.shared
            .bus
            .publish(ev.with_task(self.id, self.handler.name(), self.level));
    }

    /// Context the task derives from: the override, else the parent's current one.
    fn base_context(&self) -> Option<TaskContext> {
        self.context_override
            .clone()
            .or_else(|| self.parent.as_ref().map(|p| p.context()))
    }

    fn parent_gone(&self) -> bool {
        self.parent.as_ref().is_some_and(|p| p.is_stopped())
            || self.base_context().is_some_and(|ctx| ctx.is_cancelled())
    }

    fn fire(self: &Arc<Self>, pick: fn(&Listeners) -> &Vec<Listener>) {
        let snapshot: Vec<Listener> = pick(&self.listeners.lock()).clone();
        if snapshot.is_empty() {
            return;
        }
        let handle = TaskHandle::new(Arc::clone(self));
        for listener in snapshot {
            listener(&handle);
        }
    }

    // ---------------------------
    // Lifecycle
    // ---------------------------

    /// Cancels the context with `reason`. No-op if already stopped.
    pub(crate) fn stop(&self, reason: TaskError) -> bool {
        if !self.context().cancel(reason.clone()) {
            return false;
        }
        self.span.in_scope(|| match &reason {
            TaskError::Complete | TaskError::Exit | TaskError::AutoStop => {
                tracing::debug!(reason = %reason, "task stopped")
            }
            _ => tracing::warn!(reason = %reason, "task stopped"),
        });
        self.publish(Event::new(EventKind::TaskStopped).with_error(&reason));
        true
    }

    /// Runs the start sequence. Returns `true` if the task was admitted.
    pub(crate) async fn start(self: &Arc<Self>) -> bool {
        let handle = TaskHandle::new(Arc::clone(self));
        loop {
            if let Some(cause) = self.context().cause() {
                self.reject(cause);
                return false;
            }
            self.lifecycle.lock().started_at = Some(Instant::now());
            self.set_state(TaskState::Starting);
            self.publish(Event::new(EventKind::TaskStarting).with_retry(self.retry_count()));

            match guarded(self.handler.start(&handle)).await {
                Ok(()) => {
                    self.set_state(TaskState::Started);
                    {
                        let mut r = self.retry.lock();
                        if !r.restarting {
                            r.count = 0;
                        }
                        r.restarting = false;
                    }
                    if self.job.is_some() {
                        job::spawn_dispatch(self);
                    }
                    self.startup.resolve(Ok(()));
                    self.publish(Event::new(EventKind::TaskStarted));
                    self.fire(|l| &l.start);
                    if !self.is_stopped() {
                        self.launch(&handle).await;
                    }
                    return true;
                }
                // The context and the child queue carry over to the next attempt.
                Err(err) => match self.check_retry(err, self.context()).await {
                    Verdict::Retry => {}
                    Verdict::GiveUp(reason) => {
                        self.reject(self.context().cause().unwrap_or(reason));
                        return false;
                    }
                },
            }
        }
    }

    /// Drives the `run` hook according to the handler's mode.
    async fn launch(self: &Arc<Self>, handle: &TaskHandle) {
        match self.handler.mode() {
            TaskMode::Passive => {}
            TaskMode::Blocking => {
                self.set_state(TaskState::Running);
                let outcome = guarded(self.handler.run(handle)).await;
                self.stop(outcome.err().unwrap_or(TaskError::Complete));
            }
            TaskMode::Background => {
                self.set_state(TaskState::Going);
                let node = Arc::clone(self);
                let handle = handle.clone();
                let join = tokio::spawn(
                    async move {
                        let outcome = guarded(node.handler.run(&handle)).await;
                        node.stop(outcome.err().unwrap_or(TaskError::Complete));
                    }
                    .instrument(self.span.clone()),
                );
                *self.background.lock() = Some(join);
            }
        }
    }

    /// Refuses the task for good without running dispose hooks.
    pub(crate) fn reject(&self, reason: TaskError) {
        self.stop(reason.clone());
        if let Some(job) = &self.job {
            job.close(&reason);
        }
        self.span
            .in_scope(|| tracing::warn!(reason = %reason, "task rejected"));
        self.publish(Event::new(EventKind::TaskRejected).with_error(&reason));
        self.finish(reason);
    }

    /// Runs the dispose sequence. Returns `true` if the task restarted in place
    /// and was admitted again.
    pub(crate) async fn dispose(self: &Arc<Self>) -> bool {
        if !self.claim_dispose() {
            return false;
        }
        let reason = self.context().cause().unwrap_or(TaskError::Canceled);

        self.fire(|l| &l.before_dispose);
        if let Some(job) = &self.job {
            job.close_and_drain(&reason).await;
        }
        if let Err(payload) = AssertUnwindSafe(self.handler.dispose(&reason))
            .catch_unwind()
            .await
        {
            let message = panic_message(&*payload);
            self.span
                .in_scope(|| tracing::error!(panic = %message, "dispose hook panicked"));
        }
        let background = self.background.lock().take();
        if background.is_some_and(|run| !run.is_finished()) {
            self.span
                .in_scope(|| tracing::debug!("disposed while the background run is still winding down"));
        }

        let guard = self.base_context().unwrap_or_else(TaskContext::background);
        match self.check_retry(reason, guard).await {
            Verdict::Retry => {
                self.fire(|l| &l.dispose);
                self.set_state(TaskState::Disposed);
                self.retry.lock().restarting = true;
                self.renew();
                self.start().await
            }
            Verdict::GiveUp(reason) => {
                self.lifecycle.lock().final_reason = Some(reason.clone());
                self.shutdown.resolve(Err(reason.clone()));
                self.fire(|l| &l.dispose);
                self.set_state(TaskState::Disposed);
                self.span
                    .in_scope(|| tracing::debug!(reason = %reason, "task disposed"));
                self.publish(Event::new(EventKind::TaskDisposed).with_error(&reason));
                false
            }
        }
    }

    /// Stops with `reason`, disposes, and returns the final stop reason.
    pub(crate) async fn shutdown(self: &Arc<Self>, reason: TaskError) -> TaskError {
        self.stop(reason);
        self.dispose().await;
        TaskHandle::new(Arc::clone(self)).wait_stopped().await
    }

    /// Moves a started task into DISPOSING; `false` if not started or already disposing.
    fn claim_dispose(&self) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                let state = TaskState::from_u8(raw);
                (state >= TaskState::Started && state < TaskState::Disposing)
                    .then_some(TaskState::Disposing as u8)
            })
            .is_ok()
    }

    fn finish(&self, reason: TaskError) {
        self.lifecycle.lock().final_reason = Some(reason.clone());
        self.set_state(TaskState::Disposed);
        self.startup.resolve(Err(reason.clone()));
        self.shutdown.resolve(Err(reason));
    }

    /// Fresh context (and fresh child gate for jobs) for the next attempt.
    fn renew(&self) {
        let ctx = match self.base_context() {
            Some(base) => base.child(),
            None => TaskContext::background(),
        };
        self.lifecycle.lock().ctx = ctx;
        if let Some(job) = &self.job {
            job.reset();
        }
    }

    /// Decides whether `err` is absorbed by a retry, and paces it.
    ///
    /// The pause is abandoned as soon as `guard` is cancelled.
    async fn check_retry(&self, err: TaskError, guard: TaskContext) -> Verdict {
        if !err.is_retryable() || self.parent_gone() {
            return Verdict::GiveUp(err);
        }
        let (policy, retried) = {
            let r = self.retry.lock();
            (r.policy, r.count)
        };
        if !policy.allows(retried) {
            if policy.max_retry > 0 {
                return Verdict::GiveUp(TaskError::RetryExhausted {
                    retries: retried,
                    last: Box::new(err),
                });
            }
            return Verdict::GiveUp(err);
        }

        let retry = retried + 1;
        let elapsed = self.started_at().map_or(Duration::ZERO, |t| t.elapsed());
        let pause = policy.pause(retry, elapsed);
        self.span.in_scope(|| {
            tracing::warn!(
                retry,
                pause_ms = pause.as_millis() as u64,
                reason = %err,
                "task failed, retrying"
            )
        });
        self.publish(
            Event::new(EventKind::RetryScheduled)
                .with_retry(retry)
                .with_delay(pause)
                .with_error(&err),
        );

        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            _ = guard.cancelled() => return Verdict::GiveUp(err),
        }

        self.retry.lock().count = retry;
        self.set_description("retryCount", retry);
        Verdict::Retry
    }
}

/// Awaits a hook, converting a panic into [`TaskError::Panic`].
pub(crate) async fn guarded<F>(fut: F) -> Result<(), TaskError>
where
    F: Future<Output = Result<(), TaskError>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => Err(TaskError::panic(panic_message(&*payload), None)),
    }
}

/// Renders a panic payload as text.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32};

    use async_trait::async_trait;

    use super::*;
    use crate::core::testing::{FailingRun, Flaky, Idle, Journal, root};
    use crate::tasks::{Task, TaskFn};

    struct SlowStart {
        done: AtomicBool,
    }

    #[async_trait]
    impl Task for SlowStart {
        async fn start(&self, _task: &TaskHandle) -> Result<(), TaskError> {
            tokio::time::sleep(Duration::from_secs(1)).await;
            self.done.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct SelfRetrying {
        starts: AtomicU32,
    }

    #[async_trait]
    impl Task for SelfRetrying {
        async fn start(&self, task: &TaskHandle) -> Result<(), TaskError> {
            task.set_retry(3, Duration::from_secs(1));
            self.starts.fetch_add(1, Ordering::SeqCst);
            Err(TaskError::fail("refused"))
        }
    }

    struct PanicStart;

    #[async_trait]
    impl Task for PanicStart {
        async fn start(&self, _task: &TaskHandle) -> Result<(), TaskError> {
            panic!("boom");
        }
    }

    #[tokio::test]
    async fn listeners_fire_in_registration_order() {
        let root = root();
        let journal = Journal::default();

        let task = root.add_task_with(Idle::arc("idle"), TaskOptions::new(), |t| {
            t.on_start(journal.record("start1"));
            t.on_dispose(journal.record("dispose1"));
            t.on_start(journal.record("start2"));
            t.on_dispose(journal.record("dispose2"));
        });
        task.wait_started().await.unwrap();
        assert_eq!(task.state(), TaskState::Started);

        task.stop(TaskError::Complete);
        assert_eq!(task.wait_stopped().await, TaskError::Complete);
        assert_eq!(task.state(), TaskState::Disposed);
        assert_eq!(journal.entries(), ["start1", "start2", "dispose1", "dispose2"]);

        root.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn start_retries_until_budget_is_spent() {
        let root = root();
        let flaky = Flaky::always(TaskError::fail("refused"));
        let begun = Instant::now();

        let task = root.add_task(
            flaky.clone(),
            TaskOptions::new().with_retry(RetryPolicy::new(3, Duration::from_secs(1))),
        );

        let reason = task.wait_stopped().await;
        assert_eq!(
            reason,
            TaskError::RetryExhausted {
                retries: 3,
                last: Box::new(TaskError::fail("refused")),
            }
        );
        assert_eq!(task.retry_count(), 3);
        assert_eq!(flaky.starts(), 4);
        assert!(begun.elapsed() >= Duration::from_secs(3), "retries are paced");
        assert!(task.wait_started().await.is_err());
        assert_eq!(
            task.description().get("retryCount").map(String::as_str),
            Some("3")
        );
    }

    #[tokio::test]
    async fn shutdown_resolves_before_dispose_listeners() {
        let root = root();
        let seen = Arc::new(Mutex::new(None));

        let task = root.add_task_with(Idle::arc("idle"), TaskOptions::new(), |t| {
            let seen = Arc::clone(&seen);
            t.on_dispose(move |t| {
                *seen.lock() = Some((t.node().shutdown.outcome(), t.state()));
            });
        });
        task.wait_started().await.unwrap();
        task.stop(TaskError::Complete);
        task.wait_stopped().await;

        let (outcome, state) = seen.lock().take().expect("on_dispose ran");
        assert_eq!(outcome, Some(Err(TaskError::Complete)));
        assert_eq!(state, TaskState::Disposing);
        assert_eq!(task.state(), TaskState::Disposed);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_set_from_the_start_hook_bounds_attempts() {
        let root = root();
        let handler = Arc::new(SelfRetrying {
            starts: AtomicU32::new(0),
        });

        let task = root.add_task(handler.clone(), TaskOptions::new());

        assert_eq!(
            task.wait_stopped().await,
            TaskError::RetryExhausted {
                retries: 3,
                last: Box::new(TaskError::fail("refused")),
            }
        );
        assert_eq!(task.retry_count(), 3);
        assert_eq!(handler.starts.load(Ordering::SeqCst), 4);
        assert_eq!(task.retry_policy().max_retry, 3);
    }

    #[tokio::test]
    async fn no_budget_keeps_the_raw_error() {
        let root = root();
        let flaky = Flaky::always(TaskError::fail("refused"));

        let task = root.add_task(flaky.clone(), TaskOptions::new());

        assert_eq!(task.wait_stopped().await, TaskError::fail("refused"));
        assert_eq!(task.retry_count(), 0);
        assert_eq!(flaky.starts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_start_error_is_never_retried() {
        let root = root();
        let flaky = Flaky::always(TaskError::fatal("bad config"));

        let task = root.add_task(
            flaky.clone(),
            TaskOptions::new().with_retry(RetryPolicy::unlimited(Duration::from_secs(1))),
        );

        assert_eq!(task.wait_stopped().await, TaskError::fatal("bad config"));
        assert_eq!(flaky.starts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn start_succeeds_after_transient_failures() {
        let root = root();
        let flaky = Flaky::times(2, TaskError::fail("busy"));

        let task = root.add_task(
            flaky.clone(),
            TaskOptions::new().with_retry(RetryPolicy::new(5, Duration::from_millis(100))),
        );

        assert_eq!(task.wait_started().await, Ok(()));
        assert_eq!(flaky.starts(), 3);
        assert_eq!(task.retry_count(), 0, "cleared by the successful start");
    }

    #[tokio::test(start_paused = true)]
    async fn completed_run_is_never_retried() {
        let root = root();
        let runs = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&runs);

        let task = root.add_task(
            TaskFn::arc("once", move |_task: TaskHandle| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, TaskError>(())
                }
            }),
            TaskOptions::new().with_retry(RetryPolicy::unlimited(Duration::from_secs(1))),
        );

        assert_eq!(task.wait_stopped().await, TaskError::Complete);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_started_returns_after_the_start_hook() {
        let root = root();
        let handler = Arc::new(SlowStart {
            done: AtomicBool::new(false),
        });

        let task = root.add_task(handler.clone(), TaskOptions::new());
        task.wait_started().await.unwrap();

        assert!(handler.done.load(Ordering::SeqCst));
        assert!(task.state() >= TaskState::Started);
        assert!(task.start_time().is_some());
    }

    #[tokio::test]
    async fn panic_in_start_becomes_the_stop_reason() {
        let root = root();

        let task = root.add_task(Arc::new(PanicStart), TaskOptions::new());

        match task.wait_stopped().await {
            TaskError::Panic { message, .. } => assert_eq!(message, "boom"),
            other => panic!("unexpected reason: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failing_background_run_restarts_in_place_until_exhausted() {
        let root = root();
        let handler = FailingRun::arc();
        let journal = Journal::default();

        let task = root.add_task_with(
            handler.clone(),
            TaskOptions::new().with_retry(RetryPolicy::new(2, Duration::from_secs(1))),
            |t| t.on_start(journal.record("start")),
        );

        assert_eq!(
            task.wait_stopped().await,
            TaskError::RetryExhausted {
                retries: 2,
                last: Box::new(TaskError::fail("stream dropped")),
            }
        );
        assert_eq!(handler.runs(), 3);
        assert_eq!(task.retry_count(), 2);
        assert_eq!(journal.entries(), ["start", "start", "start"]);
    }

    #[tokio::test]
    async fn parent_stop_reason_reaches_children() {
        let root = root();
        let job = root.add_job(Idle::keepalive("job"), TaskOptions::new());
        let child = job.add_task(Idle::arc("child"), TaskOptions::new());
        child.wait_started().await.unwrap();

        job.stop(TaskError::fail("custom"));

        assert_eq!(child.wait_stopped().await, TaskError::fail("custom"));
        assert_eq!(job.wait_stopped().await, TaskError::fail("custom"));
        assert_eq!(child.level(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn parent_stop_abandons_pending_retry() {
        let root = root();
        let job = root.add_job(Idle::keepalive("job"), TaskOptions::new());
        let flaky = Flaky::always(TaskError::fail("refused"));
        let task = job.add_task(
            flaky.clone(),
            TaskOptions::new().with_retry(RetryPolicy::unlimited(Duration::from_secs(60))),
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        job.stop(TaskError::Exit);

        assert_eq!(task.wait_stopped().await, TaskError::Exit);
        assert_eq!(flaky.starts(), 1);
    }

    #[tokio::test]
    async fn stop_before_admission_rejects() {
        let root = root();
        let job = root.add_job(Idle::keepalive("job"), TaskOptions::new());
        job.wait_started().await.unwrap();

        let task = job.add_task(Idle::arc("early"), TaskOptions::new());
        task.stop(TaskError::fatal("not needed"));

        assert_eq!(task.wait_started().await, Err(TaskError::fatal("not needed")));
        assert_eq!(task.wait_stopped().await, TaskError::fatal("not needed"));
    }

    #[tokio::test]
    async fn handles_compare_by_identity() {
        let root = root();
        let a = root.add_task(Idle::arc("a"), TaskOptions::new());
        let b = root.add_task(Idle::arc("a"), TaskOptions::new());

        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.parent().map(|p| p.id()), Some(0));
    }
}
