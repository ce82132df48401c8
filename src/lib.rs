//! # tasktree
//!
//! **tasktree** is a hierarchical task supervision library for tokio.
//!
//! Long-lived units of work (streams, device sessions, connections) are modelled
//! as a tree of tasks: jobs own children, children inherit cancellation, and a
//! failed task is retried in place according to its policy. Stopping any node
//! tears down its whole subtree, and every node reports one typed stop reason.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!                 ┌───────────────────────────────────────────┐
//!                 │ RootManager (keepalive root job, level 0) │
//!                 │  - Shared { id counter, Bus, Config }     │
//!                 │  - OsSignal task (optional)               │
//!                 └──────┬───────────────────────┬────────────┘
//!                        │ dispatch loop         │
//!                        ▼                       ▼
//!              ┌──────────────────┐     ┌──────────────────┐
//!              │ Job "camera-1"   │     │ Task "metrics"   │
//!              │ (Manager<K, T>)  │     │ (background run) │
//!              └──┬────────────┬──┘     └──────────────────┘
//!                 │ dispatch loop
//!                 ▼            ▼
//!          ┌────────────┐ ┌────────────┐
//!          │ Task "rtp" │ │ Task "rtcp"│
//!          └────────────┘ └────────────┘
//!
//!  every node ── publish(Event) ──► Bus ──► forwarder ──► SubscriberSet
//!                                                          ├─► worker 1 ─► sub1.on_event()
//!                                                          └─► worker N ─► subN.on_event()
//! ```
//!
//! ### Lifecycle
//! ```text
//! job.add_task(handler) ──► INIT ──► job's dispatch loop:
//!
//! loop {
//!   ├─► STARTING: handler.start()
//!   │     ├─ Ok  → STARTED → startup resolved, on_start listeners
//!   │     │         ├─ Blocking   → RUNNING: run() on the loop → stop(Complete | err)
//!   │     │         ├─ Background → GOING:   run() on its own tokio task
//!   │     │         └─ Passive    → until stopped
//!   │     └─ Err → retry policy allows? pause, fresh context, retry : rejected
//!   │
//!   └─ context cancelled (stop, parent stop, run finished)
//!        └─► DISPOSING: children drained, handler.dispose(reason)
//!              ├─ reason retryable and budget left → restart in place
//!              └─ otherwise → DISPOSED, shutdown resolved with the reason
//! }
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                     |
//! |-------------------|--------------------------------------------------------------|----------------------------------------|
//! | **Tree**          | Root, jobs, keyed managers, task handles.                    | [`RootManager`], [`Job`], [`Manager`], [`TaskHandle`] |
//! | **Tasks**         | Handlers with optional start/run/dispose hooks.              | [`Task`], [`TaskFn`], [`TaskMode`]     |
//! | **Policies**      | Retry budget, pacing, backoff and jitter.                    | [`RetryPolicy`], [`JitterPolicy`]      |
//! | **Cancellation**  | Context chains carrying a typed cause; one-shot promises.    | [`TaskContext`], [`Promise`]           |
//! | **Subscriber API**| Hook into lifecycle events (logging, metrics, custom sinks). | [`Subscribe`], [`LogWriter`]           |
//! | **Errors**        | Typed stop reasons and root errors.                          | [`TaskError`], [`RuntimeError`]        |
//! | **Configuration** | Per-tree settings.                                           | [`Config`]                             |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tasktree::{Config, LogWriter, RootManager, Subscribe, TaskError, TaskFn, TaskHandle, TaskOptions};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config { signals: false, grace: Duration::from_secs(5), ..Config::default() };
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
//!     let root: RootManager = RootManager::builder(cfg).with_subscribers(subs).build();
//!
//!     let hello = root.add_task(
//!         TaskFn::arc("hello", |_task: TaskHandle| async move {
//!             println!("Hello from task!");
//!             Ok::<_, TaskError>(())
//!         }),
//!         TaskOptions::new(),
//!     );
//!     assert_eq!(hello.wait_stopped().await, TaskError::Complete);
//!
//!     assert_eq!(root.shutdown().await?, TaskError::Exit);
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod policies;
mod subscribers;
mod tasks;

// ---- Public re-exports ----

pub use crate::core::{
    Config, Job, Keyed, Manager, Promise, RootBuilder, RootManager, TaskContext, TaskHandle,
    TaskState,
};
pub use error::{RuntimeError, TaskError};
pub use events::{Bus, Event, EventKind};
pub use policies::{JitterPolicy, RetryPolicy};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
pub use tasks::{Task, TaskFn, TaskMode, TaskOptions, TaskRef};
