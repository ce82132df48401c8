//! # Example: retry_with_backoff
//!
//! A background task that fails its first two runs. Each failure disposes the
//! task and restarts it in place after a growing, jittered pause.
//!
//! ## Flow
//! ```text
//! root.add_task(flaky, retry = 5 × 100ms, ×2, max 1s, equal jitter)
//!   ├─► TaskStarting → TaskStarted → run() → Err("boom #1")
//!   ├─► TaskStopped(fail) → dispose → RetryScheduled{retry=1, delay≈100ms}
//!   ├─► TaskStarting → TaskStarted → run() → Err("boom #2")
//!   ├─► TaskStopped(fail) → dispose → RetryScheduled{retry=2, delay≈200ms}
//!   ├─► TaskStarting → TaskStarted → run() → Ok(())
//!   └─► TaskStopped(complete) → TaskDisposed(complete)
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=debug cargo run --example retry_with_backoff
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tasktree::{
    Config, JitterPolicy, LogWriter, RetryPolicy, RootManager, Subscribe, TaskError, TaskFn,
    TaskHandle, TaskOptions, TaskRef,
};

static RUNS: AtomicU64 = AtomicU64::new(0);

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // 1. Tree with a 5s grace period and the built-in log subscriber
    let cfg = Config {
        grace: Duration::from_secs(5),
        bus_capacity: 100,
        signals: false,
        ..Config::default()
    };
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let root: RootManager = RootManager::builder(cfg).with_subscribers(subs).build();

    // 2. A run hook that fails twice, then succeeds
    let flaky: TaskRef = TaskFn::arc("flaky", |task: TaskHandle| async move {
        let run = RUNS.fetch_add(1, Ordering::Relaxed) + 1;
        println!("[flaky] run {run} (retry count {})", task.retry_count());

        if run <= 2 {
            println!("[flaky] simulated failure #{run}");
            return Err(TaskError::fail(format!("boom #{run}")));
        }
        println!("[flaky] success on run {run}");
        Ok(())
    });

    // 3. Exponential backoff with jitter
    let retry = RetryPolicy::new(5, Duration::from_millis(100))
        .with_backoff(2.0, Duration::from_secs(1))
        .with_jitter(JitterPolicy::Equal);

    // 4. Admit and wait for the final outcome
    let task = root.add_task(flaky, TaskOptions::new().with_retry(retry));
    let reason = task.wait_stopped().await;
    println!("[flaky] finished: {reason} after {} runs", RUNS.load(Ordering::Relaxed));

    root.shutdown().await?;
    Ok(())
}
