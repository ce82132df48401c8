//! # Example: device_tree
//!
//! A keyed manager of devices. Each device is a job owning one stream pull
//! task; removing a device tears down its stream, and Ctrl-C (or the demo
//! timer) shuts the whole tree down.
//!
//! ```text
//! root (RootManager<String, Device>)
//!   ├─ Device "cam-1" (job, passive)
//!   │    └─ pull "cam-1/main" (background)
//!   ├─ Device "cam-2"
//!   │    └─ pull "cam-2/main"
//!   └─ os-signal
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=info cargo run --example device_tree
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tasktree::{
    Config, Keyed, LogWriter, RootManager, Subscribe, Task, TaskError, TaskFn, TaskHandle,
    TaskOptions,
};

struct Device {
    id: String,
}

#[async_trait]
impl Task for Device {
    fn name(&self) -> &str {
        &self.id
    }

    async fn start(&self, task: &TaskHandle) -> Result<(), TaskError> {
        let job = task
            .as_job()
            .ok_or_else(|| TaskError::fatal("device must be added as a job"))?;

        let stream = format!("{}/main", self.id);
        let pull = TaskFn::arc(stream.clone(), move |task: TaskHandle| {
            let stream = stream.clone();
            async move {
                let mut ticks = tokio::time::interval(Duration::from_millis(500));
                loop {
                    tokio::select! {
                        _ = task.cancelled() => return Ok::<_, TaskError>(()),
                        _ = ticks.tick() => tracing::info!(%stream, "frame"),
                    }
                }
            }
        });
        job.add_task(pull, TaskOptions::new().with_description("kind", "pull"));
        Ok(())
    }

    async fn dispose(&self, reason: &TaskError) {
        tracing::info!(device = %self.id, %reason, "device released");
    }
}

impl Keyed<String> for Device {
    fn key(&self) -> String {
        self.id.clone()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let root: RootManager<String, Device> = RootManager::builder(Config::default())
        .with_subscribers(subs)
        .build();

    for id in ["cam-1", "cam-2"] {
        let device = Arc::new(Device { id: id.to_string() });
        let job = root.add_keyed_job(device, TaskOptions::new());
        job.wait_started().await?;
        println!("[demo] {} started", job.name());
    }
    println!("[demo] devices: {:?}", root.keys());

    tokio::time::sleep(Duration::from_secs(2)).await;
    let key = "cam-1".to_string();
    if let Some(cam) = root.task(&key) {
        println!("[demo] removing {key}");
        root.remove(&key, TaskError::Complete);
        println!("[demo] {key} stopped: {}", cam.wait_stopped().await);
    }
    println!("[demo] devices: {:?}", root.keys());

    tokio::select! {
        res = root.wait() => println!("[demo] tree stopped: {}", res?),
        _ = tokio::time::sleep(Duration::from_secs(3)) => {
            println!("[demo] tree stopped: {}", root.shutdown().await?);
        }
    }
    Ok(())
}
