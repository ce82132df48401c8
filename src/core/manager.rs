//! # Keyed manager: a job with a key → child index.
//!
//! [`Manager`] wraps a [`Job`] whose children are all of one handler type `T`
//! and each expose a key (see [`Keyed`]). The index is maintained by listeners
//! installed before admission:
//!
//! ```text
//! add(handler) ──► key already live? ──yes──► refused with DuplicateKey
//!                        │ no
//!                        ▼
//!          on_start   → key held by another live task? stop(DuplicateKey)
//!                       else index.insert(key, (handler, task))
//!          on_dispose → index.remove(key)   (only if it still maps to this task)
//! ```
//!
//! Start listeners run on the job's dispatch loop, one child at a time, so of
//! two adds racing with the same key the first to start is indexed and the
//! other is stopped with [`TaskError::DuplicateKey`].

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::{Job, TaskHandle};
use crate::error::TaskError;
use crate::tasks::{Task, TaskOptions};

/// A handler that exposes a stable key.
pub trait Keyed<K> {
    /// Key under which the task is indexed by a [`Manager`].
    fn key(&self) -> K;
}

struct Entry<T> {
    handler: Arc<T>,
    task: TaskHandle,
}

type Index<K, T> = Arc<RwLock<HashMap<K, Entry<T>>>>;

/// Job with an index of live children by key.
pub struct Manager<K, T> {
    job: Job,
    index: Index<K, T>,
}

impl<K, T> Clone for Manager<K, T> {
    fn clone(&self) -> Self {
        Self {
            job: self.job.clone(),
            index: Arc::clone(&self.index),
        }
    }
}

impl<K, T> Deref for Manager<K, T> {
    type Target = Job;

    fn deref(&self) -> &Self::Target {
        &self.job
    }
}

impl<K, T> Manager<K, T> {
    /// Indexes children added through [`add`](Self::add) on `job`.
    pub fn new(job: Job) -> Self {
        Self {
            job,
            index: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The underlying job.
    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Number of indexed (started) children.
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    /// True if no child is indexed.
    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }
}

impl<K, T> Manager<K, T>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    T: Task + Keyed<K>,
{
    /// Registers `handler` under its key.
    ///
    /// If a live child already holds the key, the returned handle is already
    /// refused with [`TaskError::DuplicateKey`].
    pub fn add(&self, handler: Arc<T>, opts: TaskOptions) -> TaskHandle {
        self.insert(handler, opts, false)
    }

    /// Like [`add`](Self::add), admitting the handler as a job that can own
    /// children of its own.
    pub fn add_keyed_job(&self, handler: Arc<T>, opts: TaskOptions) -> Job {
        let task = self.insert(handler, opts, true);
        Job::from_node(Arc::clone(task.node()))
    }

    fn insert(&self, handler: Arc<T>, opts: TaskOptions, is_job: bool) -> TaskHandle {
        let key = handler.key();
        if self.task(&key).is_some_and(|t| !t.is_stopped()) {
            tracing::warn!(key = ?key, "duplicate key refused");
            let reason = TaskError::DuplicateKey {
                key: format!("{key:?}"),
            };
            return self.job.refuse(handler, opts, reason, is_job);
        }

        let on_start = {
            let index = Arc::clone(&self.index);
            let handler = Arc::clone(&handler);
            let key = key.clone();
            move |task: &TaskHandle| {
                let mut index = index.write();
                let taken = index
                    .get(&key)
                    .is_some_and(|e| e.task != *task && !e.task.is_stopped());
                if taken {
                    drop(index);
                    tracing::warn!(key = ?key, "duplicate key stopped after start");
                    task.stop(TaskError::DuplicateKey {
                        key: format!("{key:?}"),
                    });
                    return;
                }
                index.insert(
                    key.clone(),
                    Entry {
                        handler: Arc::clone(&handler),
                        task: task.clone(),
                    },
                );
            }
        };
        let on_dispose = {
            let index = Arc::clone(&self.index);
            move |task: &TaskHandle| {
                let mut index = index.write();
                if index.get(&key).is_some_and(|e| e.task == *task) {
                    index.remove(&key);
                }
            }
        };

        let prepare = move |task: &TaskHandle| {
            task.on_start(on_start);
            task.on_dispose(on_dispose);
        };
        if is_job {
            self.job.add_job_with(handler, opts, prepare).as_task().clone()
        } else {
            self.job.add_task_with(handler, opts, prepare)
        }
    }

    /// The handler indexed under `key`.
    pub fn get(&self, key: &K) -> Option<Arc<T>> {
        self.index.read().get(key).map(|e| Arc::clone(&e.handler))
    }

    /// The task indexed under `key`.
    pub fn task(&self, key: &K) -> Option<TaskHandle> {
        self.index.read().get(key).map(|e| e.task.clone())
    }

    /// True if `key` is indexed.
    pub fn contains(&self, key: &K) -> bool {
        self.index.read().contains_key(key)
    }

    /// Snapshot of indexed keys.
    pub fn keys(&self) -> Vec<K> {
        self.index.read().keys().cloned().collect()
    }

    /// Stops the child under `key`. The index entry goes away once it is disposed.
    pub fn remove(&self, key: &K, reason: impl Into<TaskError>) -> bool {
        match self.task(key) {
            Some(task) => task.stop(reason),
            None => false,
        }
    }

    /// Visits indexed entries until `f` returns `false`.
    pub fn range(&self, mut f: impl FnMut(&K, &Arc<T>) -> bool) {
        let snapshot: Vec<(K, Arc<T>)> = self
            .index
            .read()
            .iter()
            .map(|(k, e)| (k.clone(), Arc::clone(&e.handler)))
            .collect();
        for (key, handler) in &snapshot {
            if !f(key, handler) {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::core::RootManager;
    use crate::core::testing::{Idle, config};

    struct Device {
        id: &'static str,
    }

    #[async_trait]
    impl Task for Device {
        fn name(&self) -> &str {
            self.id
        }
    }

    impl Keyed<String> for Device {
        fn key(&self) -> String {
            self.id.to_string()
        }
    }

    fn device(id: &'static str) -> Arc<Device> {
        Arc::new(Device { id })
    }

    #[tokio::test]
    async fn index_follows_the_child_lifecycle() {
        let root: RootManager<String, Device> = RootManager::new(config());

        let cam = root.add(device("cam-1"), TaskOptions::new());
        cam.wait_started().await.unwrap();

        let key = "cam-1".to_string();
        assert!(root.contains(&key));
        assert_eq!(root.get(&key).map(|d| d.id), Some("cam-1"));
        assert_eq!(root.task(&key), Some(cam.clone()));
        assert_eq!(root.keys(), vec![key.clone()]);
        assert_eq!(root.len(), 1);

        assert!(root.remove(&key, TaskError::Complete));
        assert_eq!(cam.wait_stopped().await, TaskError::Complete);
        assert!(!root.contains(&key));
        assert!(root.is_empty());
        assert!(!root.remove(&key, TaskError::Complete));
    }

    #[tokio::test]
    async fn duplicate_key_is_refused() {
        let root: RootManager<String, Device> = RootManager::new(config());
        let first = root.add(device("cam-1"), TaskOptions::new());
        first.wait_started().await.unwrap();

        let second = root.add(device("cam-1"), TaskOptions::new());

        assert_eq!(
            second.wait_started().await,
            Err(TaskError::DuplicateKey {
                key: "\"cam-1\"".to_string()
            })
        );
        assert!(!first.is_stopped());
        assert_eq!(root.task(&"cam-1".to_string()), Some(first));
    }

    #[tokio::test]
    async fn racing_adds_keep_one_indexed_child() {
        let root: RootManager<String, Device> = RootManager::new(config());
        let key = "cam-1".to_string();

        let first = root.add(device("cam-1"), TaskOptions::new());
        let second = root.add(device("cam-1"), TaskOptions::new());

        assert_eq!(
            second.wait_stopped().await,
            TaskError::DuplicateKey {
                key: "\"cam-1\"".to_string()
            }
        );
        first.wait_started().await.unwrap();
        assert!(!first.is_stopped());
        assert_eq!(root.task(&key), Some(first.clone()));
        assert_eq!(root.child_count(), 1);

        first.stop(TaskError::Complete);
        first.wait_stopped().await;
        assert!(!root.contains(&key));
        assert_eq!(root.child_count(), 0);
    }

    #[tokio::test]
    async fn key_is_reusable_after_disposal() {
        let root: RootManager<String, Device> = RootManager::new(config());
        let first = root.add(device("cam-1"), TaskOptions::new());
        first.wait_started().await.unwrap();
        first.stop(TaskError::Complete);
        first.wait_stopped().await;

        let second = root.add(device("cam-1"), TaskOptions::new());
        second.wait_started().await.unwrap();
        assert_eq!(root.task(&"cam-1".to_string()), Some(second));
    }

    #[tokio::test]
    async fn keyed_jobs_own_children() {
        let root: RootManager<String, Device> = RootManager::new(config());
        let key = "cam-1".to_string();

        let cam = root.add_keyed_job(device("cam-1"), TaskOptions::new());
        let stream = cam.add_task(Idle::arc("stream"), TaskOptions::new());
        stream.wait_started().await.unwrap();
        assert!(root.task(&key).is_some_and(|t| t.is_job()));

        assert!(root.remove(&key, TaskError::Complete));
        assert_eq!(stream.wait_stopped().await, TaskError::Complete);
        assert_eq!(cam.wait_stopped().await, TaskError::Complete);
        assert!(!root.contains(&key));
    }

    #[tokio::test]
    async fn nested_manager_over_a_job() {
        let root = crate::core::testing::root();
        let job = root.add_job(Idle::keepalive("devices"), TaskOptions::new());
        let devices: Manager<String, Device> = Manager::new(job.clone());

        for id in ["cam-1", "cam-2", "cam-3"] {
            devices
                .add(device(id), TaskOptions::new())
                .wait_started()
                .await
                .unwrap();
        }

        let mut visited = 0;
        devices.range(|_key, _dev| {
            visited += 1;
            visited < 2
        });
        assert_eq!(visited, 2);

        let mut keys = devices.keys();
        keys.sort();
        assert_eq!(keys, ["cam-1", "cam-2", "cam-3"]);
        assert_eq!(devices.child_count(), 3);
        assert!(devices.task(&"cam-2".to_string()).is_some_and(|t| t.level() == 2));

        job.stop(TaskError::Exit);
        job.wait_stopped().await;
        assert!(devices.is_empty());
    }
}
