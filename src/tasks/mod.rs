//! # Task handlers and admission options.
//!
//! - [`Task`] - trait with optional `start` / `run` / `dispose` hooks
//! - [`TaskMode`] - how `run` is driven (passive, blocking, background)
//! - [`TaskFn`] - closure-backed handler
//! - [`TaskRef`] - shared handler (`Arc<dyn Task>`)
//! - [`TaskOptions`] - per-admission configuration

pub(crate) mod callback;
mod options;
mod task;
mod task_fn;

pub use options::TaskOptions;
pub use task::{Task, TaskMode, TaskRef};
pub use task_fn::TaskFn;
