//! Runtime core: the task tree and its lifecycle.
//!
//! Public API from this module: [`RootManager`], [`Job`], [`Manager`],
//! [`TaskHandle`], plus the building blocks [`TaskContext`] and [`Promise`].
//!
//! Internal modules:
//! - [`node`]: per-task state machine (start, retry, dispose, restart);
//! - [`job`]: dispatch loop serializing a job's children;
//! - [`manager`]: key → child index over a job;
//! - [`root`]: tree root, subscriber forwarding, graceful shutdown;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod config;
mod context;
mod handle;
mod job;
mod manager;
mod node;
mod promise;
mod root;
mod shared;
mod shutdown;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use context::TaskContext;
pub use handle::TaskHandle;
pub use job::Job;
pub use manager::{Keyed, Manager};
pub use node::TaskState;
pub use promise::Promise;
pub use root::{RootBuilder, RootManager};

pub(crate) use node::panic_message;
