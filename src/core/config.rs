//! # Tree configuration.
//!
//! [`Config`] holds the settings a [`RootManager`](crate::RootManager) is built with.
//!
//! Config is used in two ways:
//! 1. **Root creation**: bus capacity, OS signal handling, shutdown grace
//! 2. **Task defaults**: `retry` applies to every task admitted without
//!    [`TaskOptions::with_retry`](crate::TaskOptions::with_retry)
//!
//! ## Sentinel values
//! - `grace = 0s` → wait for shutdown without a deadline

use std::time::Duration;

use crate::policies::RetryPolicy;

/// Configuration of one task tree.
#[derive(Clone, Debug)]
pub struct Config {
    /// Capacity of the event bus ring buffer (min 1).
    pub bus_capacity: usize,

    /// Retry policy for tasks admitted without an explicit one.
    pub retry: RetryPolicy,

    /// Install the `OsSignal` task (SIGINT/SIGTERM/SIGQUIT → shutdown).
    pub signals: bool,

    /// Maximum time [`RootManager::shutdown`](crate::RootManager::shutdown) waits
    /// for the tree to dispose.
    pub grace: Duration,
}

impl Config {
    /// Bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Shutdown deadline, `None` if unbounded.
    #[inline]
    pub fn grace_period(&self) -> Option<Duration> {
        if self.grace == Duration::ZERO {
            None
        } else {
            Some(self.grace)
        }
    }
}

impl Default for Config {
    /// - `bus_capacity = 1024`
    /// - `retry = RetryPolicy::never()`
    /// - `signals = true`
    /// - `grace = 30s`
    fn default() -> Self {
        Self {
            bus_capacity: 1024,
            retry: RetryPolicy::never(),
            signals: true,
            grace: Duration::from_secs(30),
        }
    }
}
