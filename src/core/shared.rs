//! Per-tree state shared by every node: id generator, event bus, config.
//!
//! Created once by the root and handed down to each admitted node, so two trees
//! in one process never share ids or events.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::Config;
use crate::events::Bus;

#[derive(Debug)]
pub(crate) struct Shared {
    ids: AtomicU64,
    pub(crate) bus: Bus,
    pub(crate) config: Config,
}

impl Shared {
    pub(crate) fn new(config: Config) -> Self {
        Self {
            ids: AtomicU64::new(0),
            bus: Bus::new(config.bus_capacity_clamped()),
            config,
        }
    }

    /// Next task id; the root gets 0.
    pub(crate) fn next_id(&self) -> u64 {
        self.ids.fetch_add(1, Ordering::Relaxed)
    }
}
