//! Tree events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: task nodes (start/stop/retry/dispose), job dispatch loops
//!   (panics), the root (shutdown), `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the root forwarder (fans out to `SubscriberSet`) and any
//!   receiver obtained from `RootManager::subscribe`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
