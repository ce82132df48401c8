//! Retry policies.
//!
//! ## Contents
//! - [`RetryPolicy`] retry budget and pacing (`max_retry` / interval / growth)
//! - [`JitterPolicy`] randomization of the pause between attempts
//!
//! ## Wiring
//! ```text
//! TaskOptions { retry: Option<RetryPolicy> }  (falls back to Config::retry)
//!      └─► core::node uses:
//!           - retry.allows(count) to decide restart vs. give up
//!           - retry.pause(count, elapsed) to pace the next attempt
//! ```

mod jitter;
mod retry;

pub use jitter::JitterPolicy;
pub use retry::RetryPolicy;
