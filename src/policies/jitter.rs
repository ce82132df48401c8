//! # Jitter for retry pauses.
//!
//! [`JitterPolicy`] randomizes the pause between retries so that a fleet of
//! tasks failing on the same upstream does not reconnect in lockstep.
//!
//! - [`JitterPolicy::None`] — exact pause
//! - [`JitterPolicy::Full`] — random pause in `[0, pause]`
//! - [`JitterPolicy::Equal`] — `pause/2 + random[0, pause/2]`

use rand::Rng;
use std::time::Duration;

/// Randomization applied to a computed retry pause.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// Use the pause as computed.
    #[default]
    None,
    /// Random pause in `[0, pause]`.
    Full,
    /// Half the pause plus a random share of the other half.
    Equal,
}

impl JitterPolicy {
    /// Applies jitter to `pause`.
    pub fn apply(&self, pause: Duration) -> Duration {
        let ms = pause.as_millis().min(u128::from(u64::MAX)) as u64;
        if ms == 0 {
            return pause;
        }
        let mut rng = rand::rng();
        match self {
            JitterPolicy::None => pause,
            JitterPolicy::Full => Duration::from_millis(rng.random_range(0..=ms)),
            JitterPolicy::Equal => {
                let half = ms / 2;
                Duration::from_millis(half + rng.random_range(0..=ms - half))
            }
        }
    }
}
