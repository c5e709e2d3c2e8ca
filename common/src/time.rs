//! Time utilities, constants and the clock abstraction.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

/// Timing constants.
pub mod constants {
    use super::Duration;

    /// Lifetime of a built rate graph (5 minutes).
    pub fn graph_cache_ttl() -> Duration {
        Duration::minutes(5)
    }

    /// Longest accepted graph lifetime (1 day).
    pub fn max_graph_cache_ttl() -> Duration {
        Duration::days(1)
    }

    /// Default look-back window for rate history (30 days).
    pub fn history_window() -> Duration {
        Duration::days(30)
    }
}

/// A timestamp with timezone (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Source of the current time.
///
/// Everything that ages data (edge confidence, cache expiry, history
/// windows) reads time through a `Clock` so it can be pinned in tests.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> Timestamp;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<Timestamp>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write();
        *now += by;
    }

    /// Jump to an absolute time.
    pub fn set(&self, to: Timestamp) {
        *self.now.write() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.read()
    }
}

/// Shared clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// Calendar day key (`YYYY-MM-DD`) for a timestamp.
pub fn day_key(timestamp: Timestamp) -> String {
    timestamp.date_naive().format("%Y-%m-%d").to_string()
}

/// Calendar day of a timestamp.
pub fn day_of(timestamp: Timestamp) -> NaiveDate {
    timestamp.date_naive()
}

/// Timestamps one day apart from `start` up to and including `end`.
///
/// Stops early if the next day would fall outside the representable range.
pub fn day_steps(start: Timestamp, end: Timestamp) -> impl Iterator<Item = Timestamp> {
    std::iter::successors(Some(start), |current| {
        current.checked_add_signed(Duration::days(1))
    })
    .take_while(move |current| *current <= end)
}
