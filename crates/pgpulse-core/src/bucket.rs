//! Time bucketing for cycle timestamps.
//!
//! Every sample produced by one cycle carries the same timestamp: the cycle
//! start floored to the polling interval.

use std::fmt;
use std::num::NonZeroU64;
use std::time::Duration;

/// Polling interval in whole seconds. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Interval(NonZeroU64);

impl Interval {
    pub const ONE_MINUTE: Interval = Interval(NonZeroU64::new(60).unwrap());

    /// Longest accepted interval; timestamps are `i64` seconds.
    pub const MAX_SECS: u64 = i64::MAX as u64;

    /// Returns `None` for zero or for intervals that do not fit a timestamp.
    pub fn from_secs(secs: u64) -> Option<Self> {
        if secs > Self::MAX_SECS {
            return None;
        }
        NonZeroU64::new(secs).map(Self)
    }

    pub fn as_secs(self) -> u64 {
        self.0.get()
    }

    /// Floors a unix timestamp to the interval boundary.
    pub fn floor(self, now: i64) -> i64 {
        bucket(now, self)
    }

    /// Returns the first boundary strictly after `now`.
    pub fn next_boundary(self, now: i64) -> i64 {
        self.floor(now).saturating_add(self.as_secs() as i64)
    }
}

impl Default for Interval {
    fn default() -> Self {
        Self::ONE_MINUTE
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.as_secs())
    }
}

/// `now - (now mod interval)`, using euclidean remainder so timestamps before
/// the epoch still floor downwards.
pub fn bucket(now: i64, interval: Interval) -> i64 {
    let secs = interval.as_secs() as i64;
    now - now.rem_euclid(secs)
}

/// A fired trigger: the bucket the cycle runs for, and how many boundaries
/// were passed over since the previous cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub bucket: i64,
    pub skipped: u64,
}

/// Tracks which bucket the last cycle ran for.
///
/// Cycles never overlap: if a cycle runs past one or more boundaries, those
/// triggers are skipped rather than replayed.
#[derive(Debug, Clone)]
pub struct Ticker {
    interval: Interval,
    last: Option<i64>,
}

impl Ticker {
    pub fn new(interval: Interval) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Whether a cycle is due at `now`.
    pub fn is_due(&self, now: i64) -> bool {
        match self.last {
            None => true,
            Some(last) => self.interval.floor(now) > last,
        }
    }

    /// Marks a cycle as started at `now`.
    pub fn fire(&mut self, now: i64) -> Tick {
        let bucket = self.interval.floor(now);
        let step = self.interval.as_secs() as i64;
        let skipped = match self.last {
            Some(last) if bucket > last => ((bucket - last) / step - 1) as u64,
            _ => 0,
        };
        self.last = Some(bucket);
        Tick { bucket, skipped }
    }

    /// Marks the cycle as finished at `now`.
    ///
    /// Boundaries crossed while the cycle ran are consumed, so the next cycle
    /// waits for the following boundary. Returns how many were skipped.
    pub fn complete(&mut self, now: i64) -> u64 {
        let Some(last) = self.last else {
            return 0;
        };
        let end = self.interval.floor(now);
        if end <= last {
            return 0;
        }
        self.last = Some(end);
        ((end - last) / self.interval.as_secs() as i64) as u64
    }

    /// Time left until the next cycle may start.
    pub fn wait(&self, now: i64) -> Duration {
        if self.is_due(now) {
            return Duration::ZERO;
        }
        let next = self.interval.next_boundary(now);
        Duration::from_secs((next - now).max(0) as u64)
    }
}
