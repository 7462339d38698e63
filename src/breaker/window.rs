//! Rolling outcome window for circuit health evaluation.
//!
//! Outcomes are bucketed per second over a fixed-width window. Buckets are
//! reused in a ring; a bucket whose tagged second has fallen out of the
//! window is discarded on the next write or read that touches it. All
//! methods take an explicit `now` so evaluation is deterministic in tests.

use std::time::Instant;

/// Number of one-second buckets in the window.
const BUCKETS: u64 = 10;

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    /// Seconds since the window origin this bucket currently represents.
    second: u64,
    successes: u32,
    failures: u32,
}

/// Success/failure totals over the window at a single instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WindowTotals {
    pub volume: u32,
    pub failures: u32,
}

impl WindowTotals {
    /// Failure percentage (0-100) of the observed volume. Zero volume
    /// reports zero percent.
    pub fn error_percent(&self) -> u32 {
        if self.volume == 0 {
            0
        } else {
            self.failures * 100 / self.volume
        }
    }
}

/// Ring of per-second outcome buckets covering the last [`BUCKETS`] seconds.
#[derive(Debug)]
pub(crate) struct RollingWindow {
    origin: Instant,
    buckets: [Bucket; BUCKETS as usize],
}

impl RollingWindow {
    pub fn new(origin: Instant) -> Self {
        Self {
            origin,
            buckets: [Bucket::default(); BUCKETS as usize],
        }
    }

    pub fn record_success(&mut self, now: Instant) {
        self.bucket_mut(now).successes += 1;
    }

    pub fn record_failure(&mut self, now: Instant) {
        self.bucket_mut(now).failures += 1;
    }

    /// Sum the buckets still inside the window ending at `now`.
    pub fn totals(&self, now: Instant) -> WindowTotals {
        let current = self.second(now);
        let oldest = current.saturating_sub(BUCKETS - 1);
        let mut totals = WindowTotals {
            volume: 0,
            failures: 0,
        };
        for bucket in &self.buckets {
            if bucket.second >= oldest && bucket.second <= current {
                totals.volume += bucket.successes + bucket.failures;
                totals.failures += bucket.failures;
            }
        }
        totals
    }

    /// Drop all recorded outcomes, e.g. after the circuit recovers.
    pub fn reset(&mut self) {
        self.buckets = [Bucket::default(); BUCKETS as usize];
        // Zeroed buckets claim second 0; push the origin back so second 0
        // is already outside the window and stale tags cannot be counted.
        self.origin = self
            .origin
            .checked_sub(std::time::Duration::from_secs(BUCKETS))
            .unwrap_or(self.origin);
    }

    fn second(&self, now: Instant) -> u64 {
        now.duration_since(self.origin).as_secs()
    }

    fn bucket_mut(&mut self, now: Instant) -> &mut Bucket {
        let second = self.second(now);
        let bucket = &mut self.buckets[(second % BUCKETS) as usize];
        if bucket.second != second {
            *bucket = Bucket {
                second,
                successes: 0,
                failures: 0,
            };
        }
        bucket
    }
}
