//! Monotonic tick clocks for timing region workloads

use std::time::Instant;

/// Source of monotonic ticks.
pub trait Clock {
    /// Current tick count; never decreases.
    fn ticks(&self) -> u64;

    /// Convert a tick delta to seconds.
    fn ticks_to_seconds(&self, ticks: u64) -> f64;
}

/// Nanosecond ticks since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn ticks(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    #[inline]
    fn ticks_to_seconds(&self, ticks: u64) -> f64 {
        ticks as f64 / 1_000_000_000.0
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn ticks(&self) -> u64 {
        (**self).ticks()
    }

    fn ticks_to_seconds(&self, ticks: u64) -> f64 {
        (**self).ticks_to_seconds(ticks)
    }
}
