// Clock - Wall-clock capability for the step engine
// Production uses a monotonic clock, tests drive time by hand

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Source of the current time in seconds
///
/// Only differences between readings matter; the origin is arbitrary.
pub trait Clock {
    fn now(&self) -> f64;
}

/// Monotonic clock measured from its creation
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Hand-driven clock
///
/// Clones share the same time, so a test can keep one handle and give the
/// other to the sequencer. Stored as f64 bits in an atomic.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    seconds: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start at a given time
    pub fn starting_at(seconds: f64) -> Self {
        let clock = Self::new();
        clock.set(seconds);
        clock
    }

    /// Jump to an absolute time
    pub fn set(&self, seconds: f64) {
        self.seconds.store(seconds.to_bits(), Ordering::Relaxed);
    }

    /// Move time forward (or backward with a negative delta)
    pub fn advance(&self, delta: f64) {
        self.set(self.now() + delta);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.seconds.load(Ordering::Relaxed))
    }
}
