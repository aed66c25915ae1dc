//! Monotonic second counter, incremented by a single background thread
//! and read lock-free everywhere else. Kept separate from `SystemTime` so
//! expiry math stays simple integer arithmetic, the same tradeoff the
//! session table this is modeled on makes.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Timer(AtomicU64);

impl Timer {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Current tick count.
    ///
    /// # Examples
    ///
    /// ```
    /// use rtpcore_session::timer::Timer;
    ///
    /// let timer = Timer::new();
    /// assert_eq!(timer.get(), 0);
    /// timer.add(1);
    /// assert_eq!(timer.get(), 1);
    /// ```
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    pub fn add(&self, delta: u64) -> u64 {
        self.0.fetch_add(delta, Ordering::AcqRel) + delta
    }
}
