//! [`Clock`] – monotonic time and blocking sleep.
//!
//! The transport never calls `std::thread::sleep` or `Instant::now` directly;
//! every wait goes through a [`Clock`] so that connect backoff and write
//! stalls can be replayed deterministically in tests.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use sitl_transport::clock::{Clock, ManualClock};
//!
//! let clock = ManualClock::new();
//! clock.sleep(Duration::from_millis(500));
//! assert_eq!(clock.millis(), 500);
//! assert_eq!(clock.sleeps(), vec![Duration::from_millis(500)]);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Source of monotonic time plus the matching sleep primitive.
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;

    /// Block the calling thread for `duration`.
    fn sleep(&self, duration: Duration);

    /// Milliseconds since the clock's origin.
    fn millis(&self) -> u64 {
        self.now().as_millis() as u64
    }

    /// Microseconds since the clock's origin.
    fn micros(&self) -> u64 {
        self.now().as_micros() as u64
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SystemClock
// ────────────────────────────────────────────────────────────────────────────

/// Wall-clock implementation backed by [`Instant`].
///
/// The origin is the moment the clock was created.
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
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    /// A zero duration yields the thread instead of sleeping.
    fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            std::thread::yield_now();
        } else {
            std::thread::sleep(duration);
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ManualClock
// ────────────────────────────────────────────────────────────────────────────

/// Fake clock whose time only moves when told to.
///
/// [`sleep`][Clock::sleep] returns immediately, advances the clock by the
/// requested duration, and records it.  Clones share the same state, so a
/// test can keep one handle while the transport owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_us: Arc<AtomicU64>,
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl ManualClock {
    /// A clock at time zero with no recorded sleeps.
    pub fn new() -> Self {
        Self::default()
    }

    /// Jump to an absolute time in milliseconds.
    pub fn set_millis(&self, ms: u64) {
        self.now_us.store(ms.saturating_mul(1_000), Ordering::SeqCst);
    }

    /// Move time forward without recording a sleep.
    pub fn advance(&self, by: Duration) {
        self.now_us
            .fetch_add(by.as_micros() as u64, Ordering::SeqCst);
    }

    /// Return to time zero and forget recorded sleeps.
    pub fn reset(&self) {
        self.now_us.store(0, Ordering::SeqCst);
        self.sleeps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    /// Every duration passed to `sleep`, oldest first.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_micros(self.now_us.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(duration);
        self.advance(duration);
    }
}
