//! [`RetryPolicy`] – how long the transport is allowed to wait.
//!
//! Connecting favours availability: while the simulator refuses connections
//! (it is usually still starting up) the transport sleeps
//! [`interval`][RetryPolicy::interval] and tries again.  The default policy
//! retries forever; [`with_max_attempts`][RetryPolicy::with_max_attempts] and
//! [`with_deadline`][RetryPolicy::with_deadline] bound it.
//!
//! Writes on a non-blocking socket can report "would block" when the kernel
//! send buffer is full.  The transport then sleeps
//! [`write_backoff`][RetryPolicy::write_backoff] between attempts and gives up
//! once [`write_timeout`][RetryPolicy::write_timeout] has elapsed.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use sitl_transport::retry::RetryPolicy;
//!
//! let policy = RetryPolicy::default().with_max_attempts(3);
//! assert!(policy.should_retry(1, Duration::ZERO));
//! assert!(policy.should_retry(2, Duration::from_secs(1)));
//! assert!(!policy.should_retry(3, Duration::from_secs(1)));
//! ```

use std::time::Duration;

/// Default pause between refused connect attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Default pause between would-block send attempts.
pub const DEFAULT_WRITE_BACKOFF: Duration = Duration::from_micros(200);

/// Default budget for a single blocked write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Backoff and bounds for connect retries and blocked writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Sleep between refused connect attempts.
    pub interval: Duration,
    /// Total connect attempts allowed; `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Time budget for the whole connect loop; `None` waits forever.
    pub deadline: Option<Duration>,
    /// Sleep between would-block send attempts.  Zero yields the thread.
    pub write_backoff: Duration,
    /// Give up on a write that stays blocked this long.
    pub write_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RETRY_INTERVAL,
            max_attempts: None,
            deadline: None,
            write_backoff: DEFAULT_WRITE_BACKOFF,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl RetryPolicy {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Stop after `attempts` refused connects.  Zero is treated as one.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts.max(1));
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_write_backoff(mut self, backoff: Duration) -> Self {
        self.write_backoff = backoff;
        self
    }

    /// Whether another connect attempt is allowed after `attempts` refusals
    /// spread over `elapsed`.
    ///
    /// The deadline is checked against the time at which the next attempt
    /// would start, i.e. after one more `interval`.
    pub fn should_retry(&self, attempts: u32, elapsed: Duration) -> bool {
        let under_attempts = self.max_attempts.is_none_or(|max| attempts < max);
        let under_deadline = self
            .deadline
            .is_none_or(|deadline| elapsed + self.interval <= deadline);
        under_attempts && under_deadline
    }

    /// Whether a write blocked for `waited` should keep trying.
    pub fn write_within_budget(&self, waited: Duration) -> bool {
        waited < self.write_timeout
    }
}
