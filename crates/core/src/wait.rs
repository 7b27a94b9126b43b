//! Backoff strategies for the orchestrator loop.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Supplies the delays the orchestrator sleeps between cycles.
pub trait WaitStrategy: Send + Sync {
    /// Delay after a cycle that processed no jobs.
    fn idle_delay(&self) -> Duration;

    /// Delay after a cycle that failed with a recoverable error.
    fn error_delay(&self) -> Duration;

    /// Called after every cycle that completed without error.
    fn on_success(&self) {}
}

/// Constant idle and error delays.
#[derive(Debug, Clone)]
pub struct FixedWaitStrategy {
    idle: Duration,
    error: Duration,
}

impl FixedWaitStrategy {
    pub fn new(idle: Duration, error: Duration) -> Self {
        Self { idle, error }
    }
}

impl Default for FixedWaitStrategy {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(5))
    }
}

impl WaitStrategy for FixedWaitStrategy {
    fn idle_delay(&self) -> Duration {
        self.idle
    }

    fn error_delay(&self) -> Duration {
        self.error
    }
}

/// Fixed idle delay; the error delay doubles with each consecutive failed
/// cycle up to `max_error`, and resets on the next successful cycle.
#[derive(Debug)]
pub struct ExponentialWaitStrategy {
    idle: Duration,
    base_error: Duration,
    max_error: Duration,
    consecutive_errors: AtomicU32,
}

impl ExponentialWaitStrategy {
    pub fn new(idle: Duration, base_error: Duration, max_error: Duration) -> Self {
        Self {
            idle,
            base_error,
            max_error: max_error.max(base_error),
            consecutive_errors: AtomicU32::new(0),
        }
    }
}

impl WaitStrategy for ExponentialWaitStrategy {
    fn idle_delay(&self) -> Duration {
        self.idle
    }

    fn error_delay(&self) -> Duration {
        let attempt = self.consecutive_errors.fetch_add(1, Ordering::SeqCst);
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.base_error
            .checked_mul(factor)
            .unwrap_or(self.max_error)
            .min(self.max_error)
    }

    fn on_success(&self) {
        self.consecutive_errors.store(0, Ordering::SeqCst);
    }
}
