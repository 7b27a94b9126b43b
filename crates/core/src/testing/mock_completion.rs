//! Mock completion checker and wait strategy for testing.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::completion::CompletionChecker;
use crate::job::ProvisionedResource;
use crate::wait::WaitStrategy;

/// Completion checker with a settable answer.
#[derive(Debug, Default)]
pub struct MockCompletionChecker {
    complete: AtomicBool,
    calls: AtomicUsize,
}

impl MockCompletionChecker {
    pub fn new(complete: bool) -> Self {
        Self {
            complete: AtomicBool::new(complete),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_complete(&self, complete: bool) {
        self.complete.store(complete, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CompletionChecker for MockCompletionChecker {
    fn is_complete(&self, _resource: &ProvisionedResource) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.complete.load(Ordering::SeqCst)
    }
}

/// Wait strategy that counts how often each delay is requested.
///
/// Delays default to 1ms so loops spin quickly in tests.
#[derive(Debug)]
pub struct RecordingWaitStrategy {
    idle: Duration,
    error: Duration,
    idle_calls: AtomicUsize,
    error_calls: AtomicUsize,
    success_calls: AtomicUsize,
}

impl Default for RecordingWaitStrategy {
    fn default() -> Self {
        Self::new(Duration::from_millis(1), Duration::from_millis(1))
    }
}

impl RecordingWaitStrategy {
    pub fn new(idle: Duration, error: Duration) -> Self {
        Self {
            idle,
            error,
            idle_calls: AtomicUsize::new(0),
            error_calls: AtomicUsize::new(0),
            success_calls: AtomicUsize::new(0),
        }
    }

    pub fn idle_calls(&self) -> usize {
        self.idle_calls.load(Ordering::SeqCst)
    }

    pub fn error_calls(&self) -> usize {
        self.error_calls.load(Ordering::SeqCst)
    }

    pub fn success_calls(&self) -> usize {
        self.success_calls.load(Ordering::SeqCst)
    }
}

impl WaitStrategy for RecordingWaitStrategy {
    fn idle_delay(&self) -> Duration {
        self.idle_calls.fetch_add(1, Ordering::SeqCst);
        self.idle
    }

    fn error_delay(&self) -> Duration {
        self.error_calls.fetch_add(1, Ordering::SeqCst);
        self.error
    }

    fn on_success(&self) {
        self.success_calls.fetch_add(1, Ordering::SeqCst);
    }
}
