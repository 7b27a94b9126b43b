//! Orchestrator configuration.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::wait::{ExponentialWaitStrategy, FixedWaitStrategy, WaitStrategy};

/// Configuration for the transfer orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Start the control loop on boot.
    /// When disabled, it can still be started via the API.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Maximum jobs pulled per state in one phase.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Sleep after a cycle that processed no jobs (milliseconds).
    #[serde(default = "default_wait")]
    pub idle_wait_ms: u64,

    /// Sleep after a cycle that failed with a recoverable error (milliseconds).
    #[serde(default = "default_wait")]
    pub error_wait_ms: u64,

    /// Cap for exponential error backoff (0 = fixed error wait).
    #[serde(default)]
    pub max_error_wait_ms: u64,

    /// Retryable flow failures tolerated per job (0 = unlimited).
    #[serde(default = "default_max_flow_retries")]
    pub max_flow_retries: u32,
}

fn default_enabled() -> bool {
    true
}

fn default_batch_size() -> usize {
    5
}

fn default_wait() -> u64 {
    5000 // 5 seconds
}

fn default_max_flow_retries() -> u32 {
    10
}

impl OrchestratorConfig {
    /// Build the wait strategy described by this config.
    pub fn wait_strategy(&self) -> Arc<dyn WaitStrategy> {
        let idle = Duration::from_millis(self.idle_wait_ms);
        let error = Duration::from_millis(self.error_wait_ms);
        if self.max_error_wait_ms == 0 {
            Arc::new(FixedWaitStrategy::new(idle, error))
        } else {
            Arc::new(ExponentialWaitStrategy::new(
                idle,
                error,
                Duration::from_millis(self.max_error_wait_ms),
            ))
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            batch_size: default_batch_size(),
            idle_wait_ms: default_wait(),
            error_wait_ms: default_wait(),
            max_error_wait_ms: 0,
            max_flow_retries: default_max_flow_retries(),
        }
    }
}
