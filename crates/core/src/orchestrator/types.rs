//! Types for the transfer orchestrator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::JobError;

/// Errors that can occur during orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Job store error.
    #[error("job store error: {0}")]
    Store(#[from] JobError),

    /// A job was found somewhere the state machine forbids.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The caller supplied a request that cannot become a job.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The worker task panicked or was aborted.
    #[error("worker task failed: {0}")]
    Worker(String),
}

impl OrchestratorError {
    /// Whether the control loop must stop instead of backing off.
    ///
    /// An illegal transition means the loop acted on a job in the wrong
    /// state, which is a broken invariant rather than a transient failure.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            OrchestratorError::InvariantViolation(_)
                | OrchestratorError::Store(JobError::InvalidTransition { .. })
        )
    }
}

/// Current status of the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    /// Whether the control loop is running.
    pub running: bool,
    /// Stored jobs per state.
    pub jobs: BTreeMap<String, u64>,
}

/// Jobs handled by each phase of one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub provisioned: usize,
    pub dispatched: usize,
    pub inspected: usize,
}

impl CycleReport {
    pub fn total(&self) -> usize {
        self.provisioned + self.dispatched + self.inspected
    }

    pub fn is_idle(&self) -> bool {
        self.total() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobRole, JobState};

    #[test]
    fn test_fatal_classification() {
        assert!(OrchestratorError::InvariantViolation("x".into()).is_fatal());
        assert!(OrchestratorError::Store(JobError::InvalidTransition {
            job_id: "j".into(),
            role: JobRole::Executor,
            from: JobState::Initial,
            to: JobState::Sent,
        })
        .is_fatal());

        assert!(!OrchestratorError::Store(JobError::Database("locked".into())).is_fatal());
        assert!(!OrchestratorError::Worker("cancelled".into()).is_fatal());
        assert!(!OrchestratorError::InvalidRequest("empty id".into()).is_fatal());
    }

    #[test]
    fn test_cycle_report_total() {
        let report = CycleReport {
            provisioned: 1,
            dispatched: 2,
            inspected: 3,
        };
        assert_eq!(report.total(), 6);
        assert!(!report.is_idle());
        assert!(CycleReport::default().is_idle());
    }

    #[test]
    fn test_status_serialization() {
        let mut status = OrchestratorStatus {
            running: true,
            ..Default::default()
        };
        status.jobs.insert("sent".to_string(), 2);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["running"], true);
        assert_eq!(json["jobs"]["sent"], 2);
    }
}
