//! Job storage trait and errors.

use thiserror::Error;

use super::{Job, JobRole, JobState};

/// Error type for job operations.
#[derive(Debug, Error)]
pub enum JobError {
    /// Job not found.
    #[error("job not found: {0}")]
    NotFound(String),

    /// A job already exists for this correlation id.
    #[error("a job already exists for correlation id {0}")]
    DuplicateCorrelationId(String),

    /// The state machine does not allow this transition.
    #[error("job {job_id} ({role}) cannot transition from {from} to {to}")]
    InvalidTransition {
        job_id: String,
        role: JobRole,
        from: JobState,
        to: JobState,
    },

    #[error("unknown job state: {0}")]
    UnknownState(String),

    #[error("unknown job role: {0}")]
    UnknownRole(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(String),
}

/// Trait for job storage backends.
///
/// Implementations must make `create` and `update` atomic per job and must
/// reject a second job with the same correlation id.
pub trait JobStore: Send + Sync {
    /// Persist a new job. Fails with [`JobError::DuplicateCorrelationId`] if a
    /// job with the same correlation id exists.
    fn create(&self, job: &Job) -> Result<(), JobError>;

    /// Persist the mutable parts of an existing job.
    fn update(&self, job: &Job) -> Result<(), JobError>;

    /// Like [`update`](Self::update), but only while the stored job is in
    /// `expected`. Returns false when another writer moved it first.
    fn update_if_state(&self, job: &Job, expected: JobState) -> Result<bool, JobError>;

    /// Get a job by ID.
    fn get(&self, id: &str) -> Result<Option<Job>, JobError>;

    /// Look up the job id created for a correlation id.
    fn find_id_by_correlation_id(&self, correlation_id: &str)
        -> Result<Option<String>, JobError>;

    /// Up to `limit` jobs in `state`, oldest transition first.
    fn next_for_state(&self, state: JobState, limit: usize) -> Result<Vec<Job>, JobError>;

    /// Number of jobs currently in `state`.
    fn count_by_state(&self, state: JobState) -> Result<u64, JobError>;
}
