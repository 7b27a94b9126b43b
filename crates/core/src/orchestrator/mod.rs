//! Transfer orchestrator for automated job processing.
//!
//! The orchestrator owns one control loop that drives jobs through the
//! state machine:
//! - **Provisioning**: `Initial` jobs are handed to the provisioner
//! - **Dispatch**: `Provisioned` jobs go to the peer or the data flow gateway
//! - **Completion**: `Acknowledged` jobs are polled for completion
//!
//! All job state lives in the [`JobStore`](crate::job::JobStore), so a
//! restarted orchestrator resumes where the previous one stopped.

mod config;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use runner::TransferOrchestrator;
pub use types::{CycleReport, OrchestratorError, OrchestratorStatus};
