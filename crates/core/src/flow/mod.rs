//! Data flow execution for executor-side jobs.

mod fs;
mod manager;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::job::TransferRequest;

pub use fs::{FsFlowController, SOURCE_PATH_PROPERTY};
pub use manager::DataFlowManager;

/// Outcome of initiating a data flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum FlowOutcome {
    /// The flow was started.
    Ok,
    /// Temporary failure; try again on a later cycle.
    Retry(String),
    /// Permanent failure; the job is failed with this detail.
    Fatal(String),
}

impl FlowOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            FlowOutcome::Ok => "ok",
            FlowOutcome::Retry(_) => "retry",
            FlowOutcome::Fatal(_) => "fatal",
        }
    }
}

/// Executes (or starts) the data movement for a request.
#[async_trait]
pub trait FlowGateway: Send + Sync {
    async fn initiate(&self, request: &TransferRequest) -> FlowOutcome;
}

/// One strategy for moving data, selected by [`DataFlowManager`].
#[async_trait]
pub trait DataFlowController: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Whether this controller can move data for `request`.
    fn can_handle(&self, request: &TransferRequest) -> bool;

    async fn initiate(&self, request: &TransferRequest) -> FlowOutcome;
}
