//! Mock data flow gateway for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::flow::{FlowGateway, FlowOutcome};
use crate::job::TransferRequest;

/// Mock implementation of the FlowGateway trait.
///
/// Returns scripted outcomes in order, then `FlowOutcome::Ok`.
#[derive(Default)]
pub struct MockFlowGateway {
    outcomes: Arc<RwLock<VecDeque<FlowOutcome>>>,
    requests: Arc<RwLock<Vec<TransferRequest>>>,
}

impl MockFlowGateway {
    /// Create a new mock gateway that always succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that returns `outcomes` in order.
    pub fn with_outcomes(outcomes: impl IntoIterator<Item = FlowOutcome>) -> Self {
        Self {
            outcomes: Arc::new(RwLock::new(outcomes.into_iter().collect())),
            ..Self::default()
        }
    }

    /// Get all requests passed to `initiate`.
    pub async fn recorded_requests(&self) -> Vec<TransferRequest> {
        self.requests.read().await.clone()
    }

    /// Get the number of `initiate` calls.
    pub async fn initiate_count(&self) -> usize {
        self.requests.read().await.len()
    }
}

#[async_trait]
impl FlowGateway for MockFlowGateway {
    async fn initiate(&self, request: &TransferRequest) -> FlowOutcome {
        self.requests.write().await.push(request.clone());
        self.outcomes
            .write()
            .await
            .pop_front()
            .unwrap_or(FlowOutcome::Ok)
    }
}
