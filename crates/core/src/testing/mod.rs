//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the orchestrator's
//! collaborators, so the control loop can be tested without a peer, a
//! filesystem layout or real timing.
//!
//! # Example
//!
//! ```rust,ignore
//! use courier_core::testing::{MockDispatcher, MockFlowGateway, MockProvisioner};
//!
//! let provisioner = Arc::new(MockProvisioner::new());
//! let dispatcher = Arc::new(MockDispatcher::new());
//! let flow = Arc::new(MockFlowGateway::with_outcomes([FlowOutcome::Retry("busy".into())]));
//!
//! // Build a TransferOrchestrator with these and drive it with run_cycle()...
//! ```

mod mock_completion;
mod mock_dispatcher;
mod mock_flow;
mod mock_provisioner;

pub use mock_completion::{MockCompletionChecker, RecordingWaitStrategy};
pub use mock_dispatcher::{MockDispatcher, RecordedAcknowledgment, RecordedSend};
pub use mock_flow::MockFlowGateway;
pub use mock_provisioner::MockProvisioner;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::job::{
        DataAddress, JobError, JobStore, ProvisionedResource, ResourceDefinition,
        TransferRequest, LOCAL_DIRECTORY,
    };

    /// Kind used for destination resources in fixtures.
    pub const TEST_RESOURCE_KIND: &str = "test_bucket";

    /// An initiator request with a peer address and externally managed resources.
    pub fn initiator_request(id: &str) -> TransferRequest {
        TransferRequest::new(id, DataAddress::new(LOCAL_DIRECTORY))
            .with_connector("http://peer.example:8080", "http")
            .with_asset("asset-1")
            .with_managed_resources(false)
    }

    /// A request as received by an executor.
    pub fn executor_request(id: &str) -> TransferRequest {
        TransferRequest::new(
            id,
            DataAddress::new(LOCAL_DIRECTORY).with_property("path", "/tmp/courier-test"),
        )
        .with_asset("asset-1")
    }

    /// A destination resource of [`TEST_RESOURCE_KIND`].
    pub fn destination_resource() -> ProvisionedResource {
        ProvisionedResource::destination(&ResourceDefinition::new(TEST_RESOURCE_KIND))
    }

    /// Play the provisioner: move a `Provisioning` job to `Provisioned`.
    pub fn mark_provisioned(
        store: &dyn JobStore,
        job_id: &str,
        resources: Vec<ProvisionedResource>,
    ) -> Result<(), JobError> {
        let mut job = store
            .get(job_id)?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        job.transition_provisioned(resources)?;
        store.update(&job)
    }

    /// Play the peer: move a `Sent` job to `Acknowledged`.
    pub fn mark_acknowledged(store: &dyn JobStore, job_id: &str) -> Result<(), JobError> {
        let mut job = store
            .get(job_id)?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        job.transition_acknowledged()?;
        store.update(&job)
    }
}
