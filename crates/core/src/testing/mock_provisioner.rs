//! Mock provisioner for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::job::{Job, ProvisionedResource};
use crate::provision::{ProvisionError, ProvisionHandle, ProvisionResponse, Provisioner};

/// Mock implementation of the Provisioner trait.
///
/// Records every job it is asked to provision. Without a handle the jobs
/// stay in `Provisioning` until the test moves them on; with a handle each
/// call publishes a `Provisioned` response carrying one destination resource
/// per manifest definition.
///
/// # Example
///
/// ```rust,ignore
/// use courier_core::testing::MockProvisioner;
///
/// let provisioner = MockProvisioner::new();
/// orchestrator.run_cycle().await?;
/// assert_eq!(provisioner.provision_count().await, 1);
/// ```
#[derive(Default)]
pub struct MockProvisioner {
    /// Jobs passed to `provision`.
    calls: Arc<RwLock<Vec<Job>>>,
    /// Publishes outcomes when set.
    handle: Option<ProvisionHandle>,
    /// If set, the next call will fail with this error.
    next_error: Arc<RwLock<Option<ProvisionError>>>,
}

impl MockProvisioner {
    /// Create a new mock provisioner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that completes provisioning through `handle`.
    pub fn with_handle(handle: ProvisionHandle) -> Self {
        Self {
            handle: Some(handle),
            ..Self::default()
        }
    }

    /// Get all jobs passed to `provision`.
    pub async fn recorded_jobs(&self) -> Vec<Job> {
        self.calls.read().await.clone()
    }

    /// Get the number of provision calls.
    pub async fn provision_count(&self) -> usize {
        self.calls.read().await.len()
    }

    /// Configure the next call to fail with the given error.
    pub async fn set_next_error(&self, error: ProvisionError) {
        *self.next_error.write().await = Some(error);
    }
}

#[async_trait]
impl Provisioner for MockProvisioner {
    async fn provision(&self, job: &Job) -> Result<(), ProvisionError> {
        self.calls.write().await.push(job.clone());

        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }

        if let Some(handle) = &self.handle {
            let resources = job
                .manifest
                .iter()
                .flat_map(|m| m.definitions.iter())
                .map(|definition| {
                    ProvisionedResource::destination(definition).with_property("mock", "true")
                })
                .collect();
            if !handle
                .publish(ProvisionResponse::provisioned(&job.id, resources))
                .await
            {
                return Err(ProvisionError::ChannelClosed);
            }
        }

        Ok(())
    }
}
