//! Resource provisioning: manifest generation and asynchronous provisioning.
//!
//! The orchestrator only moves a job into `Provisioning` and calls
//! [`Provisioner::provision`]. Provisioners report back by publishing a
//! [`ProvisionResponse`] on a [`ProvisionHandle`]; the [`ProvisionWriter`]
//! records the outcome in the job store.

mod fs;
mod handoff;
mod manifest;

use async_trait::async_trait;
use thiserror::Error;

use crate::job::{Job, ResourceManifest};

pub use fs::FsProvisioner;
pub use handoff::{
    create_provisioning_channel, ProvisionHandle, ProvisionOutcome, ProvisionResponse,
    ProvisionWriter,
};
pub use manifest::{DefaultManifestGenerator, STAGING_PROPERTY};

/// Errors raised when a provisioning request cannot be started.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The manifest names a resource kind this provisioner cannot create.
    #[error("unsupported resource kind: {0}")]
    UnsupportedKind(String),

    /// A resource name that is not a single plain path component.
    #[error("invalid resource name: {0:?}")]
    InvalidName(String),

    /// The provisioning channel is closed.
    #[error("provisioning channel closed")]
    ChannelClosed,

    #[error("provisioning failed: {0}")]
    Failed(String),
}

/// Builds the resource manifest for a job. Pure and synchronous.
pub trait ManifestGenerator: Send + Sync {
    /// Manifest for an initiator job whose resources are managed by this side.
    fn generate_initiator_manifest(&self, job: &Job) -> ResourceManifest;

    /// Manifest for an executor job.
    fn generate_executor_manifest(&self, job: &Job) -> ResourceManifest;
}

/// Carries out provisioning for a job.
///
/// `provision` should return as soon as the work is started. Completion is
/// reported later through a [`ProvisionHandle`].
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn provision(&self, job: &Job) -> Result<(), ProvisionError>;
}
