//! Transfer jobs: the persisted state machine driven by the orchestrator.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteJobStore;
pub use store::{JobError, JobStore};
pub use types::{
    DataAddress, Job, JobRole, JobState, ProvisionedResource, ProvisionedResourceSet,
    ResourceDefinition, ResourceManifest, TransferRequest, LOCAL_DIRECTORY,
};
