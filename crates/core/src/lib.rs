pub mod completion;
pub mod config;
pub mod dispatch;
pub mod flow;
pub mod job;
pub mod metrics;
pub mod orchestrator;
pub mod provision;
pub mod testing;
pub mod wait;

pub use completion::{CompletionChecker, CompletionCheckers, MarkerFileChecker};
pub use config::{load_config, load_config_from_str, validate_config, Config, ConfigError};
pub use dispatch::{DispatchError, HttpDispatcher, InboundTransfer, RemoteDispatcher};
pub use flow::{DataFlowController, DataFlowManager, FlowGateway, FlowOutcome, FsFlowController};
pub use job::{
    DataAddress, Job, JobError, JobRole, JobState, JobStore, ProvisionedResource,
    ResourceManifest, SqliteJobStore, TransferRequest,
};
pub use orchestrator::{
    CycleReport, OrchestratorConfig, OrchestratorError, OrchestratorStatus, TransferOrchestrator,
};
pub use provision::{
    create_provisioning_channel, DefaultManifestGenerator, FsProvisioner, ManifestGenerator,
    ProvisionError, ProvisionHandle, ProvisionResponse, Provisioner,
};
pub use wait::{ExponentialWaitStrategy, FixedWaitStrategy, WaitStrategy};
