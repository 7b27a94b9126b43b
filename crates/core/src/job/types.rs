//! Core job data types and the transfer state machine.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::JobError;

/// Resource kind for a plain directory on the local filesystem.
pub const LOCAL_DIRECTORY: &str = "local_directory";

// ============================================================================
// Role and State
// ============================================================================

/// Which side of a transfer a job represents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobRole {
    /// Issues the request to a remote peer and tracks its acknowledgment.
    Initiator,
    /// Carries out the transfer locally through the flow gateway.
    Executor,
}

impl JobRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobRole::Initiator => "initiator",
            JobRole::Executor => "executor",
        }
    }
}

impl fmt::Display for JobRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobRole {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initiator" => Ok(JobRole::Initiator),
            "executor" => Ok(JobRole::Executor),
            other => Err(JobError::UnknownRole(other.to_string())),
        }
    }
}

/// Lifecycle state of a job.
///
/// ```text
/// Initial -> Provisioning -> Provisioned -> Sent -> Acknowledged -> Completed   (initiator)
///                                       \-> Executing -> Completed              (executor)
/// any non-terminal state -> Error
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Created, no provisioning attempted yet.
    Initial,
    /// Provisioning requested; the provisioner moves the job on.
    Provisioning,
    /// Resources are ready.
    Provisioned,
    /// Request handed to the remote dispatcher (initiator only).
    Sent,
    /// Remote peer confirmed receipt (initiator only).
    Acknowledged,
    /// Handed to the flow gateway (executor only).
    Executing,
    Completed,
    Error,
}

impl JobState {
    /// All states, in lifecycle order.
    pub const ALL: [JobState; 8] = [
        JobState::Initial,
        JobState::Provisioning,
        JobState::Provisioned,
        JobState::Sent,
        JobState::Acknowledged,
        JobState::Executing,
        JobState::Completed,
        JobState::Error,
    ];

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Error)
    }

    /// Returns the state as a string (stored in the database and used for filtering).
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Initial => "initial",
            JobState::Provisioning => "provisioning",
            JobState::Provisioned => "provisioned",
            JobState::Sent => "sent",
            JobState::Acknowledged => "acknowledged",
            JobState::Executing => "executing",
            JobState::Completed => "completed",
            JobState::Error => "error",
        }
    }

    /// Whether a job with `role` may move from this state to `next`.
    pub fn can_transition_to(&self, next: JobState, role: JobRole) -> bool {
        use JobState::*;

        match (*self, next) {
            (Initial, Provisioning) | (Provisioning, Provisioned) => true,
            (Provisioned, Sent) | (Sent, Acknowledged) | (Acknowledged, Completed) => {
                role == JobRole::Initiator
            }
            // Provisioned -> Provisioned is the flow retry edge.
            (Provisioned, Provisioned) | (Provisioned, Executing) | (Executing, Completed) => {
                role == JobRole::Executor
            }
            (from, Error) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobState::ALL
            .iter()
            .find(|state| state.as_str() == s)
            .copied()
            .ok_or_else(|| JobError::UnknownState(s.to_string()))
    }
}

// ============================================================================
// Request Types
// ============================================================================

/// Where data lives or should be delivered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DataAddress {
    /// Address kind (e.g. "local_directory").
    pub kind: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub properties: HashMap<String, String>,
}

impl DataAddress {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            properties: HashMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// A logical transfer request, as submitted by a caller or received from a peer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferRequest {
    /// Caller-supplied request id; becomes the job's correlation id.
    pub id: String,
    /// Address of the remote peer the request is dispatched to.
    #[serde(default)]
    pub connector_address: String,
    /// Protocol the peer is reached over.
    #[serde(default)]
    pub protocol: String,
    /// Asset being transferred.
    #[serde(default)]
    pub asset_id: String,
    /// Where the data is delivered.
    pub destination: DataAddress,
    /// When true, the destination resources are provisioned by this side.
    #[serde(default = "default_managed_resources")]
    pub managed_resources: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub properties: HashMap<String, String>,
}

fn default_managed_resources() -> bool {
    true
}

impl TransferRequest {
    /// Create a request with managed resources and no peer address.
    pub fn new(id: impl Into<String>, destination: DataAddress) -> Self {
        Self {
            id: id.into(),
            connector_address: String::new(),
            protocol: String::new(),
            asset_id: String::new(),
            destination,
            managed_resources: true,
            properties: HashMap::new(),
        }
    }

    pub fn with_connector(
        mut self,
        address: impl Into<String>,
        protocol: impl Into<String>,
    ) -> Self {
        self.connector_address = address.into();
        self.protocol = protocol.into();
        self
    }

    pub fn with_asset(mut self, asset_id: impl Into<String>) -> Self {
        self.asset_id = asset_id.into();
        self
    }

    pub fn with_managed_resources(mut self, managed: bool) -> Self {
        self.managed_resources = managed;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

// ============================================================================
// Resource Types
// ============================================================================

/// Description of one resource to be provisioned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceDefinition {
    pub id: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub properties: HashMap<String, String>,
}

impl ResourceDefinition {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: kind.into(),
            properties: HashMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// The set of resources a job needs before it can be dispatched or executed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ResourceManifest {
    #[serde(default)]
    pub definitions: Vec<ResourceDefinition>,
}

impl ResourceManifest {
    pub fn new(definitions: Vec<ResourceDefinition>) -> Self {
        Self { definitions }
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

/// A concrete resource produced by provisioning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvisionedResource {
    pub id: String,
    /// The manifest definition this resource satisfies.
    pub resource_definition_id: String,
    /// Resource kind; selects the completion checker.
    pub kind: String,
    /// Destination resources are polled for completion.
    #[serde(default)]
    pub is_destination: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub properties: HashMap<String, String>,
}

impl ProvisionedResource {
    /// Create a destination resource for the given definition.
    pub fn destination(definition: &ResourceDefinition) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            resource_definition_id: definition.id.clone(),
            kind: definition.kind.clone(),
            is_destination: true,
            properties: HashMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// Resources produced by provisioning a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ProvisionedResourceSet {
    #[serde(default)]
    pub resources: Vec<ProvisionedResource>,
}

impl ProvisionedResourceSet {
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Resources that receive data (and so expose a completion check).
    pub fn destinations(&self) -> impl Iterator<Item = &ProvisionedResource> {
        self.resources.iter().filter(|r| r.is_destination)
    }
}

// ============================================================================
// Job
// ============================================================================

/// A unit of transfer work, persisted in a [`JobStore`](super::JobStore).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: String,
    /// The originating request id; at most one job exists per value.
    pub correlation_id: String,
    pub role: JobRole,
    pub state: JobState,
    pub request: TransferRequest,
    /// Absent until provisioning starts.
    pub manifest: Option<ResourceManifest>,
    #[serde(default)]
    pub provisioned_resources: ProvisionedResourceSet,
    /// Set only in [`JobState::Error`].
    pub error_detail: Option<String>,
    /// Number of retryable flow failures seen so far.
    #[serde(default)]
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    /// When the job entered its current state.
    pub state_timestamp: DateTime<Utc>,
}

impl Job {
    /// Create a new job in [`JobState::Initial`] with a fresh id.
    pub fn new(role: JobRole, request: TransferRequest) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            correlation_id: request.id.clone(),
            role,
            state: JobState::Initial,
            request,
            manifest: None,
            provisioned_resources: ProvisionedResourceSet::default(),
            error_detail: None,
            retry_count: 0,
            created_at: now,
            state_timestamp: now,
        }
    }

    fn transition(&mut self, next: JobState) -> Result<(), JobError> {
        if !self.state.can_transition_to(next, self.role) {
            return Err(JobError::InvalidTransition {
                job_id: self.id.clone(),
                role: self.role,
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.state_timestamp = Utc::now();
        Ok(())
    }

    pub fn transition_provisioning(&mut self, manifest: ResourceManifest) -> Result<(), JobError> {
        self.transition(JobState::Provisioning)?;
        self.manifest = Some(manifest);
        Ok(())
    }

    pub fn transition_provisioned(
        &mut self,
        resources: Vec<ProvisionedResource>,
    ) -> Result<(), JobError> {
        self.transition(JobState::Provisioned)?;
        self.provisioned_resources = ProvisionedResourceSet { resources };
        Ok(())
    }

    pub fn transition_sent(&mut self) -> Result<(), JobError> {
        self.transition(JobState::Sent)
    }

    pub fn transition_acknowledged(&mut self) -> Result<(), JobError> {
        self.transition(JobState::Acknowledged)
    }

    pub fn transition_executing(&mut self) -> Result<(), JobError> {
        self.transition(JobState::Executing)
    }

    /// Keep the job in `Provisioned` so the next cycle picks it up again.
    pub fn transition_retry(&mut self) -> Result<(), JobError> {
        self.transition(JobState::Provisioned)?;
        self.retry_count += 1;
        Ok(())
    }

    pub fn transition_completed(&mut self) -> Result<(), JobError> {
        self.transition(JobState::Completed)
    }

    pub fn transition_error(&mut self, detail: impl Into<String>) -> Result<(), JobError> {
        self.transition(JobState::Error)?;
        self.error_detail = Some(detail.into());
        Ok(())
    }

    /// The request as sent to a peer: destination properties of the first
    /// provisioned destination resource are merged into the request destination.
    pub fn dispatch_request(&self) -> TransferRequest {
        let mut request = self.request.clone();
        if let Some(resource) = self.provisioned_resources.destinations().next() {
            for (key, value) in &resource.properties {
                request
                    .destination
                    .properties
                    .insert(key.clone(), value.clone());
            }
        }
        request
    }
}
