use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::job::{JobError, JobStore, ProvisionedResource};
use crate::metrics;

/// Result of provisioning a single job.
#[derive(Debug, Clone, PartialEq)]
pub enum ProvisionOutcome {
    /// All resources are ready.
    Provisioned(Vec<ProvisionedResource>),
    /// Provisioning failed permanently.
    Failed(String),
}

impl ProvisionOutcome {
    fn label(&self) -> &'static str {
        match self {
            ProvisionOutcome::Provisioned(_) => "provisioned",
            ProvisionOutcome::Failed(_) => "failed",
        }
    }
}

/// A provisioning outcome addressed to a job.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionResponse {
    pub job_id: String,
    pub outcome: ProvisionOutcome,
}

impl ProvisionResponse {
    pub fn provisioned(job_id: impl Into<String>, resources: Vec<ProvisionedResource>) -> Self {
        Self {
            job_id: job_id.into(),
            outcome: ProvisionOutcome::Provisioned(resources),
        }
    }

    pub fn failed(job_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            outcome: ProvisionOutcome::Failed(detail.into()),
        }
    }
}

/// Handle for publishing provisioning outcomes.
///
/// Cheaply cloneable; provisioners keep one and publish from whatever task
/// finishes the work.
#[derive(Clone)]
pub struct ProvisionHandle {
    tx: mpsc::Sender<ProvisionResponse>,
}

impl ProvisionHandle {
    pub fn new(tx: mpsc::Sender<ProvisionResponse>) -> Self {
        Self { tx }
    }

    /// Publish an outcome, waiting for channel capacity.
    ///
    /// Returns false if the writer has shut down.
    pub async fn publish(&self, response: ProvisionResponse) -> bool {
        match self.tx.send(response).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to publish provisioning response for job {}: channel closed", e.0.job_id);
                false
            }
        }
    }
}

/// Background task that records provisioning outcomes in the job store.
pub struct ProvisionWriter {
    rx: mpsc::Receiver<ProvisionResponse>,
    store: Arc<dyn JobStore>,
}

impl ProvisionWriter {
    pub fn new(rx: mpsc::Receiver<ProvisionResponse>, store: Arc<dyn JobStore>) -> Self {
        Self { rx, store }
    }

    /// Consume responses until every handle is dropped.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        tracing::info!("Provisioning writer started");

        while let Some(response) = self.rx.recv().await {
            let job_id = response.job_id.clone();
            if let Err(e) = apply_response(self.store.as_ref(), response) {
                warn!("Dropping provisioning response for job {}: {}", job_id, e);
            }
        }

        tracing::info!("Provisioning writer shutting down");
    }
}

/// Apply one provisioning outcome to the stored job.
///
/// Only jobs in `Provisioning` accept an outcome; anything else is rejected
/// by the state machine.
pub(crate) fn apply_response(
    store: &dyn JobStore,
    response: ProvisionResponse,
) -> Result<(), JobError> {
    let mut job = store
        .get(&response.job_id)?
        .ok_or_else(|| JobError::NotFound(response.job_id.clone()))?;

    let label = response.outcome.label();
    match response.outcome {
        ProvisionOutcome::Provisioned(resources) => {
            job.transition_provisioned(resources)?;
            debug!(job_id = %job.id, "Job provisioned");
        }
        ProvisionOutcome::Failed(detail) => {
            job.transition_error(detail)?;
            warn!(job_id = %job.id, "Provisioning failed: {}", job.error_detail.as_deref().unwrap_or_default());
        }
    }

    store.update(&job)?;
    metrics::PROVISIONING_RESPONSES.with_label_values(&[label]).inc();
    metrics::STATE_TRANSITIONS
        .with_label_values(&[job.state.as_str()])
        .inc();
    Ok(())
}

/// Create a provisioning handoff.
///
/// Returns:
/// - `ProvisionHandle` - give a clone to each provisioner
/// - `ProvisionWriter` - spawn this with `tokio::spawn(writer.run())`
pub fn create_provisioning_channel(
    store: Arc<dyn JobStore>,
    buffer_size: usize,
) -> (ProvisionHandle, ProvisionWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (ProvisionHandle::new(tx), ProvisionWriter::new(rx, store))
}
