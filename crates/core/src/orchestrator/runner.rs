//! Transfer orchestrator implementation.
//!
//! A single worker task drives jobs through the state machine. Each cycle
//! runs three phases in order:
//! - Provisioning: `Initial` jobs get a manifest and are handed to the provisioner
//! - Dispatch: `Provisioned` jobs are sent to the peer (initiator) or to the
//!   data flow gateway (executor)
//! - Completion: `Acknowledged` jobs have their destination resources checked

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::completion::CompletionCheckers;
use crate::dispatch::{InboundTransfer, RemoteDispatcher};
use crate::flow::{FlowGateway, FlowOutcome};
use crate::job::{Job, JobError, JobRole, JobState, JobStore, ResourceManifest, TransferRequest};
use crate::metrics;
use crate::provision::{ManifestGenerator, Provisioner};
use crate::wait::WaitStrategy;

use super::config::OrchestratorConfig;
use super::types::{CycleReport, OrchestratorError, OrchestratorStatus};

/// Collaborators and settings needed to run one cycle.
///
/// Cloned into the worker task; every field is cheap to clone.
#[derive(Clone)]
struct CycleRunner {
    config: OrchestratorConfig,
    store: Arc<dyn JobStore>,
    manifest_generator: Arc<dyn ManifestGenerator>,
    provisioner: Arc<dyn Provisioner>,
    dispatcher: Arc<dyn RemoteDispatcher>,
    flow: Arc<dyn FlowGateway>,
    checkers: CompletionCheckers,
}

/// The transfer orchestrator - drives jobs through the processing pipeline.
pub struct TransferOrchestrator {
    runner: CycleRunner,
    wait_strategy: Arc<dyn WaitStrategy>,

    // Runtime state
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    worker: Mutex<Option<JoinHandle<Result<(), OrchestratorError>>>>,
}

impl TransferOrchestrator {
    /// Create a new orchestrator.
    ///
    /// The wait strategy comes from `config`; no completion checkers are
    /// registered until [`with_completion_checkers`](Self::with_completion_checkers).
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn JobStore>,
        manifest_generator: Arc<dyn ManifestGenerator>,
        provisioner: Arc<dyn Provisioner>,
        dispatcher: Arc<dyn RemoteDispatcher>,
        flow: Arc<dyn FlowGateway>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let wait_strategy = config.wait_strategy();

        Self {
            runner: CycleRunner {
                config,
                store,
                manifest_generator,
                provisioner,
                dispatcher,
                flow,
                checkers: CompletionCheckers::new(),
            },
            wait_strategy,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            worker: Mutex::new(None),
        }
    }

    pub fn with_wait_strategy(mut self, wait_strategy: Arc<dyn WaitStrategy>) -> Self {
        self.wait_strategy = wait_strategy;
        self
    }

    pub fn with_completion_checkers(mut self, checkers: CompletionCheckers) -> Self {
        self.runner.checkers = checkers;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.runner.config
    }

    /// Create a job for `request`, or return the existing one.
    ///
    /// At most one job exists per `request.id`. When a concurrent caller
    /// creates the job first, its id is returned.
    pub fn initiate(
        &self,
        role: JobRole,
        request: TransferRequest,
    ) -> Result<String, OrchestratorError> {
        if request.id.trim().is_empty() {
            return Err(OrchestratorError::InvalidRequest(
                "request id cannot be empty".to_string(),
            ));
        }

        let store = self.runner.store.as_ref();
        if let Some(id) = store.find_id_by_correlation_id(&request.id)? {
            debug!(job_id = %id, correlation_id = %request.id, "Job already initiated");
            return Ok(id);
        }

        let job = Job::new(role, request);
        match store.create(&job) {
            Ok(()) => {
                metrics::JOBS_INITIATED
                    .with_label_values(&[role.as_str()])
                    .inc();
                record_transition(&job);
                info!(
                    job_id = %job.id,
                    correlation_id = %job.correlation_id,
                    "Initiated {} job",
                    role
                );
                Ok(job.id)
            }
            Err(JobError::DuplicateCorrelationId(correlation_id)) => {
                debug!(correlation_id = %correlation_id, "Lost initiation race, using existing job");
                store
                    .find_id_by_correlation_id(&correlation_id)?
                    .ok_or_else(|| OrchestratorError::Store(JobError::NotFound(correlation_id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Initiate a job that provisions locally and sends the request to a peer.
    pub fn initiate_initiator_request(
        &self,
        request: TransferRequest,
    ) -> Result<String, OrchestratorError> {
        self.initiate(JobRole::Initiator, request)
    }

    /// Initiate a job that executes a request received from a peer.
    pub fn initiate_executor_request(
        &self,
        request: TransferRequest,
    ) -> Result<String, OrchestratorError> {
        self.initiate(JobRole::Executor, request)
    }

    /// Initiate the executor job for a transfer received from a peer.
    ///
    /// When the peer sent a callback address, the acknowledgment is posted
    /// back to it in the background. Redelivered transfers are acknowledged
    /// again.
    pub async fn receive_inbound(
        &self,
        inbound: InboundTransfer,
    ) -> Result<String, OrchestratorError> {
        let id = self.initiate_executor_request(inbound.request)?;

        let Some(address) = inbound.callback_address else {
            debug!(
                job_id = %id,
                process_id = %inbound.process_id,
                "Peer gave no callback address, not acknowledging"
            );
            return Ok(id);
        };

        let dispatcher = Arc::clone(&self.runner.dispatcher);
        let process_id = inbound.process_id;
        tokio::spawn(async move {
            match dispatcher.acknowledge(&address, &process_id).await {
                Ok(()) => info!(process_id = %process_id, peer = %address, "Transfer acknowledged to peer"),
                Err(e) => warn!(
                    process_id = %process_id,
                    peer = %address,
                    "Failed to acknowledge transfer: {}",
                    e
                ),
            }
        });

        Ok(id)
    }

    /// Start the orchestrator (spawns the worker task).
    pub async fn start(&self) {
        let mut worker = self.worker.lock().await;

        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Orchestrator already running");
            return;
        }

        if let Some(previous) = worker.take() {
            log_worker_exit(previous.await);
        }

        info!("Starting transfer orchestrator");

        let runner = self.runner.clone();
        let wait_strategy = Arc::clone(&self.wait_strategy);
        let running = Arc::clone(&self.running);
        let shutdown_rx = self.shutdown_tx.subscribe();

        *worker = Some(tokio::spawn(run_loop(
            runner,
            wait_strategy,
            running,
            shutdown_rx,
        )));

        info!("Transfer orchestrator started");
    }

    /// Stop the orchestrator and wait for the worker to exit.
    ///
    /// In-flight collaborator calls are allowed to finish.
    pub async fn stop(&self) {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        let handle = self.worker.lock().await.take();

        if !was_running && handle.is_none() {
            warn!("Orchestrator not running");
            return;
        }

        info!("Stopping transfer orchestrator");

        // Signal shutdown to the worker
        let _ = self.shutdown_tx.send(());

        if let Some(handle) = handle {
            log_worker_exit(handle.await);
        }

        info!("Transfer orchestrator stopped");
    }

    /// Wait for the worker to exit on its own and return its result.
    ///
    /// Returns immediately if no worker was started.
    pub async fn join(&self) -> Result<(), OrchestratorError> {
        let handle = self.worker.lock().await.take();
        match handle {
            Some(handle) => handle
                .await
                .map_err(|e| OrchestratorError::Worker(e.to_string()))?,
            None => Ok(()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get current orchestrator status.
    ///
    /// States whose count cannot be read are left out of `jobs`.
    pub fn status(&self) -> OrchestratorStatus {
        let jobs: BTreeMap<String, u64> = JobState::ALL
            .iter()
            .filter_map(|state| match self.runner.store.count_by_state(*state) {
                Ok(count) => Some((state.as_str().to_string(), count)),
                Err(e) => {
                    warn!(state = %state, "Failed to count jobs: {}", e);
                    None
                }
            })
            .collect();

        OrchestratorStatus {
            running: self.is_running(),
            jobs,
        }
    }

    /// Run a single cycle outside the worker loop.
    pub async fn run_cycle(&self) -> Result<CycleReport, OrchestratorError> {
        let running = AtomicBool::new(true);
        self.runner.run_cycle(&running).await
    }
}

fn log_worker_exit(result: Result<Result<(), OrchestratorError>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Orchestrator worker had terminated: {}", e),
        Err(e) => error!("Orchestrator worker task failed: {}", e),
    }
}

fn record_transition(job: &Job) {
    metrics::STATE_TRANSITIONS
        .with_label_values(&[job.state.as_str()])
        .inc();
}

/// Sleep for `delay` unless shutdown is signalled first.
///
/// Returns false when the loop should exit.
async fn pause(delay: Duration, shutdown_rx: &mut broadcast::Receiver<()>) -> bool {
    tokio::select! {
        _ = shutdown_rx.recv() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

async fn run_loop(
    runner: CycleRunner,
    wait_strategy: Arc<dyn WaitStrategy>,
    running: Arc<AtomicBool>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), OrchestratorError> {
    info!("Orchestrator loop started");

    while running.load(Ordering::SeqCst) {
        let timer = metrics::CYCLE_DURATION.start_timer();
        let result = runner.run_cycle(&running).await;
        timer.observe_duration();

        let delay = match result {
            Ok(report) => {
                wait_strategy.on_success();
                if report.is_idle() {
                    Some(wait_strategy.idle_delay())
                } else {
                    debug!(
                        provisioned = report.provisioned,
                        dispatched = report.dispatched,
                        inspected = report.inspected,
                        "Cycle finished"
                    );
                    None
                }
            }
            Err(e) if e.is_fatal() => {
                metrics::CYCLE_ERRORS.with_label_values(&["fatal"]).inc();
                error!("Orchestrator stopping on fatal error: {}", e);
                running.store(false, Ordering::SeqCst);
                return Err(e);
            }
            Err(e) => {
                metrics::CYCLE_ERRORS.with_label_values(&["recoverable"]).inc();
                error!("Orchestrator cycle failed: {}", e);
                Some(wait_strategy.error_delay())
            }
        };

        if let Some(delay) = delay {
            if !pause(delay, &mut shutdown_rx).await {
                info!("Orchestrator loop received shutdown signal");
                break;
            }
        }
    }

    running.store(false, Ordering::SeqCst);
    info!("Orchestrator loop stopped");
    Ok(())
}

impl CycleRunner {
    async fn run_cycle(&self, running: &AtomicBool) -> Result<CycleReport, OrchestratorError> {
        let mut report = CycleReport {
            provisioned: self.provision_phase().await?,
            ..Default::default()
        };

        if !running.load(Ordering::SeqCst) {
            return Ok(report);
        }
        report.dispatched = self.dispatch_phase().await?;

        if !running.load(Ordering::SeqCst) {
            return Ok(report);
        }
        report.inspected = self.completion_phase().await?;

        Ok(report)
    }

    /// Move `Initial` jobs to `Provisioning` and start provisioning them.
    async fn provision_phase(&self) -> Result<usize, OrchestratorError> {
        let jobs = self
            .store
            .next_for_state(JobState::Initial, self.config.batch_size)?;
        let count = jobs.len();

        for mut job in jobs {
            let manifest = match job.role {
                JobRole::Initiator if job.request.managed_resources => {
                    self.manifest_generator.generate_initiator_manifest(&job)
                }
                JobRole::Initiator => ResourceManifest::default(),
                JobRole::Executor => self.manifest_generator.generate_executor_manifest(&job),
            };

            job.transition_provisioning(manifest)?;
            self.store.update(&job)?;
            record_transition(&job);
            debug!(job_id = %job.id, "Job provisioning");

            if let Err(e) = self.provisioner.provision(&job).await {
                warn!(job_id = %job.id, "Provisioning could not start: {}", e);
                job.transition_error(e.to_string())?;
                self.store.update(&job)?;
                record_transition(&job);
                metrics::JOB_FAILURES
                    .with_label_values(&["provisioning"])
                    .inc();
            }
        }

        metrics::JOBS_PROCESSED
            .with_label_values(&["provisioning"])
            .inc_by(count as u64);
        Ok(count)
    }

    /// Hand `Provisioned` jobs to the dispatcher or the data flow gateway.
    async fn dispatch_phase(&self) -> Result<usize, OrchestratorError> {
        let jobs = self
            .store
            .next_for_state(JobState::Provisioned, self.config.batch_size)?;
        let count = jobs.len();

        for job in jobs {
            match job.role {
                JobRole::Initiator => self.send(job).await?,
                JobRole::Executor => self.execute(job).await?,
            }
        }

        metrics::JOBS_PROCESSED
            .with_label_values(&["dispatch"])
            .inc_by(count as u64);
        Ok(count)
    }

    /// `Sent` is durable before the dispatcher is called, so a crash during
    /// the call never leads to a second send.
    ///
    /// A failed send fails only this job; the rest of the batch goes on.
    async fn send(&self, mut job: Job) -> Result<(), OrchestratorError> {
        job.transition_sent()?;
        self.store.update(&job)?;
        record_transition(&job);

        let request = job.dispatch_request();
        match self.dispatcher.send(&request, &job.id).await {
            Ok(()) => {
                info!(
                    job_id = %job.id,
                    peer = %request.connector_address,
                    "Transfer request sent"
                );
            }
            Err(e) => {
                error!(
                    job_id = %job.id,
                    peer = %request.connector_address,
                    "Transfer request could not be sent: {}",
                    e
                );
                metrics::JOB_FAILURES.with_label_values(&["dispatch"]).inc();
                job.transition_error(format!("dispatch failed: {}", e))?;
                // The peer may have acknowledged while the call was failing.
                if self.store.update_if_state(&job, JobState::Sent)? {
                    record_transition(&job);
                } else {
                    warn!(job_id = %job.id, "Job left Sent during a failed dispatch");
                }
            }
        }
        Ok(())
    }

    async fn execute(&self, mut job: Job) -> Result<(), OrchestratorError> {
        let outcome = self.flow.initiate(&job.request).await;
        metrics::FLOW_OUTCOMES
            .with_label_values(&[outcome.label()])
            .inc();

        match outcome {
            FlowOutcome::Ok => {
                job.transition_executing()?;
                info!(job_id = %job.id, "Data flow started");
            }
            FlowOutcome::Retry(reason) => {
                job.transition_retry()?;
                error!(
                    job_id = %job.id,
                    retry_count = job.retry_count,
                    "Data flow failed, will retry: {}",
                    reason
                );

                let limit = self.config.max_flow_retries;
                if limit > 0 && job.retry_count > limit {
                    job.transition_error(format!(
                        "flow retry limit of {} exceeded: {}",
                        limit, reason
                    ))?;
                    warn!(job_id = %job.id, "Giving up on data flow");
                }
            }
            FlowOutcome::Fatal(detail) => {
                error!(job_id = %job.id, "Data flow failed permanently: {}", detail);
                job.transition_error(detail)?;
            }
        }
        if job.state == JobState::Error {
            metrics::JOB_FAILURES.with_label_values(&["flow"]).inc();
        }

        // A flow that finishes quickly may already have recorded its result.
        if self.store.update_if_state(&job, JobState::Provisioned)? {
            record_transition(&job);
        } else {
            debug!(job_id = %job.id, "Data flow recorded its result first");
        }
        Ok(())
    }

    /// Check destination resources of `Acknowledged` jobs.
    ///
    /// Checkers run on the blocking pool. Returns the number of jobs
    /// inspected, completed or not.
    async fn completion_phase(&self) -> Result<usize, OrchestratorError> {
        let jobs = self
            .store
            .next_for_state(JobState::Acknowledged, self.config.batch_size)?;

        let offending: Vec<&str> = jobs
            .iter()
            .filter(|job| job.role != JobRole::Initiator)
            .map(|job| job.id.as_str())
            .collect();
        if !offending.is_empty() {
            return Err(OrchestratorError::InvariantViolation(format!(
                "non-initiator jobs in acknowledged state: {}",
                offending.join(", ")
            )));
        }

        let count = jobs.len();
        let checkers = self.checkers.clone();
        let checked = tokio::task::spawn_blocking(move || {
            jobs.into_iter()
                .map(|job| {
                    let complete = checkers.job_complete(&job);
                    (job, complete)
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| OrchestratorError::Worker(e.to_string()))?;

        for (mut job, complete) in checked {
            if complete {
                job.transition_completed()?;
                self.store.update(&job)?;
                record_transition(&job);
                info!(job_id = %job.id, "Transfer completed");
            }
        }

        metrics::JOBS_PROCESSED
            .with_label_values(&["completion"])
            .inc_by(count as u64);
        Ok(count)
    }
}
