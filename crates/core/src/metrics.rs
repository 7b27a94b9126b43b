//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Orchestrator (cycles, phases, state transitions)
//! - Collaborators (provisioning, dispatch, data flow, completion checks)

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounterVec, Opts};

// =============================================================================
// Orchestrator
// =============================================================================

/// Jobs created by `initiate`, by role.
pub static JOBS_INITIATED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("courier_jobs_initiated_total", "Total jobs created"),
        &["role"], // "initiator", "executor"
    )
    .unwrap()
});

/// Persisted state transitions, by target state.
pub static STATE_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "courier_state_transitions_total",
            "Total persisted job state transitions",
        ),
        &["state"],
    )
    .unwrap()
});

/// Jobs handled per orchestrator phase.
pub static JOBS_PROCESSED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "courier_jobs_processed_total",
            "Total jobs processed by orchestrator phase",
        ),
        &["phase"], // "provisioning", "dispatch", "completion"
    )
    .unwrap()
});

/// Jobs moved to `Error` by the orchestrator, by phase.
pub static JOB_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("courier_job_failures_total", "Total jobs failed by the orchestrator"),
        &["phase"], // "provisioning", "dispatch", "flow"
    )
    .unwrap()
});

/// Failed cycles, by error kind.
pub static CYCLE_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("courier_cycle_errors_total", "Total failed orchestrator cycles"),
        &["kind"], // "recoverable", "fatal"
    )
    .unwrap()
});

/// Duration of one orchestrator cycle in seconds.
pub static CYCLE_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "courier_cycle_duration_seconds",
            "Duration of one orchestrator cycle",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
    )
    .unwrap()
});

// =============================================================================
// Collaborators
// =============================================================================

/// Provisioning outcomes recorded by the provisioning writer.
pub static PROVISIONING_RESPONSES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "courier_provisioning_responses_total",
            "Total provisioning outcomes recorded",
        ),
        &["outcome"], // "provisioned", "failed"
    )
    .unwrap()
});

/// Requests sent to remote peers.
pub static DISPATCH_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("courier_dispatch_requests_total", "Total dispatch requests"),
        &["status"], // "success", "error", "rejected"
    )
    .unwrap()
});

/// Acknowledgments sent back to initiating peers.
pub static ACKNOWLEDGMENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "courier_acknowledgments_total",
            "Total acknowledgments sent to initiating peers",
        ),
        &["status"], // "success", "error", "rejected"
    )
    .unwrap()
});

/// Flow gateway outcomes for executor jobs.
pub static FLOW_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("courier_flow_outcomes_total", "Total data flow outcomes"),
        &["outcome"], // "ok", "retry", "fatal"
    )
    .unwrap()
});

/// Completion checks run against destination resources.
pub static COMPLETION_CHECKS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("courier_completion_checks_total", "Total completion checks"),
        &["result"], // "complete", "pending"
    )
    .unwrap()
});

/// Get all metrics for registration with a Prometheus registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Orchestrator
        Box::new(JOBS_INITIATED.clone()),
        Box::new(STATE_TRANSITIONS.clone()),
        Box::new(JOBS_PROCESSED.clone()),
        Box::new(JOB_FAILURES.clone()),
        Box::new(CYCLE_ERRORS.clone()),
        Box::new(CYCLE_DURATION.clone()),
        // Collaborators
        Box::new(PROVISIONING_RESPONSES.clone()),
        Box::new(DISPATCH_REQUESTS.clone()),
        Box::new(ACKNOWLEDGMENTS.clone()),
        Box::new(FLOW_OUTCOMES.clone()),
        Box::new(COMPLETION_CHECKS.clone()),
    ]
}
