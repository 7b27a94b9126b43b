//! Completion detection for destination resources.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use crate::job::{Job, ProvisionedResource, LOCAL_DIRECTORY};
use crate::metrics;

/// Suffix of the marker file written once a transfer into a directory is done.
pub const MARKER_SUFFIX: &str = ".complete";

/// Decides whether a destination resource has finished receiving data.
///
/// Checks are polled from the orchestrator loop on the blocking thread pool,
/// so they may touch the filesystem. They must not mutate the resource.
pub trait CompletionChecker: Send + Sync {
    fn is_complete(&self, resource: &ProvisionedResource) -> bool;
}

/// Completion checkers keyed by resource kind.
#[derive(Clone, Default)]
pub struct CompletionCheckers {
    checkers: HashMap<String, Arc<dyn CompletionChecker>>,
}

impl CompletionCheckers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: impl Into<String>, checker: Arc<dyn CompletionChecker>) {
        self.checkers.insert(kind.into(), checker);
    }

    pub fn with_checker(mut self, kind: impl Into<String>, checker: Arc<dyn CompletionChecker>) -> Self {
        self.register(kind, checker);
        self
    }

    /// Whether a checker exists for this resource's kind.
    pub fn supports(&self, resource: &ProvisionedResource) -> bool {
        self.checkers.contains_key(&resource.kind)
    }

    /// Run the checker registered for the resource's kind.
    ///
    /// Resources without a checker never report completion.
    pub fn check(&self, resource: &ProvisionedResource) -> bool {
        self.checkers
            .get(&resource.kind)
            .map(|checker| checker.is_complete(resource))
            .unwrap_or(false)
    }

    /// Whether any checked destination resource of `job` is complete.
    pub fn job_complete(&self, job: &Job) -> bool {
        job.provisioned_resources
            .destinations()
            .filter(|resource| self.supports(resource))
            .any(|resource| {
                let done = self.check(resource);
                metrics::COMPLETION_CHECKS
                    .with_label_values(&[if done { "complete" } else { "pending" }])
                    .inc();
                done
            })
    }

    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }
}

/// Reports a `local_directory` resource complete once a `*.complete` marker
/// exists in the directory named by its `path` property.
#[derive(Debug, Clone, Default)]
pub struct MarkerFileChecker;

impl MarkerFileChecker {
    pub fn new() -> Self {
        Self
    }

    /// The resource kind this checker is registered under.
    pub fn kind() -> &'static str {
        LOCAL_DIRECTORY
    }

    /// Blocking directory scan.
    fn has_marker(dir: &Path) -> bool {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Cannot read {}: {}", dir.display(), e);
                }
                return false;
            }
        };

        entries.flatten().any(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| name.ends_with(MARKER_SUFFIX))
                .unwrap_or(false)
        })
    }
}

impl CompletionChecker for MarkerFileChecker {
    fn is_complete(&self, resource: &ProvisionedResource) -> bool {
        match resource.property("path") {
            Some(path) => Self::has_marker(Path::new(path)),
            None => false,
        }
    }
}
