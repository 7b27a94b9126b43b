use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::{DataFlowController, FlowOutcome};
use crate::completion::MARKER_SUFFIX;
use crate::job::{Job, JobError, JobState, JobStore, TransferRequest, LOCAL_DIRECTORY};
use crate::metrics;

/// Request property holding the file to copy.
pub const SOURCE_PATH_PROPERTY: &str = "source_path";

/// Copies a local file into a `local_directory` destination.
///
/// `initiate` validates the request and starts the copy in the background.
/// Sources must resolve under `source_root` and destinations under
/// `destination_root`; relative paths are taken from those roots. When the
/// copy finishes a `<file>.complete` marker is written next to the data and
/// the executor job is completed (or failed) in the store.
pub struct FsFlowController {
    store: Arc<dyn JobStore>,
    source_root: PathBuf,
    destination_root: PathBuf,
}

impl FsFlowController {
    pub fn new(
        store: Arc<dyn JobStore>,
        source_root: impl Into<PathBuf>,
        destination_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            source_root: source_root.into(),
            destination_root: destination_root.into(),
        }
    }

    async fn copy_with_marker(source: &Path, dest_dir: &Path) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(dest_dir).await?;

        let file_name = source.file_name().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "source has no file name")
        })?;
        let target = dest_dir.join(file_name);
        tokio::fs::copy(source, &target).await?;

        let mut marker = file_name.to_os_string();
        marker.push(MARKER_SUFFIX);
        tokio::fs::write(dest_dir.join(marker), b"").await?;
        Ok(target)
    }

    fn load(store: &dyn JobStore, correlation_id: &str) -> Result<Job, JobError> {
        let id = store
            .find_id_by_correlation_id(correlation_id)?
            .ok_or_else(|| JobError::NotFound(correlation_id.to_string()))?;
        store.get(&id)?.ok_or(JobError::NotFound(id))
    }

    /// Record the result of a finished copy on the executor job.
    ///
    /// The orchestrator writes `Executing` after `initiate` returns, so the
    /// job may still be `Provisioned` here. Each write only applies to the
    /// state it was computed from; on a lost race the job is reloaded.
    async fn finish(
        store: &dyn JobStore,
        correlation_id: &str,
        result: Result<(), String>,
    ) -> Result<(), JobError> {
        loop {
            let mut job = Self::load(store, correlation_id)?;
            let expected = job.state;
            if expected.is_terminal() {
                warn!(job_id = %job.id, "Flow finished for a job already {}", expected);
                return Ok(());
            }

            if job.state == JobState::Provisioned {
                job.transition_executing()?;
            }
            match &result {
                Ok(()) => job.transition_completed()?,
                Err(detail) => job.transition_error(detail.clone())?,
            }

            if store.update_if_state(&job, expected)? {
                metrics::STATE_TRANSITIONS
                    .with_label_values(&[job.state.as_str()])
                    .inc();
                return Ok(());
            }
            debug!(job_id = %job.id, "Job changed while recording flow result, retrying");
        }
    }
}

/// Resolve `path` against `root`, refusing anything that leaves it.
///
/// Lexical only: `..` components are rejected outright. Symlinks are checked
/// separately with [`resolves_within`].
fn confine(root: &Path, path: &Path) -> Option<PathBuf> {
    if path.components().any(|c| c == Component::ParentDir) {
        return None;
    }
    let resolved = root.join(path);
    resolved.starts_with(root).then_some(resolved)
}

/// Whether the deepest existing ancestor of `path` canonicalizes under the
/// canonical `root`.
async fn resolves_within(root: &Path, path: &Path) -> std::io::Result<bool> {
    let root = tokio::fs::canonicalize(root).await?;
    let mut existing = path;
    loop {
        match tokio::fs::canonicalize(existing).await {
            Ok(canonical) => return Ok(canonical.starts_with(&root)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => match existing.parent() {
                Some(parent) => existing = parent,
                None => return Ok(false),
            },
            Err(e) => return Err(e),
        }
    }
}

#[async_trait]
impl DataFlowController for FsFlowController {
    fn name(&self) -> &str {
        "fs-copy"
    }

    fn can_handle(&self, request: &TransferRequest) -> bool {
        request.destination.kind == LOCAL_DIRECTORY
            && request.property(SOURCE_PATH_PROPERTY).is_some()
    }

    async fn initiate(&self, request: &TransferRequest) -> FlowOutcome {
        let Some(source) = request.property(SOURCE_PATH_PROPERTY) else {
            return FlowOutcome::Fatal(format!("request {} has no source path", request.id));
        };
        let Some(dest_dir) = request.destination.property("path") else {
            return FlowOutcome::Fatal(format!("request {} has no destination path", request.id));
        };

        let Some(source) = confine(&self.source_root, Path::new(source)) else {
            return FlowOutcome::Fatal(format!("source {} is outside the source root", source));
        };
        let Some(dest_dir) = confine(&self.destination_root, Path::new(dest_dir)) else {
            return FlowOutcome::Fatal(format!(
                "destination {} is outside the destination root",
                dest_dir
            ));
        };

        match tokio::fs::metadata(&source).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                return FlowOutcome::Fatal(format!("source {} is not a file", source.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return FlowOutcome::Fatal(format!("source {} does not exist", source.display()))
            }
            Err(e) => return FlowOutcome::Retry(format!("cannot stat {}: {}", source.display(), e)),
        }

        for (root, path, what) in [
            (&self.source_root, &source, "source"),
            (&self.destination_root, &dest_dir, "destination"),
        ] {
            match resolves_within(root, path).await {
                Ok(true) => {}
                Ok(false) => {
                    return FlowOutcome::Fatal(format!(
                        "{} {} resolves outside {}",
                        what,
                        path.display(),
                        root.display()
                    ))
                }
                Err(e) => {
                    return FlowOutcome::Retry(format!("cannot resolve {}: {}", path.display(), e))
                }
            }
        }

        let store = Arc::clone(&self.store);
        let correlation_id = request.id.clone();

        tokio::spawn(async move {
            let result = match Self::copy_with_marker(&source, &dest_dir).await {
                Ok(target) => {
                    info!("Copied {} to {}", source.display(), target.display());
                    Ok(())
                }
                Err(e) => Err(format!("copy of {} failed: {}", source.display(), e)),
            };
            if let Err(e) = Self::finish(store.as_ref(), &correlation_id, result).await {
                error!("Failed to record flow result for request {}: {}", correlation_id, e);
            }
        });

        debug!("Started fs copy for request {}", request.id);
        FlowOutcome::Ok
    }
}
