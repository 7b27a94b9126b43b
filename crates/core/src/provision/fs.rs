use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::job::{Job, ProvisionedResource, ResourceDefinition, LOCAL_DIRECTORY};

use super::{ProvisionError, ProvisionHandle, ProvisionResponse, Provisioner};

/// Provisions `local_directory` resources as directories under a root path.
///
/// Each resource gets `<root>/<job id>/<definition name or id>`. The name
/// comes from the request, so it must be a single plain path component. The
/// resulting destination resource carries the directory in its `path`
/// property.
pub struct FsProvisioner {
    root_dir: PathBuf,
    handle: ProvisionHandle,
}

impl FsProvisioner {
    pub fn new(root_dir: impl Into<PathBuf>, handle: ProvisionHandle) -> Self {
        Self {
            root_dir: root_dir.into(),
            handle,
        }
    }

    fn directory_for(
        &self,
        job_id: &str,
        definition: &ResourceDefinition,
    ) -> Result<PathBuf, ProvisionError> {
        let name = definition
            .properties
            .get("name")
            .filter(|n| !n.is_empty())
            .unwrap_or(&definition.id);
        if !is_plain_name(name) {
            return Err(ProvisionError::InvalidName(name.clone()));
        }
        Ok(self.root_dir.join(job_id).join(name))
    }
}

#[async_trait]
impl Provisioner for FsProvisioner {
    async fn provision(&self, job: &Job) -> Result<(), ProvisionError> {
        let definitions = job
            .manifest
            .as_ref()
            .map(|m| m.definitions.clone())
            .unwrap_or_default();

        if let Some(unsupported) = definitions.iter().find(|d| d.kind != LOCAL_DIRECTORY) {
            return Err(ProvisionError::UnsupportedKind(unsupported.kind.clone()));
        }

        let targets = definitions
            .into_iter()
            .map(|d| {
                let dir = self.directory_for(&job.id, &d)?;
                Ok((d, dir))
            })
            .collect::<Result<Vec<(ResourceDefinition, PathBuf)>, ProvisionError>>()?;

        let job_id = job.id.clone();
        let handle = self.handle.clone();

        tokio::spawn(async move {
            let mut resources = Vec::with_capacity(targets.len());
            for (definition, dir) in targets {
                if let Err(e) = tokio::fs::create_dir_all(&dir).await {
                    handle
                        .publish(ProvisionResponse::failed(
                            &job_id,
                            format!("failed to create {}: {}", dir.display(), e),
                        ))
                        .await;
                    return;
                }
                debug!(job_id = %job_id, "Provisioned directory {}", dir.display());
                resources.push(
                    ProvisionedResource::destination(&definition)
                        .with_property("path", dir.to_string_lossy()),
                );
            }
            handle
                .publish(ProvisionResponse::provisioned(&job_id, resources))
                .await;
        });

        Ok(())
    }
}

/// True for names like `inbox`; false for `..`, `a/b`, `/tmp` or `.`.
fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains(['/', '\\'])
}
