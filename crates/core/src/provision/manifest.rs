use crate::job::{Job, ResourceDefinition, ResourceManifest, LOCAL_DIRECTORY};

use super::ManifestGenerator;

/// Request property naming a local staging area for executor jobs.
pub const STAGING_PROPERTY: &str = "staging";

/// Manifest generator for local directory resources.
///
/// - Initiator: one `local_directory` definition when the destination is a
///   local directory, named after the destination `name` property (falling
///   back to the asset id).
/// - Executor: a staging directory when the request asks for one, otherwise
///   nothing to provision.
#[derive(Debug, Clone, Default)]
pub struct DefaultManifestGenerator;

impl ManifestGenerator for DefaultManifestGenerator {
    fn generate_initiator_manifest(&self, job: &Job) -> ResourceManifest {
        let destination = &job.request.destination;
        if destination.kind != LOCAL_DIRECTORY {
            return ResourceManifest::default();
        }

        let name = destination
            .property("name")
            .unwrap_or(job.request.asset_id.as_str());
        let definition = ResourceDefinition::new(LOCAL_DIRECTORY).with_property("name", name);
        ResourceManifest::new(vec![definition])
    }

    fn generate_executor_manifest(&self, job: &Job) -> ResourceManifest {
        match job.request.property(STAGING_PROPERTY) {
            Some(name) => ResourceManifest::new(vec![
                ResourceDefinition::new(LOCAL_DIRECTORY).with_property("name", name)
            ]),
            None => ResourceManifest::default(),
        }
    }
}
