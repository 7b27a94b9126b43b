//! Transfer pipeline integration tests.
//!
//! Two peers, each with its own store, wired with the filesystem
//! collaborators:
//! - FsProvisioner + provisioning writer
//! - FsFlowController behind a DataFlowManager (executor side)
//! - MarkerFileChecker (initiator side)
//!
//! The dispatcher is mocked; the test carries the request from one peer to
//! the other the way the inbound API would, and the acknowledgment back.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::task::JoinHandle;

use courier_core::{
    completion::{CompletionCheckers, MarkerFileChecker},
    flow::{DataFlowManager, FsFlowController, SOURCE_PATH_PROPERTY},
    job::{DataAddress, JobState, JobStore, SqliteJobStore, TransferRequest, LOCAL_DIRECTORY},
    provision::{
        create_provisioning_channel, DefaultManifestGenerator, FsProvisioner, STAGING_PROPERTY,
    },
    testing::{fixtures, MockDispatcher},
    InboundTransfer, OrchestratorConfig, TransferOrchestrator,
};

/// One side of a transfer.
struct Peer {
    store: Arc<SqliteJobStore>,
    dispatcher: Arc<MockDispatcher>,
    orchestrator: TransferOrchestrator,
    _writer: JoinHandle<()>,
}

impl Peer {
    /// A peer that only copies files from `<dir>/outbox` into `<dir>`.
    fn new(dir: &Path) -> Self {
        Self::with_roots(dir, &dir.join("outbox"), dir)
    }

    fn with_roots(dir: &Path, source_root: &Path, destination_root: &Path) -> Self {
        std::fs::create_dir_all(dir).unwrap();
        let store = Arc::new(SqliteJobStore::new(&dir.join("jobs.db")).unwrap());
        let (handle, writer) = create_provisioning_channel(store.clone(), 16);
        let writer = tokio::spawn(writer.run());

        let provisioner = Arc::new(FsProvisioner::new(dir.join("provisioned"), handle));
        let dispatcher = Arc::new(MockDispatcher::new());
        let flow = Arc::new(
            DataFlowManager::new().with_controller(Arc::new(FsFlowController::new(
                store.clone(),
                source_root,
                destination_root,
            ))),
        );
        let checkers = CompletionCheckers::new()
            .with_checker(MarkerFileChecker::kind(), Arc::new(MarkerFileChecker::new()));

        let orchestrator = TransferOrchestrator::new(
            OrchestratorConfig {
                idle_wait_ms: 5,
                error_wait_ms: 5,
                ..Default::default()
            },
            store.clone(),
            Arc::new(DefaultManifestGenerator),
            provisioner,
            dispatcher.clone(),
            flow,
        )
        .with_completion_checkers(checkers);

        Self {
            store,
            dispatcher,
            orchestrator,
            _writer: writer,
        }
    }

    fn state(&self, id: &str) -> JobState {
        self.store.get(id).unwrap().unwrap().state
    }

    /// Run cycles until the job reaches `state`.
    async fn drive_to(&self, id: &str, state: JobState) {
        for _ in 0..200 {
            if self.state(id) == state {
                return;
            }
            self.orchestrator.run_cycle().await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} stuck in {:?}, expected {:?}", id, self.state(id), state);
    }
}

#[tokio::test]
async fn test_local_directory_transfer_between_peers() {
    let temp_dir = TempDir::new().unwrap();
    let outbox = temp_dir.path().join("outbox");
    std::fs::create_dir_all(&outbox).unwrap();
    std::fs::write(outbox.join("report.csv"), b"id,value\n1,42\n").unwrap();

    let consumer_dir = temp_dir.path().join("consumer");
    let consumer = Peer::new(&consumer_dir);
    let provider = Peer::with_roots(
        &temp_dir.path().join("provider"),
        &outbox,
        &consumer_dir.join("provisioned"),
    );

    // Consumer initiates and provisions its inbox
    let request = TransferRequest::new(
        "tx-fs",
        DataAddress::new(LOCAL_DIRECTORY).with_property("name", "inbox"),
    )
    .with_connector("http://provider.example", "http")
    .with_asset("report")
    .with_property(SOURCE_PATH_PROPERTY, "report.csv");

    let initiator_id = consumer
        .orchestrator
        .initiate_initiator_request(request)
        .unwrap();
    consumer.drive_to(&initiator_id, JobState::Sent).await;

    let sends = consumer.dispatcher.recorded_sends().await;
    assert_eq!(sends.len(), 1);
    let inbox = sends[0]
        .request
        .destination
        .property("path")
        .expect("dispatched request should carry the provisioned path")
        .to_string();
    assert!(inbox.ends_with("inbox"));
    assert!(Path::new(&inbox).is_dir());

    // Provider receives the request and copies the data
    let executor_id = provider
        .orchestrator
        .receive_inbound(InboundTransfer {
            request: sends[0].request.clone(),
            process_id: sends[0].process_id.clone(),
            callback_address: Some("http://consumer.example".to_string()),
        })
        .await
        .unwrap();
    provider.drive_to(&executor_id, JobState::Completed).await;
    assert_eq!(
        std::fs::read(Path::new(&inbox).join("report.csv")).unwrap(),
        b"id,value\n1,42\n"
    );

    // The provider acknowledged the consumer's job
    let acks = provider.dispatcher.recorded_acknowledgments().await;
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].process_id, initiator_id);
    assert_eq!(acks[0].callback_address, "http://consumer.example");

    // Consumer applies the acknowledgment and detects the marker
    fixtures::mark_acknowledged(consumer.store.as_ref(), &initiator_id).unwrap();
    consumer.drive_to(&initiator_id, JobState::Completed).await;
}

#[tokio::test]
async fn test_executor_without_controller_fails() {
    let temp_dir = TempDir::new().unwrap();
    let provider = Peer::new(temp_dir.path());

    let request = TransferRequest::new("tx-s3", DataAddress::new("object_store"));
    let id = provider.orchestrator.initiate_executor_request(request).unwrap();
    provider.drive_to(&id, JobState::Error).await;

    let job = provider.store.get(&id).unwrap().unwrap();
    assert!(job
        .error_detail
        .unwrap()
        .contains("no data flow controller"));
}

#[tokio::test]
async fn test_executor_missing_source_fails() {
    let temp_dir = TempDir::new().unwrap();
    let provider = Peer::new(temp_dir.path());

    std::fs::create_dir_all(temp_dir.path().join("outbox")).unwrap();

    let request = TransferRequest::new(
        "tx-missing",
        DataAddress::new(LOCAL_DIRECTORY).with_property("path", "out"),
    )
    .with_property(SOURCE_PATH_PROPERTY, "absent.bin");
    let id = provider.orchestrator.initiate_executor_request(request).unwrap();
    provider.drive_to(&id, JobState::Error).await;
}

#[tokio::test]
async fn test_executor_source_outside_outbox_fails() {
    let temp_dir = TempDir::new().unwrap();
    let provider = Peer::new(temp_dir.path());
    std::fs::create_dir_all(temp_dir.path().join("outbox")).unwrap();
    let secret = temp_dir.path().join("jobs.db");

    let request = TransferRequest::new(
        "tx-escape",
        DataAddress::new(LOCAL_DIRECTORY).with_property("path", "out"),
    )
    .with_property(SOURCE_PATH_PROPERTY, secret.to_string_lossy());
    let id = provider.orchestrator.initiate_executor_request(request).unwrap();
    provider.drive_to(&id, JobState::Error).await;

    let job = provider.store.get(&id).unwrap().unwrap();
    assert!(job.error_detail.unwrap().contains("outside the source root"));
    assert!(!temp_dir.path().join("out").exists());
}

#[tokio::test]
async fn test_peer_supplied_staging_name_cannot_escape() {
    let temp_dir = TempDir::new().unwrap();
    let provider = Peer::new(temp_dir.path());

    let request = TransferRequest::new("tx-staging", DataAddress::new("object_store"))
        .with_property(STAGING_PROPERTY, "../../escaped");
    let id = provider.orchestrator.initiate_executor_request(request).unwrap();
    provider.drive_to(&id, JobState::Error).await;

    let job = provider.store.get(&id).unwrap().unwrap();
    assert!(job.error_detail.unwrap().contains("invalid resource name"));
    assert!(!temp_dir.path().join("escaped").exists());
}

#[tokio::test]
async fn test_remote_destination_needs_no_local_resources() {
    let temp_dir = TempDir::new().unwrap();
    let consumer = Peer::new(temp_dir.path());

    let request = TransferRequest::new("tx-bucket", DataAddress::new("object_store"))
        .with_connector("http://provider.example", "http");
    let id = consumer.orchestrator.initiate_initiator_request(request).unwrap();

    consumer.drive_to(&id, JobState::Sent).await;
    assert_eq!(consumer.dispatcher.send_count().await, 1);

    let job = consumer.store.get(&id).unwrap().unwrap();
    assert!(job.manifest.unwrap().is_empty());
    assert!(job.provisioned_resources.is_empty());
}
