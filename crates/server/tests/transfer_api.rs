//! Transfer API tests.
//!
//! Drive the HTTP surface in-process; the orchestrator is advanced by hand
//! with `run_cycle()` and mock collaborators.

mod common;

use axum::http::StatusCode;
use serde_json::{json, Value};

use common::{fixtures, TestFixture};
use courier_core::{JobRole, JobState, JobStore};

fn initiator_body(id: &str) -> Value {
    json!({
        "role": "initiator",
        "request": serde_json::to_value(fixtures::initiator_request(id)).unwrap()
    })
}

/// Create an initiator transfer and drive it to `Sent`.
async fn sent_transfer(fixture: &TestFixture, correlation_id: &str) -> String {
    let response = fixture
        .post("/api/v1/transfers", initiator_body(correlation_id))
        .await;
    assert_status!(response, StatusCode::CREATED);
    let id = response.body["id"].as_str().unwrap().to_string();

    fixture.orchestrator.run_cycle().await.unwrap();
    fixtures::mark_provisioned(fixture.store.as_ref(), &id, vec![]).unwrap();
    fixture.orchestrator.run_cycle().await.unwrap();

    assert_eq!(
        fixture.store.get(&id).unwrap().unwrap().state,
        JobState::Sent
    );
    id
}

// =============================================================================
// Health, config and metrics
// =============================================================================

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/v1/health").await;

    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "status", json!("ok"));
}

#[tokio::test]
async fn test_config_endpoint() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/v1/config").await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["orchestrator"]["enabled"], json!(false));
    assert_eq!(response.body["orchestrator"]["batch_size"], json!(5));
    assert_eq!(response.body["dispatch"]["timeout_secs"], json!(30));
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new();
    fixture.get("/api/v1/health").await;

    let response = fixture.get("/api/v1/metrics").await;

    assert_status!(response, StatusCode::OK);
    assert!(response.text.contains("courier_http_requests_total"));
    assert!(response.text.contains("health"));
    assert!(response.text.contains("courier_orchestrator_running"));
    assert!(response.text.contains("courier_jobs_by_state"));
}

// =============================================================================
// Initiation
// =============================================================================

#[tokio::test]
async fn test_create_transfer() {
    let fixture = TestFixture::new();

    let response = fixture.post("/api/v1/transfers", initiator_body("tx-1")).await;

    assert_status!(response, StatusCode::CREATED);
    let id = response.body["id"].as_str().unwrap();

    let job = fixture.store.get(id).unwrap().unwrap();
    assert_eq!(job.correlation_id, "tx-1");
    assert_eq!(job.role, JobRole::Initiator);
    assert_eq!(job.state, JobState::Initial);
}

#[tokio::test]
async fn test_create_transfer_is_idempotent() {
    let fixture = TestFixture::new();

    let first = fixture.post("/api/v1/transfers", initiator_body("tx-1")).await;
    let second = fixture.post("/api/v1/transfers", initiator_body("tx-1")).await;

    assert_status!(first, StatusCode::CREATED);
    assert_status!(second, StatusCode::CREATED);
    assert_eq!(first.body["id"], second.body["id"]);
    assert_eq!(fixture.store.count_by_state(JobState::Initial).unwrap(), 1);
}

#[tokio::test]
async fn test_create_transfer_defaults_to_initiator() {
    let fixture = TestFixture::new();

    let response = fixture
        .post(
            "/api/v1/transfers",
            json!({
                "request": {
                    "id": "tx-default",
                    "destination": { "kind": "local_directory" }
                }
            }),
        )
        .await;

    assert_status!(response, StatusCode::CREATED);
    let job = fixture
        .store
        .get(response.body["id"].as_str().unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(job.role, JobRole::Initiator);
    assert!(job.request.managed_resources);
}

#[tokio::test]
async fn test_create_transfer_with_empty_id_is_rejected() {
    let fixture = TestFixture::new();

    let response = fixture.post("/api/v1/transfers", initiator_body("  ")).await;

    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].as_str().unwrap().contains("id"));
}

#[tokio::test]
async fn test_create_transfer_with_unknown_role_is_rejected() {
    let fixture = TestFixture::new();

    let mut body = initiator_body("tx-1");
    body["role"] = json!("observer");
    let response = fixture.post("/api/v1/transfers", body).await;

    assert_status!(response, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_create_transfer_with_malformed_json() {
    let fixture = TestFixture::new();

    let response = fixture.post_raw("/api/v1/transfers", "{not json").await;

    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_inbound_transfer_creates_executor_job() {
    let fixture = TestFixture::new();

    let body = json!({
        "request": serde_json::to_value(fixtures::executor_request("tx-in")).unwrap(),
        "process_id": "remote-job-1"
    });
    let first = fixture.post("/api/v1/transfers/inbound", body.clone()).await;
    let second = fixture.post("/api/v1/transfers/inbound", body).await;

    assert_status!(first, StatusCode::OK);
    assert_eq!(first.body["id"], second.body["id"]);

    let job = fixture
        .store
        .get(first.body["id"].as_str().unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(job.role, JobRole::Executor);
    assert_eq!(job.correlation_id, "tx-in");
}

#[tokio::test]
async fn test_inbound_transfer_acknowledges_the_initiator() {
    let fixture = TestFixture::new();

    let body = json!({
        "request": serde_json::to_value(fixtures::executor_request("tx-in")).unwrap(),
        "process_id": "remote-job-1",
        "callback_address": "http://initiator.example:8080"
    });
    let response = fixture.post("/api/v1/transfers/inbound", body).await;
    assert_status!(response, StatusCode::OK);

    let mut acks = Vec::new();
    for _ in 0..50 {
        acks = fixture.dispatcher.recorded_acknowledgments().await;
        if !acks.is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].process_id, "remote-job-1");
    assert_eq!(acks[0].callback_address, "http://initiator.example:8080");
}

// =============================================================================
// Queries
// =============================================================================

#[tokio::test]
async fn test_get_transfer() {
    let fixture = TestFixture::new();
    let created = fixture.post("/api/v1/transfers", initiator_body("tx-1")).await;
    let id = created.body["id"].as_str().unwrap();

    let response = fixture.get(&format!("/api/v1/transfers/{}", id)).await;

    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "id", json!(id));
    assert_json_path!(response.body, "correlation_id", json!("tx-1"));
    assert_json_path!(response.body, "role", json!("initiator"));
    assert_json_path!(response.body, "state", json!("initial"));
    assert_json_path!(response.body, "retry_count", json!(0));
    assert_eq!(
        response.body["request"]["connector_address"],
        json!("http://peer.example:8080")
    );
}

#[tokio::test]
async fn test_get_missing_transfer() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/v1/transfers/no-such-job").await;

    assert_status!(response, StatusCode::NOT_FOUND);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("no-such-job"));
}

#[tokio::test]
async fn test_list_transfers_by_state() {
    let fixture = TestFixture::new();
    fixture.post("/api/v1/transfers", initiator_body("tx-1")).await;
    fixture.post("/api/v1/transfers", initiator_body("tx-2")).await;

    let response = fixture.get("/api/v1/transfers?state=initial").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["transfers"].as_array().unwrap().len(), 2);
    assert_json_path!(response.body, "state", json!("initial"));

    let limited = fixture.get("/api/v1/transfers?state=initial&limit=1").await;
    assert_eq!(limited.body["transfers"].as_array().unwrap().len(), 1);
    assert_json_path!(limited.body, "limit", json!(1));

    let empty = fixture.get("/api/v1/transfers?state=sent").await;
    assert!(empty.body["transfers"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_list_transfers_clamps_limit() {
    let fixture = TestFixture::new();

    let response = fixture
        .get("/api/v1/transfers?state=initial&limit=100000")
        .await;

    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "limit", json!(1000));
}

#[tokio::test]
async fn test_list_transfers_with_unknown_state() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/v1/transfers?state=archived").await;

    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].as_str().unwrap().contains("archived"));
}

// =============================================================================
// Acknowledgment
// =============================================================================

#[tokio::test]
async fn test_acknowledge_sent_transfer() {
    let fixture = TestFixture::new();
    let id = sent_transfer(&fixture, "tx-ack").await;
    assert_eq!(fixture.dispatcher.send_count().await, 1);

    let response = fixture
        .post_empty(&format!("/api/v1/transfers/{}/acknowledge", id))
        .await;

    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "state", json!("acknowledged"));
    assert_eq!(
        fixture.store.get(&id).unwrap().unwrap().state,
        JobState::Acknowledged
    );
}

#[tokio::test]
async fn test_acknowledge_twice_conflicts() {
    let fixture = TestFixture::new();
    let id = sent_transfer(&fixture, "tx-ack").await;
    let path = format!("/api/v1/transfers/{}/acknowledge", id);

    assert_status!(fixture.post_empty(&path).await, StatusCode::OK);
    let response = fixture.post_empty(&path).await;

    assert_status!(response, StatusCode::CONFLICT);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("acknowledged"));
}

#[tokio::test]
async fn test_acknowledge_before_send_conflicts() {
    let fixture = TestFixture::new();
    let created = fixture.post("/api/v1/transfers", initiator_body("tx-1")).await;
    let id = created.body["id"].as_str().unwrap();

    let response = fixture
        .post_empty(&format!("/api/v1/transfers/{}/acknowledge", id))
        .await;

    assert_status!(response, StatusCode::CONFLICT);
    assert_eq!(
        fixture.store.get(id).unwrap().unwrap().state,
        JobState::Initial
    );
}

#[tokio::test]
async fn test_acknowledge_executor_conflicts() {
    let fixture = TestFixture::new();
    let created = fixture
        .post(
            "/api/v1/transfers",
            json!({
                "role": "executor",
                "request": serde_json::to_value(fixtures::executor_request("tx-exec")).unwrap()
            }),
        )
        .await;
    let id = created.body["id"].as_str().unwrap();

    let response = fixture
        .post_empty(&format!("/api/v1/transfers/{}/acknowledge", id))
        .await;

    assert_status!(response, StatusCode::CONFLICT);
    assert!(response.body["error"].as_str().unwrap().contains("executor"));
}

#[tokio::test]
async fn test_acknowledge_missing_transfer() {
    let fixture = TestFixture::new();

    let response = fixture
        .post_empty("/api/v1/transfers/no-such-job/acknowledge")
        .await;

    assert_status!(response, StatusCode::NOT_FOUND);
}

// =============================================================================
// Orchestrator
// =============================================================================

#[tokio::test]
async fn test_orchestrator_status_counts_jobs() {
    let fixture = TestFixture::new();
    fixture.post("/api/v1/transfers", initiator_body("tx-1")).await;
    sent_transfer(&fixture, "tx-2").await;

    let response = fixture.get("/api/v1/orchestrator/status").await;

    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "running", json!(false));
    assert_json_path!(response.body, "batch_size", json!(5));
    // tx-1 was provisioned alongside tx-2 but never marked provisioned
    assert_eq!(response.body["jobs"]["provisioning"], json!(1));
    assert_eq!(response.body["jobs"]["sent"], json!(1));
    assert_eq!(response.body["jobs"]["completed"], json!(0));
}

#[tokio::test]
async fn test_orchestrator_start_and_stop() {
    let fixture = TestFixture::new();

    let started = fixture.post_empty("/api/v1/orchestrator/start").await;
    assert_status!(started, StatusCode::OK);
    assert_json_path!(started.body, "message", json!("Orchestrator started"));
    assert!(fixture.orchestrator.is_running());

    let status = fixture.get("/api/v1/orchestrator/status").await;
    assert_json_path!(status.body, "running", json!(true));

    let stopped = fixture.post_empty("/api/v1/orchestrator/stop").await;
    assert_status!(stopped, StatusCode::OK);
    assert_json_path!(stopped.body, "message", json!("Orchestrator stopped"));
    assert!(!fixture.orchestrator.is_running());
}
