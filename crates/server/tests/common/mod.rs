//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with mock collaborators injected, so the HTTP surface and the
//! orchestrator can be exercised without a peer or real provisioning.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use courier_core::{
    config::{DatabaseConfig, ServerConfig},
    testing::{MockDispatcher, MockFlowGateway, MockProvisioner},
    Config, DefaultManifestGenerator, JobStore, OrchestratorConfig, SqliteJobStore,
    TransferOrchestrator,
};

/// Re-export fixtures for test convenience
pub use courier_core::testing::fixtures;

/// Test fixture for API testing with mock collaborators.
///
/// The orchestrator is never started; tests drive it with `run_cycle()`.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_transfer_creation() {
///     let fixture = TestFixture::new();
///
///     let response = fixture.post("/api/v1/transfers", json!({
///         "role": "initiator",
///         "request": { "id": "tx-1", "destination": { "kind": "local_directory" } }
///     })).await;
///
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    pub store: Arc<SqliteJobStore>,
    pub orchestrator: Arc<TransferOrchestrator>,
    /// Mock provisioner - records jobs, never publishes
    pub provisioner: Arc<MockProvisioner>,
    /// Mock dispatcher - records sends
    pub dispatcher: Arc<MockDispatcher>,
    /// Mock flow gateway - scripted outcomes
    pub flow: Arc<MockFlowGateway>,
    /// Temporary directory for the test database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    /// Raw body, for non-JSON endpoints
    pub text: String,
}

impl TestFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let config = Config {
            server: ServerConfig {
                host: std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
                port: 0, // Not used for in-process testing
            },
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            orchestrator: OrchestratorConfig {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        };

        let store = Arc::new(SqliteJobStore::new(&db_path).expect("Failed to create job store"));
        let provisioner = Arc::new(MockProvisioner::new());
        let dispatcher = Arc::new(MockDispatcher::new());
        let flow = Arc::new(MockFlowGateway::new());

        let orchestrator = Arc::new(TransferOrchestrator::new(
            config.orchestrator.clone(),
            store.clone(),
            Arc::new(DefaultManifestGenerator),
            provisioner.clone(),
            dispatcher.clone(),
            flow.clone(),
        ));

        let state = Arc::new(courier_server::state::AppState::new(
            config,
            store.clone() as Arc<dyn JobStore>,
            orchestrator.clone(),
        ));

        let router = courier_server::api::create_router(state);

        Self {
            router,
            store,
            orchestrator,
            provisioner,
            dispatcher,
            flow,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).into_owned();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body, text }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status, $response.status, $response.text
        );
    };
}

/// Helper to assert a JSON path equals expected value.
#[macro_export]
macro_rules! assert_json_path {
    ($json:expr, $path:expr, $expected:expr) => {
        let actual = &$json[$path];
        assert_eq!(
            actual, &$expected,
            "Path '{}' expected {:?}, got {:?}",
            $path, $expected, actual
        );
    };
}
