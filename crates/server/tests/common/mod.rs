//! Common test utilities for in-process API testing with mocks.
//!
//! The fixture builds the real router on top of a SQLite status store in a
//! temp directory, with the job service and object storage replaced by
//! controllable fakes.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use vidrelay_core::{
    load_config_from_str,
    testing::{fast_config, MockJobClient, MockObjectStore},
    OrchestratorConfig, SqliteStatusStore, StatusStore, TranscodeOrchestrator, TranscodeRecord,
    TranscodeStatus,
};
use vidrelay_server::state::AppState;

/// Test fixture for API testing with mock dependencies.
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_event_accepted() {
///     let fixture = TestFixture::new().await;
///     let response = fixture
///         .post("/api/v1/events/object-created", json!({"bucketId": "media", "name": "raw/a.mp4"}))
///         .await;
///     assert_eq!(response.status, 202);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock job service - script submissions and poll results
    pub job_client: Arc<MockJobClient>,
    /// Mock object storage - inspect uploads and removals
    pub object_store: Arc<MockObjectStore>,
    /// Real SQLite status store backing the API
    pub status_store: Arc<SqliteStatusStore>,
    pub orchestrator: Arc<TranscodeOrchestrator>,
    /// Temporary directory for the database and fs object root
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a fixture with millisecond poll intervals.
    pub async fn new() -> Self {
        Self::with_orchestrator_config(fast_config()).await
    }

    pub async fn with_orchestrator_config(orchestrator_config: OrchestratorConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        let objects_dir = temp_dir.path().join("objects");
        std::fs::create_dir_all(&objects_dir).expect("Failed to create objects dir");

        let toml = format!(
            r#"
[job_service]
url = "https://jobs.test"
api_key = "test-key"

[database]
path = "{}"

[storage]
backend = "fs"
public_base_url = "http://127.0.0.1:8080/objects"

[storage.fs]
root = "{}"
"#,
            db_path.display(),
            objects_dir.display()
        );
        let mut config = load_config_from_str(&toml).expect("Failed to parse test config");
        config.orchestrator = orchestrator_config;

        let job_client = Arc::new(MockJobClient::new());
        let object_store = Arc::new(MockObjectStore::new());
        let status_store =
            Arc::new(SqliteStatusStore::new(&db_path).expect("Failed to create status store"));

        let orchestrator = Arc::new(TranscodeOrchestrator::new(
            config.orchestrator.clone(),
            Arc::clone(&job_client) as Arc<dyn vidrelay_core::JobClient>,
            Arc::clone(&status_store) as Arc<dyn StatusStore>,
            Arc::clone(&object_store) as Arc<dyn vidrelay_core::ObjectStore>,
        ));

        let state = Arc::new(AppState::new(
            config,
            Arc::clone(&orchestrator),
            Arc::clone(&status_store) as Arc<dyn StatusStore>,
        ));

        let router = vidrelay_server::api::create_router(state);

        Self {
            router,
            job_client,
            object_store,
            status_store,
            orchestrator,
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

    /// Send a POST request with no body.
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

    /// Post an object-created event.
    pub async fn post_event(&self, bucket_id: &str, name: &str) -> TestResponse {
        self.post(
            "/api/v1/events/object-created",
            serde_json::json!({ "bucketId": bucket_id, "name": name }),
        )
        .await
    }

    /// Poll the status store until the record reaches `status`.
    pub async fn wait_for_status(
        &self,
        source_path: &str,
        status: TranscodeStatus,
    ) -> TranscodeRecord {
        for _ in 0..200 {
            if let Ok(Some(record)) = self.status_store.get(source_path) {
                if record.status == status {
                    return record;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{} never reached {:?}", source_path, status);
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

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&body_bytes).into_owned())
            })
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
