//! Common test utilities for API testing.
//!
//! Builds an in-process router over a real orchestrator. The converter is
//! the default `cp {input} {output_dir}` program, so jobs finish without any
//! external tooling, and every directory lives in a temp dir.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use convoy_core::{Config, StorageConfig};
use convoy_server::state::{build_orchestrator, build_store, AppState, ServiceOrchestrator};

/// Re-export fixtures for test convenience
pub use convoy_core::testing::fixtures;

/// Base URL artifacts are published under in tests.
pub const PUBLIC_BASE_URL: &str = "http://files.test";

/// In-process server with a running orchestrator.
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// The orchestrator behind the router
    pub orchestrator: Arc<ServiceOrchestrator>,
    /// Work, artifact and input directories
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

impl TestFixture {
    /// Create a fixture with default settings.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a fixture, letting the caller adjust the config first.
    pub async fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let mut config = Config::default();
        config.orchestrator.work_dir = temp_dir.path().join("work");
        config.storage = StorageConfig {
            root: temp_dir.path().join("artifacts"),
            public_base_url: PUBLIC_BASE_URL.to_string(),
        };
        config.server.intake_dir = Some(temp_dir.path().join("inputs"));
        config.reaper.enabled = false;
        config.callback.retry_delay_secs = 1;
        adjust(&mut config);
        if let Some(intake) = &config.server.intake_dir {
            std::fs::create_dir_all(intake).expect("Failed to create intake dir");
        }

        let store = build_store(&config).expect("Failed to create store");
        let orchestrator =
            Arc::new(build_orchestrator(&config, store).expect("Failed to build orchestrator"));
        orchestrator.start();

        let state = Arc::new(AppState::new(config, Arc::clone(&orchestrator)));
        let router = convoy_server::api::create_router(state);

        Self {
            router,
            orchestrator,
            temp_dir,
        }
    }

    /// The intake directory path inputs are accepted from.
    pub fn intake_dir(&self) -> PathBuf {
        self.temp_dir.path().join("inputs")
    }

    /// Write an input file into the fixture's input directory.
    pub fn input_file(&self, name: &str, contents: &[u8]) -> PathBuf {
        fixtures::write_input(&self.temp_dir.path().join("inputs"), name, contents)
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
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

    /// Create a job and return its id, asserting 201.
    pub async fn create_job(&self, body: Value) -> String {
        let response = self.post("/api/v1/jobs", body).await;
        assert_eq!(
            response.status,
            StatusCode::CREATED,
            "unexpected body: {}",
            response.text
        );
        response.body["id"]
            .as_str()
            .expect("id in create response")
            .to_string()
    }

    /// Poll `GET /api/v1/jobs/{id}` until the job is terminal.
    pub async fn wait_for_terminal(&self, id: &str) -> Value {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let response = self.get(&format!("/api/v1/jobs/{}", id)).await;
            assert_eq!(response.status, StatusCode::OK);
            let state = response.body["state"].as_str().unwrap_or_default().to_string();
            if state == "processed" || state == "error" {
                return response.body;
            }
            assert!(Instant::now() < deadline, "job {} stuck in {}", id, state);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

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
