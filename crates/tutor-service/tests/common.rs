//! Common test utilities for tutor-service integration tests.

#![allow(dead_code)] // Each test file uses a different subset

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tempfile::TempDir;

use tutor_service::{create_router, AppState, ServiceConfig};
use tutor_store::{EngineOptions, RocksStore};

pub const API_KEY: &str = "test-service-key";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Direct handle on the store behind the server.
    pub store: Arc<RocksStore>,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
}

impl TestHarness {
    /// Create a new test harness with a fresh database.
    pub fn new() -> Self {
        Self::with_api_key(Some(API_KEY))
    }

    /// A harness whose service accepts writes only with `api_key`, or never.
    pub fn with_api_key(api_key: Option<&str>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            data_dir: temp_dir.path().to_string_lossy().to_string(),
            service_api_key: api_key.map(Into::into),
            max_balance: 100,
            reconcile_enabled: false,
            ..ServiceConfig::default()
        };
        let options = EngineOptions {
            lock_timeout_ms: 5_000,
            ..config.engine_options()
        };
        let store =
            Arc::new(RocksStore::open_with(temp_dir.path(), options).expect("Failed to open store"));

        let state = AppState::new(Arc::clone(&store), config);
        let router: Router = create_router(state);
        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            _temp_dir: temp_dir,
        }
    }

    /// Register a user and return its id.
    pub async fn create_user(&self, role: &str) -> String {
        let response = self
            .server
            .post("/v1/users")
            .add_header("x-api-key", API_KEY)
            .json(&json!({ "role": role, "display_name": format!("{role} user") }))
            .await;
        response.assert_status_ok();
        response.json::<Value>()["id"].as_str().unwrap().to_string()
    }

    /// Add credits to a user.
    pub async fn add_credits(&self, user_id: &str, amount: i64) -> Value {
        let response = self
            .server
            .post(&format!("/v1/users/{user_id}/credits"))
            .add_header("x-api-key", API_KEY)
            .json(&json!({ "amount": amount, "reason": "purchase" }))
            .await;
        response.assert_status_ok();
        response.json()
    }

    /// Create a lesson starting tomorrow.
    pub async fn create_lesson(
        &self,
        teacher_id: &str,
        capacity: u32,
        credit_cost: i64,
    ) -> String {
        let starts_at = Utc::now() + Duration::days(1);
        let response = self
            .server
            .post("/v1/lessons")
            .add_header("x-api-key", API_KEY)
            .json(&json!({
                "teacher_id": teacher_id,
                "title": "Physics",
                "capacity": capacity,
                "credit_cost": credit_cost,
                "starts_at": starts_at,
                "ends_at": starts_at + Duration::hours(1),
            }))
            .await;
        response.assert_status_ok();
        response.json::<Value>()["id"].as_str().unwrap().to_string()
    }

    /// Current balance of a user.
    pub async fn balance(&self, user_id: &str) -> i64 {
        let response = self
            .server
            .get(&format!("/v1/users/{user_id}/credits"))
            .await;
        response.assert_status_ok();
        response.json::<Value>()["balance"].as_i64().unwrap()
    }

    /// Create a booking in the given status and return the full receipt.
    pub async fn book(
        &self,
        lesson_id: &str,
        student_id: &str,
        status: &str,
    ) -> axum_test::TestResponse {
        self.server
            .post("/v1/bookings")
            .add_header("x-api-key", API_KEY)
            .json(&json!({
                "lesson_id": lesson_id,
                "student_id": student_id,
                "status": status,
            }))
            .await
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
