//! Liveness check.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use tutor_core::UserId;
use tutor_store::Store;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok" or "degraded".
    pub status: &'static str,
    /// Service name.
    pub service: &'static str,
    /// Service version.
    pub version: &'static str,
    /// Whether a read against the store succeeded.
    pub storage_ok: bool,
    /// Whether the maintenance job is configured to run.
    pub maintenance_enabled: bool,
}

/// Health check endpoint. Answers 503 when the store cannot be read.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let sentinel = UserId::from_bytes([0; 16]);
    let storage_ok = match state.store.get_user(&sentinel) {
        Ok(_) => true,
        Err(e) => {
            tracing::error!(error = %e, "Health check could not read the store");
            false
        }
    };

    let status = if storage_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if storage_ok { "ok" } else { "degraded" },
            service: "tutor",
            version: env!("CARGO_PKG_VERSION"),
            storage_ok,
            maintenance_enabled: state.config.reconcile_enabled,
        }),
    )
}
