//! Health endpoints for the Attendance Service.
//!
//! - `GET /health` - Liveness probe (is the process running?)
//! - `GET /ready` - Readiness probe (startup finished, not draining, and the
//!   attendance database answers)
//!
//! The `/metrics` endpoint is merged onto the same listener in `main.rs`.

use crate::store::AttendanceStore;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Readiness flag shared with `main`.
#[derive(Debug, Default)]
pub struct HealthState {
    /// True once startup completes; cleared when shutdown begins.
    ready: AtomicBool,
}

impl HealthState {
    /// Create a new health state (not ready).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Mark the service as not ready (e.g., during shutdown).
    pub fn set_not_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Readiness probe body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadinessResponse {
    /// "ready" or "not_ready".
    pub status: &'static str,

    /// Database connectivity, omitted when the probe did not get that far.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<&'static str>,

    /// Generic reason, no infrastructure details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone)]
struct HealthRouterState {
    health: Arc<HealthState>,
    store: Arc<dyn AttendanceStore>,
}

/// Create the health router with liveness and readiness endpoints.
pub fn health_router(health_state: Arc<HealthState>, store: Arc<dyn AttendanceStore>) -> Router {
    Router::new()
        .route("/health", get(liveness_handler))
        .route("/ready", get(readiness_handler))
        .with_state(HealthRouterState {
            health: health_state,
            store,
        })
}

/// Does not check dependencies; failure means the process is hung.
async fn liveness_handler() -> &'static str {
    "OK"
}

/// Returns 503 until startup completes, again once shutdown begins, and
/// whenever the database stops answering.
#[tracing::instrument(skip_all, name = "att.health.readiness")]
async fn readiness_handler(State(state): State<HealthRouterState>) -> impl IntoResponse {
    if !state.health.is_ready() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready",
                database: None,
                error: Some("Service is starting or draining".to_string()),
            }),
        );
    }

    if let Err(e) = state.store.ping().await {
        warn!(target: "att.health", error = %e, "Readiness check failed: database error");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready",
                database: Some("unhealthy"),
                error: Some("Service dependencies unavailable".to_string()),
            }),
        );
    }

    (
        StatusCode::OK,
        Json(ReadinessResponse {
            status: "ready",
            database: Some("healthy"),
            error: None,
        }),
    )
}
