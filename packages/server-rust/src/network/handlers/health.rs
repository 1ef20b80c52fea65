//! Health, liveness, and readiness endpoint handlers.
//!
//! Exposes lifecycle information for orchestrators and monitoring.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use super::AppState;
use crate::network::HealthState;

/// Detailed health JSON.
///
/// Always returns 200; the `state` field tells monitoring tools whether the
/// server is actually ready, draining, or stopped.
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "state": state.shutdown.health_state().as_str(),
        "service": state.config.service_name,
        "operations": state.engine.registry().len(),
        "in_flight": state.shutdown.in_flight_count(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// Liveness probe. Always 200: it only asserts the process is responsive.
/// A failed liveness probe restarts the pod, so no dependency checks here.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe. 200 only in the `Ready` state; 503 during startup and
/// drain so the endpoint drops out of load-balancer rotation.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() == HealthState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
