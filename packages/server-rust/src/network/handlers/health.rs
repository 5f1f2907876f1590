//! Health, liveness and readiness checks.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use super::AppState;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub state: &'static str,
    /// Orchestrations currently holding an in-flight guard.
    pub in_flight: u64,
    pub uptime_secs: u64,
}

/// Always 200; `state` tells a ready gateway from a draining one.
pub async fn health_handler(State(app): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport {
        state: app.shutdown.health_state().as_str(),
        in_flight: app.shutdown.in_flight_count(),
        uptime_secs: app.start_time.elapsed().as_secs(),
    })
}

/// Process is up. Never consults downstream services.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// 200 only while new orchestrations are admitted.
pub async fn readiness_handler(State(app): State<AppState>) -> StatusCode {
    if app.shutdown.is_accepting() {
        return StatusCode::OK;
    }
    StatusCode::SERVICE_UNAVAILABLE
}
