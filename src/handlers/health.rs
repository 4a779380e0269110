//! Health endpoint.
//!
//! `GET /health` needs no token and bypasses the IP allow-list by default, so
//! load balancers and process supervisors can reach it from anywhere.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use tracing::instrument;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "ok",
///   "version": "0.1.0",
///   "timestamp": "2024-01-15T10:30:00Z",
///   "uptimeSeconds": 3600
/// }
/// ```
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        uptime_seconds: state.uptime_seconds(),
    })
}
