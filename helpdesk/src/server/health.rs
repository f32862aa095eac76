//! Health check endpoints.

use super::{AppState, Readiness};
use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
}

/// Liveness check. Does not touch any dependency.
///
/// ```bash
/// curl http://localhost:8081/health
/// # {"status":"ok","version":"0.1.0"}
/// ```
pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    /// Overall readiness status
    pub ready: bool,
    /// Database connectivity
    pub database: bool,
    /// Redis connectivity
    pub redis: bool,
    /// Event bus connectivity
    pub event_bus: bool,
}

/// Readiness check.
///
/// Probes the store, cache and bus concurrently. Returns 503 if any of them
/// is unreachable.
///
/// ```bash
/// curl http://localhost:8081/ready
/// # {"ready":true,"database":true,"redis":true,"event_bus":true}
/// ```
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let probes = &state.readiness;
    let (database, redis, event_bus) = tokio::join!(
        Readiness::check(probes.database.as_ref()),
        Readiness::check(probes.redis.as_ref()),
        Readiness::check(probes.event_bus.as_ref()),
    );
    let ready = database && redis && event_bus;

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ReadinessResponse {
            ready,
            database,
            redis,
            event_bus,
        }),
    )
}
