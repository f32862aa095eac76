//! Router configuration for the ticket service.

use super::{AppState, handlers, health};
use crate::metrics;
use axum::{
    Router,
    extract::{MatchedPath, Request},
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use std::time::Instant;

/// Build the complete application router.
///
/// # Routes
///
/// - `GET /health` - Liveness
/// - `GET /ready` - Readiness of store, cache and bus
/// - `/api/v1/tickets` - Customer and agent ticket endpoints
/// - `GET /api/v1/agent/tickets` - Agent-only listing
///
/// Every request is counted and timed by matched route.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route(
            "/v1/tickets",
            get(handlers::list_my_tickets).post(handlers::create_ticket),
        )
        .route(
            "/v1/tickets/:id",
            get(handlers::get_ticket).put(handlers::update_ticket),
        )
        .route("/v1/agent/tickets", get(handlers::list_all_tickets));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .nest("/api", api_routes)
        .layer(middleware::from_fn(track_http_metrics))
        .with_state(state)
}

/// Record count and latency of every request, labelled by matched route so
/// ticket ids do not explode the label set.
async fn track_http_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| "unmatched".to_string(), |p| p.as_str().to_string());

    let response = next.run(request).await;

    metrics::record_http_request(
        &method,
        &endpoint,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}
