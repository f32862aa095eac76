//! HTTP surface of the ticket service.
//!
//! This module provides the Axum-based HTTP server with:
//! - Application state management
//! - Caller identity extraction
//! - Ticket endpoints and health checks
//! - Request metrics middleware

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod health;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use extractors::Caller;
pub use health::{health_check, readiness_check};
pub use routes::build_router;
pub use state::{AppState, HealthProbe, Readiness};
