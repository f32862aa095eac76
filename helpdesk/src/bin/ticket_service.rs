//! Ticket Service
//!
//! Serves the ticket HTTP API and runs the cache invalidator in the same
//! process.
//!
//! # Usage
//!
//! ```bash
//! # Start infrastructure
//! docker compose up -d
//!
//! cargo run --bin ticket-service
//! ```

use helpdesk::bootstrap;
use helpdesk::consumers::CacheInvalidator;
use helpdesk::runtime::Application;
use helpdesk::server::{AppState, Readiness, build_router};
use helpdesk::service::TicketService;
use helpdesk_core::environment::SystemClock;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = bootstrap::load();
    tracing::info!("Starting ticket service...");

    bootstrap::start_metrics(&config)?;

    let store = bootstrap::connect_store(&config.database).await?;
    let cache = bootstrap::connect_cache(&config.redis).await?;
    let bus = bootstrap::connect_bus(&config.redpanda)?;
    tracing::info!("✓ Infrastructure connected");

    let tickets = TicketService::new(
        store.clone(),
        cache.clone(),
        bus.clone(),
        Arc::new(SystemClock),
    )
    .with_settings(config.service_settings());

    let state = AppState::new(tickets).with_readiness(Readiness {
        database: Some(store),
        redis: Some(cache.clone()),
        event_bus: Some(bus.clone()),
    });

    let app = Application::new(config.server.shutdown_timeout());
    let invalidator = bootstrap::consumer(
        &app,
        "cache-invalidator",
        &config.redpanda.invalidator_group,
        &config.redpanda,
        bus,
        Arc::new(CacheInvalidator::new(cache)),
    )?;

    let addr = config.server.http_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Ticket service is running, press Ctrl+C to shutdown");

    app.with_consumer(invalidator)
        .with_http(listener, build_router(state))
        .run()
        .await
}
