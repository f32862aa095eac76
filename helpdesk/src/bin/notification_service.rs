//! Notification Service
//!
//! Sends an email and a webhook message whenever an agent changes a ticket's
//! status. Channels without configuration are disabled.

use helpdesk::bootstrap;
use helpdesk::consumers::Notifier;
use helpdesk::runtime::Application;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = bootstrap::load();
    tracing::info!("Starting notification service...");

    bootstrap::start_metrics(&config)?;

    let bus = bootstrap::connect_bus(&config.redpanda)?;
    let notifier = Notifier::from_config(&config.notifier, reqwest::Client::new())?;
    tracing::info!(channels = ?notifier.channel_names(), "Notification channels configured");

    let app = Application::new(config.server.shutdown_timeout());
    let consumer = bootstrap::consumer(
        &app,
        "notifier",
        &config.redpanda.notifier_group,
        &config.redpanda,
        bus,
        Arc::new(notifier),
    )?;

    tracing::info!("Notification service is running, press Ctrl+C to shutdown");
    app.with_consumer(consumer).run().await
}
