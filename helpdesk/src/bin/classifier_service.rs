//! Classifier Service
//!
//! Classifies new and edited tickets with the configured model and writes the
//! result back to the store. Without `ANTHROPIC_API_KEY` every ticket gets the
//! fallback classification.

use helpdesk::bootstrap;
use helpdesk::consumers::Classifier;
use helpdesk::runtime::Application;
use helpdesk_core::environment::SystemClock;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = bootstrap::load();
    tracing::info!("Starting classifier service...");

    bootstrap::start_metrics(&config)?;

    let store = bootstrap::connect_store(&config.database).await?;
    let bus = bootstrap::connect_bus(&config.redpanda)?;
    let generator = bootstrap::text_generator(&config.classifier)?;

    let classifier = Classifier::new(store, bus.clone(), generator, Arc::new(SystemClock))
        .with_topic(config.redpanda.topic.clone())
        .with_max_write_attempts(config.pipeline.max_write_attempts);

    let app = Application::new(config.server.shutdown_timeout());
    let consumer = bootstrap::consumer(
        &app,
        "classifier",
        &config.redpanda.classifier_group,
        &config.redpanda,
        bus,
        Arc::new(classifier),
    )?;

    tracing::info!("Classifier service is running, press Ctrl+C to shutdown");
    app.with_consumer(consumer).run().await
}
