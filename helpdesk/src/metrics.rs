//! Prometheus metrics for the helpdesk services.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `helpdesk_cache_hits_total{key_class}` / `helpdesk_cache_misses_total{key_class}`
//! - `helpdesk_events_published_total{type}`
//! - `helpdesk_side_effect_failures_total{kind}`
//! - `helpdesk_events_consumed_total{consumer,outcome}`
//! - `helpdesk_classifications_total{outcome}`
//! - `helpdesk_notifications_total{channel,outcome}`
//! - `helpdesk_http_requests_total{method,endpoint,status}`
//! - `helpdesk_store_writes_total{op}` / `helpdesk_store_conflicts_total`
//!   (recorded by `helpdesk-postgres`)
//!
//! ## Histograms
//! - `helpdesk_http_request_duration_seconds{method,endpoint}`

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use thiserror::Error;

/// Metrics exporter errors.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Exporter configuration was rejected.
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Recorder or listener could not be installed.
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus exporter serving `/metrics` on its own listener.
pub struct MetricsServer {
    addr: SocketAddr,
}

impl MetricsServer {
    /// Create a server for `addr`. Nothing is bound until [`start`](Self::start).
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Register metric descriptions, install the global recorder and start
    /// the HTTP listener on the current tokio runtime.
    ///
    /// A recorder that is already installed is tolerated.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError`] if the exporter cannot be configured or bound.
    pub fn start(&self) -> Result<(), MetricsError> {
        let builder = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install() {
            Ok(()) => {
                register_metrics();
                tracing::info!(
                    addr = %self.addr,
                    "Metrics server started - available at http://{}/metrics",
                    self.addr
                );
                Ok(())
            },
            Err(BuildError::FailedToSetGlobalRecorder(_)) => {
                tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                Ok(())
            },
            Err(e) => Err(MetricsError::Install(e.to_string())),
        }
    }
}

/// Register descriptions for every helpdesk metric.
pub fn register_metrics() {
    // Cache
    describe_counter!(
        "helpdesk_cache_hits_total",
        "Read-path cache hits by key class (ticket, user_tickets, tickets_all)"
    );
    describe_counter!(
        "helpdesk_cache_misses_total",
        "Read-path cache misses by key class, including timeouts and undecodable values"
    );

    // Write path
    describe_counter!(
        "helpdesk_events_published_total",
        "Ticket events appended to the bus by type"
    );
    describe_counter!(
        "helpdesk_side_effect_failures_total",
        "Cache evictions or publishes that failed after a committed write"
    );
    describe_counter!(
        "helpdesk_store_writes_total",
        "Ticket store writes by operation"
    );
    describe_counter!(
        "helpdesk_store_conflicts_total",
        "Ticket updates rejected because the stored version moved on"
    );

    // Consumers
    describe_counter!(
        "helpdesk_events_consumed_total",
        "Events processed per consumer by outcome (handled, skipped, failed)"
    );
    describe_counter!(
        "helpdesk_classifications_total",
        "Classifier results by outcome (model, fallback)"
    );
    describe_counter!(
        "helpdesk_notifications_total",
        "Notification attempts per channel by outcome"
    );

    // HTTP
    describe_counter!(
        "helpdesk_http_requests_total",
        "HTTP requests by method, matched route and status"
    );
    describe_histogram!(
        "helpdesk_http_request_duration_seconds",
        "HTTP request latency by method and matched route"
    );

    tracing::debug!("Helpdesk metrics registered");
}

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Record a read-path cache lookup.
pub fn record_cache_lookup(key_class: &'static str, hit: bool) {
    if hit {
        metrics::counter!("helpdesk_cache_hits_total", "key_class" => key_class).increment(1);
    } else {
        metrics::counter!("helpdesk_cache_misses_total", "key_class" => key_class).increment(1);
    }
}

/// Record an event appended to the bus.
pub fn record_event_published(event_type: &'static str) {
    metrics::counter!("helpdesk_events_published_total", "type" => event_type).increment(1);
    tracing::trace!(event_type, "Recorded event_published metric");
}

/// Record a failed eviction or publish after a committed write.
pub fn record_side_effect_failure(kind: &'static str) {
    metrics::counter!("helpdesk_side_effect_failures_total", "kind" => kind).increment(1);
}

/// Record one consumed event.
pub fn record_event_consumed(consumer: &str, outcome: &'static str) {
    metrics::counter!(
        "helpdesk_events_consumed_total",
        "consumer" => consumer.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a classification and whether the model result was used.
pub fn record_classification(outcome: &'static str) {
    metrics::counter!("helpdesk_classifications_total", "outcome" => outcome).increment(1);
    tracing::debug!(outcome, "Recorded classification metric");
}

/// Record a notification attempt on one channel.
pub fn record_notification(channel: &'static str, outcome: &'static str) {
    metrics::counter!(
        "helpdesk_notifications_total",
        "channel" => channel,
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a completed HTTP request.
pub fn record_http_request(method: &str, endpoint: &str, status: u16, duration_secs: f64) {
    metrics::counter!(
        "helpdesk_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => endpoint.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(
        "helpdesk_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => endpoint.to_string()
    )
    .record(duration_secs);
}
