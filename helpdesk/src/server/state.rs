//! Application state for the ticket HTTP server.

use crate::service::TicketService;
use helpdesk_postgres::PostgresTicketStore;
use helpdesk_redis::RedisCache;
use helpdesk_redpanda::RedpandaEventBus;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A dependency the readiness endpoint can probe.
pub trait HealthProbe: Send + Sync {
    /// `true` if the dependency answered.
    fn is_healthy(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>>;
}

impl HealthProbe for PostgresTicketStore {
    fn is_healthy(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move {
            self.ping()
                .await
                .inspect_err(|e| tracing::warn!(error = %e, "Database readiness check failed"))
                .is_ok()
        })
    }
}

impl HealthProbe for RedisCache {
    fn is_healthy(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move {
            self.ping()
                .await
                .inspect_err(|e| tracing::warn!(error = %e, "Redis readiness check failed"))
                .is_ok()
        })
    }
}

impl HealthProbe for RedpandaEventBus {
    fn is_healthy(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move {
            self.ping()
                .await
                .inspect_err(|e| tracing::warn!(error = %e, "Event bus readiness check failed"))
                .is_ok()
        })
    }
}

/// Probes behind `GET /ready`. An unset probe counts as healthy.
#[derive(Clone, Default)]
pub struct Readiness {
    /// Ticket store
    pub database: Option<Arc<dyn HealthProbe>>,
    /// Ticket cache
    pub redis: Option<Arc<dyn HealthProbe>>,
    /// Event bus
    pub event_bus: Option<Arc<dyn HealthProbe>>,
}

impl Readiness {
    /// Run one probe, treating an absent probe as healthy.
    pub(crate) async fn check(probe: Option<&Arc<dyn HealthProbe>>) -> bool {
        match probe {
            Some(probe) => probe.is_healthy().await,
            None => true,
        }
    }
}

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request; every field is reference counted.
#[derive(Clone)]
pub struct AppState {
    /// Ticket operations
    pub tickets: TicketService,

    /// Dependency probes for the readiness endpoint
    pub readiness: Readiness,
}

impl AppState {
    /// Create state with no readiness probes.
    #[must_use]
    pub fn new(tickets: TicketService) -> Self {
        Self {
            tickets,
            readiness: Readiness::default(),
        }
    }

    /// Attach readiness probes.
    #[must_use]
    pub fn with_readiness(mut self, readiness: Readiness) -> Self {
        self.readiness = readiness;
        self
    }
}
