//! Cache invalidation driven by the event stream.
//!
//! The ticket service already evicts after its own writes. The invalidator
//! repeats the eviction for every event it sees, which also covers writes the
//! service did not make (the classifier's write-back) and evictions that
//! failed on the write path.

use crate::runtime::{EventHandler, HandlerError, Outcome};
use async_trait::async_trait;
use helpdesk_core::cache::{Cache, CacheKey};
use helpdesk_core::event::TicketEvent;
use std::sync::Arc;
use tracing::{debug, info};

/// Keys made stale by `event`.
#[must_use]
pub fn invalidation_keys(event: &TicketEvent) -> Vec<CacheKey> {
    match event {
        TicketEvent::TicketCreated(e) => CacheKey::after_create(e.user_id).to_vec(),
        TicketEvent::TicketUpdated(_)
        | TicketEvent::TicketContentUpdated(_)
        | TicketEvent::TicketClassified(_) => {
            CacheKey::after_update(event.ticket_id(), event.user_id()).to_vec()
        },
    }
}

/// Evicts projections affected by each event. Idempotent.
#[derive(Clone)]
pub struct CacheInvalidator {
    cache: Arc<dyn Cache>,
}

impl CacheInvalidator {
    /// Create an invalidator over `cache`.
    #[must_use]
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl EventHandler for CacheInvalidator {
    async fn handle(&self, data: &[u8]) -> Result<Outcome, HandlerError> {
        let event = TicketEvent::decode(data)?;
        let keys = CacheKey::render_all(&invalidation_keys(&event));
        debug!(event_type = event.event_type(), keys = ?keys, "Invalidating cache keys");

        self.cache.delete(&keys).await?;

        info!(
            ticket_id = %event.ticket_id(),
            user_id = %event.user_id(),
            event_type = event.event_type(),
            "Invalidated caches"
        );
        Ok(Outcome::Handled)
    }
}
