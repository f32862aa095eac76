use super::{ServiceSettings, SideEffectPolicy};
use crate::metrics;
use helpdesk_core::cache::{Cache, CacheKey};
use helpdesk_core::environment::Clock;
use helpdesk_core::error::{SideEffectKind, StoreError, TicketError};
use helpdesk_core::event::{TicketContentUpdated, TicketCreated, TicketEvent, TicketUpdated};
use helpdesk_core::event_bus::EventBus;
use helpdesk_core::model::{
    CustomerPatch, NewTicket, ReadScope, Role, Ticket, TicketId, TicketPatch, UserId,
};
use helpdesk_core::store::TicketStore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// A follow-up that failed after the store commit.
struct SideEffectFailure {
    kind: SideEffectKind,
    reason: String,
}

/// Ticket operations over an injected store, cache, bus and clock.
///
/// Writes go store first, then cache eviction, then publish. Reads are
/// read-through: a cache miss, error, timeout or undecodable value falls back
/// to the store and repopulates the key.
#[derive(Clone)]
pub struct TicketService {
    store: Arc<dyn TicketStore>,
    cache: Arc<dyn Cache>,
    bus: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    settings: ServiceSettings,
}

impl TicketService {
    /// Create a service with default [`ServiceSettings`].
    #[must_use]
    pub fn new(
        store: Arc<dyn TicketStore>,
        cache: Arc<dyn Cache>,
        bus: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            cache,
            bus,
            clock,
            settings: ServiceSettings::default(),
        }
    }

    /// Replace the settings.
    #[must_use]
    pub fn with_settings(mut self, settings: ServiceSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Current settings.
    #[must_use]
    pub const fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Open a ticket for `owner`.
    ///
    /// # Errors
    ///
    /// - [`TicketError::Validation`] if title or description is too short
    /// - [`TicketError::Store`] if the insert fails
    /// - [`TicketError::SideEffect`] under [`SideEffectPolicy::Propagate`]
    ///   when eviction or publish fails; the ticket exists regardless
    pub async fn create(&self, request: NewTicket, owner: UserId) -> Result<Ticket, TicketError> {
        request.validate()?;

        let ticket = Ticket::open(request, owner, self.clock.now());
        self.store.insert(&ticket).await?;
        info!(ticket_id = %ticket.id, user_id = %owner, "Ticket created");

        let eviction = self
            .evict(ticket.id, &CacheKey::after_create(owner))
            .await;
        let publish = self
            .publish(&TicketEvent::TicketCreated(TicketCreated {
                ticket_id: ticket.id,
                user_id: owner,
                title: ticket.title.clone(),
                description: ticket.description.clone(),
                created_at: ticket.created_at,
            }))
            .await;
        self.settle(ticket.id, [eviction, publish])?;

        Ok(ticket)
    }

    /// Load one ticket through the cache.
    ///
    /// A nil `caller` reads any ticket; otherwise the caller must own it. The
    /// cache is populated before the ownership check.
    ///
    /// # Errors
    ///
    /// - [`TicketError::NotFound`] if the ticket does not exist
    /// - [`TicketError::Unauthorized`] if the caller does not own it
    pub async fn get_by_id(&self, id: TicketId, caller: UserId) -> Result<Ticket, TicketError> {
        let ticket = self
            .read_through(
                CacheKey::Ticket(id),
                self.settings.ticket_ttl,
                self.store.find_by_id(id),
            )
            .await?;
        ticket.authorize(ReadScope::for_caller(caller))?;
        Ok(ticket)
    }

    /// Tickets owned by `user`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::Store`] if the store cannot be read.
    pub async fn list_by_user(&self, user: UserId) -> Result<Vec<Ticket>, TicketError> {
        self.read_through(
            CacheKey::UserTickets(user),
            self.settings.list_ttl,
            self.store.list_by_user(user),
        )
        .await
    }

    /// Every ticket, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::Store`] if the store cannot be read.
    pub async fn list_all(&self) -> Result<Vec<Ticket>, TicketError> {
        self.read_through(
            CacheKey::AllTickets,
            self.settings.list_ttl,
            self.store.list_all(),
        )
        .await
    }

    /// Agent update.
    ///
    /// Applies the present fields to the stored ticket, records `caller` as
    /// the agent if none is assigned yet, evicts every projection of the
    /// ticket and publishes `ticket_updated` when the status changed.
    ///
    /// # Errors
    ///
    /// - [`TicketError::Unauthorized`] unless `role` is agent, before any
    ///   store access
    /// - [`TicketError::NotFound`] if the ticket does not exist
    /// - [`TicketError::Store`] on store failure or repeated version conflicts
    /// - [`TicketError::SideEffect`] under [`SideEffectPolicy::Propagate`]
    pub async fn update(
        &self,
        id: TicketId,
        patch: &TicketPatch,
        caller: UserId,
        role: Role,
    ) -> Result<Ticket, TicketError> {
        if role != Role::Agent {
            return Err(TicketError::Unauthorized(
                "only agents can update tickets".to_string(),
            ));
        }

        let (saved, old_status) = self
            .write_with_retry(id, |ticket| {
                let old_status = ticket.status.clone();
                ticket.apply_patch(patch);
                if ticket.assign_agent(caller) {
                    debug!(ticket_id = %ticket.id, agent_id = %caller, "Agent assigned");
                }
                Ok(old_status)
            })
            .await?;
        info!(
            ticket_id = %id,
            agent_id = %caller,
            old_status = %old_status,
            new_status = %saved.status,
            "Ticket updated by agent"
        );

        let eviction = self
            .evict(id, &CacheKey::after_update(id, saved.user_id))
            .await;
        let publish = if saved.status == old_status {
            Ok(())
        } else {
            self.publish(&TicketEvent::TicketUpdated(TicketUpdated {
                ticket_id: id,
                user_id: saved.user_id,
                old_status,
                new_status: saved.status.clone(),
                updated_at: saved.updated_at,
            }))
            .await
        };
        self.settle(id, [eviction, publish])?;

        Ok(saved)
    }

    /// Customer edit of title and description.
    ///
    /// Allowed only for the owner and only until an agent has been assigned.
    /// Publishes `ticket_content_updated` when the content actually changed.
    ///
    /// # Errors
    ///
    /// - [`TicketError::NotFound`] if the ticket does not exist
    /// - [`TicketError::Unauthorized`] if `caller` does not own the ticket
    /// - [`TicketError::AgentAssigned`] once an agent took the ticket
    /// - [`TicketError::Store`] on store failure or repeated version conflicts
    /// - [`TicketError::SideEffect`] under [`SideEffectPolicy::Propagate`]
    pub async fn customer_update(
        &self,
        id: TicketId,
        patch: &CustomerPatch,
        caller: UserId,
    ) -> Result<Ticket, TicketError> {
        let (saved, changed) = self
            .write_with_retry(id, |ticket| {
                if ticket.user_id != caller {
                    return Err(TicketError::Unauthorized("not your ticket".to_string()));
                }
                if ticket.agent_id.is_some() {
                    return Err(TicketError::AgentAssigned(ticket.id));
                }
                Ok(ticket.apply_customer_patch(patch))
            })
            .await?;
        info!(ticket_id = %id, user_id = %caller, changed, "Ticket updated by customer");

        let eviction = self
            .evict(id, &CacheKey::after_update(id, caller))
            .await;
        let publish = if changed {
            self.publish(&TicketEvent::TicketContentUpdated(TicketContentUpdated {
                ticket_id: id,
                user_id: caller,
                title: saved.title.clone(),
                description: saved.description.clone(),
                updated_at: saved.updated_at,
            }))
            .await
        } else {
            Ok(())
        };
        self.settle(id, [eviction, publish])?;

        Ok(saved)
    }

    // ------------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------------

    /// Load, mutate and compare-and-set, reloading on version conflicts.
    async fn write_with_retry<R>(
        &self,
        id: TicketId,
        mut apply: impl FnMut(&mut Ticket) -> Result<R, TicketError>,
    ) -> Result<(Ticket, R), TicketError> {
        let mut attempt = 1;
        loop {
            let mut ticket = self.store.find_by_id(id).await?;
            let outcome = apply(&mut ticket)?;
            ticket.updated_at = self.clock.now();

            match self.store.update(&ticket).await {
                Ok(saved) => return Ok((saved, outcome)),
                Err(StoreError::Conflict { expected, .. })
                    if attempt < self.settings.max_write_attempts =>
                {
                    debug!(ticket_id = %id, attempt, expected, "Version conflict, reloading ticket");
                    attempt += 1;
                },
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn evict(&self, ticket_id: TicketId, keys: &[CacheKey]) -> Result<(), SideEffectFailure> {
        let rendered = CacheKey::render_all(keys);
        match self.cache.delete(&rendered).await {
            Ok(()) => {
                debug!(ticket_id = %ticket_id, keys = ?rendered, "Cache keys evicted");
                Ok(())
            },
            Err(e) => self.side_effect_failed(ticket_id, SideEffectKind::CacheEviction, e.to_string()),
        }
    }

    async fn publish(&self, event: &TicketEvent) -> Result<(), SideEffectFailure> {
        let ticket_id = event.ticket_id();
        let record = match event.to_record() {
            Ok(record) => record,
            Err(e) => return self.side_effect_failed(ticket_id, SideEffectKind::Publish, e.to_string()),
        };

        match self.bus.publish(&self.settings.topic, &record).await {
            Ok(()) => {
                metrics::record_event_published(event.event_type());
                info!(
                    ticket_id = %ticket_id,
                    event_type = event.event_type(),
                    topic = %self.settings.topic,
                    "Event published"
                );
                Ok(())
            },
            Err(e) => self.side_effect_failed(ticket_id, SideEffectKind::Publish, e.to_string()),
        }
    }

    fn side_effect_failed(
        &self,
        ticket_id: TicketId,
        kind: SideEffectKind,
        reason: String,
    ) -> Result<(), SideEffectFailure> {
        error!(
            ticket_id = %ticket_id,
            kind = %kind,
            policy = %self.settings.policy,
            error = %reason,
            "Side effect failed after committed write"
        );
        metrics::record_side_effect_failure(kind.as_str());
        Err(SideEffectFailure { kind, reason })
    }

    /// Apply the side-effect policy to the outcomes of one write.
    fn settle(
        &self,
        ticket_id: TicketId,
        outcomes: impl IntoIterator<Item = Result<(), SideEffectFailure>>,
    ) -> Result<(), TicketError> {
        if self.settings.policy == SideEffectPolicy::LogAndContinue {
            return Ok(());
        }
        match outcomes.into_iter().find_map(Result::err) {
            Some(failure) => Err(TicketError::SideEffect {
                ticket_id,
                kind: failure.kind,
                reason: failure.reason,
            }),
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------------------

    async fn read_through<T, F>(&self, key: CacheKey, ttl: Duration, load: F) -> Result<T, TicketError>
    where
        T: Serialize + DeserializeOwned,
        F: Future<Output = Result<T, StoreError>>,
    {
        let rendered = key.to_string();
        if let Some(value) = self.cached(&key, &rendered).await {
            return Ok(value);
        }

        let value = load.await?;
        self.populate(&rendered, &value, ttl).await;
        Ok(value)
    }

    async fn cached<T: DeserializeOwned>(&self, key: &CacheKey, rendered: &str) -> Option<T> {
        let timeout = self.settings.cache_timeout;
        let hit = match tokio::time::timeout(timeout, self.cache.get(rendered)).await {
            Ok(Ok(Some(bytes))) => match serde_json::from_slice(&bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key = rendered, error = %e, "Discarding undecodable cache entry");
                    None
                },
            },
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                warn!(key = rendered, error = %e, "Cache read failed, falling back to store");
                None
            },
            Err(_) => {
                warn!(key = rendered, ?timeout, "Cache read timed out, falling back to store");
                None
            },
        };

        metrics::record_cache_lookup(key.class(), hit.is_some());
        debug!(key = rendered, hit = hit.is_some(), "Cache lookup");
        hit
    }

    async fn populate<T: Serialize>(&self, rendered: &str, value: &T, ttl: Duration) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = rendered, error = %e, "Failed to encode cache value");
                return;
            },
        };

        let timeout = self.settings.cache_timeout;
        match tokio::time::timeout(timeout, self.cache.set(rendered, bytes, ttl)).await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => warn!(key = rendered, error = %e, "Failed to populate cache"),
            Err(_) => warn!(key = rendered, ?timeout, "Cache populate timed out"),
        }
    }
}
