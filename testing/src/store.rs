//! In-memory ticket store.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only happens after a test already panicked

use helpdesk_core::error::StoreError;
use helpdesk_core::model::{Ticket, TicketId, UserId};
use helpdesk_core::store::TicketStore;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// `HashMap`-backed [`TicketStore`] with the same version semantics as the
/// Postgres implementation.
///
/// # Fault injection
///
/// - [`conflict_next_updates`](Self::conflict_next_updates) simulates a racing
///   writer: the next `n` updates bump the stored version first and then fail
///   with [`StoreError::Conflict`]
/// - [`set_unavailable`](Self::set_unavailable) fails every call with
///   [`StoreError::Database`]
#[derive(Clone, Debug, Default)]
pub struct InMemoryTicketStore {
    tickets: Arc<RwLock<HashMap<TicketId, Ticket>>>,
    pending_conflicts: Arc<AtomicU32>,
    unavailable: Arc<AtomicBool>,
    updates: Arc<AtomicUsize>,
}

impl InMemoryTicketStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` updates lose a race against another writer.
    pub fn conflict_next_updates(&self, n: u32) {
        self.pending_conflicts.store(n, Ordering::SeqCst);
    }

    /// Fail every operation until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Snapshot of a stored ticket.
    #[must_use]
    pub fn get(&self, id: TicketId) -> Option<Ticket> {
        self.tickets.read().unwrap().get(&id).cloned()
    }

    /// Overwrite a row directly, bypassing version checks.
    pub fn put(&self, ticket: Ticket) {
        self.tickets.write().unwrap().insert(ticket.id, ticket);
    }

    /// Number of stored tickets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tickets.read().unwrap().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tickets.read().unwrap().is_empty()
    }

    /// Number of successful updates so far.
    #[must_use]
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Database("store unavailable".to_string()));
        }
        Ok(())
    }

    fn take_conflict(&self) -> bool {
        self.pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn sorted(mut tickets: Vec<Ticket>) -> Vec<Ticket> {
        tickets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tickets
    }
}

impl TicketStore for InMemoryTicketStore {
    fn insert(
        &self,
        ticket: &Ticket,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        let ticket = ticket.clone();
        Box::pin(async move {
            self.check_available()?;
            let mut tickets = self.tickets.write().unwrap();
            if tickets.contains_key(&ticket.id) {
                return Err(StoreError::Database(format!("duplicate ticket id {}", ticket.id)));
            }
            tickets.insert(ticket.id, ticket);
            Ok(())
        })
    }

    fn find_by_id(
        &self,
        id: TicketId,
    ) -> Pin<Box<dyn Future<Output = Result<Ticket, StoreError>> + Send + '_>> {
        Box::pin(async move {
            self.check_available()?;
            self.get(id).ok_or(StoreError::NotFound(id))
        })
    }

    fn list_by_user(
        &self,
        user: UserId,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Ticket>, StoreError>> + Send + '_>> {
        Box::pin(async move {
            self.check_available()?;
            let tickets = self
                .tickets
                .read()
                .unwrap()
                .values()
                .filter(|t| t.user_id == user)
                .cloned()
                .collect();
            Ok(Self::sorted(tickets))
        })
    }

    fn list_all(&self) -> Pin<Box<dyn Future<Output = Result<Vec<Ticket>, StoreError>> + Send + '_>> {
        Box::pin(async move {
            self.check_available()?;
            let tickets = self.tickets.read().unwrap().values().cloned().collect();
            Ok(Self::sorted(tickets))
        })
    }

    fn update(
        &self,
        ticket: &Ticket,
    ) -> Pin<Box<dyn Future<Output = Result<Ticket, StoreError>> + Send + '_>> {
        let ticket = ticket.clone();
        Box::pin(async move {
            self.check_available()?;
            let mut tickets = self.tickets.write().unwrap();
            let stored = tickets.get_mut(&ticket.id).ok_or(StoreError::NotFound(ticket.id))?;

            if self.take_conflict() {
                stored.version += 1;
            }
            if stored.version != ticket.version {
                return Err(StoreError::Conflict {
                    ticket_id: ticket.id,
                    expected: ticket.version,
                });
            }

            let mut saved = ticket;
            saved.version += 1;
            *stored = saved.clone();
            self.updates.fetch_add(1, Ordering::SeqCst);
            Ok(saved)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use helpdesk_core::model::NewTicket;

    fn ticket() -> Ticket {
        Ticket::open(
            NewTicket::new("Cannot login", "I am unable to log into my account"),
            UserId::new(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn update_bumps_version() {
        let store = InMemoryTicketStore::new();
        let t = ticket();
        store.insert(&t).await.unwrap();

        let saved = store.update(&t).await.unwrap();
        assert_eq!(saved.version, 2);
        assert_eq!(store.get(t.id).unwrap().version, 2);
    }

    #[tokio::test]
    async fn stale_update_conflicts() {
        let store = InMemoryTicketStore::new();
        let t = ticket();
        store.insert(&t).await.unwrap();
        store.update(&t).await.unwrap();

        let err = store.update(&t).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::Conflict {
                ticket_id: t.id,
                expected: 1
            }
        );
    }

    #[tokio::test]
    async fn injected_conflict_moves_stored_version() {
        let store = InMemoryTicketStore::new();
        let t = ticket();
        store.insert(&t).await.unwrap();
        store.conflict_next_updates(1);

        assert!(matches!(store.update(&t).await, Err(StoreError::Conflict { .. })));
        let reloaded = store.find_by_id(t.id).await.unwrap();
        assert_eq!(reloaded.version, 2);
        assert!(store.update(&reloaded).await.is_ok());
    }

    #[tokio::test]
    async fn missing_ticket_is_not_found() {
        let store = InMemoryTicketStore::new();
        let id = TicketId::new();
        assert_eq!(store.find_by_id(id).await, Err(StoreError::NotFound(id)));
    }
}
