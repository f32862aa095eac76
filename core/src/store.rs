//! Durable ticket storage.
//!
//! The store is the single source of truth. A successful return means the
//! write is committed; there is no delete operation.
//!
//! # Concurrency
//!
//! [`TicketStore::update`] is a compare-and-set on `version`: it succeeds only
//! if the stored row still carries the version the caller read, and bumps it.
//! Agent updates and the classifier's write-back both reload and re-apply on
//! [`StoreError::Conflict`], so neither silently overwrites the other.
//!
//! # Implementations
//!
//! - `PostgresTicketStore` (`helpdesk-postgres`)
//! - `InMemoryTicketStore` (`helpdesk-testing`)

use crate::error::StoreError;
use crate::model::{Ticket, TicketId, UserId};
use std::future::Future;
use std::pin::Pin;

/// Ticket persistence.
pub trait TicketStore: Send + Sync {
    /// Insert a new ticket.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on failure, including a duplicate id.
    fn insert(
        &self,
        ticket: &Ticket,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>>;

    /// Load one ticket.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no ticket has this id.
    fn find_by_id(
        &self,
        id: TicketId,
    ) -> Pin<Box<dyn Future<Output = Result<Ticket, StoreError>> + Send + '_>>;

    /// All tickets owned by `user`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on failure.
    fn list_by_user(
        &self,
        user: UserId,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Ticket>, StoreError>> + Send + '_>>;

    /// Every ticket, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on failure.
    fn list_all(&self) -> Pin<Box<dyn Future<Output = Result<Vec<Ticket>, StoreError>> + Send + '_>>;

    /// Persist `ticket` if the stored version equals `ticket.version`.
    ///
    /// Returns the stored row with its new version.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if the ticket does not exist
    /// - [`StoreError::Conflict`] if the stored version moved on
    fn update(
        &self,
        ticket: &Ticket,
    ) -> Pin<Box<dyn Future<Output = Result<Ticket, StoreError>> + Send + '_>>;
}
