//! # Helpdesk Core
//!
//! Domain types and infrastructure traits for the helpdesk ticket pipeline.
//!
//! A ticket mutation flows through four collaborators that never talk to each
//! other directly:
//!
//! ```text
//! ┌──────────────────┐
//! │  TicketService   │
//! └────────┬─────────┘
//!          │ 1. write
//!          ▼
//! ┌──────────────────┐   2. evict   ┌──────────────┐
//! │   TicketStore    │─────────────►│    Cache     │
//! │ (source of truth)│              └──────────────┘
//! └────────┬─────────┘                     ▲
//!          │ 3. publish                    │ evict
//!          ▼                               │
//! ┌──────────────────┐          ┌──────────┴───────┐
//! │    EventBus      │─────────►│ Cache Invalidator│
//! │ (ticket-events)  │──┐       └──────────────────┘
//! └──────────────────┘  ├──────► Classifier
//!                       └──────► Notifier
//! ```
//!
//! This crate holds only the vocabulary shared by every service:
//!
//! - [`model`]: tickets, identities, patches and read scopes
//! - [`event`]: the `ticket-events` payloads and their JSON codec
//! - [`error`]: the error taxonomy
//! - [`store`], [`cache`], [`event_bus`]: dyn-compatible infrastructure traits
//! - [`environment`]: injected clock

pub use chrono::{DateTime, Utc};

pub mod cache;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod model;
pub mod store;

/// Environment module - dependency injection traits.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use helpdesk_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let before = clock.now();
    /// assert!(clock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

pub use error::{CacheError, EventError, SideEffectKind, StoreError, TicketError};
pub use event::TicketEvent;
pub use model::{
    CustomerPatch, NewTicket, ReadScope, Role, Ticket, TicketId, TicketPatch, TicketStatus, UserId,
};
