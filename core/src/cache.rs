//! Cache abstraction and key layout.
//!
//! The cache only ever holds read projections. Writers evict rather than
//! update, and readers repopulate on miss:
//!
//! | Key | Value | TTL |
//! |-----|-------|-----|
//! | `ticket:<id>` | one ticket | [`TICKET_TTL`] |
//! | `user_tickets:<user_id>` | the user's tickets | [`LIST_TTL`] |
//! | `tickets:all` | every ticket | [`LIST_TTL`] |

use crate::error::CacheError;
use crate::model::{TicketId, UserId};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Lifetime of a single-ticket projection.
pub const TICKET_TTL: Duration = Duration::from_secs(60 * 60);

/// Lifetime of a list projection.
pub const LIST_TTL: Duration = Duration::from_secs(5 * 60);

/// A cache key class plus its parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// `ticket:<id>`
    Ticket(TicketId),
    /// `user_tickets:<user_id>`
    UserTickets(UserId),
    /// `tickets:all`
    AllTickets,
}

impl CacheKey {
    /// Keys made stale by a new ticket of `owner`.
    #[must_use]
    pub const fn after_create(owner: UserId) -> [Self; 2] {
        [Self::UserTickets(owner), Self::AllTickets]
    }

    /// Keys made stale by any write to an existing ticket.
    #[must_use]
    pub const fn after_update(ticket_id: TicketId, owner: UserId) -> [Self; 3] {
        [
            Self::Ticket(ticket_id),
            Self::UserTickets(owner),
            Self::AllTickets,
        ]
    }

    /// Metric label for the key class.
    #[must_use]
    pub const fn class(&self) -> &'static str {
        match self {
            Self::Ticket(_) => "ticket",
            Self::UserTickets(_) => "user_tickets",
            Self::AllTickets => "tickets_all",
        }
    }

    /// Default TTL for the key class.
    #[must_use]
    pub const fn default_ttl(&self) -> Duration {
        match self {
            Self::Ticket(_) => TICKET_TTL,
            Self::UserTickets(_) | Self::AllTickets => LIST_TTL,
        }
    }

    /// Render a batch of keys.
    #[must_use]
    pub fn render_all(keys: &[Self]) -> Vec<String> {
        keys.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ticket(id) => write!(f, "ticket:{id}"),
            Self::UserTickets(user) => write!(f, "user_tickets:{user}"),
            Self::AllTickets => f.write_str("tickets:all"),
        }
    }
}

/// Key-value cache with per-entry TTL.
///
/// Values are opaque bytes; callers own the encoding. Implementations must be
/// safe to share between the HTTP path and consumer tasks.
///
/// # Dyn Compatibility
///
/// Methods return `Pin<Box<dyn Future>>` so the cache can be injected as
/// `Arc<dyn Cache>`.
pub trait Cache: Send + Sync {
    /// Fetch a value, `None` on miss or expiry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the cache cannot be queried.
    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, CacheError>> + Send + '_>>;

    /// Store a value that expires after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the write fails.
    fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>>;

    /// Remove keys. Missing keys are not an error.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the delete fails.
    fn delete(
        &self,
        keys: &[String],
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>>;
}
