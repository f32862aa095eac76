//! Error taxonomy for the ticket pipeline.
//!
//! - [`TicketError`]: what ticket service callers see
//! - [`StoreError`]: durable store failures
//! - [`CacheError`]: cache failures, never fatal on the read path
//! - [`EventError`]: event payloads that cannot be decoded
//!
//! Bus failures live next to the trait in [`event_bus`](crate::event_bus).

use crate::model::TicketId;
use std::fmt;
use thiserror::Error;

/// Errors returned by ticket service operations.
#[derive(Error, Debug)]
pub enum TicketError {
    /// Input rejected before any write.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Caller may not perform this operation on this ticket.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// No ticket with this id.
    #[error("ticket not found: {0}")]
    NotFound(TicketId),

    /// Customer edit attempted after an agent took the ticket.
    #[error("ticket {0} is already assigned to an agent")]
    AgentAssigned(TicketId),

    /// The store write committed but a follow-up side effect failed.
    ///
    /// Only produced under
    /// `SideEffectPolicy::Propagate`; the write is never rolled back.
    #[error("ticket {ticket_id} was saved but {kind} failed: {reason}")]
    SideEffect {
        /// The ticket that was written
        ticket_id: TicketId,
        /// Which side effect failed
        kind: SideEffectKind,
        /// Underlying error
        reason: String,
    },

    /// Store failure other than not-found.
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for TicketError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}

/// Side effects that follow a committed write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SideEffectKind {
    /// Evicting cache keys
    CacheEviction,
    /// Appending to the event bus
    Publish,
}

impl SideEffectKind {
    /// Metric label value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CacheEviction => "cache_eviction",
            Self::Publish => "publish",
        }
    }
}

impl fmt::Display for SideEffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from [`TicketStore`](crate::store::TicketStore) implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Row does not exist.
    #[error("ticket not found: {0}")]
    NotFound(TicketId),

    /// The stored version moved on since the ticket was read.
    #[error("concurrent update on ticket {ticket_id}: expected version {expected}")]
    Conflict {
        /// Ticket being written
        ticket_id: TicketId,
        /// Version the writer read
        expected: i64,
    },

    /// Connection or query failure.
    #[error("database error: {0}")]
    Database(String),
}

/// Errors from [`Cache`](crate::cache::Cache) implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Could not reach the cache.
    #[error("cache connection failed: {0}")]
    Connection(String),

    /// A command failed.
    #[error("cache operation on '{key}' failed: {reason}")]
    Operation {
        /// Key (or first key) involved
        key: String,
        /// Underlying error
        reason: String,
    },

    /// The operation exceeded the read-path budget.
    #[error("cache operation on '{0}' timed out")]
    Timeout(String),

    /// Value could not be (de)serialized.
    #[error("cache value serialization failed: {0}")]
    Serialization(String),
}

/// Errors decoding a `ticket-events` payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// Not JSON, or a tagged payload with missing fields.
    #[error("malformed event payload: {0}")]
    Malformed(String),

    /// Untagged payload that matches neither legacy shape.
    #[error("unrecognized event shape")]
    Unrecognized,

    /// Untagged payload whose ticket id is nil.
    #[error("event carries a nil ticket id")]
    NilTicketId,

    /// Event could not be encoded.
    #[error("event serialization failed: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_not_found_maps_to_ticket_not_found() {
        let id = TicketId::new();
        let err: TicketError = StoreError::NotFound(id).into();
        assert!(matches!(err, TicketError::NotFound(found) if found == id));

        let err: TicketError = StoreError::Database("down".to_string()).into();
        assert!(matches!(err, TicketError::Store(StoreError::Database(_))));
    }

    #[test]
    fn unauthorized_message_is_prefixed() {
        let err = TicketError::Unauthorized("not your ticket".to_string());
        assert_eq!(err.to_string(), "unauthorized: not your ticket");
    }
}
