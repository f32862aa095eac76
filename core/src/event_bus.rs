//! Event bus abstraction for the `ticket-events` log.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ 1. Store write  │◄─── Source of truth
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ 2. Publish to   │
//! │    Event Bus    │◄─── At-least-once delivery
//! └────────┬────────┘
//!          │
//!     ┌────┼─────────────┐
//!     ▼    ▼             ▼
//! invalidator  classifier  notifier   (one consumer group each)
//! ```
//!
//! # Key Principles
//!
//! - **Store first**: a record is only published after the store commit
//! - **At-least-once delivery**: a record may be delivered more than once
//! - **Independent groups**: each consumer group sees every record
//! - **Ordered within partition**: records sharing a key keep their order
//!
//! # Implementations
//!
//! - `InMemoryEventBus` (`helpdesk-testing`): consumer groups over a shared log
//! - `RedpandaEventBus` (`helpdesk-redpanda`): Kafka-compatible production bus

use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to connect to the event bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish a record to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// A delivered message had no usable payload
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// A record to append to a topic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusRecord {
    /// Partitioning key
    pub key: String,
    /// Encoded event
    pub payload: Vec<u8>,
}

impl BusRecord {
    /// Create a record.
    #[must_use]
    pub fn new(key: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            payload,
        }
    }
}

/// A record as delivered to one consumer group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    /// Source topic
    pub topic: String,
    /// Source partition
    pub partition: i32,
    /// Offset within the partition
    pub offset: i64,
    /// Partitioning key, if the producer set one
    pub key: Option<String>,
    /// Encoded event
    pub payload: Vec<u8>,
}

/// Stream of deliveries from a subscription.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Delivery, EventBusError>> + Send>>;

/// Trait for event bus implementations.
///
/// # Consumer Groups
///
/// Every subscription names a consumer group. Each group receives its own copy
/// of every record; subscribers sharing a group split the partitions between
/// them and never both process the same partition offset.
///
/// # Dyn Compatibility
///
/// Methods return `Pin<Box<dyn Future>>` instead of using `async fn` so that
/// services can hold an `Arc<dyn EventBus>`.
pub trait EventBus: Send + Sync {
    /// Append a record to a topic.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the broker does not
    /// acknowledge the record.
    fn publish(
        &self,
        topic: &str,
        record: &BusRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Join `group` and stream records from `topics`.
    ///
    /// A delivery's offset is committed only when the subscriber polls for
    /// the next one. A subscriber that stops or crashes mid-handler sees that
    /// record again; nothing is committed before it has been handled.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if the group cannot be
    /// joined.
    fn subscribe(
        &self,
        topics: &[&str],
        group: &str,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>>;
}
