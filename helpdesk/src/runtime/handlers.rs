//! Event handler trait.
//!
//! The `EventHandler` trait accepts raw payload bytes so the consumer loop
//! stays independent of the event schema. Each handler decodes the payload
//! itself and reports what it did with it.
//!
//! # Example
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//!
//! struct AuditHandler;
//!
//! #[async_trait]
//! impl EventHandler for AuditHandler {
//!     async fn handle(&self, data: &[u8]) -> Result<Outcome, HandlerError> {
//!         let event = TicketEvent::decode(data)?;
//!         tracing::info!(ticket_id = %event.ticket_id(), "audited");
//!         Ok(Outcome::Handled)
//!     }
//! }
//! ```

use async_trait::async_trait;

/// Error type handlers report to the consumer loop.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// What a handler did with a delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The event was acted upon.
    Handled,
    /// The event is not relevant to this consumer.
    Skipped,
}

impl Outcome {
    /// Metric label value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Handled => "handled",
            Self::Skipped => "skipped",
        }
    }
}

/// Handler for processing deliveries from one consumer group.
///
/// # Error Handling
///
/// Errors are logged and counted by the `EventConsumer` but never stop the
/// loop; the next delivery is processed as usual. Handlers must therefore be
/// safe to run again on a redelivered event.
///
/// # Thread Safety
///
/// Handlers are shared as `Arc<dyn EventHandler>` and moved into a tokio task.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Process one payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be decoded or processing fails.
    async fn handle(&self, data: &[u8]) -> Result<Outcome, HandlerError>;
}
