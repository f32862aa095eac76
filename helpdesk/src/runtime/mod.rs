//! Runtime components for the helpdesk services.
//!
//! - **`consumer`**: event bus consumer with automatic reconnection
//! - **`handlers`**: the trait consumers dispatch deliveries to
//! - **`lifecycle`**: application lifecycle and graceful shutdown

pub mod consumer;
pub mod handlers;
pub mod lifecycle;

pub use consumer::{ConsumerBuildError, EventConsumer};
pub use handlers::{EventHandler, HandlerError, Outcome};
pub use lifecycle::Application;
