//! # Anthropic Messages API Client
//!
//! Small client for the non-streaming Messages API, used by the helpdesk
//! classifier to turn a ticket into a category, priority and suggested reply.
//!
//! ## Example
//!
//! ```no_run
//! use helpdesk_anthropic::{AnthropicClient, Message, MessagesRequest};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = AnthropicClient::with_timeout("sk-ant-...".to_string(), Duration::from_secs(30))?;
//!
//!     let request = MessagesRequest::new(vec![Message::user("Classify ticket: ...")])
//!         .with_max_tokens(1000)
//!         .with_temperature(0.1);
//!
//!     let response = client.messages(request).await?;
//!     println!("{}", response.text());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod messages;
pub mod types;

// Re-export main types for convenience
pub use client::{AnthropicClient, DEFAULT_API_URL};
pub use error::ClaudeError;
pub use messages::{DEFAULT_MODEL, MessagesRequest, MessagesResponse};
pub use types::{ContentBlock, Message, Role, StopReason, Usage};
