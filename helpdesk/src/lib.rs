//! # Helpdesk
//!
//! Services of the helpdesk ticket pipeline:
//!
//! - [`service::TicketService`]: ticket writes and read-through reads, behind
//!   the HTTP surface in [`server`]
//! - [`consumers::CacheInvalidator`]: evicts cached projections on every event
//! - [`consumers::Classifier`]: AI classification with a deterministic fallback
//! - [`consumers::Notifier`]: email and webhook notifications on status changes
//!
//! Each consumer runs in its own consumer group through the shared
//! [`runtime::EventConsumer`] loop. [`bootstrap`] wires the production
//! infrastructure from [`config::Config`]; the three binaries under
//! `src/bin/` compose the pieces.

pub mod bootstrap;
pub mod config;
pub mod consumers;
pub mod metrics;
pub mod runtime;
pub mod server;
pub mod service;

pub use config::Config;
pub use service::{ServiceSettings, SideEffectPolicy, TicketService};
