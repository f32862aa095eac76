//! Downstream consumers of `ticket-events`.
//!
//! Each consumer is an [`EventHandler`](crate::runtime::EventHandler) run in
//! its own consumer group, so every one of them sees every event and none of
//! them waits on another.
//!
//! | Consumer | Group | Acts on |
//! |---|---|---|
//! | [`CacheInvalidator`] | `cache-invalidator-group` | every event |
//! | [`Classifier`] | `ai-consumer-group` | created, content updated |
//! | [`Notifier`] | `notification-consumer-group` | updated |

pub mod classifier;
pub mod invalidator;
pub mod notifier;

pub use classifier::{AnthropicGenerator, Classification, Classifier, InferenceError, TextGenerator};
pub use invalidator::CacheInvalidator;
pub use notifier::{EmailChannel, NotificationChannel, Notifier, NotifyError, SlackChannel};
