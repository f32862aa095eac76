//! Event bus consumer with automatic reconnection.
//!
//! `EventConsumer` owns the subscribe-process-reconnect loop every helpdesk
//! consumer shares. A consumer implements [`EventHandler`] and the loop takes
//! care of the consumer group subscription, per-message error handling,
//! reconnection and shutdown.
//!
//! # Pattern: Subscribe-Process-Reconnect Loop
//!
//! ```text
//! loop {
//!     try_subscribe(topics, group):
//!         loop {
//!             - Check shutdown signal
//!             - Handle next delivery to completion
//!             - Log and count errors (don't crash)
//!         }
//!         if stream ended or subscribe failed:
//!             wait retry_delay (or stop on shutdown)
//! }
//! ```
//!
//! The shutdown signal is only observed between deliveries, so a handler is
//! never cancelled halfway through.
//!
//! # Example
//!
//! ```rust,ignore
//! let consumer = EventConsumer::builder()
//!     .name("cache-invalidator")
//!     .group("cache-invalidator-group")
//!     .topics(vec!["ticket-events".to_string()])
//!     .event_bus(event_bus)
//!     .handler(handler)
//!     .shutdown(shutdown_rx)
//!     .build()?;
//!
//! let handle = consumer.spawn();
//! ```

use super::EventHandler;
use crate::metrics;
use futures::StreamExt;
use helpdesk_core::event_bus::{EventBus, EventStream};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// A required builder field was not set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("event consumer is missing required field '{0}'")]
pub struct ConsumerBuildError(pub &'static str);

/// Event bus consumer for one consumer group.
///
/// # Lifecycle
///
/// 1. Created via `builder()`
/// 2. Spawned as background task via `spawn()`
/// 3. Runs until the shutdown signal is received
pub struct EventConsumer {
    /// Consumer name (for logging and metrics)
    name: String,

    /// Consumer group shared by every replica of this consumer
    group: String,

    /// Topics to subscribe to
    topics: Vec<String>,

    /// Event bus to consume from
    event_bus: Arc<dyn EventBus>,

    /// Handler for processing deliveries
    handler: Arc<dyn EventHandler>,

    /// Shutdown signal receiver
    shutdown: broadcast::Receiver<()>,

    /// Retry delay on connection failure (default: 5 seconds)
    retry_delay: Duration,
}

impl EventConsumer {
    /// Create a builder for configuring a consumer.
    #[must_use]
    pub fn builder() -> EventConsumerBuilder {
        EventConsumerBuilder::default()
    }

    /// Consumer name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spawn the consumer as a background task.
    ///
    /// The returned handle resolves once the shutdown signal has been
    /// observed.
    #[must_use]
    pub fn spawn(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&mut self) {
        info!(consumer = %self.name, group = %self.group, "Event consumer started");

        loop {
            let topics: Vec<&str> = self.topics.iter().map(String::as_str).collect();

            let subscribed = tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name, "Event consumer received shutdown signal");
                    break;
                }
                result = self.event_bus.subscribe(&topics, &self.group) => result,
            };

            match subscribed {
                Ok(mut stream) => {
                    info!(
                        consumer = %self.name,
                        group = %self.group,
                        topics = ?self.topics,
                        "Subscribed to event bus"
                    );
                    if self.process_stream(&mut stream).await.is_break() {
                        break;
                    }
                    warn!(
                        consumer = %self.name,
                        "Event stream ended, reconnecting in {:?}",
                        self.retry_delay
                    );
                },
                Err(e) => {
                    error!(
                        consumer = %self.name,
                        error = %e,
                        "Failed to subscribe to event bus, retrying in {:?}",
                        self.retry_delay
                    );
                },
            }

            if self.wait_retry().await.is_break() {
                break;
            }
        }

        info!(consumer = %self.name, "Event consumer stopped");
    }

    /// Process deliveries until the stream ends (`Continue`) or shutdown is
    /// signalled (`Break`).
    async fn process_stream(&mut self, stream: &mut EventStream) -> std::ops::ControlFlow<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name, "Event consumer received shutdown signal during processing");
                    return std::ops::ControlFlow::Break(());
                }
                next = stream.next() => {
                    match next {
                        Some(Ok(delivery)) => {
                            debug!(
                                consumer = %self.name,
                                topic = %delivery.topic,
                                partition = delivery.partition,
                                offset = delivery.offset,
                                "Delivery received"
                            );
                            self.dispatch(&delivery.payload).await;
                        }
                        Some(Err(e)) => {
                            error!(consumer = %self.name, error = %e, "Error receiving event from stream");
                        }
                        None => {
                            warn!(consumer = %self.name, "Event stream ended");
                            return std::ops::ControlFlow::Continue(());
                        }
                    }
                }
            }
        }
    }

    async fn dispatch(&self, payload: &[u8]) {
        match self.handler.handle(payload).await {
            Ok(outcome) => {
                metrics::record_event_consumed(&self.name, outcome.as_str());
            },
            Err(e) => {
                metrics::record_event_consumed(&self.name, "failed");
                error!(consumer = %self.name, error = %e, "Failed to handle event");
            },
        }
    }

    async fn wait_retry(&mut self) -> std::ops::ControlFlow<()> {
        tokio::select! {
            _ = self.shutdown.recv() => {
                info!(consumer = %self.name, "Event consumer received shutdown signal while waiting to reconnect");
                std::ops::ControlFlow::Break(())
            }
            () = tokio::time::sleep(self.retry_delay) => std::ops::ControlFlow::Continue(()),
        }
    }
}

/// Builder for configuring an `EventConsumer`.
#[derive(Default)]
pub struct EventConsumerBuilder {
    name: Option<String>,
    group: Option<String>,
    topics: Option<Vec<String>>,
    event_bus: Option<Arc<dyn EventBus>>,
    handler: Option<Arc<dyn EventHandler>>,
    shutdown: Option<broadcast::Receiver<()>>,
    retry_delay: Option<Duration>,
}

impl EventConsumerBuilder {
    /// Set consumer name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set consumer group.
    #[must_use]
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Set topics to subscribe to.
    #[must_use]
    pub fn topics(mut self, topics: Vec<String>) -> Self {
        self.topics = Some(topics);
        self
    }

    /// Set event bus instance.
    #[must_use]
    pub fn event_bus(mut self, event_bus: Arc<dyn EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Set event handler.
    #[must_use]
    pub fn handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Set shutdown signal receiver.
    #[must_use]
    pub fn shutdown(mut self, shutdown: broadcast::Receiver<()>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Set custom retry delay (default: 5 seconds).
    #[must_use]
    pub const fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Build the `EventConsumer`.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerBuildError`] naming the first required field that is
    /// missing (name, group, topics, `event_bus`, handler, shutdown).
    pub fn build(self) -> Result<EventConsumer, ConsumerBuildError> {
        Ok(EventConsumer {
            name: self.name.ok_or(ConsumerBuildError("name"))?,
            group: self.group.ok_or(ConsumerBuildError("group"))?,
            topics: self.topics.ok_or(ConsumerBuildError("topics"))?,
            event_bus: self.event_bus.ok_or(ConsumerBuildError("event_bus"))?,
            handler: self.handler.ok_or(ConsumerBuildError("handler"))?,
            shutdown: self.shutdown.ok_or(ConsumerBuildError("shutdown"))?,
            retry_delay: self.retry_delay.unwrap_or(DEFAULT_RETRY_DELAY),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code
mod tests {
    use super::*;
    use crate::runtime::{HandlerError, Outcome};
    use async_trait::async_trait;
    use helpdesk_core::event_bus::BusRecord;
    use helpdesk_testing::InMemoryEventBus;
    use helpdesk_testing::helpers::eventually;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl EventHandler for Recording {
        async fn handle(&self, data: &[u8]) -> Result<Outcome, HandlerError> {
            self.seen.lock().unwrap().push(data.to_vec());
            if data == b"bad" {
                return Err("cannot process".into());
            }
            Ok(Outcome::Handled)
        }
    }

    fn consumer(
        bus: &InMemoryEventBus,
        handler: Arc<Recording>,
        shutdown: broadcast::Receiver<()>,
    ) -> EventConsumer {
        EventConsumer::builder()
            .name("recording")
            .group("recording-group")
            .topics(vec!["ticket-events".to_string()])
            .event_bus(Arc::new(bus.clone()))
            .handler(handler)
            .shutdown(shutdown)
            .retry_delay(Duration::from_millis(10))
            .build()
            .unwrap()
    }

    #[test]
    fn build_reports_missing_fields() {
        let err = EventConsumer::builder().name("x").build().err();
        assert_eq!(err, Some(ConsumerBuildError("group")));
    }

    #[tokio::test]
    async fn handler_errors_do_not_stop_the_loop() {
        let bus = InMemoryEventBus::new();
        let handler = Arc::new(Recording::default());
        let (tx, rx) = broadcast::channel(1);
        let handle = consumer(&bus, Arc::clone(&handler), rx).spawn();

        for payload in [b"one".to_vec(), b"bad".to_vec(), b"two".to_vec()] {
            bus.publish("ticket-events", &BusRecord::new("k", payload))
                .await
                .unwrap();
        }

        let done = eventually(Duration::from_secs(2), || {
            let handler = Arc::clone(&handler);
            async move { handler.seen.lock().unwrap().len() == 3 }
        })
        .await;
        assert!(done, "all three deliveries should reach the handler");
        assert_eq!(bus.position("recording-group", "ticket-events"), 3);

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("consumer should stop on shutdown")
            .unwrap();
    }

    struct Gated {
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl EventHandler for Gated {
        async fn handle(&self, _data: &[u8]) -> Result<Outcome, HandlerError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(Outcome::Handled)
        }
    }

    #[tokio::test]
    async fn offset_is_committed_only_after_the_handler_returns() {
        let bus = InMemoryEventBus::new();
        let handler = Arc::new(Gated {
            entered: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
        });
        let (tx, rx) = broadcast::channel(1);
        let handle = EventConsumer::builder()
            .name("gated")
            .group("gated-group")
            .topics(vec!["ticket-events".to_string()])
            .event_bus(Arc::new(bus.clone()))
            .handler(Arc::clone(&handler) as Arc<dyn EventHandler>)
            .shutdown(rx)
            .build()
            .unwrap()
            .spawn();

        bus.publish("ticket-events", &BusRecord::new("k", b"one".to_vec()))
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(1), handler.entered.notified())
            .await
            .expect("handler should be entered");
        assert_eq!(bus.position("gated-group", "ticket-events"), 1);
        assert_eq!(bus.committed("gated-group", "ticket-events"), 0);

        handler.release.notify_one();
        let committed = eventually(Duration::from_secs(1), || {
            let bus = bus.clone();
            async move { bus.committed("gated-group", "ticket-events") == 1 }
        })
        .await;
        assert!(committed);

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("consumer should stop on shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn ended_stream_does_not_stop_the_consumer() {
        let bus = InMemoryEventBus::new();
        let handler = Arc::new(Recording::default());
        let (tx, rx) = broadcast::channel(1);
        let handle = consumer(&bus, Arc::clone(&handler), rx).spawn();

        tokio::time::sleep(Duration::from_millis(20)).await;
        bus.close();
        tokio::time::sleep(Duration::from_millis(30)).await;

        tx.send(()).unwrap();
        assert!(tokio::time::timeout(Duration::from_secs(1), handle).await.is_ok());
    }

    #[tokio::test]
    async fn shutdown_stops_an_idle_consumer() {
        let bus = InMemoryEventBus::new();
        let (tx, rx) = broadcast::channel(1);
        let handle = consumer(&bus, Arc::new(Recording::default()), rx).spawn();

        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(()).unwrap();

        assert!(tokio::time::timeout(Duration::from_secs(1), handle).await.is_ok());
    }
}
