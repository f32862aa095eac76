//! Redpanda event bus implementation for the helpdesk pipeline.
//!
//! This crate provides a Kafka-compatible implementation of the [`EventBus`]
//! trait from `helpdesk-core`, built on rdkafka.
//!
//! # Delivery Semantics
//!
//! **At-least-once delivery** with manual offset commits:
//! - A delivery's offset is committed when the subscriber polls for the next
//!   one, i.e. after the handler for it has returned
//! - If the process crashes mid-handler, that record is redelivered; no
//!   record is committed before it has been handled
//! - Subscribers MUST be idempotent
//! - Records are keyed by ticket id, so one ticket's events share a partition
//!
//! **Consumer groups** are chosen per subscription: the cache invalidator,
//! classifier and notifier each join their own group and each receive every
//! record, while replicas within one group split the partitions.
//!
//! # Example
//!
//! ```no_run
//! use helpdesk_redpanda::RedpandaEventBus;
//! use helpdesk_core::event_bus::{BusRecord, EventBus};
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let event_bus = RedpandaEventBus::new("localhost:9092")?;
//!
//! event_bus
//!     .publish("ticket-events", &BusRecord::new("ticket-id", b"{}".to_vec()))
//!     .await?;
//!
//! let mut stream = event_bus
//!     .subscribe(&["ticket-events"], "cache-invalidator-group")
//!     .await?;
//! while let Some(result) = stream.next().await {
//!     match result {
//!         Ok(delivery) => println!("offset {}", delivery.offset),
//!         Err(e) => eprintln!("Error: {e}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use helpdesk_core::event_bus::{BusRecord, Delivery, EventBus, EventBusError, EventStream};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Redpanda event bus implementation.
///
/// Holds one producer for the lifetime of the process; every `subscribe`
/// call creates a fresh consumer that lives as long as its stream.
///
/// # Example
///
/// ```no_run
/// use helpdesk_redpanda::RedpandaEventBus;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let event_bus = RedpandaEventBus::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .producer_acks("all")
///     .auto_offset_reset("earliest")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaEventBus {
    /// Kafka producer for publishing records
    producer: FutureProducer,
    /// Broker addresses (for creating consumers)
    brokers: String,
    /// Producer timeout
    timeout: Duration,
    /// Auto offset reset policy
    auto_offset_reset: String,
}

impl RedpandaEventBus {
    /// Create a new Redpanda event bus with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be
    /// created.
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder for configuring the event bus.
    #[must_use]
    pub fn builder() -> RedpandaEventBusBuilder {
        RedpandaEventBusBuilder::default()
    }

    /// Get a reference to the brokers string.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    /// Fetch cluster metadata through the producer, used by readiness checks.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if no broker answers within
    /// the producer timeout.
    pub async fn ping(&self) -> Result<(), EventBusError> {
        let producer = self.producer.clone();
        let timeout = self.timeout;
        tokio::task::spawn_blocking(move || {
            producer
                .client()
                .fetch_metadata(None, Timeout::After(timeout))
                .map(|_| ())
        })
        .await
        .map_err(|e| EventBusError::ConnectionFailed(format!("Metadata task failed: {e}")))?
        .map_err(|e| EventBusError::ConnectionFailed(format!("Metadata request failed: {e}")))
    }
}

/// Builder for configuring a [`RedpandaEventBus`].
#[derive(Default)]
pub struct RedpandaEventBusBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    auto_offset_reset: Option<String>,
}

impl RedpandaEventBusBuilder {
    /// Set the broker addresses (comma-separated).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the producer acknowledgment mode: "0", "1" or "all".
    ///
    /// Default: "all"
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the compression codec.
    ///
    /// Default: "none"
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the producer send timeout.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set where a consumer group without a committed offset starts reading:
    /// `"earliest"` or `"latest"`.
    ///
    /// Default: "earliest", so a newly deployed consumer group processes the
    /// backlog instead of skipping it.
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Build the [`RedpandaEventBus`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if brokers are not set or
    /// the producer cannot be created.
    pub fn build(self) -> Result<RedpandaEventBus, EventBusError> {
        let brokers = self.brokers.ok_or_else(|| {
            EventBusError::ConnectionFailed("Brokers not configured".to_string())
        })?;
        let acks = self.producer_acks.as_deref().unwrap_or("all");
        let compression = self.compression.as_deref().unwrap_or("none");
        let auto_offset_reset = self
            .auto_offset_reset
            .unwrap_or_else(|| "earliest".to_string());

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", acks)
            .set("compression.type", compression)
            .create()
            .map_err(|e| {
                EventBusError::ConnectionFailed(format!("Failed to create producer: {e}"))
            })?;

        tracing::info!(
            brokers = %brokers,
            acks,
            compression,
            auto_offset_reset = %auto_offset_reset,
            "RedpandaEventBus created"
        );

        Ok(RedpandaEventBus {
            producer,
            brokers,
            timeout: self.timeout.unwrap_or(Duration::from_secs(5)),
            auto_offset_reset,
        })
    }
}

fn to_delivery<M: Message>(message: &M) -> Result<Delivery, EventBusError> {
    let payload = message.payload().ok_or_else(|| {
        EventBusError::InvalidMessage(format!(
            "empty payload at {}/{}@{}",
            message.topic(),
            message.partition(),
            message.offset()
        ))
    })?;
    let key = message
        .key()
        .map(|k| String::from_utf8_lossy(k).into_owned());

    Ok(Delivery {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        key,
        payload: payload.to_vec(),
    })
}

fn commit_handled(consumer: &StreamConsumer, message: &BorrowedMessage<'_>, group: &str) {
    if let Err(e) = consumer.commit_message(message, CommitMode::Async) {
        tracing::warn!(
            consumer_group = %group,
            topic = message.topic(),
            partition = message.partition(),
            offset = message.offset(),
            error = %e,
            "Failed to commit offset (message may be redelivered)"
        );
    }
}

impl EventBus for RedpandaEventBus {
    fn publish(
        &self,
        topic: &str,
        record: &BusRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        // Clone data before moving into async block
        let topic = topic.to_string();
        let record = record.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            let kafka_record = FutureRecord::to(&topic)
                .payload(&record.payload)
                .key(&record.key);

            match self.producer.send(kafka_record, Timeout::After(timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %topic,
                        key = %record.key,
                        partition,
                        offset,
                        "Record published"
                    );
                    Ok(())
                },
                Err((kafka_error, _)) => {
                    tracing::error!(
                        topic = %topic,
                        key = %record.key,
                        error = %kafka_error,
                        "Failed to publish record"
                    );
                    Err(EventBusError::PublishFailed {
                        topic,
                        reason: kafka_error.to_string(),
                    })
                },
            }
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
        group: &str,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        // Clone configuration before moving into async block
        let topics: Vec<String> = topics.iter().map(|s| (*s).to_string()).collect();
        let group = group.to_string();
        let brokers = self.brokers.clone();
        let auto_offset_reset = self.auto_offset_reset.clone();

        Box::pin(async move {
            // Manual commit for at-least-once
            let consumer: StreamConsumer = ClientConfig::new()
                .set("bootstrap.servers", &brokers)
                .set("group.id", &group)
                .set("enable.auto.commit", "false")
                .set("auto.offset.reset", &auto_offset_reset)
                .set("session.timeout.ms", "6000")
                .set("enable.partition.eof", "false")
                .create()
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to create consumer: {e}"),
                })?;

            let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
            consumer
                .subscribe(&topic_refs)
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to subscribe to topics: {e}"),
                })?;

            tracing::info!(
                topics = ?topics,
                consumer_group = %group,
                auto_offset_reset = %auto_offset_reset,
                "Subscribed to topics"
            );

            // The stream owns the consumer; dropping it leaves the group.
            let stream = async_stream::stream! {
                use futures::StreamExt;

                let mut messages = consumer.stream();
                while let Some(msg_result) = messages.next().await {
                    match msg_result {
                        Ok(message) => {
                            yield to_delivery(&message);
                            // Resumed only when the subscriber asks for the next
                            // delivery, so this one has been handled.
                            commit_handled(&consumer, &message, &group);
                        },
                        Err(e) => {
                            yield Err(EventBusError::TransportError(format!(
                                "Failed to receive message: {e}"
                            )));
                        },
                    }
                }
                tracing::debug!(consumer_group = %group, "Consumer stream ended");
            };

            Ok(Box::pin(stream) as EventStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redpanda_event_bus_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedpandaEventBus>();
        assert_sync::<RedpandaEventBus>();
    }

    #[test]
    fn build_without_brokers_fails() {
        let result = RedpandaEventBus::builder().build();
        assert!(matches!(result, Err(EventBusError::ConnectionFailed(_))));
    }
}
