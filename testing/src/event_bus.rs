//! In-memory event bus with consumer groups.
//!
//! Every topic is a single-partition append-only log. Each consumer group keeps
//! one cursor per topic; all subscribers of a group share it, so two replicas
//! of the same group never receive the same offset while separate groups each
//! see every record.
//!
//! A delivered offset is committed when the subscriber polls again, so
//! [`InMemoryEventBus::committed`] trails [`InMemoryEventBus::position`] by the
//! delivery currently being handled.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only happens after a test already panicked

use helpdesk_core::event::TicketEvent;
use helpdesk_core::event_bus::{BusRecord, Delivery, EventBus, EventBusError, EventStream};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct BusState {
    logs: HashMap<String, Vec<BusRecord>>,
    cursors: HashMap<(String, String), usize>,
    committed: HashMap<(String, String), usize>,
    failing_publishes: u32,
    closed: bool,
}

impl BusState {
    fn next_for(&mut self, group: &str, topics: &[String]) -> Option<Delivery> {
        for topic in topics {
            let Some(log) = self.logs.get(topic) else {
                continue;
            };
            let cursor = self
                .cursors
                .entry((group.to_string(), topic.clone()))
                .or_default();
            if let Some(record) = log.get(*cursor) {
                let offset = i64::try_from(*cursor).unwrap_or(i64::MAX);
                *cursor += 1;
                return Some(Delivery {
                    topic: topic.clone(),
                    partition: 0,
                    offset,
                    key: Some(record.key.clone()),
                    payload: record.payload.clone(),
                });
            }
        }
        None
    }

    fn commit(&mut self, group: &str, topic: &str, offset: i64) {
        let next = usize::try_from(offset).map_or(0, |o| o + 1);
        let committed = self
            .committed
            .entry((group.to_string(), topic.to_string()))
            .or_default();
        *committed = (*committed).max(next);
    }
}

/// In-memory [`EventBus`] for tests.
///
/// # Example
///
/// ```
/// use helpdesk_core::event_bus::{BusRecord, EventBus};
/// use helpdesk_testing::InMemoryEventBus;
/// use futures::StreamExt;
///
/// # tokio_test::block_on(async {
/// let bus = InMemoryEventBus::new();
/// bus.publish("ticket-events", &BusRecord::new("k", b"{}".to_vec())).await.unwrap();
///
/// let mut stream = bus.subscribe(&["ticket-events"], "group-a").await.unwrap();
/// let delivery = stream.next().await.unwrap().unwrap();
/// assert_eq!(delivery.offset, 0);
/// # });
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryEventBus {
    state: Arc<Mutex<BusState>>,
    notify: Arc<Notify>,
}

impl InMemoryEventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` publishes.
    pub fn fail_next_publishes(&self, n: u32) {
        self.state.lock().unwrap().failing_publishes = n;
    }

    /// Every record appended to `topic`.
    #[must_use]
    pub fn records(&self, topic: &str) -> Vec<BusRecord> {
        self.state
            .lock()
            .unwrap()
            .logs
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Every decodable event appended to `topic`.
    #[must_use]
    pub fn events(&self, topic: &str) -> Vec<TicketEvent> {
        self.records(topic)
            .iter()
            .filter_map(|r| TicketEvent::decode(&r.payload).ok())
            .collect()
    }

    /// Next offset `group` will receive from `topic`.
    #[must_use]
    pub fn position(&self, group: &str, topic: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .cursors
            .get(&(group.to_string(), topic.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Offset after the last delivery `group` has finished handling on `topic`.
    #[must_use]
    pub fn committed(&self, group: &str, topic: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .committed
            .get(&(group.to_string(), topic.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// End every open subscription; later subscriptions end immediately.
    /// Publishing still succeeds.
    pub fn close(&self) {
        self.state.lock().unwrap().closed = true;
        self.notify.notify_waiters();
    }

    /// Move `group`'s cursor on `topic` back to `offset`, replaying everything
    /// after it. Simulates a consumer crash before commit.
    pub fn rewind(&self, group: &str, topic: &str, offset: usize) {
        self.state
            .lock()
            .unwrap()
            .cursors
            .insert((group.to_string(), topic.to_string()), offset);
        self.notify.notify_waiters();
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        topic: &str,
        record: &BusRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let record = record.clone();
        Box::pin(async move {
            {
                let mut state = self.state.lock().unwrap();
                if state.failing_publishes > 0 {
                    state.failing_publishes -= 1;
                    return Err(EventBusError::PublishFailed {
                        topic,
                        reason: "injected publish failure".to_string(),
                    });
                }
                state.logs.entry(topic.clone()).or_default().push(record);
            }
            tracing::trace!(topic = %topic, "record appended");
            self.notify.notify_waiters();
            Ok(())
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
        group: &str,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|s| (*s).to_string()).collect();
        let group = group.to_string();
        let state = Arc::clone(&self.state);
        let notify = Arc::clone(&self.notify);

        Box::pin(async move {
            let stream = async_stream::stream! {
                loop {
                    let notified = notify.notified();
                    tokio::pin!(notified);
                    notified.as_mut().enable();

                    let next = {
                        let mut state = state.lock().unwrap();
                        if state.closed {
                            break;
                        }
                        state.next_for(&group, &topics)
                    };
                    match next {
                        Some(delivery) => {
                            let (topic, offset) = (delivery.topic.clone(), delivery.offset);
                            yield Ok(delivery);
                            state.lock().unwrap().commit(&group, &topic, offset);
                        },
                        None => notified.await,
                    }
                }
            };
            Ok(Box::pin(stream) as EventStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    fn record(n: u8) -> BusRecord {
        BusRecord::new(format!("key-{n}"), vec![n])
    }

    #[tokio::test]
    async fn every_group_sees_every_record() {
        let bus = InMemoryEventBus::new();
        bus.publish("t", &record(1)).await.unwrap();
        bus.publish("t", &record(2)).await.unwrap();

        for group in ["a", "b"] {
            let mut stream = bus.subscribe(&["t"], group).await.unwrap();
            let first = stream.next().await.unwrap().unwrap();
            let second = stream.next().await.unwrap().unwrap();
            assert_eq!((first.payload, second.payload), (vec![1], vec![2]));
        }
    }

    #[tokio::test]
    async fn replicas_in_one_group_split_records() {
        let bus = InMemoryEventBus::new();
        bus.publish("t", &record(1)).await.unwrap();
        bus.publish("t", &record(2)).await.unwrap();

        let mut one = bus.subscribe(&["t"], "g").await.unwrap();
        let mut two = bus.subscribe(&["t"], "g").await.unwrap();
        let a = one.next().await.unwrap().unwrap();
        let b = two.next().await.unwrap().unwrap();
        assert_ne!(a.offset, b.offset);
        assert_eq!(bus.position("g", "t"), 2);
    }

    #[tokio::test]
    async fn waiting_subscriber_wakes_on_publish() {
        let bus = InMemoryEventBus::new();
        let mut stream = bus.subscribe(&["t"], "g").await.unwrap();

        let publisher = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.publish("t", &record(7)).await.unwrap();
        });

        let delivery = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(delivery.key.as_deref(), Some("key-7"));
    }

    #[tokio::test]
    async fn rewind_redelivers() {
        let bus = InMemoryEventBus::new();
        bus.publish("t", &record(1)).await.unwrap();
        let mut stream = bus.subscribe(&["t"], "g").await.unwrap();
        stream.next().await.unwrap().unwrap();

        bus.rewind("g", "t", 0);
        let again = stream.next().await.unwrap().unwrap();
        assert_eq!(again.offset, 0);
    }

    #[tokio::test]
    async fn close_ends_open_and_later_subscriptions() {
        let bus = InMemoryEventBus::new();
        let mut open = bus.subscribe(&["t"], "g").await.unwrap();

        let closer = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            closer.close();
        });

        let ended = tokio::time::timeout(Duration::from_secs(1), open.next())
            .await
            .unwrap();
        assert!(ended.is_none());

        let mut later = bus.subscribe(&["t"], "g").await.unwrap();
        assert!(later.next().await.is_none());
        assert!(bus.publish("t", &record(1)).await.is_ok());
    }

    #[tokio::test]
    async fn offsets_commit_when_the_subscriber_polls_again() {
        let bus = InMemoryEventBus::new();
        bus.publish("t", &record(1)).await.unwrap();
        bus.publish("t", &record(2)).await.unwrap();
        let mut stream = bus.subscribe(&["t"], "g").await.unwrap();

        stream.next().await.unwrap().unwrap();
        assert_eq!(bus.position("g", "t"), 1);
        assert_eq!(bus.committed("g", "t"), 0, "first delivery still in flight");

        stream.next().await.unwrap().unwrap();
        assert_eq!(bus.committed("g", "t"), 1);

        bus.close();
        assert!(stream.next().await.is_none());
        assert_eq!(bus.committed("g", "t"), 2);
    }

    #[tokio::test]
    async fn injected_publish_failure_drops_record() {
        let bus = InMemoryEventBus::new();
        bus.fail_next_publishes(1);
        assert!(bus.publish("t", &record(1)).await.is_err());
        assert!(bus.publish("t", &record(2)).await.is_ok());
        assert_eq!(bus.records("t").len(), 1);
    }
}
