//! Cache invalidator over the in-memory cache.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use helpdesk::consumers::CacheInvalidator;
use helpdesk::runtime::{EventHandler, Outcome};
use helpdesk_core::event::{TicketCreated, TicketEvent, TicketUpdated};
use helpdesk_core::model::{TicketId, TicketStatus, UserId};
use helpdesk_testing::InMemoryCache;
use std::sync::Arc;
use std::time::Duration;

const TTL: Duration = Duration::from_secs(60);

fn warm(cache: &InMemoryCache, ticket_id: TicketId, owner: UserId, other: UserId) {
    for key in [
        format!("ticket:{ticket_id}"),
        format!("user_tickets:{owner}"),
        format!("user_tickets:{other}"),
        "tickets:all".to_string(),
    ] {
        cache.insert_raw(&key, b"[]".to_vec(), TTL);
    }
}

fn updated(ticket_id: TicketId, owner: UserId) -> Vec<u8> {
    TicketEvent::TicketUpdated(TicketUpdated {
        ticket_id,
        user_id: owner,
        old_status: TicketStatus::open(),
        new_status: TicketStatus::new(TicketStatus::IN_PROGRESS),
        updated_at: chrono::Utc::now(),
    })
    .encode()
    .unwrap()
}

#[tokio::test]
async fn update_evicts_the_ticket_and_its_lists_only() {
    let cache = InMemoryCache::new();
    let (id, owner, other) = (TicketId::new(), UserId::new(), UserId::new());
    warm(&cache, id, owner, other);
    let invalidator = CacheInvalidator::new(Arc::new(cache.clone()));

    let outcome = invalidator.handle(&updated(id, owner)).await.unwrap();

    assert_eq!(outcome, Outcome::Handled);
    assert_eq!(cache.keys(), vec![format!("user_tickets:{other}")]);
}

#[tokio::test]
async fn created_keeps_the_single_ticket_key() {
    let cache = InMemoryCache::new();
    let (id, owner, other) = (TicketId::new(), UserId::new(), UserId::new());
    warm(&cache, id, owner, other);
    let invalidator = CacheInvalidator::new(Arc::new(cache.clone()));

    let created = TicketEvent::TicketCreated(TicketCreated {
        ticket_id: id,
        user_id: owner,
        title: "Cannot login".to_string(),
        description: "I am unable to log into my account".to_string(),
        created_at: chrono::Utc::now(),
    });
    invalidator.handle(&created.encode().unwrap()).await.unwrap();

    let mut expected = vec![format!("ticket:{id}"), format!("user_tickets:{other}")];
    expected.sort();
    assert_eq!(cache.keys(), expected);
}

#[tokio::test]
async fn delivering_twice_equals_delivering_once() {
    let (id, owner, other) = (TicketId::new(), UserId::new(), UserId::new());
    let payload = updated(id, owner);

    let once = InMemoryCache::new();
    warm(&once, id, owner, other);
    CacheInvalidator::new(Arc::new(once.clone()))
        .handle(&payload)
        .await
        .unwrap();

    let twice = InMemoryCache::new();
    warm(&twice, id, owner, other);
    let invalidator = CacheInvalidator::new(Arc::new(twice.clone()));
    invalidator.handle(&payload).await.unwrap();
    invalidator.handle(&payload).await.unwrap();

    assert_eq!(once.keys(), twice.keys());
}

#[tokio::test]
async fn legacy_untagged_payloads_are_still_understood() {
    let cache = InMemoryCache::new();
    let (id, owner, other) = (TicketId::new(), UserId::new(), UserId::new());
    warm(&cache, id, owner, other);

    let legacy = serde_json::json!({
        "ticket_id": id,
        "user_id": owner,
        "old_status": "open",
        "new_status": "closed",
        "updated_at": "2025-01-01T00:00:00Z"
    });
    CacheInvalidator::new(Arc::new(cache.clone()))
        .handle(&serde_json::to_vec(&legacy).unwrap())
        .await
        .unwrap();

    assert!(!cache.contains(&format!("ticket:{id}")));
}

#[tokio::test]
async fn undecodable_payloads_are_errors_and_evict_nothing() {
    let cache = InMemoryCache::new();
    let (id, owner, other) = (TicketId::new(), UserId::new(), UserId::new());
    warm(&cache, id, owner, other);

    let result = CacheInvalidator::new(Arc::new(cache.clone()))
        .handle(b"{\"hello\": \"world\"}")
        .await;

    assert!(result.is_err());
    assert_eq!(cache.keys().len(), 4);
}
