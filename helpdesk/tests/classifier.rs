//! Classifier against a mocked Messages API.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use helpdesk::consumers::{AnthropicGenerator, Classifier, TextGenerator};
use helpdesk::runtime::{EventHandler, Outcome};
use helpdesk_anthropic::AnthropicClient;
use helpdesk_core::event::{TicketContentUpdated, TicketCreated, TicketEvent, TicketUpdated};
use helpdesk_core::model::{NewTicket, Ticket, TicketStatus, UserId};
use helpdesk_testing::{InMemoryEventBus, InMemoryTicketStore, test_clock};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOPIC: &str = "ticket-events";

fn answer(text: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "msg_01",
        "model": "claude-sonnet-4-5-20250929",
        "role": "assistant",
        "content": [{"type": "text", "text": text}],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 40, "output_tokens": 30}
    })
}

fn generator(server: &MockServer) -> Arc<dyn TextGenerator> {
    let client = AnthropicClient::with_timeout("test-key".to_string(), Duration::from_secs(2))
        .unwrap()
        .with_base_url(format!("{}/v1", server.uri()));
    Arc::new(AnthropicGenerator::new(client, "claude-sonnet-4-5-20250929", 1000))
}

struct Setup {
    store: InMemoryTicketStore,
    bus: InMemoryEventBus,
    classifier: Classifier,
    ticket: Ticket,
}

fn setup(generator: Option<Arc<dyn TextGenerator>>) -> Setup {
    let store = InMemoryTicketStore::new();
    let bus = InMemoryEventBus::new();
    let ticket = Ticket::open(
        NewTicket::new("Charged twice", "My card was charged twice for one order"),
        UserId::new(),
        chrono::Utc::now(),
    );
    store.put(ticket.clone());
    let classifier = Classifier::new(
        Arc::new(store.clone()),
        Arc::new(bus.clone()),
        generator,
        Arc::new(test_clock()),
    );
    Setup {
        store,
        bus,
        classifier,
        ticket,
    }
}

fn created(ticket: &Ticket) -> Vec<u8> {
    TicketEvent::TicketCreated(TicketCreated {
        ticket_id: ticket.id,
        user_id: ticket.user_id,
        title: ticket.title.clone(),
        description: ticket.description.clone(),
        created_at: ticket.created_at,
    })
    .encode()
    .unwrap()
}

#[tokio::test]
async fn model_answer_is_written_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(body_partial_json(serde_json::json!({"temperature": 0.1})))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer(
            "```json\n{\"category\": \"Billing\", \"priority\": \"high\", \"suggestion\": \"We will refund the duplicate charge.\"}\n```",
        )))
        .expect(1)
        .mount(&server)
        .await;
    let s = setup(Some(generator(&server)));

    let outcome = s.classifier.handle(&created(&s.ticket)).await.unwrap();

    assert_eq!(outcome, Outcome::Handled);
    let stored = s.store.get(s.ticket.id).unwrap();
    assert_eq!(stored.category, "Billing");
    assert_eq!(stored.priority, "high");
    assert_eq!(stored.suggestion.as_deref(), Some("We will refund the duplicate charge."));
    assert_eq!(stored.status, TicketStatus::classified());

    match s.bus.events(TOPIC).as_slice() {
        [TicketEvent::TicketClassified(e)] => {
            assert_eq!(e.ticket_id, s.ticket.id);
            assert_eq!(e.category, "Billing");
        },
        other => panic!("expected one ticket_classified, got {other:?}"),
    }
}

#[tokio::test]
async fn prompt_carries_title_and_description() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer(
            r#"{"category": "Bug", "priority": "medium", "suggestion": "Try again."}"#,
        )))
        .mount(&server)
        .await;
    let s = setup(Some(generator(&server)));

    s.classifier.handle(&created(&s.ticket)).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let prompt = body["messages"][0]["content"].to_string();
    assert!(prompt.contains("Charged twice"));
    assert!(prompt.contains("My card was charged twice for one order"));
}

#[tokio::test]
async fn backend_errors_degrade_to_the_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
        .mount(&server)
        .await;
    let s = setup(Some(generator(&server)));

    let outcome = s.classifier.handle(&created(&s.ticket)).await.unwrap();

    assert_eq!(outcome, Outcome::Handled);
    let stored = s.store.get(s.ticket.id).unwrap();
    assert_eq!(stored.category, "Unknown");
    assert_eq!(stored.priority, "low");
    assert_eq!(
        stored.suggestion.as_deref(),
        Some("Please provide more details for assistance.")
    );
    assert_eq!(stored.status, TicketStatus::classified());
}

#[tokio::test]
async fn prose_answers_degrade_to_the_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(answer("This looks like a billing issue.")),
        )
        .mount(&server)
        .await;
    let s = setup(Some(generator(&server)));

    s.classifier.handle(&created(&s.ticket)).await.unwrap();

    assert_eq!(s.store.get(s.ticket.id).unwrap().category, "Unknown");
}

#[tokio::test]
async fn empty_answers_degrade_to_the_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer("")))
        .mount(&server)
        .await;
    let s = setup(Some(generator(&server)));

    s.classifier.handle(&created(&s.ticket)).await.unwrap();

    let stored = s.store.get(s.ticket.id).unwrap();
    assert_eq!(stored.category, "Unknown");
    assert_eq!(stored.priority, "low");
}

#[tokio::test]
async fn no_generator_means_fallback_without_network() {
    let s = setup(None);

    s.classifier.handle(&created(&s.ticket)).await.unwrap();

    assert_eq!(s.store.get(s.ticket.id).unwrap().category, "Unknown");
}

#[tokio::test]
async fn content_edits_are_reclassified() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer(
            r#"{"category": "Feature", "priority": "low", "suggestion": "Thanks for the idea."}"#,
        )))
        .mount(&server)
        .await;
    let s = setup(Some(generator(&server)));

    let edited = TicketEvent::TicketContentUpdated(TicketContentUpdated {
        ticket_id: s.ticket.id,
        user_id: s.ticket.user_id,
        title: "Dark mode".to_string(),
        description: "Please add a dark mode to the dashboard".to_string(),
        updated_at: s.ticket.updated_at,
    })
    .encode()
    .unwrap();

    assert_eq!(s.classifier.handle(&edited).await.unwrap(), Outcome::Handled);
    assert_eq!(s.store.get(s.ticket.id).unwrap().category, "Feature");
}

#[tokio::test]
async fn agent_status_is_not_regressed() {
    let s = setup(None);
    let mut taken = s.ticket.clone();
    taken.status = TicketStatus::new(TicketStatus::IN_PROGRESS);
    taken.agent_id = Some(UserId::new());
    s.store.put(taken);

    s.classifier.handle(&created(&s.ticket)).await.unwrap();

    let stored = s.store.get(s.ticket.id).unwrap();
    assert_eq!(stored.status.as_str(), "in_progress");
    assert_eq!(stored.category, "Unknown");
}

#[tokio::test]
async fn concurrent_writes_are_reloaded_and_retried() {
    let s = setup(None);
    s.store.conflict_next_updates(1);

    s.classifier.handle(&created(&s.ticket)).await.unwrap();

    let stored = s.store.get(s.ticket.id).unwrap();
    assert_eq!(stored.status, TicketStatus::classified());
    assert_eq!(s.store.update_count(), 1);
}

#[tokio::test]
async fn status_updates_are_skipped() {
    let s = setup(None);
    let updated = TicketEvent::TicketUpdated(TicketUpdated {
        ticket_id: s.ticket.id,
        user_id: s.ticket.user_id,
        old_status: TicketStatus::open(),
        new_status: TicketStatus::new(TicketStatus::CLOSED),
        updated_at: s.ticket.updated_at,
    })
    .encode()
    .unwrap();

    assert_eq!(s.classifier.handle(&updated).await.unwrap(), Outcome::Skipped);
    assert_eq!(s.store.update_count(), 0);
}

#[tokio::test]
async fn malformed_payloads_are_errors_not_panics() {
    let s = setup(None);
    assert!(s.classifier.handle(b"not json").await.is_err());
}

#[tokio::test]
async fn missing_ticket_is_a_handler_error() {
    let s = setup(None);
    let ghost = Ticket::open(
        NewTicket::new("Ghost ticket", "This ticket was never stored"),
        UserId::new(),
        chrono::Utc::now(),
    );

    assert!(s.classifier.handle(&created(&ghost)).await.is_err());
    assert!(s.bus.events(TOPIC).is_empty());
}
