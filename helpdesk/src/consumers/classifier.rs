//! Ticket classification.
//!
//! On `ticket_created` and `ticket_content_updated` the classifier asks a text
//! generator for a category, a priority and a suggested reply, then writes them
//! back to the store. Anything that goes wrong with the model (no key, request
//! failure, unparseable answer) degrades to [`Classification::fallback`]; only
//! store failures are reported as handler errors.
//!
//! The write-back re-reads the ticket from the store and is a versioned
//! update, so it never overwrites an agent's concurrent change. Status moves to
//! `classified` only while the ticket is still `open`.

use crate::metrics;
use crate::runtime::{EventHandler, HandlerError, Outcome};
use async_trait::async_trait;
use helpdesk_anthropic::{AnthropicClient, Message, MessagesRequest};
use helpdesk_core::environment::Clock;
use helpdesk_core::error::{StoreError, TicketError};
use helpdesk_core::event::{TicketClassified, TicketEvent};
use helpdesk_core::event_bus::EventBus;
use helpdesk_core::model::{Ticket, TicketId, TicketStatus};
use helpdesk_core::store::TicketStore;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Category used when the model gives no usable answer.
pub const FALLBACK_CATEGORY: &str = "Unknown";
/// Priority used when the model gives no usable answer.
pub const FALLBACK_PRIORITY: &str = "low";
/// Suggestion used when the model gives no usable answer.
pub const FALLBACK_SUGGESTION: &str = "Please provide more details for assistance.";

const TEMPERATURE: f32 = 0.1;

/// Text generation failures. Never surfaced to the consumer loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferenceError {
    /// No backend is configured.
    #[error("no text generator configured")]
    NotConfigured,
    /// The backend call failed.
    #[error("text generation failed: {0}")]
    Request(String),
    /// The answer was not the expected JSON object.
    #[error("unparseable classification: {0}")]
    Unparseable(String),
}

/// Model output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Billing, Bug, Feature or Support
    pub category: String,
    /// low, medium or high
    pub priority: String,
    /// Suggested reply for the agent
    pub suggestion: String,
}

impl Classification {
    /// The classification applied when the model cannot be used.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            category: FALLBACK_CATEGORY.to_string(),
            priority: FALLBACK_PRIORITY.to_string(),
            suggestion: FALLBACK_SUGGESTION.to_string(),
        }
    }

    fn apply_to(&self, ticket: &mut Ticket) {
        ticket.category.clone_from(&self.category);
        ticket.priority.clone_from(&self.priority);
        ticket.suggestion = Some(self.suggestion.clone());
        if ticket.status.is_open() {
            ticket.status = TicketStatus::classified();
        }
    }
}

/// Prompt sent for one ticket.
#[must_use]
pub fn build_prompt(title: &str, description: &str) -> String {
    format!(
        r#"Classify ticket: {title}. Description: {description}. JSON only: {{"category": "Billing|Bug|Feature|Support", "priority": "low|medium|high", "suggestion": "1-2 sentence reply"}}"#
    )
}

/// Body of the first markdown code fence in `text`, or the whole text when
/// there is none. A `json` label is dropped in any case, and prose around
/// the fence is ignored.
#[must_use]
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let rest = &trimmed[start + 3..];
    let rest = match rest.get(..4) {
        Some(label) if label.eq_ignore_ascii_case("json") => &rest[4..],
        _ => rest,
    };
    rest.find("```").map_or(rest, |end| &rest[..end]).trim()
}

/// Parse a model answer into a [`Classification`].
///
/// # Errors
///
/// Returns [`InferenceError::Unparseable`] unless the fenced or bare text is a
/// JSON object with string `category`, `priority` and `suggestion`.
pub fn parse_classification(text: &str) -> Result<Classification, InferenceError> {
    serde_json::from_str(strip_code_fence(text))
        .map_err(|e| InferenceError::Unparseable(e.to_string()))
}

/// Opaque text-generation backend.
pub trait TextGenerator: Send + Sync {
    /// Complete `prompt`.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::Request`] if the backend call fails.
    fn generate(
        &self,
        prompt: &str,
    ) -> Pin<Box<dyn Future<Output = Result<String, InferenceError>> + Send + '_>>;
}

/// [`TextGenerator`] backed by the Anthropic Messages API.
#[derive(Clone)]
pub struct AnthropicGenerator {
    client: AnthropicClient,
    model: String,
    max_tokens: u32,
}

impl AnthropicGenerator {
    /// Wrap a configured client.
    #[must_use]
    pub fn new(client: AnthropicClient, model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            client,
            model: model.into(),
            max_tokens,
        }
    }
}

impl TextGenerator for AnthropicGenerator {
    fn generate(
        &self,
        prompt: &str,
    ) -> Pin<Box<dyn Future<Output = Result<String, InferenceError>> + Send + '_>> {
        let request = MessagesRequest::new(vec![Message::user(prompt)])
            .with_model(self.model.clone())
            .with_max_tokens(self.max_tokens)
            .with_temperature(TEMPERATURE);
        Box::pin(async move {
            let response = self
                .client
                .messages(request)
                .await
                .map_err(|e| InferenceError::Request(e.to_string()))?;
            Ok(response.text())
        })
    }
}

/// Classifier consumer.
pub struct Classifier {
    store: Arc<dyn TicketStore>,
    bus: Arc<dyn EventBus>,
    generator: Option<Arc<dyn TextGenerator>>,
    clock: Arc<dyn Clock>,
    topic: String,
    max_write_attempts: u32,
}

impl Classifier {
    /// Create a classifier. Without a generator every ticket gets the
    /// fallback classification.
    #[must_use]
    pub fn new(
        store: Arc<dyn TicketStore>,
        bus: Arc<dyn EventBus>,
        generator: Option<Arc<dyn TextGenerator>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            bus,
            generator,
            clock,
            topic: "ticket-events".to_string(),
            max_write_attempts: 3,
        }
    }

    /// Topic `ticket_classified` is published to.
    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Attempts per write-back on version conflicts (at least one).
    #[must_use]
    pub fn with_max_write_attempts(mut self, attempts: u32) -> Self {
        self.max_write_attempts = attempts.max(1);
        self
    }

    /// Classify one ticket's content. Never fails.
    pub async fn classify(&self, title: &str, description: &str) -> Classification {
        match self.try_classify(title, description).await {
            Ok(classification) => {
                metrics::record_classification("model");
                classification
            },
            Err(e) => {
                warn!(error = %e, "Classification unavailable, using fallback");
                metrics::record_classification("fallback");
                Classification::fallback()
            },
        }
    }

    async fn try_classify(
        &self,
        title: &str,
        description: &str,
    ) -> Result<Classification, InferenceError> {
        let generator = self.generator.as_ref().ok_or(InferenceError::NotConfigured)?;
        let text = generator.generate(&build_prompt(title, description)).await?;
        debug!(raw = %text, "Model answer received");
        parse_classification(&text)
    }

    /// Reload the ticket, apply `classification` and store it, retrying on
    /// version conflicts.
    async fn write_back(
        &self,
        ticket_id: TicketId,
        classification: &Classification,
    ) -> Result<Ticket, TicketError> {
        let mut attempt = 1;
        loop {
            let mut ticket = self.store.find_by_id(ticket_id).await?;
            classification.apply_to(&mut ticket);
            ticket.updated_at = self.clock.now();

            match self.store.update(&ticket).await {
                Ok(saved) => return Ok(saved),
                Err(StoreError::Conflict { expected, .. }) if attempt < self.max_write_attempts => {
                    debug!(ticket_id = %ticket_id, attempt, expected, "Version conflict, reloading ticket");
                    attempt += 1;
                },
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn announce(&self, saved: &Ticket) {
        let event = TicketEvent::TicketClassified(TicketClassified {
            ticket_id: saved.id,
            user_id: saved.user_id,
            category: saved.category.clone(),
            priority: saved.priority.clone(),
            status: saved.status.clone(),
            classified_at: saved.updated_at,
        });

        let published = match event.to_record() {
            Ok(record) => self
                .bus
                .publish(&self.topic, &record)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match published {
            Ok(()) => metrics::record_event_published(event.event_type()),
            Err(e) => {
                warn!(ticket_id = %saved.id, error = %e, "Failed to publish ticket_classified");
                metrics::record_side_effect_failure("publish");
            },
        }
    }
}

#[async_trait]
impl EventHandler for Classifier {
    async fn handle(&self, data: &[u8]) -> Result<Outcome, HandlerError> {
        let event = TicketEvent::decode(data)?;
        let (ticket_id, title, description) = match &event {
            TicketEvent::TicketCreated(e) => (e.ticket_id, e.title.as_str(), e.description.as_str()),
            TicketEvent::TicketContentUpdated(e) => {
                (e.ticket_id, e.title.as_str(), e.description.as_str())
            },
            TicketEvent::TicketUpdated(_) | TicketEvent::TicketClassified(_) => {
                debug!(event_type = event.event_type(), "Skipping event");
                return Ok(Outcome::Skipped);
            },
        };

        let classification = self.classify(title, description).await;
        let saved = self.write_back(ticket_id, &classification).await?;
        info!(
            ticket_id = %ticket_id,
            category = %saved.category,
            priority = %saved.priority,
            status = %saved.status,
            "Ticket classified"
        );

        self.announce(&saved).await;
        Ok(Outcome::Handled)
    }
}
