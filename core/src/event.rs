//! Ticket lifecycle events carried on the `ticket-events` topic.
//!
//! # Wire format
//!
//! Events are JSON objects with a `type` discriminant:
//!
//! ```json
//! {"type":"ticket_updated","ticket_id":"…","user_id":"…",
//!  "old_status":"classified","new_status":"closed","updated_at":"2025-01-01T00:00:00Z"}
//! ```
//!
//! Payloads without a `type` field are accepted in the older untagged form.
//! They are probed as `ticket_updated` first and `ticket_created` second, and
//! are rejected if the probed ticket id is nil. Producers always emit the tagged
//! form.
//!
//! Events are immutable and carry no sequence number; ordering comes from the
//! bus partition, which is keyed by ticket id.

use crate::error::EventError;
use crate::event_bus::BusRecord;
use crate::model::{TicketId, TicketStatus, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A ticket was created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketCreated {
    /// New ticket
    pub ticket_id: TicketId,
    /// Owner
    pub user_id: UserId,
    /// Title at creation
    pub title: String,
    /// Description at creation
    pub description: String,
    /// Store commit time
    pub created_at: DateTime<Utc>,
}

/// An agent changed a ticket's status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketUpdated {
    /// Updated ticket
    pub ticket_id: TicketId,
    /// Ticket owner (not the acting agent)
    pub user_id: UserId,
    /// Status before the update
    pub old_status: TicketStatus,
    /// Status after the update
    pub new_status: TicketStatus,
    /// Store commit time
    pub updated_at: DateTime<Utc>,
}

/// A customer edited title or description.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketContentUpdated {
    /// Edited ticket
    pub ticket_id: TicketId,
    /// Owner
    pub user_id: UserId,
    /// New title
    pub title: String,
    /// New description
    pub description: String,
    /// Store commit time
    pub updated_at: DateTime<Utc>,
}

/// The classifier wrote category, priority and suggestion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketClassified {
    /// Classified ticket
    pub ticket_id: TicketId,
    /// Owner
    pub user_id: UserId,
    /// Assigned category
    pub category: String,
    /// Assigned priority
    pub priority: String,
    /// Status after the write-back
    pub status: TicketStatus,
    /// Store commit time
    pub classified_at: DateTime<Utc>,
}

/// Every payload that can appear on `ticket-events`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TicketEvent {
    /// See [`TicketCreated`]
    TicketCreated(TicketCreated),
    /// See [`TicketUpdated`]
    TicketUpdated(TicketUpdated),
    /// See [`TicketContentUpdated`]
    TicketContentUpdated(TicketContentUpdated),
    /// See [`TicketClassified`]
    TicketClassified(TicketClassified),
}

impl TicketEvent {
    /// Discriminant value, also used as a metric label.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::TicketCreated(_) => "ticket_created",
            Self::TicketUpdated(_) => "ticket_updated",
            Self::TicketContentUpdated(_) => "ticket_content_updated",
            Self::TicketClassified(_) => "ticket_classified",
        }
    }

    /// The ticket this event is about.
    #[must_use]
    pub const fn ticket_id(&self) -> TicketId {
        match self {
            Self::TicketCreated(e) => e.ticket_id,
            Self::TicketUpdated(e) => e.ticket_id,
            Self::TicketContentUpdated(e) => e.ticket_id,
            Self::TicketClassified(e) => e.ticket_id,
        }
    }

    /// The ticket's owner.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        match self {
            Self::TicketCreated(e) => e.user_id,
            Self::TicketUpdated(e) => e.user_id,
            Self::TicketContentUpdated(e) => e.user_id,
            Self::TicketClassified(e) => e.user_id,
        }
    }

    /// Serialize to the tagged JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Serialization`] if encoding fails.
    pub fn encode(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(|e| EventError::Serialization(e.to_string()))
    }

    /// Encode into a bus record keyed by ticket id.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Serialization`] if encoding fails.
    pub fn to_record(&self) -> Result<BusRecord, EventError> {
        Ok(BusRecord::new(self.ticket_id().to_string(), self.encode()?))
    }

    /// Decode a payload in either the tagged or the legacy untagged form.
    ///
    /// # Errors
    ///
    /// - [`EventError::Malformed`]: not JSON, or a tagged object that does not
    ///   match its variant
    /// - [`EventError::Unrecognized`]: untagged and neither legacy shape fits
    /// - [`EventError::NilTicketId`]: untagged with a nil ticket id
    pub fn decode(payload: &[u8]) -> Result<Self, EventError> {
        let value: serde_json::Value =
            serde_json::from_slice(payload).map_err(|e| EventError::Malformed(e.to_string()))?;

        if value.get("type").is_some() {
            return serde_json::from_value(value).map_err(|e| EventError::Malformed(e.to_string()));
        }

        Self::probe_legacy(value)
    }

    fn probe_legacy(value: serde_json::Value) -> Result<Self, EventError> {
        let event = if let Ok(updated) = serde_json::from_value::<TicketUpdated>(value.clone()) {
            Self::TicketUpdated(updated)
        } else if let Ok(created) = serde_json::from_value::<TicketCreated>(value) {
            Self::TicketCreated(created)
        } else {
            return Err(EventError::Unrecognized);
        };

        if event.ticket_id().is_nil() {
            return Err(EventError::NilTicketId);
        }
        Ok(event)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn updated() -> TicketEvent {
        TicketEvent::TicketUpdated(TicketUpdated {
            ticket_id: TicketId::new(),
            user_id: UserId::new(),
            old_status: TicketStatus::classified(),
            new_status: TicketStatus::new(TicketStatus::CLOSED),
            updated_at: Utc::now(),
        })
    }

    #[test]
    fn encodes_with_type_tag() {
        let json: serde_json::Value = serde_json::from_slice(&updated().encode().unwrap()).unwrap();
        assert_eq!(json["type"], "ticket_updated");
        assert_eq!(json["old_status"], "classified");
        assert_eq!(json["new_status"], "closed");
    }

    #[test]
    fn record_is_keyed_by_ticket_id() {
        let event = updated();
        let record = event.to_record().unwrap();
        assert_eq!(record.key, event.ticket_id().to_string());
        assert_eq!(TicketEvent::decode(&record.payload).unwrap(), event);
    }

    #[test]
    fn legacy_created_payload_is_probed() {
        let ticket_id = TicketId::new();
        let payload = serde_json::json!({
            "ticket_id": ticket_id,
            "user_id": UserId::new(),
            "title": "Cannot login",
            "description": "I am unable to log into my account",
            "created_at": "2025-03-01T10:15:00+02:00",
        });
        let event = TicketEvent::decode(payload.to_string().as_bytes()).unwrap();
        assert_eq!(event.event_type(), "ticket_created");
        assert_eq!(event.ticket_id(), ticket_id);
    }

    #[test]
    fn legacy_updated_payload_wins_the_probe() {
        let payload = serde_json::json!({
            "ticket_id": TicketId::new(),
            "user_id": UserId::new(),
            "old_status": "open",
            "new_status": "in_progress",
            "updated_at": "2025-03-01T10:15:00Z",
        });
        let event = TicketEvent::decode(payload.to_string().as_bytes()).unwrap();
        assert!(matches!(event, TicketEvent::TicketUpdated(ref u) if u.new_status.as_str() == "in_progress"));
    }

    #[test]
    fn legacy_nil_ticket_id_is_rejected() {
        let payload = serde_json::json!({
            "ticket_id": uuid::Uuid::nil(),
            "user_id": UserId::new(),
            "title": "Cannot login",
            "description": "I am unable to log into my account",
            "created_at": "2025-03-01T10:15:00Z",
        });
        assert_eq!(
            TicketEvent::decode(payload.to_string().as_bytes()),
            Err(EventError::NilTicketId)
        );
    }

    #[test]
    fn unknown_shapes_are_rejected() {
        assert_eq!(
            TicketEvent::decode(br#"{"hello":"world"}"#),
            Err(EventError::Unrecognized)
        );
        assert!(matches!(
            TicketEvent::decode(br#"{"type":"ticket_deleted","ticket_id":"x"}"#),
            Err(EventError::Malformed(_))
        ));
        assert!(matches!(
            TicketEvent::decode(b"not json"),
            Err(EventError::Malformed(_))
        ));
    }

    proptest! {
        #[test]
        fn decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = TicketEvent::decode(&bytes);
        }
    }
}
