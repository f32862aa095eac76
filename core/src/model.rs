//! Domain types for the helpdesk pipeline.
//!
//! Tickets are owned by the [`TicketStore`](crate::store::TicketStore) and are
//! only ever mutated through the ticket service or the classifier's
//! write-back. Nothing here performs I/O.

use crate::error::TicketError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a ticket
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(Uuid);

impl TicketId {
    /// Creates a new random `TicketId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `TicketId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Whether this is the all-zero id.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TicketId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Identity of a customer or agent.
///
/// The nil id is the sentinel the HTTP layer passes for agents on reads; see
/// [`ReadScope::for_caller`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// The all-zero identity.
    pub const NIL: Self = Self(Uuid::nil());

    /// Creates a new random `UserId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `UserId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Whether this is the all-zero id.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// ============================================================================
// Roles and read scopes
// ============================================================================

/// Caller role as asserted by the upstream auth layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Ticket owner
    Customer,
    /// Support staff
    Agent,
}

impl Role {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Agent => "agent",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = TicketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "agent" => Ok(Self::Agent),
            other => Err(TicketError::Validation(format!("unknown role: {other}"))),
        }
    }
}

/// Which tickets a reader may see.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadScope {
    /// Any ticket (agents).
    Unrestricted,
    /// Only tickets owned by this user.
    Owner(UserId),
}

impl ReadScope {
    /// Map a caller id to a scope. The nil id bypasses ownership checks.
    #[must_use]
    pub fn for_caller(caller: UserId) -> Self {
        if caller.is_nil() {
            Self::Unrestricted
        } else {
            Self::Owner(caller)
        }
    }
}

// ============================================================================
// Status
// ============================================================================

/// Ticket status.
///
/// Open-ended: any string is accepted and preserved, the associated
/// constants name the values the pipeline itself understands.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketStatus(String);

impl TicketStatus {
    /// Newly created.
    pub const OPEN: &'static str = "open";
    /// Picked up by an agent.
    pub const IN_PROGRESS: &'static str = "in_progress";
    /// Category and priority assigned.
    pub const CLASSIFIED: &'static str = "classified";
    /// Resolved.
    pub const CLOSED: &'static str = "closed";

    /// Wrap an arbitrary status value.
    #[must_use]
    pub fn new(status: impl Into<String>) -> Self {
        Self(status.into())
    }

    /// The `open` status.
    #[must_use]
    pub fn open() -> Self {
        Self::new(Self::OPEN)
    }

    /// The `classified` status.
    #[must_use]
    pub fn classified() -> Self {
        Self::new(Self::CLASSIFIED)
    }

    /// Borrow the raw value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the ticket is still untouched by agents and the classifier.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.0 == Self::OPEN
    }
}

impl Default for TicketStatus {
    fn default() -> Self {
        Self::open()
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TicketStatus {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// Ticket
// ============================================================================

/// Default priority before classification.
pub const DEFAULT_PRIORITY: &str = "low";

/// Minimum title length (characters) on create.
pub const MIN_TITLE_LEN: usize = 5;

/// Minimum description length (characters) on create.
pub const MIN_DESCRIPTION_LEN: usize = 10;

/// A support ticket.
///
/// `version` starts at 1 and is bumped by every successful store update; a
/// write carrying a stale version is rejected with
/// [`StoreError::Conflict`](crate::error::StoreError::Conflict).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Ticket id
    pub id: TicketId,
    /// Short summary
    pub title: String,
    /// Full problem statement
    pub description: String,
    /// Lifecycle status
    pub status: TicketStatus,
    /// Classifier-assigned category, empty until classified
    pub category: String,
    /// Classifier-assigned priority
    pub priority: String,
    /// Classifier-suggested reply
    pub suggestion: Option<String>,
    /// Owning customer
    pub user_id: UserId,
    /// First agent to act on the ticket; write-once
    pub agent_id: Option<UserId>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last write time
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency version
    pub version: i64,
}

impl Ticket {
    /// Build a freshly opened ticket for `owner`.
    #[must_use]
    pub fn open(request: NewTicket, owner: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: TicketId::new(),
            title: request.title,
            description: request.description,
            status: TicketStatus::open(),
            category: String::new(),
            priority: DEFAULT_PRIORITY.to_string(),
            suggestion: None,
            user_id: owner,
            agent_id: None,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// Check that a reader with `scope` may see this ticket.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::Unauthorized`] if the scope is restricted to
    /// another owner.
    pub fn authorize(&self, scope: ReadScope) -> Result<(), TicketError> {
        match scope {
            ReadScope::Unrestricted => Ok(()),
            ReadScope::Owner(user) if user == self.user_id => Ok(()),
            ReadScope::Owner(_) => Err(TicketError::Unauthorized("not your ticket".to_string())),
        }
    }

    /// Record the acting agent unless one is already assigned.
    ///
    /// Returns `true` if the assignment happened.
    pub fn assign_agent(&mut self, agent: UserId) -> bool {
        if self.agent_id.is_some() {
            return false;
        }
        self.agent_id = Some(agent);
        true
    }

    /// Apply the fields present in an agent patch.
    pub fn apply_patch(&mut self, patch: &TicketPatch) {
        if let Some(title) = &patch.title {
            self.title.clone_from(title);
        }
        if let Some(description) = &patch.description {
            self.description.clone_from(description);
        }
        if let Some(status) = &patch.status {
            self.status = status.clone();
        }
    }

    /// Apply the fields present in a customer patch.
    ///
    /// Returns `true` if title or description actually changed.
    pub fn apply_customer_patch(&mut self, patch: &CustomerPatch) -> bool {
        let mut changed = false;
        if let Some(title) = &patch.title {
            changed |= *title != self.title;
            self.title.clone_from(title);
        }
        if let Some(description) = &patch.description {
            changed |= *description != self.description;
            self.description.clone_from(description);
        }
        changed
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Create request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTicket {
    /// Title, at least five characters
    pub title: String,
    /// Description, at least ten characters
    pub description: String,
}

impl NewTicket {
    /// Create a request.
    #[must_use]
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }

    /// Enforce the minimum lengths, counted in characters as sent.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::Validation`] naming the first offending field.
    pub fn validate(&self) -> Result<(), TicketError> {
        if self.title.chars().count() < MIN_TITLE_LEN {
            return Err(TicketError::Validation(format!(
                "title must be at least {MIN_TITLE_LEN} characters"
            )));
        }
        if self.description.chars().count() < MIN_DESCRIPTION_LEN {
            return Err(TicketError::Validation(format!(
                "description must be at least {MIN_DESCRIPTION_LEN} characters"
            )));
        }
        Ok(())
    }
}

/// Agent update. Absent fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketPatch {
    /// New title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TicketStatus>,
}

impl TicketPatch {
    /// Patch that only changes the status.
    #[must_use]
    pub fn status(status: impl Into<String>) -> Self {
        Self {
            status: Some(TicketStatus::new(status)),
            ..Self::default()
        }
    }
}

/// Customer update. Only content fields are editable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerPatch {
    /// New title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(owner: UserId) -> Ticket {
        Ticket::open(
            NewTicket::new("Cannot login", "I am unable to log into my account"),
            owner,
            Utc::now(),
        )
    }

    #[test]
    fn open_ticket_defaults() {
        let ticket = sample(UserId::new());
        assert!(!ticket.id.is_nil());
        assert!(ticket.status.is_open());
        assert_eq!(ticket.category, "");
        assert_eq!(ticket.priority, "low");
        assert_eq!(ticket.suggestion, None);
        assert_eq!(ticket.agent_id, None);
        assert_eq!(ticket.version, 1);
    }

    #[test]
    fn validate_rejects_short_fields() {
        assert!(NewTicket::new("Help", "I am unable to log in").validate().is_err());
        assert!(NewTicket::new("Cannot login", "too short").validate().is_err());
        assert!(NewTicket::new("Cannot login", "exactly 10").validate().is_ok());
    }

    #[test]
    fn validate_counts_characters_as_sent() {
        assert!(NewTicket::new("abcd ", "I am unable to log in").validate().is_ok());
        assert!(NewTicket::new("ümlä", "I am unable to log in").validate().is_err());
        assert!(NewTicket::new("ümläu", "I am unable to log in").validate().is_ok());
    }

    #[test]
    fn nil_caller_reads_everything() {
        let ticket = sample(UserId::new());
        assert!(ticket.authorize(ReadScope::for_caller(UserId::NIL)).is_ok());
        assert!(ticket.authorize(ReadScope::for_caller(ticket.user_id)).is_ok());
        assert!(matches!(
            ticket.authorize(ReadScope::for_caller(UserId::new())),
            Err(TicketError::Unauthorized(_))
        ));
    }

    #[test]
    fn agent_assignment_is_write_once() {
        let mut ticket = sample(UserId::new());
        let first = UserId::new();
        assert!(ticket.assign_agent(first));
        assert!(!ticket.assign_agent(UserId::new()));
        assert_eq!(ticket.agent_id, Some(first));
    }

    #[test]
    fn patch_leaves_absent_fields_alone() {
        let mut ticket = sample(UserId::new());
        ticket.apply_patch(&TicketPatch::status(TicketStatus::IN_PROGRESS));
        assert_eq!(ticket.status.as_str(), "in_progress");
        assert_eq!(ticket.title, "Cannot login");
        assert_eq!(ticket.description, "I am unable to log into my account");
    }

    #[test]
    fn customer_patch_reports_changes() {
        let mut ticket = sample(UserId::new());
        let same = CustomerPatch {
            title: Some("Cannot login".to_string()),
            description: None,
        };
        assert!(!ticket.apply_customer_patch(&same));

        let different = CustomerPatch {
            title: None,
            description: Some("Password reset email never arrives".to_string()),
        };
        assert!(ticket.apply_customer_patch(&different));
        assert_eq!(ticket.description, "Password reset email never arrives");
    }

    #[test]
    fn role_parses_wire_values() {
        assert_eq!("agent".parse::<Role>().ok(), Some(Role::Agent));
        assert_eq!("customer".parse::<Role>().ok(), Some(Role::Customer));
        assert!("admin".parse::<Role>().is_err());
    }
}
