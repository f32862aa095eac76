//! Ticket write and read paths.
//!
//! [`TicketService`] is the only writer of customer- and agent-initiated
//! changes. Every committed write is followed by cache eviction and, when the
//! change is interesting downstream, an event on the bus. What happens when
//! either follow-up fails is decided by [`SideEffectPolicy`].

mod ticket;

pub use ticket::TicketService;

use helpdesk_core::cache::{LIST_TTL, TICKET_TTL};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Behaviour when a cache eviction or publish fails after the store write
/// has committed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SideEffectPolicy {
    /// Log, count, and report success to the caller.
    #[default]
    #[serde(rename = "log")]
    LogAndContinue,
    /// Report [`TicketError::SideEffect`](helpdesk_core::TicketError::SideEffect).
    /// The write stays committed.
    #[serde(rename = "propagate")]
    Propagate,
}

impl SideEffectPolicy {
    /// Configuration value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LogAndContinue => "log",
            Self::Propagate => "propagate",
        }
    }
}

impl fmt::Display for SideEffectPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SideEffectPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "log" => Ok(Self::LogAndContinue),
            "propagate" => Ok(Self::Propagate),
            other => Err(format!("unknown side effect policy: {other}")),
        }
    }
}

/// Tunables for [`TicketService`].
#[derive(Clone, Debug)]
pub struct ServiceSettings {
    /// Topic events are published to
    pub topic: String,
    /// Failure handling for post-commit side effects
    pub policy: SideEffectPolicy,
    /// Budget for each read-path cache operation
    pub cache_timeout: Duration,
    /// TTL of `ticket:<id>` entries
    pub ticket_ttl: Duration,
    /// TTL of list entries
    pub list_ttl: Duration,
    /// Attempts per write on version conflicts
    pub max_write_attempts: u32,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            topic: "ticket-events".to_string(),
            policy: SideEffectPolicy::default(),
            cache_timeout: Duration::from_millis(250),
            ticket_ttl: TICKET_TTL,
            list_ttl: LIST_TTL,
            max_write_attempts: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_parses_config_values() {
        assert_eq!("log".parse(), Ok(SideEffectPolicy::LogAndContinue));
        assert_eq!("PROPAGATE".parse(), Ok(SideEffectPolicy::Propagate));
        assert!("retry".parse::<SideEffectPolicy>().is_err());
    }

    #[test]
    #[allow(clippy::unwrap_used)] // Test code
    fn policy_serializes_as_config_value() {
        assert_eq!(
            serde_json::to_string(&SideEffectPolicy::Propagate).unwrap(),
            "\"propagate\""
        );
    }
}
