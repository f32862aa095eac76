//! Status-change notifications.
//!
//! Only `ticket_updated` events produce a notification; every other event is
//! skipped. Each configured channel gets exactly one attempt per event. A
//! failing channel is logged and counted and does not prevent the next one
//! from being tried.

use crate::config::NotifierConfig;
use crate::metrics;
use crate::runtime::{EventHandler, HandlerError, Outcome};
use async_trait::async_trait;
use helpdesk_core::event::{TicketEvent, TicketUpdated};
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Notification delivery failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The channel could not be configured.
    #[error("invalid channel configuration: {0}")]
    Config(String),
    /// The message could not be delivered.
    #[error("delivery failed: {0}")]
    Transport(String),
    /// The receiving end answered with a non-success status.
    #[error("rejected with status {0}")]
    Rejected(u16),
}

/// Text of the status-change notification.
#[must_use]
pub fn notification_message(event: &TicketUpdated) -> String {
    format!(
        "Ticket {} updated: Status changed from {} to {}. User: {}",
        event.ticket_id, event.old_status, event.new_status, event.user_id
    )
}

/// One way of reaching people.
pub trait NotificationChannel: Send + Sync {
    /// Metric and log label.
    fn name(&self) -> &'static str;

    /// Deliver one message.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] if the message was not accepted.
    fn send(
        &self,
        subject: &str,
        body: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>>;
}

/// Email over an authenticated STARTTLS relay.
#[derive(Clone)]
pub struct EmailChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailChannel {
    /// Configure the relay. `sender` is both the From address and the SMTP
    /// username.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Config`] for an invalid address or relay host.
    pub fn new(
        smtp_server: &str,
        smtp_port: u16,
        sender: &str,
        password: &str,
        receiver: &str,
    ) -> Result<Self, NotifyError> {
        let from = sender
            .parse()
            .map_err(|e| NotifyError::Config(format!("Invalid from address: {e}")))?;
        let to = receiver
            .parse()
            .map_err(|e| NotifyError::Config(format!("Invalid to address: {e}")))?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(smtp_server)
            .map_err(|e| NotifyError::Config(format!("SMTP relay error: {e}")))?
            .port(smtp_port)
            .credentials(Credentials::new(sender.to_string(), password.to_string()))
            .build();

        Ok(Self {
            transport,
            from,
            to,
        })
    }
}

impl NotificationChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    fn send(
        &self,
        subject: &str,
        body: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string());
        Box::pin(async move {
            let email = email.map_err(|e| NotifyError::Config(format!("Failed to build email: {e}")))?;
            self.transport
                .send(email)
                .await
                .map_err(|e| NotifyError::Transport(format!("Failed to send email: {e}")))?;
            Ok(())
        })
    }
}

/// Slack-style incoming webhook taking `{"text": ...}`.
#[derive(Clone)]
pub struct SlackChannel {
    client: reqwest::Client,
    webhook_url: String,
}

impl SlackChannel {
    /// Post to `webhook_url` with a shared HTTP client.
    #[must_use]
    pub fn new(client: reqwest::Client, webhook_url: impl Into<String>) -> Self {
        Self {
            client,
            webhook_url: webhook_url.into(),
        }
    }
}

impl NotificationChannel for SlackChannel {
    fn name(&self) -> &'static str {
        "slack"
    }

    fn send(
        &self,
        _subject: &str,
        body: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
        let payload = serde_json::json!({ "text": body });
        Box::pin(async move {
            let response = self
                .client
                .post(&self.webhook_url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| NotifyError::Transport(e.to_string()))?;

            let status = response.status();
            if status.is_success() {
                Ok(())
            } else {
                Err(NotifyError::Rejected(status.as_u16()))
            }
        })
    }
}

/// Notifier consumer.
#[derive(Clone, Default)]
pub struct Notifier {
    channels: Vec<Arc<dyn NotificationChannel>>,
}

impl Notifier {
    /// Notifier over an explicit channel list, tried in order.
    #[must_use]
    pub fn new(channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        Self { channels }
    }

    /// Build the channels `config` enables: email when sender, password and
    /// receiver are all set, Slack when a webhook URL is set.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Config`] if an enabled channel is misconfigured.
    pub fn from_config(config: &NotifierConfig, client: reqwest::Client) -> Result<Self, NotifyError> {
        let mut channels: Vec<Arc<dyn NotificationChannel>> = Vec::new();

        match (&config.email_sender, &config.email_password, &config.email_receiver) {
            (Some(sender), Some(password), Some(receiver)) => {
                channels.push(Arc::new(EmailChannel::new(
                    &config.smtp_server,
                    config.smtp_port,
                    sender,
                    password,
                    receiver,
                )?));
            },
            _ => info!("Email settings incomplete, email notifications disabled"),
        }

        match &config.slack_webhook_url {
            Some(url) => channels.push(Arc::new(SlackChannel::new(client, url.clone()))),
            None => info!("No Slack webhook configured, Slack notifications disabled"),
        }

        Ok(Self::new(channels))
    }

    /// Names of the configured channels.
    #[must_use]
    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Send one notification on every channel.
    pub async fn notify(&self, event: &TicketUpdated) {
        let message = notification_message(event);
        let subject = format!("Ticket Update: {}", event.ticket_id);

        if self.channels.is_empty() {
            info!(ticket_id = %event.ticket_id, "No notification channels configured");
            return;
        }

        for channel in &self.channels {
            match channel.send(&subject, &message).await {
                Ok(()) => {
                    metrics::record_notification(channel.name(), "sent");
                    info!(ticket_id = %event.ticket_id, channel = channel.name(), "Notification sent");
                },
                Err(e) => {
                    metrics::record_notification(channel.name(), "failed");
                    warn!(
                        ticket_id = %event.ticket_id,
                        channel = channel.name(),
                        error = %e,
                        "Notification failed"
                    );
                },
            }
        }
    }
}

#[async_trait]
impl EventHandler for Notifier {
    async fn handle(&self, data: &[u8]) -> Result<Outcome, HandlerError> {
        match TicketEvent::decode(data)? {
            TicketEvent::TicketUpdated(event) => {
                self.notify(&event).await;
                Ok(Outcome::Handled)
            },
            other => {
                debug!(
                    ticket_id = %other.ticket_id(),
                    event_type = other.event_type(),
                    "Skipped event (no notification)"
                );
                Ok(Outcome::Skipped)
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use chrono::Utc;
    use helpdesk_core::model::{TicketId, TicketStatus, UserId};

    #[test]
    fn message_names_both_statuses_and_the_owner() {
        let event = TicketUpdated {
            ticket_id: TicketId::new(),
            user_id: UserId::new(),
            old_status: TicketStatus::classified(),
            new_status: TicketStatus::new(TicketStatus::CLOSED),
            updated_at: Utc::now(),
        };

        assert_eq!(
            notification_message(&event),
            format!(
                "Ticket {} updated: Status changed from classified to closed. User: {}",
                event.ticket_id, event.user_id
            )
        );
    }

    #[test]
    fn incomplete_email_settings_disable_email() {
        let config = NotifierConfig {
            smtp_server: "smtp.example.com".to_string(),
            smtp_port: 587,
            email_sender: Some("helpdesk@example.com".to_string()),
            email_password: None,
            email_receiver: Some("support@example.com".to_string()),
            slack_webhook_url: Some("https://hooks.example.com/T000".to_string()),
        };

        let notifier = Notifier::from_config(&config, reqwest::Client::new()).unwrap();
        assert_eq!(notifier.channel_names(), vec!["slack"]);
    }

    #[test]
    fn invalid_sender_is_a_config_error() {
        let result = EmailChannel::new("smtp.example.com", 587, "not an address", "pw", "a@b.c");
        assert!(matches!(result, Err(NotifyError::Config(_))));
    }
}
