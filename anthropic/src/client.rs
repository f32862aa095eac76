//! Anthropic API client implementation

use crate::{
    error::ClaudeError,
    messages::{MessagesRequest, MessagesResponse},
};
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Public API base URL
pub const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1";

const API_VERSION: &str = "2023-06-01";

/// Anthropic API client
#[derive(Clone)]
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    api_url: String,
}

impl AnthropicClient {
    /// Create a client whose requests are abandoned after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ClaudeError::MissingApiKey`] for an empty key and
    /// [`ClaudeError::ClientConfig`] if the HTTP client cannot be built.
    pub fn with_timeout(api_key: String, timeout: Duration) -> Result<Self, ClaudeError> {
        if api_key.trim().is_empty() {
            return Err(ClaudeError::MissingApiKey);
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClaudeError::ClientConfig(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            api_url: DEFAULT_API_URL.to_string(),
        })
    }

    /// Point the client at a different base URL (a proxy or a test server).
    #[must_use]
    pub fn with_base_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Base URL requests are sent to
    #[must_use]
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Create messages (non-streaming)
    ///
    /// # Errors
    ///
    /// Returns errors for network failures, API errors, or parsing failures
    pub async fn messages(&self, request: MessagesRequest) -> Result<MessagesResponse, ClaudeError> {
        let response = self
            .client
            .post(format!("{}/messages", self.api_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ClaudeError::RequestFailed(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let parsed = response
                    .json::<MessagesResponse>()
                    .await
                    .map_err(|e| ClaudeError::ResponseParseFailed(e.to_string()))?;
                tracing::debug!(
                    message_id = %parsed.id,
                    input_tokens = parsed.usage.input_tokens,
                    output_tokens = parsed.usage.output_tokens,
                    "Messages API call completed"
                );
                Ok(parsed)
            },
            StatusCode::TOO_MANY_REQUESTS => Err(ClaudeError::RateLimited),
            StatusCode::UNAUTHORIZED => Err(ClaudeError::Unauthorized),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ClaudeError::ApiError {
                    status: status.as_u16(),
                    message: body,
                })
            },
        }
    }
}
