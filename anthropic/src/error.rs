//! Error types for the Anthropic API client

use thiserror::Error;

/// Errors that can occur when calling the Messages API
#[derive(Debug, Error)]
pub enum ClaudeError {
    /// No API key configured
    #[error("Missing ANTHROPIC_API_KEY")]
    MissingApiKey,

    /// HTTP client could not be built
    #[error("Client configuration failed: {0}")]
    ClientConfig(String),

    /// HTTP request failed or timed out
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Response parsing failed
    #[error("Response parsing failed: {0}")]
    ResponseParseFailed(String),

    /// Rate limited - too many requests
    #[error("Rate limited - too many requests")]
    RateLimited,

    /// Unauthorized - invalid API key
    #[error("Unauthorized - invalid API key")]
    Unauthorized,

    /// API returned an error
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from API
        message: String,
    },
}
