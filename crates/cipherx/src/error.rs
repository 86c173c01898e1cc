//! Error taxonomy for generation, scheduling and posting.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Maximum tweet length in characters.
pub const MAX_TWEET_CHARS: usize = 280;

/// Errors surfaced by the bot, queue and posting paths.
#[derive(Debug, Error)]
pub enum BotError {
    /// Social-platform consumer credentials are absent.
    #[error("Twitter API configuration missing: {}", .0.join(", "))]
    NotConfigured(Vec<&'static str>),

    /// No access token is available for posting.
    #[error("Twitter account not connected. Please authenticate first.")]
    NotAuthenticated,

    /// Tweet text is empty.
    #[error("Tweet text is required and must be a non-empty string")]
    EmptyText,

    /// Tweet text exceeds the platform limit.
    #[error("Tweet is too long ({length} characters). Maximum is 280.")]
    TooLong { length: usize },

    /// Upstream rejected our credentials (HTTP 401).
    #[error("Twitter authentication failed. Please reconnect your account.")]
    AuthFailed,

    /// Upstream rate limit hit (HTTP 429).
    #[error("Twitter rate limit exceeded. Please try again later.")]
    RateLimited,

    /// Upstream rejected the request body (HTTP 400).
    #[error("Invalid tweet request: {0}")]
    BadRequest(String),

    /// Any other non-2xx from the publish endpoint.
    #[error("Failed to post tweet (status {status}): {message}")]
    PostFailed { status: u16, message: String },

    /// Market or sentiment data could not be fetched or mapped.
    #[error("Failed to fetch market data: {0}")]
    Fetch(String),

    /// The language model call failed.
    #[error("Failed to generate tweet: {0}")]
    Generation(String),

    /// A post happened too recently.
    #[error("Please wait {} more minutes between tweets", remaining_minutes(.remaining))]
    CooldownActive { remaining: Duration },

    /// A generate-and-post cycle is already running.
    #[error("Tweet generation already in progress")]
    GenerationInProgress,

    /// Transport-level HTTP failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn remaining_minutes(remaining: &Duration) -> u64 {
    remaining.as_secs().div_ceil(60)
}

impl BotError {
    /// HTTP status used when this error crosses the route boundary.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::EmptyText | Self::TooLong { .. } | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotAuthenticated | Self::AuthFailed => StatusCode::UNAUTHORIZED,
            Self::RateLimited | Self::CooldownActive { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::GenerationInProgress => StatusCode::CONFLICT,
            Self::Fetch(_) | Self::Generation(_) | Self::Http(_) => StatusCode::BAD_GATEWAY,
            Self::NotConfigured(_) | Self::PostFailed { .. } | Self::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether this is a local validation failure raised before any network call.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::EmptyText | Self::TooLong { .. })
    }

    /// Whether this is an expected, non-fatal scheduling refusal.
    #[must_use]
    pub fn is_scheduling(&self) -> bool {
        matches!(self, Self::CooldownActive { .. } | Self::GenerationInProgress)
    }
}

impl IntoResponse for BotError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Reject empty or oversize tweet text before any network call.
///
/// Length is counted in Unicode scalar values.
pub fn validate_tweet(text: &str) -> Result<(), BotError> {
    if text.trim().is_empty() {
        return Err(BotError::EmptyText);
    }
    let length = text.chars().count();
    if length > MAX_TWEET_CHARS {
        return Err(BotError::TooLong { length });
    }
    Ok(())
}
