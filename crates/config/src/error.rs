//! Configuration errors.

use thiserror::Error;

/// Errors raised while loading [`crate::AppConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// One or more required environment variables are absent.
    #[error("missing required configuration: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    /// A value is present but malformed.
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
