//! Startup configuration for the CipherX posting service.
//!
//! All settings come from the process environment and are validated once,
//! before the server binds. Every required key that is absent is reported
//! together, so an operator sees the full list in a single failed start.
//!
//! # Configuration
//!
//! - `X_API_KEY` / `X_API_SECRET`: OAuth1 consumer credentials (soft-required;
//!   the server starts without them and Twitter routes answer `api_not_configured`)
//! - `X_ACCESS_TOKEN` / `X_ACCESS_TOKEN_SECRET`: optional pre-provisioned tokens
//! - `COINGECKO_API_KEY`, `LUNARCRUSH_API_KEY`, `OPENAI_API_KEY`, `APP_URL`: required
//! - `OPENAI_MODEL`, `PORT`, `POST_INTERVAL_MINUTES`, `POSTS_PER_DAY`,
//!   `COOKIE_SECURE`: optional tuning
//! - `X_API_BASE_URL`, `COINGECKO_BASE_URL`, `LUNARCRUSH_BASE_URL`,
//!   `OPENAI_BASE_URL`: upstream overrides

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod error;
mod secret;

pub use error::ConfigError;
pub use secret::Secret;

use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

const ENV_X_API_KEY: &str = "X_API_KEY";
const ENV_X_API_SECRET: &str = "X_API_SECRET";
const ENV_X_ACCESS_TOKEN: &str = "X_ACCESS_TOKEN";
const ENV_X_ACCESS_TOKEN_SECRET: &str = "X_ACCESS_TOKEN_SECRET";
const ENV_COINGECKO_API_KEY: &str = "COINGECKO_API_KEY";
const ENV_LUNARCRUSH_API_KEY: &str = "LUNARCRUSH_API_KEY";
const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
const ENV_APP_URL: &str = "APP_URL";
const ENV_OPENAI_MODEL: &str = "OPENAI_MODEL";
const ENV_PORT: &str = "PORT";
const ENV_POST_INTERVAL_MINUTES: &str = "POST_INTERVAL_MINUTES";
const ENV_POSTS_PER_DAY: &str = "POSTS_PER_DAY";
const ENV_COOKIE_SECURE: &str = "COOKIE_SECURE";
const ENV_X_API_BASE_URL: &str = "X_API_BASE_URL";
const ENV_COINGECKO_BASE_URL: &str = "COINGECKO_BASE_URL";
const ENV_LUNARCRUSH_BASE_URL: &str = "LUNARCRUSH_BASE_URL";
const ENV_OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";

/// Default Twitter API host (OAuth1 endpoints and v2 tweets live under it).
pub const DEFAULT_X_API_BASE_URL: &str = "https://api.twitter.com";
/// Default CoinGecko API base.
pub const DEFAULT_COINGECKO_BASE_URL: &str = "https://api.coingecko.com/api/v3";
/// Default LunarCrush API base.
pub const DEFAULT_LUNARCRUSH_BASE_URL: &str = "https://lunarcrush.com/api4";
/// Default OpenAI API base.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
/// Default chat model.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4";
/// Default listen port.
pub const DEFAULT_PORT: u16 = 3000;
/// Default posting interval (4 hours).
pub const DEFAULT_POST_INTERVAL: Duration = Duration::from_secs(4 * 60 * 60);

/// Longest accepted posting interval, in minutes (one week).
pub const MAX_POST_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

/// Accepted range for `POSTS_PER_DAY`.
const POSTS_PER_DAY_RANGE: std::ops::RangeInclusive<u32> = 1..=5;

/// Social-platform settings.
#[derive(Debug, Clone)]
pub struct TwitterConfig {
    /// OAuth1 consumer key.
    pub api_key: Option<Secret>,
    /// OAuth1 consumer secret.
    pub api_secret: Option<Secret>,
    /// Pre-provisioned access token (app owner).
    pub access_token: Option<Secret>,
    /// Pre-provisioned access token secret.
    pub access_token_secret: Option<Secret>,
    /// API host for OAuth and v2 endpoints.
    pub base_url: String,
}

impl TwitterConfig {
    /// Load only the social-platform settings from the process environment.
    ///
    /// Used by tooling that talks to the platform without the rest of the
    /// service, such as the interactive token command.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load only the social-platform settings through a key lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| non_empty(lookup(key));
        Self {
            api_key: get(ENV_X_API_KEY).map(Secret::new),
            api_secret: get(ENV_X_API_SECRET).map(Secret::new),
            access_token: get(ENV_X_ACCESS_TOKEN).map(Secret::new),
            access_token_secret: get(ENV_X_ACCESS_TOKEN_SECRET).map(Secret::new),
            base_url: base_url(get(ENV_X_API_BASE_URL), DEFAULT_X_API_BASE_URL),
        }
    }

    /// Consumer key and secret, when both are configured.
    #[must_use]
    pub fn consumer(&self) -> Option<(&str, &str)> {
        match (&self.api_key, &self.api_secret) {
            (Some(key), Some(secret)) => Some((key.expose(), secret.expose())),
            _ => None,
        }
    }

    /// Pre-provisioned access token pair, when both halves are configured.
    #[must_use]
    pub fn access_pair(&self) -> Option<(&str, &str)> {
        match (&self.access_token, &self.access_token_secret) {
            (Some(token), Some(secret)) => Some((token.expose(), secret.expose())),
            _ => None,
        }
    }
}

/// An upstream HTTP provider keyed by API key.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// API key sent with each request.
    pub api_key: Secret,
    /// Base URL of the provider API.
    pub base_url: String,
}

/// LLM provider settings.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key.
    pub api_key: Secret,
    /// Base URL (chat completions live at `{base_url}/chat/completions`).
    pub base_url: String,
    /// Chat model name.
    pub model: String,
}

/// Validated application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Social platform.
    pub twitter: TwitterConfig,
    /// Trending-coins provider.
    pub coingecko: ProviderConfig,
    /// Sentiment provider.
    pub lunarcrush: ProviderConfig,
    /// Tweet writer.
    pub openai: OpenAiConfig,
    /// Public base URL of this service, without trailing slash.
    pub app_url: String,
    /// HTTP listen port.
    pub port: u16,
    /// Interval between automated posts; also the manual-post cooldown.
    pub post_interval: Duration,
    /// Whether credential cookies carry the `Secure` attribute.
    pub cookie_secure: bool,
}

impl AppConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    /// Returns [`ConfigError::Missing`] listing every absent required key, or
    /// [`ConfigError::Invalid`] for the first malformed value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Empty values are treated as absent.
    ///
    /// # Errors
    /// Same as [`AppConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| non_empty(lookup(key));

        let mut missing = Vec::new();
        let mut require = |key: &'static str| {
            let value = get(key);
            if value.is_none() {
                missing.push(key);
            }
            value
        };

        let coingecko_key = require(ENV_COINGECKO_API_KEY);
        let lunarcrush_key = require(ENV_LUNARCRUSH_API_KEY);
        let openai_key = require(ENV_OPENAI_API_KEY);
        let app_url = require(ENV_APP_URL);

        let (Some(coingecko_key), Some(lunarcrush_key), Some(openai_key), Some(app_url)) =
            (coingecko_key, lunarcrush_key, openai_key, app_url)
        else {
            return Err(ConfigError::Missing(missing));
        };

        let port = match get(ENV_PORT) {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::Invalid {
                key: ENV_PORT,
                reason: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };

        let post_interval = post_interval(
            get(ENV_POST_INTERVAL_MINUTES).as_deref(),
            get(ENV_POSTS_PER_DAY).as_deref(),
        )?;

        let cookie_secure = get(ENV_COOKIE_SECURE)
            .map_or(true, |v| !(v.eq_ignore_ascii_case("false") || v == "0"));

        let twitter = TwitterConfig::from_lookup(&lookup);

        let config = Self {
            twitter,
            coingecko: ProviderConfig {
                api_key: Secret::new(coingecko_key),
                base_url: base_url(get(ENV_COINGECKO_BASE_URL), DEFAULT_COINGECKO_BASE_URL),
            },
            lunarcrush: ProviderConfig {
                api_key: Secret::new(lunarcrush_key),
                base_url: base_url(get(ENV_LUNARCRUSH_BASE_URL), DEFAULT_LUNARCRUSH_BASE_URL),
            },
            openai: OpenAiConfig {
                api_key: Secret::new(openai_key),
                base_url: base_url(get(ENV_OPENAI_BASE_URL), DEFAULT_OPENAI_BASE_URL),
                model: get(ENV_OPENAI_MODEL).unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            },
            app_url: app_url.trim_end_matches('/').to_string(),
            port,
            post_interval,
            cookie_secure,
        };

        let twitter_missing = config.twitter_missing();
        if twitter_missing.is_empty() {
            debug!("Twitter consumer credentials configured");
        } else {
            warn!(
                missing = ?twitter_missing,
                "Twitter consumer credentials not configured; auth and posting routes will report api_not_configured"
            );
        }

        Ok(config)
    }

    /// Social-platform consumer keys that are absent.
    #[must_use]
    pub fn twitter_missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.twitter.api_key.is_none() {
            missing.push(ENV_X_API_KEY);
        }
        if self.twitter.api_secret.is_none() {
            missing.push(ENV_X_API_SECRET);
        }
        missing
    }

    /// OAuth callback URL registered with the social platform.
    #[must_use]
    pub fn callback_url(&self) -> String {
        format!("{}/api/auth/twitter/callback", self.app_url)
    }

    /// Dashboard URL that handshake redirects land on.
    #[must_use]
    pub fn dashboard_url(&self) -> String {
        format!("{}/dashboard", self.app_url)
    }

    /// Presence/length report safe to expose over HTTP.
    #[must_use]
    pub fn diagnostics(&self) -> Diagnostics {
        let len = |s: &Option<Secret>| s.as_ref().map_or(0, Secret::len);
        Diagnostics {
            has_api_key: self.twitter.api_key.is_some(),
            has_api_secret: self.twitter.api_secret.is_some(),
            has_access_token: self.twitter.access_token.is_some(),
            has_access_token_secret: self.twitter.access_token_secret.is_some(),
            api_key_length: len(&self.twitter.api_key),
            api_secret_length: len(&self.twitter.api_secret),
            app_url: self.app_url.clone(),
            post_interval_minutes: self.post_interval.as_secs() / 60,
        }
    }
}

/// Configuration diagnostics; never contains secret values.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub has_api_key: bool,
    pub has_api_secret: bool,
    pub has_access_token: bool,
    pub has_access_token_secret: bool,
    pub api_key_length: usize,
    pub api_secret_length: usize,
    pub app_url: String,
    pub post_interval_minutes: u64,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn base_url(value: Option<String>, default: &str) -> String {
    value
        .unwrap_or_else(|| default.to_string())
        .trim_end_matches('/')
        .to_string()
}

/// Posting interval of `minutes`, between one minute and [`MAX_POST_INTERVAL_MINUTES`].
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] for zero or anything above the maximum.
pub fn interval_from_minutes(minutes: u64) -> Result<Duration, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        key: ENV_POST_INTERVAL_MINUTES,
        reason,
    };
    if minutes == 0 {
        return Err(invalid("must be greater than zero".to_string()));
    }
    if minutes > MAX_POST_INTERVAL_MINUTES {
        return Err(invalid(format!(
            "must be at most {MAX_POST_INTERVAL_MINUTES}"
        )));
    }
    minutes
        .checked_mul(60)
        .map(Duration::from_secs)
        .ok_or_else(|| invalid("too large".to_string()))
}

/// Resolve the posting interval: explicit minutes win over posts-per-day.
fn post_interval(minutes: Option<&str>, per_day: Option<&str>) -> Result<Duration, ConfigError> {
    if let Some(raw) = minutes {
        let minutes = raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
            key: ENV_POST_INTERVAL_MINUTES,
            reason: e.to_string(),
        })?;
        return interval_from_minutes(minutes);
    }

    if let Some(raw) = per_day {
        let per_day = raw.parse::<u32>().map_err(|e| ConfigError::Invalid {
            key: ENV_POSTS_PER_DAY,
            reason: e.to_string(),
        })?;
        if !POSTS_PER_DAY_RANGE.contains(&per_day) {
            return Err(ConfigError::Invalid {
                key: ENV_POSTS_PER_DAY,
                reason: format!(
                    "must be between {} and {}",
                    POSTS_PER_DAY_RANGE.start(),
                    POSTS_PER_DAY_RANGE.end()
                ),
            });
        }
        return Ok(Duration::from_secs(24 * 60 * 60 / u64::from(per_day)));
    }

    Ok(DEFAULT_POST_INTERVAL)
}
