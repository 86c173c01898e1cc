//! Access tokens, the process-local credential store, and cookie persistence.

use axum::http::{header, HeaderMap, HeaderValue};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::cache::TtlCache;
use crate::clock::Clock;

use super::oauth::TokenCredentials;

/// How long an issued access token is kept, in the store and in cookies.
pub const CREDENTIAL_TTL_DAYS: i64 = 30;

pub const COOKIE_ACCESS_TOKEN: &str = "twitter_access_token";
pub const COOKIE_ACCESS_TOKEN_SECRET: &str = "twitter_access_token_secret";
pub const COOKIE_USER_ID: &str = "twitter_user_id";
pub const COOKIE_SCREEN_NAME: &str = "twitter_screen_name";

const STORE_KEY: &str = "active";

/// Temporary token issued by the request-token step.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestToken {
    pub token: String,
    pub secret: String,
}

impl RequestToken {
    #[must_use]
    pub fn credentials(&self) -> TokenCredentials {
        TokenCredentials::new(&self.token, &self.secret)
    }
}

impl std::fmt::Debug for RequestToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestToken")
            .field("token", &self.token)
            .field("secret_len", &self.secret.len())
            .finish()
    }
}

/// Delegated user credentials issued by the access-token step.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub token: String,
    pub secret: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen_name: Option<String>,
}

impl AccessToken {
    #[must_use]
    pub fn new(token: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            secret: secret.into(),
            user_id: None,
            screen_name: None,
        }
    }

    #[must_use]
    pub fn credentials(&self) -> TokenCredentials {
        TokenCredentials::new(&self.token, &self.secret)
    }

    /// `Set-Cookie` values persisting this token for [`CREDENTIAL_TTL_DAYS`].
    #[must_use]
    pub fn to_cookies(&self, secure: bool) -> Vec<HeaderValue> {
        let max_age = CREDENTIAL_TTL_DAYS * 24 * 60 * 60;
        let mut cookies = vec![
            cookie(COOKIE_ACCESS_TOKEN, &self.token, max_age, secure),
            cookie(COOKIE_ACCESS_TOKEN_SECRET, &self.secret, max_age, secure),
        ];
        if let Some(user_id) = &self.user_id {
            cookies.push(cookie(COOKIE_USER_ID, user_id, max_age, secure));
        }
        if let Some(screen_name) = &self.screen_name {
            cookies.push(cookie(COOKIE_SCREEN_NAME, screen_name, max_age, secure));
        }
        cookies.into_iter().flatten().collect()
    }

    /// Read a token back from request cookies; both token and secret must be present.
    #[must_use]
    pub fn from_cookies(headers: &HeaderMap) -> Option<Self> {
        let jar = parse_cookies(headers);
        let find = |name: &str| {
            jar.iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
                .filter(|v| !v.is_empty())
        };

        Some(Self {
            token: find(COOKIE_ACCESS_TOKEN)?,
            secret: find(COOKIE_ACCESS_TOKEN_SECRET)?,
            user_id: find(COOKIE_USER_ID),
            screen_name: find(COOKIE_SCREEN_NAME),
        })
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token_len", &self.token.len())
            .field("secret_len", &self.secret.len())
            .field("user_id", &self.user_id)
            .field("screen_name", &self.screen_name)
            .finish()
    }
}

/// `Set-Cookie` values that expire every credential cookie.
#[must_use]
pub fn clear_cookies(secure: bool) -> Vec<HeaderValue> {
    [
        COOKIE_ACCESS_TOKEN,
        COOKIE_ACCESS_TOKEN_SECRET,
        COOKIE_USER_ID,
        COOKIE_SCREEN_NAME,
    ]
    .into_iter()
    .filter_map(|name| cookie(name, "", 0, secure))
    .collect()
}

/// Whether the request carries both access-token cookies.
#[must_use]
pub fn has_credential_cookies(headers: &HeaderMap) -> bool {
    AccessToken::from_cookies(headers).is_some()
}

fn cookie(name: &str, value: &str, max_age: i64, secure: bool) -> Option<HeaderValue> {
    let mut raw = format!(
        "{name}={}; Path=/; Max-Age={max_age}; HttpOnly; SameSite=Lax",
        urlencoding::encode(value)
    );
    if secure {
        raw.push_str("; Secure");
    }
    HeaderValue::from_str(&raw).ok()
}

fn parse_cookies(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let value = urlencoding::decode(value.trim()).ok()?.into_owned();
            Some((name.trim().to_string(), value))
        })
        .collect()
}

/// Process-local holder of the access token used by scheduled posts.
pub struct CredentialStore {
    inner: TtlCache<AccessToken>,
}

impl CredentialStore {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: TtlCache::with_clock(clock),
        }
    }

    /// Make `token` the active credential for [`CREDENTIAL_TTL_DAYS`].
    pub fn store(&self, token: AccessToken) {
        info!(
            screen_name = token.screen_name.as_deref().unwrap_or("unknown"),
            "Storing Twitter access token"
        );
        self.inner
            .set_for(STORE_KEY, token, Duration::days(CREDENTIAL_TTL_DAYS));
    }

    /// The active credential, if one exists and has not expired.
    #[must_use]
    pub fn current(&self) -> Option<AccessToken> {
        self.inner.get(STORE_KEY)
    }

    /// Whether an unexpired credential exists. Performs no network calls.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.current().is_some()
    }

    /// Forget the active credential.
    pub fn clear(&self) {
        debug!("Clearing stored Twitter access token");
        self.inner.clear();
    }
}
