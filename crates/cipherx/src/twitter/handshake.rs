//! Three-step OAuth1 authorization handshake.
//!
//! ```text
//! Unauthenticated -> RequestTokenIssued -> AuthorizedByUser -> AccessTokenIssued
//!        \________________\_____________________\______________> Failed(reason)
//! ```
//!
//! Request tokens live between the first and third step in a short TTL cache,
//! keyed by token, so a callback can only complete a handshake this process
//! started.

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::cache::TtlCache;
use crate::clock::Clock;

use super::client::TwitterClient;
use super::credentials::{AccessToken, CredentialStore, RequestToken};

/// How long an issued request token waits for the user to come back.
pub const PENDING_REQUEST_TTL_MINUTES: u64 = 15;

/// Why a handshake ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthFailure {
    /// Callback carried neither `oauth_token` nor `oauth_verifier`.
    #[error("No authorization data received")]
    NoCode,

    /// Callback token does not match a pending request token.
    #[error("Unknown or expired authorization request")]
    InvalidState,

    /// Callback carried only one of `oauth_token` / `oauth_verifier`.
    #[error("Invalid callback parameters")]
    InvalidCallback,

    /// Request-token step failed.
    #[error("Failed to obtain request token")]
    RequestTokenFailed,

    /// Access-token endpoint returned non-2xx.
    #[error("Failed to exchange access token")]
    AccessTokenFailed,

    /// Access-token response lacked the token or its secret.
    #[error("Access token response was incomplete")]
    InvalidTokens,

    /// Consumer credentials are not configured.
    #[error("Twitter API not configured")]
    ApiNotConfigured,

    /// Anything else, including a user denying access.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),
}

impl AuthFailure {
    /// Machine-readable code carried on the failure redirect.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoCode => "no_code",
            Self::InvalidState => "invalid_state",
            Self::InvalidCallback => "invalid_callback",
            Self::AccessTokenFailed => "access_token_failed",
            Self::InvalidTokens => "invalid_tokens",
            Self::ApiNotConfigured => "api_not_configured",
            Self::RequestTokenFailed | Self::AuthFailed(_) => "auth_failed",
        }
    }

    /// State-machine reason; differs from [`Self::code`] only for the request-token step.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::RequestTokenFailed => "request_token_failed",
            other => other.code(),
        }
    }
}

/// Where one handshake currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    Unauthenticated,
    RequestTokenIssued(RequestToken),
    AuthorizedByUser {
        request: RequestToken,
        verifier: String,
    },
    AccessTokenIssued(AccessToken),
    Failed(AuthFailure),
}

impl HandshakeState {
    /// Step 1 result. Only valid from `Unauthenticated`.
    #[must_use]
    pub fn request_token_issued(self, result: Result<RequestToken, AuthFailure>) -> Self {
        match (self, result) {
            (Self::Unauthenticated, Ok(token)) => Self::RequestTokenIssued(token),
            (Self::Unauthenticated, Err(failure)) => Self::Failed(failure),
            (other, _) => other.unexpected("request token"),
        }
    }

    /// Step 2: the user came back with `verifier`. Only valid from `RequestTokenIssued`.
    #[must_use]
    pub fn authorized(self, verifier: impl Into<String>) -> Self {
        match self {
            Self::RequestTokenIssued(request) => Self::AuthorizedByUser {
                request,
                verifier: verifier.into(),
            },
            other => other.unexpected("user authorization"),
        }
    }

    /// Step 3 result. Only valid from `AuthorizedByUser`.
    #[must_use]
    pub fn access_token_issued(self, result: Result<AccessToken, AuthFailure>) -> Self {
        match (self, result) {
            (Self::AuthorizedByUser { .. }, Ok(token)) => Self::AccessTokenIssued(token),
            (Self::AuthorizedByUser { .. }, Err(failure)) => Self::Failed(failure),
            (other, _) => other.unexpected("access token"),
        }
    }

    /// Move to `Failed`; `Failed` itself absorbs and keeps its first reason.
    #[must_use]
    pub fn fail(self, failure: AuthFailure) -> Self {
        match self {
            Self::Failed(first) => Self::Failed(first),
            _ => Self::Failed(failure),
        }
    }

    /// Collapse a terminal state into a result.
    pub fn into_result(self) -> Result<AccessToken, AuthFailure> {
        match self {
            Self::AccessTokenIssued(token) => Ok(token),
            Self::Failed(failure) => Err(failure),
            other => Err(AuthFailure::AuthFailed(format!(
                "handshake incomplete in state {}",
                other.name()
            ))),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::RequestTokenIssued(_) => "request_token_issued",
            Self::AuthorizedByUser { .. } => "authorized_by_user",
            Self::AccessTokenIssued(_) => "access_token_issued",
            Self::Failed(_) => "failed",
        }
    }

    fn unexpected(self, step: &str) -> Self {
        let message = format!("unexpected {step} in state {}", self.name());
        self.fail(AuthFailure::AuthFailed(message))
    }
}

/// Parameters the provider appends to the callback URL.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct CallbackParams {
    pub oauth_token: Option<String>,
    pub oauth_verifier: Option<String>,
    /// Set instead of the other two when the user declines.
    pub denied: Option<String>,
}

/// Drives handshakes against the provider and records the outcome.
pub struct OAuthHandshake {
    client: Option<TwitterClient>,
    pending: TtlCache<RequestToken>,
    store: Arc<CredentialStore>,
    callback_url: String,
}

impl OAuthHandshake {
    /// `client` is `None` when consumer credentials are not configured.
    #[must_use]
    pub fn new(
        client: Option<TwitterClient>,
        store: Arc<CredentialStore>,
        callback_url: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            pending: TtlCache::with_clock(clock),
            store,
            callback_url: callback_url.into(),
        }
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    /// Whether usable credentials exist. Never touches the network.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.store.is_authenticated()
    }

    /// Step 1: obtain a request token and return the user's authorize URL.
    pub async fn begin(&self) -> Result<String, AuthFailure> {
        let client = self.client.as_ref().ok_or(AuthFailure::ApiNotConfigured)?;

        let result = client.request_token(&self.callback_url).await;
        match HandshakeState::Unauthenticated.request_token_issued(result) {
            HandshakeState::RequestTokenIssued(token) => {
                let url = client.authorize_url(&token);
                self.pending
                    .set(token.token.clone(), token, PENDING_REQUEST_TTL_MINUTES);
                info!("OAuth handshake started");
                Ok(url)
            }
            state => {
                let failure = state
                    .into_result()
                    .err()
                    .unwrap_or(AuthFailure::RequestTokenFailed);
                warn!(reason = failure.reason(), "OAuth handshake could not start");
                Err(failure)
            }
        }
    }

    /// Steps 2 and 3: validate the callback, exchange for an access token and store it.
    pub async fn complete(&self, params: &CallbackParams) -> Result<AccessToken, AuthFailure> {
        let result = self.run_callback(params).await;
        match &result {
            Ok(token) => {
                self.store.store(token.clone());
                info!(
                    screen_name = token.screen_name.as_deref().unwrap_or("unknown"),
                    "OAuth handshake completed"
                );
            }
            Err(failure) => warn!(reason = failure.reason(), "OAuth handshake failed"),
        }
        result
    }

    async fn run_callback(&self, params: &CallbackParams) -> Result<AccessToken, AuthFailure> {
        let client = self.client.as_ref().ok_or(AuthFailure::ApiNotConfigured)?;

        if let Some(denied) = &params.denied {
            self.pending.remove(denied);
            return Err(AuthFailure::AuthFailed("access denied by user".to_string()));
        }

        let token = params.oauth_token.as_deref().filter(|t| !t.is_empty());
        let verifier = params.oauth_verifier.as_deref().filter(|v| !v.is_empty());
        let (token, verifier) = match (token, verifier) {
            (None, None) => return Err(AuthFailure::NoCode),
            (Some(token), Some(verifier)) => (token, verifier),
            _ => return Err(AuthFailure::InvalidCallback),
        };

        // Single use: a replayed callback finds nothing pending.
        let pending = self.pending.get(token);
        self.pending.remove(token);
        let request = pending.ok_or(AuthFailure::InvalidState)?;

        let state = HandshakeState::Unauthenticated
            .request_token_issued(Ok(request))
            .authorized(verifier);
        let exchange = if let HandshakeState::AuthorizedByUser { request, verifier } = &state {
            client.access_token(request, verifier).await
        } else {
            Err(AuthFailure::AuthFailed("callback out of sequence".to_string()))
        };
        state.access_token_issued(exchange).into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::twitter::oauth::ConsumerCredentials;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> RequestToken {
        RequestToken {
            token: "req".into(),
            secret: "sec".into(),
        }
    }

    #[test]
    fn test_failure_codes() {
        assert_eq!(AuthFailure::NoCode.code(), "no_code");
        assert_eq!(AuthFailure::InvalidState.code(), "invalid_state");
        assert_eq!(AuthFailure::RequestTokenFailed.code(), "auth_failed");
        assert_eq!(AuthFailure::RequestTokenFailed.reason(), "request_token_failed");
        assert_eq!(AuthFailure::InvalidTokens.reason(), "invalid_tokens");
    }

    #[test]
    fn test_happy_path_transitions() {
        let state = HandshakeState::Unauthenticated
            .request_token_issued(Ok(request()))
            .authorized("verifier");
        assert!(matches!(state, HandshakeState::AuthorizedByUser { .. }));

        let state = state.access_token_issued(Ok(AccessToken::new("t", "s")));
        assert!(matches!(state, HandshakeState::AccessTokenIssued(_)));
        assert_eq!(state.into_result().unwrap().token, "t");
    }

    #[test]
    fn test_failed_is_absorbing() {
        let state = HandshakeState::Unauthenticated
            .request_token_issued(Err(AuthFailure::RequestTokenFailed))
            .authorized("verifier")
            .access_token_issued(Ok(AccessToken::new("t", "s")));
        assert_eq!(state, HandshakeState::Failed(AuthFailure::RequestTokenFailed));
    }

    #[test]
    fn test_out_of_order_transition_fails() {
        let state = HandshakeState::Unauthenticated.authorized("verifier");
        assert!(matches!(state, HandshakeState::Failed(AuthFailure::AuthFailed(_))));
    }

    fn handshake(server: &MockServer) -> (Arc<CredentialStore>, OAuthHandshake) {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
        let store = Arc::new(CredentialStore::new(clock.clone()));
        let client = TwitterClient::new(ConsumerCredentials::new("ck", "cs"), server.uri());
        let handshake = OAuthHandshake::new(
            Some(client),
            store.clone(),
            "http://localhost:3000/api/auth/twitter/callback",
            clock,
        );
        (store, handshake)
    }

    #[tokio::test]
    async fn test_unconfigured() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
        let store = Arc::new(CredentialStore::new(clock.clone()));
        let handshake = OAuthHandshake::new(None, store, "http://x/cb", clock);
        assert_eq!(handshake.begin().await, Err(AuthFailure::ApiNotConfigured));
    }

    #[tokio::test]
    async fn test_callback_parameter_validation() {
        let server = MockServer::start().await;
        let (_store, handshake) = handshake(&server);

        let none = CallbackParams::default();
        assert_eq!(handshake.complete(&none).await, Err(AuthFailure::NoCode));

        let partial = CallbackParams {
            oauth_token: Some("req".into()),
            ..Default::default()
        };
        assert_eq!(
            handshake.complete(&partial).await,
            Err(AuthFailure::InvalidCallback)
        );

        let unknown = CallbackParams {
            oauth_token: Some("never-issued".into()),
            oauth_verifier: Some("v".into()),
            ..Default::default()
        };
        assert_eq!(
            handshake.complete(&unknown).await,
            Err(AuthFailure::InvalidState)
        );
    }

    #[tokio::test]
    async fn test_full_handshake_stores_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/request_token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("oauth_token=req&oauth_token_secret=sec&oauth_callback_confirmed=true"),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/oauth/access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "oauth_token=acc&oauth_token_secret=acc-sec&user_id=42&screen_name=cipherx",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let (store, handshake) = handshake(&server);
        let url = handshake.begin().await.unwrap();
        assert!(url.ends_with("/oauth/authorize?oauth_token=req"));

        let params = CallbackParams {
            oauth_token: Some("req".into()),
            oauth_verifier: Some("verifier".into()),
            ..Default::default()
        };
        let token = handshake.complete(&params).await.unwrap();
        assert_eq!(token.screen_name.as_deref(), Some("cipherx"));
        assert!(handshake.is_authenticated());
        assert_eq!(store.current().unwrap().token, "acc");

        // Request token is single use
        assert_eq!(
            handshake.complete(&params).await,
            Err(AuthFailure::InvalidState)
        );
    }
}
