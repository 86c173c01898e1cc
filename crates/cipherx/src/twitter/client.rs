//! Twitter/X API client: OAuth1 token endpoints and tweet publishing.

use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, error, info, instrument, warn};

use crate::error::BotError;

use super::credentials::{AccessToken, RequestToken};
use super::handshake::AuthFailure;
use super::oauth::{ConsumerCredentials, OAuthRequest, OAuthSigner};

const REQUEST_TOKEN_PATH: &str = "/oauth/request_token";
const AUTHORIZE_PATH: &str = "/oauth/authorize";
const ACCESS_TOKEN_PATH: &str = "/oauth/access_token";
const TWEETS_PATH: &str = "/2/tweets";

/// Callback value for the out-of-band (PIN) flow.
pub const OOB_CALLBACK: &str = "oob";

/// Result of a successful publish.
#[derive(Debug, Clone)]
pub struct PostedTweet {
    /// Tweet ID, when the provider returned one.
    pub id: Option<String>,
    /// Raw provider response body.
    pub response: Value,
}

/// Anything that can publish tweet text on behalf of an access token.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TweetPublisher: Send + Sync {
    /// Publish already-validated text.
    async fn publish(&self, text: &str, token: &AccessToken) -> Result<PostedTweet, BotError>;
}

/// Error body shape of the v2 API.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

/// Twitter/X API client.
#[derive(Debug, Clone)]
pub struct TwitterClient {
    http: Client,
    signer: OAuthSigner,
    base_url: String,
}

impl TwitterClient {
    /// Create a client for `base_url` (e.g. `https://api.twitter.com`).
    #[must_use]
    pub fn new(consumer: ConsumerCredentials, base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            signer: OAuthSigner::new(consumer),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Step 1: obtain a request token bound to `callback`.
    #[instrument(skip(self))]
    pub async fn request_token(&self, callback: &str) -> Result<RequestToken, AuthFailure> {
        let url = self.url(REQUEST_TOKEN_PATH);
        let header = self
            .signer
            .authorize(&OAuthRequest {
                method: "POST",
                url: &url,
                oauth_params: &[("oauth_callback", callback)],
                ..Default::default()
            })
            .map_err(|e| AuthFailure::AuthFailed(format!("invalid request-token URL: {e}")))?;

        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, header)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Request-token call failed");
                AuthFailure::RequestTokenFailed
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            warn!(status = %status, body = %body, "Request-token endpoint rejected the request");
            return Err(AuthFailure::RequestTokenFailed);
        }

        let form = parse_form(&body);
        let Some(token) = form.get("oauth_token").filter(|t| !t.is_empty()) else {
            warn!("Request-token response did not contain oauth_token");
            return Err(AuthFailure::RequestTokenFailed);
        };

        debug!("Request token issued");
        Ok(RequestToken {
            token: token.clone(),
            secret: form.get("oauth_token_secret").cloned().unwrap_or_default(),
        })
    }

    /// Step 2: the page the user is sent to for authorization.
    #[must_use]
    pub fn authorize_url(&self, request_token: &RequestToken) -> String {
        format!(
            "{}?oauth_token={}",
            self.url(AUTHORIZE_PATH),
            urlencoding::encode(&request_token.token)
        )
    }

    /// Step 3: trade the authorized request token and verifier for an access token.
    #[instrument(skip(self, request_token, verifier))]
    pub async fn access_token(
        &self,
        request_token: &RequestToken,
        verifier: &str,
    ) -> Result<AccessToken, AuthFailure> {
        let url = self.url(ACCESS_TOKEN_PATH);
        let token = request_token.credentials();
        let header = self
            .signer
            .authorize(&OAuthRequest {
                method: "POST",
                url: &url,
                oauth_params: &[("oauth_verifier", verifier)],
                token: Some(&token),
                ..Default::default()
            })
            .map_err(|e| AuthFailure::AuthFailed(format!("invalid access-token URL: {e}")))?;

        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, header)
            .form(&[("oauth_verifier", verifier)])
            .send()
            .await
            .map_err(|e| AuthFailure::AuthFailed(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            warn!(status = %status, "Access-token endpoint rejected the exchange");
            return Err(AuthFailure::AccessTokenFailed);
        }

        let form = parse_form(&body);
        let token = form.get("oauth_token").filter(|t| !t.is_empty());
        let secret = form.get("oauth_token_secret").filter(|s| !s.is_empty());
        let (Some(token), Some(secret)) = (token, secret) else {
            warn!("Access-token response missing oauth_token or oauth_token_secret");
            return Err(AuthFailure::InvalidTokens);
        };

        let access = AccessToken {
            token: token.clone(),
            secret: secret.clone(),
            user_id: form.get("user_id").cloned(),
            screen_name: form.get("screen_name").cloned(),
        };
        info!(
            screen_name = access.screen_name.as_deref().unwrap_or("unknown"),
            "Access token issued"
        );
        Ok(access)
    }

    /// Publish a tweet with the given user credentials.
    #[instrument(skip(self, text, token), fields(length = text.chars().count()))]
    pub async fn post_tweet(&self, text: &str, token: &AccessToken) -> Result<PostedTweet, BotError> {
        let url = self.url(TWEETS_PATH);
        let credentials = token.credentials();
        let header = self
            .signer
            .authorize(&OAuthRequest {
                method: "POST",
                url: &url,
                token: Some(&credentials),
                ..Default::default()
            })
            .map_err(|e| BotError::PostFailed {
                status: 0,
                message: format!("invalid tweets URL: {e}"),
            })?;

        let preview: String = text.chars().take(50).collect();
        info!(preview = %preview, "Posting tweet");

        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, header)
            .json(&json!({ "text": text }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            let response: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
            let id = response
                .pointer("/data/id")
                .and_then(Value::as_str)
                .map(String::from);
            info!(tweet_id = id.as_deref().unwrap_or("unknown"), "Tweet posted");
            return Ok(PostedTweet { id, response });
        }

        error!(status = %status, body = %body, "Twitter API rejected tweet");
        Err(map_publish_error(status, &body))
    }
}

#[async_trait]
impl TweetPublisher for TwitterClient {
    async fn publish(&self, text: &str, token: &AccessToken) -> Result<PostedTweet, BotError> {
        self.post_tweet(text, token).await
    }
}

/// Publisher used when consumer credentials are absent; every call fails
/// with [`BotError::NotConfigured`].
#[derive(Debug, Clone)]
pub struct UnconfiguredPublisher {
    missing: Vec<&'static str>,
}

impl UnconfiguredPublisher {
    #[must_use]
    pub fn new(missing: Vec<&'static str>) -> Self {
        Self { missing }
    }
}

#[async_trait]
impl TweetPublisher for UnconfiguredPublisher {
    async fn publish(&self, _text: &str, _token: &AccessToken) -> Result<PostedTweet, BotError> {
        Err(BotError::NotConfigured(self.missing.clone()))
    }
}

/// Map a non-2xx publish response onto the error taxonomy.
fn map_publish_error(status: StatusCode, body: &str) -> BotError {
    match status {
        StatusCode::UNAUTHORIZED => BotError::AuthFailed,
        StatusCode::TOO_MANY_REQUESTS => BotError::RateLimited,
        StatusCode::BAD_REQUEST => {
            let detail = serde_json::from_str::<ApiErrorBody>(body)
                .ok()
                .and_then(|b| b.detail.or(b.title))
                .unwrap_or_else(|| "Please check your input".to_string());
            BotError::BadRequest(detail)
        }
        other => {
            let message = serde_json::from_str::<ApiErrorBody>(body)
                .ok()
                .and_then(|b| b.detail)
                .unwrap_or_else(|| "Failed to post tweet".to_string());
            BotError::PostFailed {
                status: other.as_u16(),
                message,
            }
        }
    }
}

/// Parse an `application/x-www-form-urlencoded` body.
fn parse_form(body: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(body.trim().as_bytes())
        .into_owned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> TwitterClient {
        TwitterClient::new(ConsumerCredentials::new("ck", "cs"), server.uri())
    }

    #[tokio::test]
    async fn test_request_token_parses_form_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/request_token"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "oauth_token=req-token&oauth_token_secret=req-secret&oauth_callback_confirmed=true",
            ))
            .mount(&server)
            .await;

        let token = client(&server)
            .request_token("http://localhost/callback")
            .await
            .unwrap();
        assert_eq!(token.token, "req-token");
        assert_eq!(token.secret, "req-secret");
    }

    #[tokio::test]
    async fn test_request_token_missing_token_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/request_token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("oauth_callback_confirmed=true"))
            .mount(&server)
            .await;

        let err = client(&server).request_token("oob").await.unwrap_err();
        assert_eq!(err, AuthFailure::RequestTokenFailed);
    }

    #[tokio::test]
    async fn test_access_token_non_2xx() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/access_token"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid verifier"))
            .mount(&server)
            .await;

        let request = RequestToken {
            token: "req".into(),
            secret: "sec".into(),
        };
        let err = client(&server).access_token(&request, "v").await.unwrap_err();
        assert_eq!(err, AuthFailure::AccessTokenFailed);
    }

    #[tokio::test]
    async fn test_access_token_missing_secret() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("oauth_token=abc&user_id=1"))
            .mount(&server)
            .await;

        let request = RequestToken {
            token: "req".into(),
            secret: "sec".into(),
        };
        let err = client(&server).access_token(&request, "v").await.unwrap_err();
        assert_eq!(err, AuthFailure::InvalidTokens);
    }

    #[tokio::test]
    async fn test_access_token_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "oauth_token=123-abc&oauth_token_secret=xyz&user_id=123&screen_name=cipherx",
            ))
            .mount(&server)
            .await;

        let request = RequestToken {
            token: "req".into(),
            secret: "sec".into(),
        };
        let access = client(&server).access_token(&request, "v").await.unwrap();
        assert_eq!(access.token, "123-abc");
        assert_eq!(access.secret, "xyz");
        assert_eq!(access.user_id.as_deref(), Some("123"));
        assert_eq!(access.screen_name.as_deref(), Some("cipherx"));
    }

    #[tokio::test]
    async fn test_post_tweet_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/tweets"))
            .and(header_exists("authorization"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!({ "data": { "id": "1799", "text": "hello" } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let posted = client(&server)
            .post_tweet("hello", &AccessToken::new("t", "s"))
            .await
            .unwrap();
        assert_eq!(posted.id.as_deref(), Some("1799"));
    }

    #[tokio::test]
    async fn test_post_tweet_status_mapping() {
        let cases = [
            (401, json!({ "title": "Unauthorized" })),
            (429, json!({ "title": "Too Many Requests" })),
            (400, json!({ "detail": "duplicate content" })),
            (503, json!({ "detail": "over capacity" })),
        ];

        for (status, body) in cases {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/2/tweets"))
                .respond_with(ResponseTemplate::new(status).set_body_json(body))
                .mount(&server)
                .await;

            let err = client(&server)
                .post_tweet("hello", &AccessToken::new("t", "s"))
                .await
                .unwrap_err();
            match status {
                401 => assert!(matches!(err, BotError::AuthFailed)),
                429 => assert!(matches!(err, BotError::RateLimited)),
                400 => assert!(matches!(err, BotError::BadRequest(ref d) if d == "duplicate content")),
                _ => assert!(matches!(err, BotError::PostFailed { status: 503, .. })),
            }
        }
    }

    #[test]
    fn test_authorize_url() {
        let client = TwitterClient::new(ConsumerCredentials::new("ck", "cs"), "https://api.twitter.com/");
        let url = client.authorize_url(&RequestToken {
            token: "abc".into(),
            secret: String::new(),
        });
        assert_eq!(url, "https://api.twitter.com/oauth/authorize?oauth_token=abc");
    }
}
