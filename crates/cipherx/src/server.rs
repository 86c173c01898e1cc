//! HTTP surface: OAuth handshake, posting, approval queue and scheduler control.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Router,
};
use cipherx_config::{AppConfig, Diagnostics};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::bot::TweetBot;
use crate::cache::SharedCache;
use crate::clock::Clock;
use crate::error::BotError;
use crate::generator::{TweetGenerator, TweetSource};
use crate::llm::OpenAiWriter;
use crate::market::{CoinGeckoClient, LunarCrushClient};
use crate::queue::TweetQueue;
use crate::twitter::credentials::{clear_cookies, has_credential_cookies};
use crate::twitter::{
    AccessToken, AuthFailure, CallbackParams, ConsumerCredentials, CredentialStore,
    OAuthHandshake, TweetPublisher, TwitterClient, UnconfiguredPublisher,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Validated configuration.
    pub config: Arc<AppConfig>,
    /// OAuth1 handshake driver.
    pub handshake: Arc<OAuthHandshake>,
    /// Active posting credential.
    pub store: Arc<CredentialStore>,
    /// Posting scheduler.
    pub bot: Arc<TweetBot>,
    /// Drafts awaiting approval.
    pub queue: Arc<TweetQueue>,
    /// Tweet generation pipeline.
    pub source: Arc<dyn TweetSource>,
}

impl AppState {
    /// Wire every service from configuration.
    #[must_use]
    pub fn from_config(config: AppConfig, clock: Arc<dyn Clock>) -> Self {
        let cache = Arc::new(SharedCache::with_clock(clock.clone()));

        let source: Arc<dyn TweetSource> = Arc::new(TweetGenerator::new(
            Arc::new(CoinGeckoClient::new(
                config.coingecko.api_key.expose(),
                &config.coingecko.base_url,
                cache.clone(),
            )),
            Arc::new(LunarCrushClient::new(
                config.lunarcrush.api_key.expose(),
                &config.lunarcrush.base_url,
                cache.clone(),
            )),
            Arc::new(OpenAiWriter::new(
                config.openai.api_key.expose(),
                &config.openai.base_url,
                &config.openai.model,
                cache,
            )),
        ));

        let store = Arc::new(CredentialStore::new(clock.clone()));
        if let Some((token, secret)) = config.twitter.access_pair() {
            store.store(AccessToken::new(token, secret));
        }

        let client = config.twitter.consumer().map(|(key, secret)| {
            TwitterClient::new(ConsumerCredentials::new(key, secret), &config.twitter.base_url)
        });
        let publisher: Arc<dyn TweetPublisher> = match &client {
            Some(client) => Arc::new(client.clone()),
            None => {
                warn!(missing = ?config.twitter_missing(), "Twitter API not configured");
                Arc::new(UnconfiguredPublisher::new(config.twitter_missing()))
            }
        };

        let handshake = Arc::new(OAuthHandshake::new(
            client,
            store.clone(),
            config.callback_url(),
            clock.clone(),
        ));
        let bot = Arc::new(TweetBot::new(
            source.clone(),
            publisher,
            store.clone(),
            clock.clone(),
            config.post_interval,
        ));
        let queue = Arc::new(TweetQueue::new(clock));

        Self {
            config: Arc::new(config),
            handshake,
            store,
            bot,
            queue,
            source,
        }
    }
}

/// Build the HTTP router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // OAuth1 handshake
        .route("/api/auth/twitter", get(auth_start))
        .route("/api/auth/twitter/callback", get(auth_callback))
        .route("/api/auth/twitter/check", get(auth_check))
        // Posting
        .route("/api/tweet", post(post_tweet))
        // Approval queue
        .route("/api/tweets/pending", get(list_pending).post(create_pending))
        .route("/api/tweets/pending/{id}/approve", post(approve_pending))
        .route("/api/tweets/pending/{id}/post", post(post_pending))
        // Scheduler
        .route("/api/bot/status", get(bot_status))
        .route("/api/bot/start", post(bot_start))
        .route("/api/bot/stop", post(bot_stop))
        // Diagnostics
        .route("/api/test-env", get(test_env))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

/// Configuration presence report.
async fn test_env(State(state): State<AppState>) -> Json<Value> {
    let diagnostics: Diagnostics = state.config.diagnostics();
    Json(json!({
        "environment": diagnostics,
        "twitterConfigured": state.handshake.is_configured(),
        "missing": state.config.twitter_missing(),
    }))
}

#[derive(Debug, Default, Deserialize)]
struct AuthStartQuery {
    #[serde(default)]
    redirect: bool,
}

/// Start the handshake: JSON `{url}` by default, a redirect with `?redirect=true`.
async fn auth_start(State(state): State<AppState>, Query(query): Query<AuthStartQuery>) -> Response {
    match state.handshake.begin().await {
        Ok(url) if query.redirect => Redirect::to(&url).into_response(),
        Ok(url) => Json(json!({ "url": url })).into_response(),
        Err(failure) if query.redirect => failure_redirect(&state.config, &failure),
        Err(failure) => {
            let status = match failure {
                AuthFailure::ApiNotConfigured => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_GATEWAY,
            };
            (
                status,
                Json(json!({ "error": failure.to_string(), "code": failure.code() })),
            )
                .into_response()
        }
    }
}

/// Finish the handshake and persist credentials as cookies.
async fn auth_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    match state.handshake.complete(&params).await {
        Ok(token) => {
            let target = format!("{}?success=true", state.config.dashboard_url());
            let mut response = Redirect::to(&target).into_response();
            append_cookies(&mut response, token.to_cookies(state.config.cookie_secure));
            response
        }
        Err(failure) => failure_redirect(&state.config, &failure),
    }
}

/// Report whether posting credentials exist. Never calls upstream.
async fn auth_check(State(state): State<AppState>, headers: HeaderMap) -> Json<Value> {
    let from_cookies = has_credential_cookies(&headers);
    let is_authenticated = from_cookies || state.handshake.is_authenticated();
    debug!(from_cookies, is_authenticated, "Auth check");
    Json(json!({ "isAuthenticated": is_authenticated }))
}

#[derive(Debug, Default, Deserialize)]
struct TweetRequest {
    text: Option<String>,
}

/// Post `{text}`, or a generated update when the body or `text` is absent.
async fn post_tweet(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let request = match parse_tweet_request(&body) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };

    let token = AccessToken::from_cookies(&headers);
    match state.bot.manual_tweet(request.text, token).await {
        Ok(posted) => Json(json!({ "success": true, "data": posted.response })).into_response(),
        Err(e) => error_response(&state, e),
    }
}

fn parse_tweet_request(body: &[u8]) -> Result<TweetRequest, BotError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(TweetRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        warn!(error = %e, "Rejecting malformed tweet request");
        BotError::EmptyText
    })
}

async fn list_pending(State(state): State<AppState>) -> Json<Value> {
    let tweets = state.queue.pending();
    Json(json!({ "tweets": tweets, "latest": state.queue.latest() }))
}

async fn create_pending(State(state): State<AppState>) -> Response {
    match state.queue.create_pending(state.source.as_ref()).await {
        Ok(tweet) => (StatusCode::CREATED, Json(json!({ "tweet": tweet }))).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn approve_pending(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.queue.approve(&id) {
        Some(tweet) => Json(json!({ "tweet": tweet })).into_response(),
        None => not_found(&id),
    }
}

/// Publish an approved draft through the scheduler, then mark it posted.
async fn post_pending(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Some(tweet) = state.queue.get(&id) else {
        return not_found(&id);
    };
    if !tweet.approved {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "error": "Tweet must be approved before posting" })),
        )
            .into_response();
    }

    let token = AccessToken::from_cookies(&headers);
    match state.bot.manual_tweet(Some(tweet.content), token).await {
        Ok(posted) => {
            state.queue.mark_posted(&id);
            info!(id = %id, "Posted approved tweet");
            Json(json!({ "success": true, "data": posted.response })).into_response()
        }
        Err(e) => error_response(&state, e),
    }
}

async fn bot_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.bot.status()))
}

async fn bot_start(State(state): State<AppState>) -> Json<Value> {
    let started = state.bot.start();
    Json(json!({ "started": started, "status": state.bot.status() }))
}

async fn bot_stop(State(state): State<AppState>) -> Json<Value> {
    let stopped = state.bot.stop();
    Json(json!({ "stopped": stopped, "status": state.bot.status() }))
}

/// Map a posting error; a 401 also expires the credential cookies.
fn error_response(state: &AppState, error: BotError) -> Response {
    if error.is_validation() || error.is_scheduling() {
        debug!(error = %error, "Tweet request refused");
    } else {
        warn!(error = %error, "Tweet request failed");
    }
    let clear = matches!(error, BotError::AuthFailed);
    let mut response = error.into_response();
    if clear {
        append_cookies(&mut response, clear_cookies(state.config.cookie_secure));
    }
    response
}

fn failure_redirect(config: &AppConfig, failure: &AuthFailure) -> Response {
    let target = format!("{}?error={}", config.dashboard_url(), failure.code());
    Redirect::to(&target).into_response()
}

fn not_found(id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("Pending tweet {id} not found") })),
    )
        .into_response()
}

fn append_cookies(response: &mut Response, cookies: Vec<HeaderValue>) {
    let headers = response.headers_mut();
    for cookie in cookies {
        headers.append(header::SET_COOKIE, cookie);
    }
}
