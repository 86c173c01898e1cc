//! Integration tests for the HTTP surface.
//!
//! Every upstream (Twitter, CoinGecko, LunarCrush, OpenAI) is served by one
//! wiremock server; the router runs on a real listener and is driven with
//! reqwest with redirects disabled so handshake redirects can be inspected.

use cipherx::{build_router, AppState, SystemClock};
use cipherx_config::AppConfig;
use reqwest::{header, redirect, Client, StatusCode};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// =============================================================================
// Harness
// =============================================================================

fn config(upstream: &MockServer, with_twitter: bool) -> AppConfig {
    let mut env: HashMap<&str, String> = HashMap::from([
        ("COINGECKO_API_KEY", "cg".to_string()),
        ("LUNARCRUSH_API_KEY", "lc".to_string()),
        ("OPENAI_API_KEY", "sk".to_string()),
        ("APP_URL", "http://localhost:3000".to_string()),
        ("COOKIE_SECURE", "false".to_string()),
        ("X_API_BASE_URL", upstream.uri()),
        ("COINGECKO_BASE_URL", upstream.uri()),
        ("LUNARCRUSH_BASE_URL", upstream.uri()),
        ("OPENAI_BASE_URL", upstream.uri()),
    ]);
    if with_twitter {
        env.insert("X_API_KEY", "consumer-key".to_string());
        env.insert("X_API_SECRET", "consumer-secret".to_string());
    }
    AppConfig::from_lookup(|key| env.get(key).cloned()).unwrap()
}

/// Start the app on a random port.
async fn start_app(config: AppConfig) -> SocketAddr {
    let app = build_router(AppState::from_config(config, Arc::new(SystemClock)));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn client() -> Client {
    Client::builder()
        .redirect(redirect::Policy::none())
        .build()
        .unwrap()
}

fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Turn `Set-Cookie` headers into a request `Cookie` header value.
fn cookie_header(response: &reqwest::Response) -> String {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .collect::<Vec<_>>()
        .join("; ")
}

async fn mount_handshake(upstream: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth/request_token"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "oauth_token=req-token&oauth_token_secret=req-secret&oauth_callback_confirmed=true",
        ))
        .mount(upstream)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "oauth_token=acc-token&oauth_token_secret=acc-secret&user_id=42&screen_name=cipherx",
        ))
        .mount(upstream)
        .await;
}

/// Run the handshake and return the resulting cookie header.
async fn authenticate(base: &str) -> String {
    let http = client();
    let start: Value = http
        .get(format!("{base}/api/auth/twitter"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(start["url"]
        .as_str()
        .unwrap()
        .ends_with("/oauth/authorize?oauth_token=req-token"));

    let callback = http
        .get(format!(
            "{base}/api/auth/twitter/callback?oauth_token=req-token&oauth_verifier=pin"
        ))
        .send()
        .await
        .unwrap();
    assert!(callback.status().is_redirection());
    assert_eq!(
        location(&callback),
        "http://localhost:3000/dashboard?success=true"
    );
    cookie_header(&callback)
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_health() {
    let upstream = MockServer::start().await;
    let addr = start_app(config(&upstream, true)).await;

    let body: Value = client()
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_end_to_end_handshake_then_post() {
    let upstream = MockServer::start().await;
    mount_handshake(&upstream).await;
    Mock::given(method("POST"))
        .and(path("/2/tweets"))
        .and(body_partial_json(json!({ "text": "hello" })))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({ "data": { "id": "1800", "text": "hello" } })),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let addr = start_app(config(&upstream, true)).await;
    let base = format!("http://{addr}");
    let http = client();

    let before: Value = http
        .get(format!("{base}/api/auth/twitter/check"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(before, json!({ "isAuthenticated": false }));

    let cookies = authenticate(&base).await;
    assert!(cookies.contains("twitter_access_token=acc-token"));
    assert!(cookies.contains("twitter_screen_name=cipherx"));

    let check: Value = http
        .get(format!("{base}/api/auth/twitter/check"))
        .header(header::COOKIE, &cookies)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(check, json!({ "isAuthenticated": true }));

    let response = http
        .post(format!("{base}/api/tweet"))
        .header(header::COOKIE, &cookies)
        .json(&json!({ "text": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["data"]["id"], "1800");
}

#[tokio::test]
async fn test_callback_error_codes() {
    let upstream = MockServer::start().await;
    let addr = start_app(config(&upstream, true)).await;
    let base = format!("http://{addr}");
    let http = client();

    let cases = [
        ("", "no_code"),
        ("?oauth_token=req-token", "invalid_callback"),
        ("?oauth_verifier=pin", "invalid_callback"),
        ("?oauth_token=never-issued&oauth_verifier=pin", "invalid_state"),
    ];
    for (query, code) in cases {
        let response = http
            .get(format!("{base}/api/auth/twitter/callback{query}"))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_redirection());
        assert_eq!(
            location(&response),
            format!("http://localhost:3000/dashboard?error={code}")
        );
    }
}

#[tokio::test]
async fn test_access_token_failure_redirects() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/request_token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("oauth_token=req-token&oauth_token_secret=s"),
        )
        .mount(&upstream)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/access_token"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&upstream)
        .await;

    let addr = start_app(config(&upstream, true)).await;
    let base = format!("http://{addr}");
    let http = client();

    http.get(format!("{base}/api/auth/twitter")).send().await.unwrap();
    let response = http
        .get(format!(
            "{base}/api/auth/twitter/callback?oauth_token=req-token&oauth_verifier=pin"
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(
        location(&response),
        "http://localhost:3000/dashboard?error=access_token_failed"
    );
}

#[tokio::test]
async fn test_unconfigured_twitter() {
    let upstream = MockServer::start().await;
    let addr = start_app(config(&upstream, false)).await;
    let base = format!("http://{addr}");
    let http = client();

    let response = http
        .get(format!("{base}/api/auth/twitter"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "api_not_configured");

    let redirected = http
        .get(format!("{base}/api/auth/twitter?redirect=true"))
        .send()
        .await
        .unwrap();
    assert_eq!(
        location(&redirected),
        "http://localhost:3000/dashboard?error=api_not_configured"
    );

    let env: Value = http
        .get(format!("{base}/api/test-env"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(env["environment"]["hasApiKey"], false);
    assert_eq!(env["twitterConfigured"], false);
    assert_eq!(env["missing"], json!(["X_API_KEY", "X_API_SECRET"]));
}

#[tokio::test]
async fn test_tweet_validation_happens_before_network() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/tweets"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&upstream)
        .await;

    let addr = start_app(config(&upstream, true)).await;
    let http = client();
    let cookies = "twitter_access_token=t; twitter_access_token_secret=s";

    let response = http
        .post(format!("http://{addr}/api/tweet"))
        .header(header::COOKIE, cookies)
        .json(&json!({ "text": "a".repeat(281) }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("281 characters"));

    let empty = http
        .post(format!("http://{addr}/api/tweet"))
        .header(header::COOKIE, cookies)
        .json(&json!({ "text": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_post_without_credentials_is_unauthorized() {
    let upstream = MockServer::start().await;
    let addr = start_app(config(&upstream, true)).await;

    let response = client()
        .post(format!("http://{addr}/api/tweet"))
        .json(&json!({ "text": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_upstream_401_clears_cookies() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/tweets"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "title": "Unauthorized" })))
        .mount(&upstream)
        .await;

    let addr = start_app(config(&upstream, true)).await;
    let response = client()
        .post(format!("http://{addr}/api/tweet"))
        .header(
            header::COOKIE,
            "twitter_access_token=t; twitter_access_token_secret=s",
        )
        .json(&json!({ "text": "hello" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let cleared: Vec<_> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    assert_eq!(cleared.len(), 4);
    assert!(cleared.iter().all(|c| c.contains("Max-Age=0")));
}

#[tokio::test]
async fn test_second_post_hits_cooldown() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/tweets"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "data": { "id": "1" } })))
        .expect(1)
        .mount(&upstream)
        .await;

    let addr = start_app(config(&upstream, true)).await;
    let http = client();
    let cookies = "twitter_access_token=t; twitter_access_token_secret=s";

    let first = http
        .post(format!("http://{addr}/api/tweet"))
        .header(header::COOKIE, cookies)
        .json(&json!({ "text": "one" }))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = http
        .post(format!("http://{addr}/api/tweet"))
        .header(header::COOKIE, cookies)
        .json(&json!({ "text": "two" }))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: Value = second.json().await.unwrap();
    assert_eq!(body["error"], "Please wait 240 more minutes between tweets");
}

#[tokio::test]
async fn test_pending_queue_flow() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/trending"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "coins": [{ "item": {
                "name": "Pepe", "symbol": "PEPE",
                "data": { "price_change_percentage_24h": { "usd": 4.2 }, "total_volume": "$2,000,000" }
            } }]
        })))
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/public/coins/list/v2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": "1", "symbol": "SOL", "name": "Solana", "sentiment": 77, "percent_change_24h": 6.0 }]
        })))
        .mount(&upstream)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "\"Solana sentiment at 77% 🚀 #SOL\"" } }]
        })))
        .mount(&upstream)
        .await;
    Mock::given(method("POST"))
        .and(path("/2/tweets"))
        .and(body_partial_json(json!({ "text": "Solana sentiment at 77% 🚀 #SOL" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "data": { "id": "9" } })))
        .expect(1)
        .mount(&upstream)
        .await;

    let addr = start_app(config(&upstream, true)).await;
    let base = format!("http://{addr}");
    let http = client();
    let cookies = "twitter_access_token=t; twitter_access_token_secret=s";

    let created = http
        .post(format!("{base}/api/tweets/pending"))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let created: Value = created.json().await.unwrap();
    let id = created["tweet"]["id"].as_str().unwrap().to_string();
    assert_eq!(created["tweet"]["type"], "MARKET_TRENDS");
    assert_eq!(created["tweet"]["content"], "Solana sentiment at 77% 🚀 #SOL");

    let listed: Value = http
        .get(format!("{base}/api/tweets/pending"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["tweets"].as_array().unwrap().len(), 1);
    assert_eq!(listed["latest"]["id"], id.as_str());

    // Posting requires approval first
    let unapproved = http
        .post(format!("{base}/api/tweets/pending/{id}/post"))
        .header(header::COOKIE, cookies)
        .send()
        .await
        .unwrap();
    assert_eq!(unapproved.status(), StatusCode::CONFLICT);

    let approved = http
        .post(format!("{base}/api/tweets/pending/{id}/approve"))
        .send()
        .await
        .unwrap();
    assert_eq!(approved.status(), StatusCode::OK);

    let missing = http
        .post(format!("{base}/api/tweets/pending/nope/approve"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let posted = http
        .post(format!("{base}/api/tweets/pending/{id}/post"))
        .header(header::COOKIE, cookies)
        .send()
        .await
        .unwrap();
    assert_eq!(posted.status(), StatusCode::OK);

    let listed: Value = http
        .get(format!("{base}/api/tweets/pending"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(listed["tweets"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_bot_start_stop() {
    let upstream = MockServer::start().await;
    let addr = start_app(config(&upstream, true)).await;
    let base = format!("http://{addr}");
    let http = client();

    let status: Value = http
        .get(format!("{base}/api/bot/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["running"], false);
    assert_eq!(status["intervalMinutes"], 240);

    let started: Value = http
        .post(format!("{base}/api/bot/start"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(started["started"], true);
    assert_eq!(started["status"]["running"], true);

    let again: Value = http
        .post(format!("{base}/api/bot/start"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(again["started"], false);

    let stopped: Value = http
        .post(format!("{base}/api/bot/stop"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stopped["stopped"], true);
    assert_eq!(stopped["status"]["running"], false);
}
