//! LunarCrush social-sentiment feed.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

use crate::error::BotError;

use super::{cached, store, CoinSentiment, SharedCache, SentimentFeed};

pub const CACHE_KEY: &str = "lunarcrush_data";
pub const CACHE_TTL_MINUTES: u64 = 240;

#[derive(Debug, Deserialize)]
struct CoinListResponse {
    #[serde(default)]
    data: Vec<CoinSentiment>,
}

/// Coins ordered by sentiment, cached for [`CACHE_TTL_MINUTES`].
pub struct LunarCrushClient {
    http: Client,
    api_key: String,
    base_url: String,
    cache: Arc<SharedCache>,
}

impl LunarCrushClient {
    #[must_use]
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, cache: Arc<SharedCache>) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cache,
        }
    }

    async fn fetch(&self) -> Result<Vec<CoinSentiment>, BotError> {
        let url = format!("{}/public/coins/list/v2", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("sort", "sentiment")])
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| BotError::Fetch(format!("LunarCrush request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "LunarCrush returned an error");
            return Err(BotError::Fetch(format!("LunarCrush returned {status}")));
        }

        let parsed: CoinListResponse = response
            .json()
            .await
            .map_err(|e| BotError::Fetch(format!("LunarCrush response unreadable: {e}")))?;
        Ok(parsed.data)
    }
}

#[async_trait]
impl SentimentFeed for LunarCrushClient {
    #[instrument(skip(self))]
    async fn top_coins_by_sentiment(&self) -> Result<Vec<CoinSentiment>, BotError> {
        if let Some(coins) = cached::<Vec<CoinSentiment>>(&self.cache, CACHE_KEY) {
            debug!(count = coins.len(), "LunarCrush cache hit");
            return Ok(coins);
        }

        let coins = self.fetch().await?;
        info!(
            count = coins.len(),
            first = coins.first().map_or("none", |c| c.name.as_str()),
            "Fetched LunarCrush sentiment"
        );
        store(&self.cache, CACHE_KEY, &coins, CACHE_TTL_MINUTES);
        Ok(coins)
    }
}
