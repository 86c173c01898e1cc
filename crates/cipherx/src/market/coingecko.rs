//! CoinGecko trending-coins feed.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

use crate::error::BotError;

use super::{cached, store, SharedCache, MarketFeed, TrendingCoin};

pub const CACHE_KEY: &str = "coingecko_trending";
pub const CACHE_TTL_MINUTES: u64 = 5;

const API_KEY_HEADER: &str = "x-cg-demo-api-key";

#[derive(Debug, Deserialize)]
struct TrendingResponse {
    #[serde(default)]
    coins: Vec<TrendingEntry>,
}

#[derive(Debug, Deserialize)]
struct TrendingEntry {
    item: TrendingItem,
}

#[derive(Debug, Deserialize)]
struct TrendingItem {
    name: String,
    symbol: String,
    #[serde(default)]
    data: Option<TrendingItemData>,
}

#[derive(Debug, Default, Deserialize)]
struct TrendingItemData {
    #[serde(default)]
    price_change_percentage_24h: Option<Value>,
    #[serde(default)]
    total_volume: Option<Value>,
}

impl From<TrendingItem> for TrendingCoin {
    fn from(item: TrendingItem) -> Self {
        let data = item.data.unwrap_or_default();
        Self {
            name: item.name,
            symbol: item.symbol,
            price_change_24h: data
                .price_change_percentage_24h
                .as_ref()
                .and_then(usd_amount)
                .unwrap_or(0.0),
            volume_24h: data
                .total_volume
                .as_ref()
                .and_then(usd_amount)
                .unwrap_or(0.0),
        }
    }
}

/// Read a USD figure that may be a number, a `"$1,234.5"` string, or an
/// object keyed by currency.
pub(super) fn usd_amount(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s.chars().filter(|c| !matches!(c, '$' | ',')).collect();
            cleaned.trim().parse().ok()
        }
        Value::Object(map) => map.get("usd").and_then(usd_amount),
        _ => None,
    }
}

/// Trending coins from CoinGecko, cached for [`CACHE_TTL_MINUTES`].
pub struct CoinGeckoClient {
    http: Client,
    api_key: String,
    base_url: String,
    cache: Arc<SharedCache>,
}

impl CoinGeckoClient {
    #[must_use]
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, cache: Arc<SharedCache>) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cache,
        }
    }

    async fn fetch(&self) -> Result<Vec<TrendingCoin>, BotError> {
        let url = format!("{}/search/trending", self.base_url);
        let response = self
            .http
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| BotError::Fetch(format!("CoinGecko request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "CoinGecko returned an error");
            return Err(BotError::Fetch(format!("CoinGecko returned {status}")));
        }

        let parsed: TrendingResponse = response
            .json()
            .await
            .map_err(|e| BotError::Fetch(format!("CoinGecko response unreadable: {e}")))?;

        Ok(parsed.coins.into_iter().map(|entry| entry.item.into()).collect())
    }
}

#[async_trait]
impl MarketFeed for CoinGeckoClient {
    #[instrument(skip(self))]
    async fn trending(&self) -> Result<Vec<TrendingCoin>, BotError> {
        if let Some(coins) = cached::<Vec<TrendingCoin>>(&self.cache, CACHE_KEY) {
            debug!(count = coins.len(), "CoinGecko cache hit");
            return Ok(coins);
        }

        let coins = self.fetch().await?;
        info!(
            count = coins.len(),
            first = coins.first().map_or("none", |c| c.name.as_str()),
            "Fetched CoinGecko trending coins"
        );
        store(&self.cache, CACHE_KEY, &coins, CACHE_TTL_MINUTES);
        Ok(coins)
    }
}
