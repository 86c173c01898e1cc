//! Market and social-sentiment data feeds.
//!
//! Both providers cache their mapped output in one shared
//! `TtlCache<serde_json::Value>`, so a restart or a shape change upstream
//! only costs one refetch.

pub mod coingecko;
pub mod lunarcrush;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use tracing::debug;

use crate::cache::SharedCache;
use crate::error::BotError;

use coingecko::usd_amount;

pub use coingecko::CoinGeckoClient;
pub use lunarcrush::LunarCrushClient;

/// How many coins each insight list keeps.
pub const INSIGHT_LIMIT: usize = 5;

/// One entry from the trending-coins feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendingCoin {
    pub name: String,
    pub symbol: String,
    /// Percentage, e.g. `12.5` for +12.5%.
    pub price_change_24h: f64,
    /// USD.
    pub volume_24h: f64,
}

/// One entry from the social-sentiment feed.
///
/// Missing, null or oddly typed fields decode to empty strings and zeros
/// instead of failing the whole list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoinSentiment {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub symbol: String,
    #[serde(deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub price: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub percent_change_24h: f64,
    /// 0-100, share of positive posts.
    #[serde(deserialize_with = "lenient_f64")]
    pub sentiment: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub social_volume_24h: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub galaxy_score: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub volume_24h: f64,
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(usd_amount(&value).unwrap_or_default())
}

/// Trending-coins provider.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    async fn trending(&self) -> Result<Vec<TrendingCoin>, BotError>;
}

/// Social-sentiment provider.
#[async_trait]
pub trait SentimentFeed: Send + Sync {
    async fn top_coins_by_sentiment(&self) -> Result<Vec<CoinSentiment>, BotError>;
}

/// Overall direction of the sentiment feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketMood {
    Bullish,
    Bearish,
    Neutral,
}

impl MarketMood {
    /// Bullish above 55 mean sentiment, bearish below 45.
    #[must_use]
    pub fn from_coins(coins: &[CoinSentiment]) -> Self {
        if coins.is_empty() {
            return Self::Neutral;
        }
        #[allow(clippy::cast_precision_loss)]
        let mean = coins.iter().map(|c| c.sentiment).sum::<f64>() / coins.len() as f64;
        if mean > 55.0 {
            Self::Bullish
        } else if mean < 45.0 {
            Self::Bearish
        } else {
            Self::Neutral
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bullish => "bullish",
            Self::Bearish => "bearish",
            Self::Neutral => "neutral",
        }
    }
}

impl std::fmt::Display for MarketMood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived rankings over a sentiment list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketInsights {
    pub top_gainers: Vec<CoinSentiment>,
    pub top_sentiment: Vec<CoinSentiment>,
    pub top_social: Vec<CoinSentiment>,
    pub mood: MarketMood,
}

impl MarketInsights {
    #[must_use]
    pub fn from_coins(coins: &[CoinSentiment]) -> Self {
        Self {
            top_gainers: top_by(coins, |c| c.percent_change_24h),
            top_sentiment: top_by(coins, |c| c.sentiment),
            top_social: top_by(coins, |c| c.social_volume_24h),
            mood: MarketMood::from_coins(coins),
        }
    }
}

/// Both feeds, fetched for one generation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    pub trending: Vec<TrendingCoin>,
    pub sentiment: Vec<CoinSentiment>,
}

impl MarketSnapshot {
    #[must_use]
    pub fn insights(&self) -> MarketInsights {
        MarketInsights::from_coins(&self.sentiment)
    }
}

/// Highest [`INSIGHT_LIMIT`] coins by `metric`, stable for ties.
fn top_by(coins: &[CoinSentiment], metric: impl Fn(&CoinSentiment) -> f64) -> Vec<CoinSentiment> {
    let mut sorted = coins.to_vec();
    sorted.sort_by(|a, b| metric(b).partial_cmp(&metric(a)).unwrap_or(Ordering::Equal));
    sorted.truncate(INSIGHT_LIMIT);
    sorted
}

/// Read a typed value from the shared cache; undecodable entries are misses.
pub(crate) fn cached<T: DeserializeOwned>(cache: &SharedCache, key: &str) -> Option<T> {
    let value = cache.get(key)?;
    match serde_json::from_value(value) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            debug!(key, error = %e, "Discarding undecodable cache entry");
            cache.remove(key);
            None
        }
    }
}

/// Store a typed value in the shared cache.
pub(crate) fn store<T: Serialize>(cache: &SharedCache, key: &str, value: &T, ttl_minutes: u64) {
    if let Ok(encoded) = serde_json::to_value(value) {
        cache.set(key, encoded, ttl_minutes);
    }
}
