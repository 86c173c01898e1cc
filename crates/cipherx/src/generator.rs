//! Fetch, compose and write: the tweet-generation pipeline.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::error::BotError;
use crate::llm::{Persona, TweetWriter};
use crate::market::{MarketFeed, MarketSnapshot, SentimentFeed};
use crate::prompt;

/// A generated tweet together with the data it was drafted from.
#[derive(Debug, Clone)]
pub struct Draft {
    pub content: String,
    pub snapshot: MarketSnapshot,
}

/// Source of tweet text for the scheduler and the approval queue.
#[async_trait]
pub trait TweetSource: Send + Sync {
    /// Short market update for automatic posting.
    async fn generate_update(&self) -> Result<String, BotError>;

    /// Longer insight draft for operator approval.
    async fn draft(&self) -> Result<Draft, BotError>;
}

/// Production pipeline over the two market feeds and a writer.
pub struct TweetGenerator {
    market: Arc<dyn MarketFeed>,
    sentiment: Arc<dyn SentimentFeed>,
    writer: Arc<dyn TweetWriter>,
}

impl TweetGenerator {
    #[must_use]
    pub fn new(
        market: Arc<dyn MarketFeed>,
        sentiment: Arc<dyn SentimentFeed>,
        writer: Arc<dyn TweetWriter>,
    ) -> Self {
        Self {
            market,
            sentiment,
            writer,
        }
    }

    /// Fetch both feeds concurrently; either failing aborts the cycle.
    pub async fn fetch_snapshot(&self) -> Result<MarketSnapshot, BotError> {
        let (trending, sentiment) = tokio::try_join!(
            self.market.trending(),
            self.sentiment.top_coins_by_sentiment()
        )?;
        Ok(MarketSnapshot {
            trending,
            sentiment,
        })
    }
}

#[async_trait]
impl TweetSource for TweetGenerator {
    #[instrument(skip(self))]
    async fn generate_update(&self) -> Result<String, BotError> {
        info!("Starting tweet generation");
        let snapshot = self.fetch_snapshot().await?;
        let prompt = prompt::market_update(&snapshot.trending, &snapshot.sentiment)?;
        self.writer.complete(Persona::MarketUpdate, &prompt).await
    }

    #[instrument(skip(self))]
    async fn draft(&self) -> Result<Draft, BotError> {
        let snapshot = self.fetch_snapshot().await?;
        let prompt = prompt::insights(&snapshot)?;
        let content = self.writer.complete(Persona::Insights, &prompt).await?;
        Ok(Draft { content, snapshot })
    }
}
