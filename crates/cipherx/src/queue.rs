//! Drafts awaiting operator approval.
//!
//! The queue keeps the [`MAX_PENDING`] most recent drafts. Drafts older than
//! [`PENDING_TTL_MINUTES`] or already posted are purged whenever the pending
//! list is read.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::BotError;
use crate::generator::TweetSource;
use crate::market::MarketSnapshot;

pub const MAX_PENDING: usize = 10;
pub const PENDING_TTL_MINUTES: i64 = 30;

/// Content category of a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TweetType {
    #[default]
    MarketTrends,
    Hype,
    Sentiment,
    Memecoins,
    GemAlert,
}

/// A drafted, not yet published tweet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTweet {
    pub id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub tweet_type: TweetType,
    pub created_at: DateTime<Utc>,
    /// Market data the draft was written from; absent for manual drafts.
    pub metrics: Option<MarketSnapshot>,
    pub approved: bool,
    pub posted: bool,
}

/// Bounded, expiring list of drafts.
pub struct TweetQueue {
    entries: Mutex<VecDeque<PendingTweet>>,
    clock: Arc<dyn Clock>,
}

impl TweetQueue {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(MAX_PENDING + 1)),
            clock,
        }
    }

    /// Generate a draft from live market data and enqueue it.
    pub async fn create_pending(&self, source: &dyn TweetSource) -> Result<PendingTweet, BotError> {
        let draft = source.draft().await?;
        let tweet = self.new_entry(draft.content, TweetType::MarketTrends, Some(draft.snapshot));
        self.push(tweet.clone());
        info!(id = %tweet.id, "Created pending tweet");
        Ok(tweet)
    }

    /// Enqueue a manually written draft.
    pub fn add(&self, content: impl Into<String>, tweet_type: TweetType) -> PendingTweet {
        let tweet = self.new_entry(content.into(), tweet_type, None);
        self.push(tweet.clone());
        tweet
    }

    /// Append, dropping the oldest entry past [`MAX_PENDING`] whatever its state.
    pub fn push(&self, tweet: PendingTweet) {
        let mut entries = self.lock();
        entries.push_back(tweet);
        while entries.len() > MAX_PENDING {
            if let Some(evicted) = entries.pop_front() {
                debug!(id = %evicted.id, "Evicting oldest pending tweet");
            }
        }
    }

    /// Purge stale and posted drafts, then list those neither posted nor approved.
    #[must_use]
    pub fn pending(&self) -> Vec<PendingTweet> {
        let cutoff = self.clock.now() - Duration::minutes(PENDING_TTL_MINUTES);
        let mut entries = self.lock();
        entries.retain(|t| t.created_at > cutoff && !t.posted);
        entries
            .iter()
            .filter(|t| !t.approved && !t.posted)
            .cloned()
            .collect()
    }

    /// Mark a draft approved. Does not post it.
    #[must_use]
    pub fn approve(&self, id: &str) -> Option<PendingTweet> {
        let mut entries = self.lock();
        let tweet = entries.iter_mut().find(|t| t.id == id)?;
        tweet.approved = true;
        info!(id, "Approved pending tweet");
        Some(tweet.clone())
    }

    /// Look up a draft without changing it.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<PendingTweet> {
        self.lock().iter().find(|t| t.id == id).cloned()
    }

    /// Mark a draft posted; it is purged on the next read.
    pub fn mark_posted(&self, id: &str) -> bool {
        let mut entries = self.lock();
        match entries.iter_mut().find(|t| t.id == id) {
            Some(tweet) => {
                tweet.posted = true;
                true
            }
            None => false,
        }
    }

    /// Most recently enqueued draft that has not been posted or purged.
    #[must_use]
    pub fn latest(&self) -> Option<PendingTweet> {
        self.lock().iter().rev().find(|t| !t.posted).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn new_entry(
        &self,
        content: String,
        tweet_type: TweetType,
        metrics: Option<MarketSnapshot>,
    ) -> PendingTweet {
        PendingTweet {
            id: Uuid::new_v4().to_string(),
            content,
            tweet_type,
            created_at: self.clock.now(),
            metrics,
            approved: false,
            posted: false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<PendingTweet>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::generator::Draft;
    use async_trait::async_trait;

    fn queue() -> (Arc<ManualClock>, TweetQueue) {
        let clock = Arc::new(ManualClock::default());
        let queue = TweetQueue::new(clock.clone());
        (clock, queue)
    }

    #[test]
    fn test_eleven_inserts_keep_ten_most_recent() {
        let (_clock, queue) = queue();
        for i in 0..11 {
            queue.add(format!("tweet {i}"), TweetType::Hype);
        }

        let pending = queue.pending();
        assert_eq!(pending.len(), MAX_PENDING);
        assert_eq!(pending[0].content, "tweet 1");
        assert_eq!(pending[9].content, "tweet 10");
    }

    #[test]
    fn test_eviction_ignores_approval() {
        let (_clock, queue) = queue();
        let first = queue.add("approved", TweetType::GemAlert);
        let _ = queue.approve(&first.id);
        for i in 0..10 {
            queue.add(format!("tweet {i}"), TweetType::Hype);
        }
        assert!(queue.get(&first.id).is_none());
    }

    #[test]
    fn test_expires_after_thirty_minutes() {
        let (clock, queue) = queue();
        queue.add("old", TweetType::MarketTrends);

        clock.advance(Duration::minutes(29));
        assert_eq!(queue.pending().len(), 1);

        clock.advance(Duration::minutes(2));
        assert!(queue.pending().is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_approve_hides_from_pending_but_keeps_entry() {
        let (_clock, queue) = queue();
        let tweet = queue.add("draft", TweetType::Sentiment);

        let approved = queue.approve(&tweet.id).unwrap();
        assert!(approved.approved);
        assert!(!approved.posted);
        assert!(queue.pending().is_empty());
        assert_eq!(queue.len(), 1);

        assert!(queue.approve("missing").is_none());
    }

    #[test]
    fn test_posted_is_purged() {
        let (_clock, queue) = queue();
        let tweet = queue.add("draft", TweetType::Memecoins);
        assert!(queue.mark_posted(&tweet.id));
        assert!(!queue.mark_posted("missing"));

        assert!(queue.get(&tweet.id).unwrap().posted);
        assert!(queue.latest().is_none());
        assert!(queue.pending().is_empty());
        assert!(queue.get(&tweet.id).is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_tweet_type_wire_names() {
        assert_eq!(serde_json::to_string(&TweetType::GemAlert).unwrap(), "\"GEM_ALERT\"");
        assert_eq!(
            serde_json::to_string(&TweetType::MarketTrends).unwrap(),
            "\"MARKET_TRENDS\""
        );
    }

    struct FixedDraft;

    #[async_trait]
    impl TweetSource for FixedDraft {
        async fn generate_update(&self) -> Result<String, BotError> {
            Ok("update".into())
        }

        async fn draft(&self) -> Result<Draft, BotError> {
            Ok(Draft {
                content: "insight".into(),
                snapshot: MarketSnapshot {
                    trending: vec![],
                    sentiment: vec![],
                },
            })
        }
    }

    #[tokio::test]
    async fn test_create_pending_attaches_metrics() {
        let (_clock, queue) = queue();
        let tweet = queue.create_pending(&FixedDraft).await.unwrap();
        assert_eq!(tweet.content, "insight");
        assert_eq!(tweet.tweet_type, TweetType::MarketTrends);
        assert!(tweet.metrics.is_some());
        assert_eq!(queue.pending(), vec![tweet]);
    }
}
