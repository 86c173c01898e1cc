//! CipherX: crypto-market tweet drafting and posting service.
//!
//! Market and sentiment feeds are fetched through a shared TTL cache, turned
//! into a prompt, written up by a language model and published to Twitter/X
//! with OAuth1-signed requests. A scheduler posts on an interval with a
//! cooldown and single-flight guard; an approval queue holds drafts for an
//! operator.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod bot;
pub mod cache;
pub mod clock;
pub mod error;
pub mod generator;
pub mod llm;
pub mod market;
pub mod prompt;
pub mod queue;
pub mod server;
pub mod twitter;

pub use bot::{BotStatus, TweetBot};
pub use cache::{SharedCache, TtlCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{validate_tweet, BotError, MAX_TWEET_CHARS};
pub use generator::{Draft, TweetGenerator, TweetSource};
pub use queue::{PendingTweet, TweetQueue, TweetType};
pub use server::{build_router, AppState};
