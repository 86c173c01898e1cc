//! Language-model tweet writing.

pub mod openai;

use async_trait::async_trait;
use tracing::warn;

use crate::error::{BotError, MAX_TWEET_CHARS};

pub use openai::OpenAiWriter;

/// Longest prompt sent to the model, in characters.
pub const MAX_PROMPT_CHARS: usize = 2000;

/// Completions are cut here when too long, leaving room for the ellipsis.
const TRUNCATE_AT: usize = MAX_TWEET_CHARS - 3;

/// System instructions the model writes under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persona {
    /// Concise analyst voice used for scheduled posts.
    MarketUpdate,
    /// Brand voice used for drafts awaiting approval.
    Insights,
}

impl Persona {
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::MarketUpdate => "MARKET_UPDATE",
            Self::Insights => "INSIGHTS",
        }
    }

    #[must_use]
    pub fn system_prompt(self) -> &'static str {
        match self {
            Self::MarketUpdate => {
                "You are a crypto market analyst crafting engaging tweets. Your tweets MUST be \
                 under 280 characters, including emojis and hashtags. Keep it concise but \
                 informative. Use max 2-3 hashtags."
            }
            Self::Insights => {
                "You are a specialized crypto market insights generator. Create engaging tweets \
                 for CipherX, a crypto intelligence platform that posts market insights and \
                 social sentiment trends. Use emojis, hashtags, and an engaging hook. Maximum \
                 280 characters."
            }
        }
    }
}

/// Anything that turns a prompt into tweet text.
#[async_trait]
pub trait TweetWriter: Send + Sync {
    /// Complete `prompt` under `persona`. Output is already cleaned with
    /// [`ensure_valid_tweet`].
    async fn complete(&self, persona: Persona, prompt: &str) -> Result<String, BotError>;
}

/// Clean model output into something postable.
///
/// Strips surrounding quotes, collapses whitespace, and cuts over-long text at
/// the last word boundary before appending `...`.
#[must_use]
pub fn ensure_valid_tweet(raw: &str) -> String {
    let unquoted = raw
        .trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '\u{201c}' | '\u{201d}'));
    let collapsed = unquoted.split_whitespace().collect::<Vec<_>>().join(" ");

    let length = collapsed.chars().count();
    if length <= MAX_TWEET_CHARS {
        return collapsed;
    }

    warn!(length, "Generated tweet too long, truncating");
    let head: String = collapsed.chars().take(TRUNCATE_AT).collect();
    let cut = match head.rfind(' ') {
        Some(space) if space > 0 => &head[..space],
        _ => head.as_str(),
    };
    format!("{}...", cut.trim_end())
}

/// Bound a prompt to [`MAX_PROMPT_CHARS`].
#[must_use]
pub fn bound_prompt(prompt: &str) -> String {
    prompt.chars().take(MAX_PROMPT_CHARS).collect()
}
