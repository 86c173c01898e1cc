//! Natural-language prompts composed from market data.

use std::fmt::Write as _;

use crate::error::BotError;
use crate::market::{CoinSentiment, MarketInsights, MarketSnapshot, TrendingCoin};

fn missing_data() -> BotError {
    BotError::Fetch("missing data from market providers".to_string())
}

fn highest_sentiment(coins: &[CoinSentiment]) -> Option<&CoinSentiment> {
    coins.iter().max_by(|a, b| {
        a.sentiment
            .partial_cmp(&b.sentiment)
            .unwrap_or(std::cmp::Ordering::Equal)
    })
}

/// Short market update: top trending coin and the highest-sentiment coin.
pub fn market_update(trending: &[TrendingCoin], sentiment: &[CoinSentiment]) -> Result<String, BotError> {
    let top = trending.first().ok_or_else(missing_data)?;
    let loved = highest_sentiment(sentiment).ok_or_else(missing_data)?;

    Ok(format!(
        "Market Update:\n\
         - Top Trending: {} (${}) ({:+.2}% 24h)\n\
         - Highest Sentiment: {} ({:.0}% positive)\n\
         - 24h Volume: ${:.2}M",
        top.name,
        top.symbol,
        top.price_change_24h,
        loved.name,
        loved.sentiment,
        top.volume_24h / 1e6,
    ))
}

/// Longer brief for approval drafts: sentiment leader, top gainer, social
/// leader, overall mood and the top trending coin.
pub fn insights(snapshot: &MarketSnapshot) -> Result<String, BotError> {
    let MarketInsights {
        top_gainers,
        top_sentiment,
        top_social,
        mood,
    } = snapshot.insights();

    let (Some(loved), Some(gainer), Some(social)) =
        (top_sentiment.first(), top_gainers.first(), top_social.first())
    else {
        return Err(missing_data());
    };
    let trending = snapshot.trending.first().ok_or_else(missing_data)?;

    let mut prompt = String::from("Create an engaging tweet based on these market insights:\n\n");
    let _ = writeln!(
        prompt,
        "Top Sentiment Coin: {} (${})\n- Sentiment Score: {:.0}%\n- 24h Change: {:+.2}%\n- Social Volume: {:.0}\n",
        loved.name, loved.symbol, loved.sentiment, loved.percent_change_24h, loved.social_volume_24h
    );
    let _ = writeln!(
        prompt,
        "Top Gainer: {} (${})\n- 24h Change: {:+.2}%\n- Price: ${}\n- Volume: ${:.2}M\n",
        gainer.name,
        gainer.symbol,
        gainer.percent_change_24h,
        gainer.price,
        gainer.volume_24h / 1e6
    );
    let _ = writeln!(
        prompt,
        "Top Social Activity: {} (${})\n- Social Volume: {:.0}\n- Sentiment: {:.0}%\n- 24h Change: {:+.2}%\n",
        social.name, social.symbol, social.social_volume_24h, social.sentiment, social.percent_change_24h
    );
    let _ = write!(
        prompt,
        "Market Sentiment: {mood}\nTop Trending: {} (${})\n- 24h Volume: ${:.2}M\n- Price Change: {:+.2}%",
        trending.name,
        trending.symbol,
        trending.volume_24h / 1e6,
        trending.price_change_24h
    );
    Ok(prompt)
}
