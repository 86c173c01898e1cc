//! OpenAI chat-completions tweet writer.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

use crate::cache::SharedCache;
use crate::error::BotError;

use super::{bound_prompt, ensure_valid_tweet, Persona, TweetWriter};

/// Completions are reused for this long for an identical prompt.
pub const CACHE_TTL_MINUTES: u64 = 60;

const MAX_TOKENS: u32 = 100;
const TEMPERATURE: f32 = 0.7;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiError,
}

/// Writes tweets with an OpenAI chat model.
pub struct OpenAiWriter {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
    cache: Arc<SharedCache>,
}

impl OpenAiWriter {
    #[must_use]
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        cache: Arc<SharedCache>,
    ) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            cache,
        }
    }

    fn cache_key(persona: Persona, prompt: &str) -> String {
        format!("tweet_template_{}_{prompt}", persona.key())
    }

    async fn request(&self, persona: Persona, prompt: &str) -> Result<String, BotError> {
        let user = format!(
            "Create a tweet based on this market data. Remember to keep it under 280 characters:\n{prompt}"
        );
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: persona.system_prompt(),
                },
                ChatMessage {
                    role: "user",
                    content: &user,
                },
            ],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| BotError::Generation(format!("OpenAI request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BotError::Generation(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            error!(status = %status, "OpenAI API returned an error");
            if let Ok(error_response) = serde_json::from_str::<ApiErrorResponse>(&body) {
                return Err(BotError::Generation(format!(
                    "OpenAI API error: {}",
                    error_response.error.message
                )));
            }
            return Err(BotError::Generation(format!("OpenAI API error ({status})")));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| BotError::Generation(format!("Failed to parse response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| BotError::Generation("OpenAI returned no content".to_string()))
    }
}

#[async_trait]
impl TweetWriter for OpenAiWriter {
    #[instrument(skip(self, persona, prompt), fields(persona = persona.key(), prompt_len = prompt.len()))]
    async fn complete(&self, persona: Persona, prompt: &str) -> Result<String, BotError> {
        let prompt = bound_prompt(prompt);
        let key = Self::cache_key(persona, &prompt);

        if let Some(Value::String(cached)) = self.cache.get(&key) {
            debug!("Using cached tweet template");
            return Ok(ensure_valid_tweet(&cached));
        }

        let raw = self.request(persona, &prompt).await?;
        let tweet = ensure_valid_tweet(&raw);
        info!(length = tweet.chars().count(), "Generated tweet");

        self.cache
            .set(key, Value::String(tweet.clone()), CACHE_TTL_MINUTES);
        Ok(tweet)
    }
}
