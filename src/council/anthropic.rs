//! Anthropic Claude council member.
//!
//! Implements `SignalSource` against the Anthropic Messages API with
//! retry and exponential backoff on rate limits and server errors.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::wire::{self, SourceReply};
use super::SignalSource;
use crate::config::LlmSourceConfig;
use crate::types::{CourtsideError, FactPack};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Maximum retries on rate limit / server errors.
const MAX_RETRIES: u32 = 2;

/// Base delay for exponential backoff (ms).
const BASE_BACKOFF_MS: u64 = 500;

pub const ANTHROPIC_SOURCE_ID: &str = "anthropic";

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct AnthropicSource {
    http: Client,
    api_key: SecretString,
    model: String,
    max_tokens: u32,
    weight: f64,
    timeout: Duration,
}

impl AnthropicSource {
    pub fn new(cfg: &LlmSourceConfig, api_key: SecretString) -> Result<Self, CourtsideError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| CourtsideError::Config(format!("Anthropic HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_key,
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            weight: cfg.weight,
            timeout: Duration::from_secs(cfg.timeout_secs),
        })
    }

    async fn call_api(&self, system: &str, user_message: &str) -> Result<String, CourtsideError> {
        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: system.to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: user_message.to_string(),
            }],
        };

        let mut last_error = String::new();

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                debug!(attempt, delay_ms = delay, "Retrying Anthropic API call");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let resp = self
                .http
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", self.api_key.expose_secret())
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&request)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let body: MessagesResponse =
                            response.json().await.map_err(|e| CourtsideError::Source {
                                source_id: ANTHROPIC_SOURCE_ID.to_string(),
                                message: format!("response decode: {e}"),
                            })?;
                        return Ok(body
                            .content
                            .iter()
                            .filter_map(|b| b.text.as_deref())
                            .collect::<Vec<_>>()
                            .join(""));
                    }

                    let error_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.as_u16() >= 500 {
                        warn!(status = %status, attempt, "Retryable Anthropic API error");
                        last_error = format!("HTTP {status}: {error_text}");
                        continue;
                    }

                    return Err(CourtsideError::Source {
                        source_id: ANTHROPIC_SOURCE_ID.to_string(),
                        message: format!("HTTP {status}: {error_text}"),
                    });
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Anthropic request failed");
                    last_error = format!("request error: {e}");
                    continue;
                }
            }
        }

        Err(CourtsideError::Source {
            source_id: ANTHROPIC_SOURCE_ID.to_string(),
            message: format!("failed after {MAX_RETRIES} retries: {last_error}"),
        })
    }
}

#[async_trait]
impl SignalSource for AnthropicSource {
    fn source_id(&self) -> &str {
        ANTHROPIC_SOURCE_ID
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn solicit(&self, pack: &FactPack) -> Result<SourceReply, CourtsideError> {
        debug!(model = %self.model, game_id = %pack.game.game_id, "Soliciting Anthropic vote");
        let text = self
            .call_api(super::system_prompt(), &super::build_prompt(pack))
            .await?;
        wire::extract_reply(&text)
    }
}
