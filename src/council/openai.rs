//! OpenAI council member.
//!
//! `SignalSource` against the Chat Completions API. Same retry shape
//! as the Anthropic client; only the wire format differs.

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

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

const MAX_RETRIES: u32 = 2;
const BASE_BACKOFF_MS: u64 = 500;

pub const OPENAI_SOURCE_ID: &str = "openai";

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiSource {
    http: Client,
    api_key: SecretString,
    model: String,
    max_tokens: u32,
    weight: f64,
    timeout: Duration,
}

impl OpenAiSource {
    pub fn new(cfg: &LlmSourceConfig, api_key: SecretString) -> Result<Self, CourtsideError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| CourtsideError::Config(format!("OpenAI HTTP client: {e}")))?;

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
        let request = ChatRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_message.to_string(),
                },
            ],
            response_format: ResponseFormat {
                format_type: "json_object".to_string(),
            },
        };

        let mut last_error = String::new();

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                debug!(attempt, delay_ms = delay, "Retrying OpenAI API call");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let resp = self
                .http
                .post(OPENAI_API_URL)
                .bearer_auth(self.api_key.expose_secret())
                .json(&request)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let body: ChatResponse =
                            response.json().await.map_err(|e| CourtsideError::Source {
                                source_id: OPENAI_SOURCE_ID.to_string(),
                                message: format!("response decode: {e}"),
                            })?;
                        return body
                            .choices
                            .first()
                            .and_then(|c| c.message.content.clone())
                            .ok_or_else(|| CourtsideError::Source {
                                source_id: OPENAI_SOURCE_ID.to_string(),
                                message: "empty completion".to_string(),
                            });
                    }

                    let error_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.as_u16() >= 500 {
                        warn!(status = %status, attempt, "Retryable OpenAI API error");
                        last_error = format!("HTTP {status}: {error_text}");
                        continue;
                    }

                    return Err(CourtsideError::Source {
                        source_id: OPENAI_SOURCE_ID.to_string(),
                        message: format!("HTTP {status}: {error_text}"),
                    });
                }
                Err(e) => {
                    warn!(attempt, error = %e, "OpenAI request failed");
                    last_error = format!("request error: {e}");
                    continue;
                }
            }
        }

        Err(CourtsideError::Source {
            source_id: OPENAI_SOURCE_ID.to_string(),
            message: format!("failed after {MAX_RETRIES} retries: {last_error}"),
        })
    }
}

#[async_trait]
impl SignalSource for OpenAiSource {
    fn source_id(&self) -> &str {
        OPENAI_SOURCE_ID
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn solicit(&self, pack: &FactPack) -> Result<SourceReply, CourtsideError> {
        debug!(model = %self.model, game_id = %pack.game.game_id, "Soliciting OpenAI vote");
        let text = self
            .call_api(super::system_prompt(), &super::build_prompt(pack))
            .await?;
        wire::extract_reply(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> LlmSourceConfig {
        LlmSourceConfig {
            enabled: true,
            weight: 0.9,
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 25,
            max_tokens: 1024,
        }
    }

    #[test]
    fn test_construction() {
        let source = OpenAiSource::new(&cfg(), SecretString::new("key".into())).unwrap();
        assert_eq!(source.source_id(), "openai");
        assert_eq!(source.weight(), 0.9);
        assert_eq!(source.timeout(), Duration::from_secs(25));
    }

    #[test]
    fn test_request_asks_for_json_object() {
        let req = ChatRequest {
            model: "gpt-4o".to_string(),
            max_tokens: 1024,
            messages: vec![],
            response_format: ResponseFormat {
                format_type: "json_object".to_string(),
            },
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_response_content_extraction() {
        let body: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": "{\"x\": 1}"}}]}"#,
        )
        .unwrap();
        assert_eq!(
            body.choices.first().and_then(|c| c.message.content.clone()),
            Some("{\"x\": 1}".to_string())
        );
    }

    #[test]
    fn test_empty_choices_handled() {
        let body: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(body.choices.is_empty());
    }
}
