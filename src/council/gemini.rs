//! Google Gemini council member.
//!
//! `SignalSource` against the generateContent endpoint. The API key
//! travels in a header rather than a bearer token, and the system
//! prompt rides in a dedicated `systemInstruction` block.

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

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

const MAX_RETRIES: u32 = 2;
const BASE_BACKOFF_MS: u64 = 500;

pub const GEMINI_SOURCE_ID: &str = "gemini";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: ContentPart,
    contents: Vec<ContentPart>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct ContentPart {
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TextPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ContentPart,
}

pub struct GeminiSource {
    http: Client,
    api_key: SecretString,
    model: String,
    max_tokens: u32,
    weight: f64,
    timeout: Duration,
}

impl GeminiSource {
    pub fn new(cfg: &LlmSourceConfig, api_key: SecretString) -> Result<Self, CourtsideError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| CourtsideError::Config(format!("Gemini HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_key,
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            weight: cfg.weight,
            timeout: Duration::from_secs(cfg.timeout_secs),
        })
    }

    fn endpoint(&self) -> String {
        format!("{GEMINI_API_BASE}/{}:generateContent", self.model)
    }

    async fn call_api(&self, system: &str, user_message: &str) -> Result<String, CourtsideError> {
        let request = GenerateRequest {
            system_instruction: ContentPart {
                parts: vec![TextPart {
                    text: system.to_string(),
                }],
            },
            contents: vec![ContentPart {
                parts: vec![TextPart {
                    text: user_message.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: self.max_tokens,
                response_mime_type: "application/json".to_string(),
            },
        };

        let mut last_error = String::new();

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                debug!(attempt, delay_ms = delay, "Retrying Gemini API call");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let resp = self
                .http
                .post(self.endpoint())
                .header("x-goog-api-key", self.api_key.expose_secret())
                .json(&request)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let body: GenerateResponse =
                            response.json().await.map_err(|e| CourtsideError::Source {
                                source_id: GEMINI_SOURCE_ID.to_string(),
                                message: format!("response decode: {e}"),
                            })?;
                        return body
                            .candidates
                            .first()
                            .map(|c| {
                                c.content
                                    .parts
                                    .iter()
                                    .map(|p| p.text.as_str())
                                    .collect::<Vec<_>>()
                                    .join("")
                            })
                            .filter(|t| !t.is_empty())
                            .ok_or_else(|| CourtsideError::Source {
                                source_id: GEMINI_SOURCE_ID.to_string(),
                                message: "empty candidate list".to_string(),
                            });
                    }

                    let error_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.as_u16() >= 500 {
                        warn!(status = %status, attempt, "Retryable Gemini API error");
                        last_error = format!("HTTP {status}: {error_text}");
                        continue;
                    }

                    return Err(CourtsideError::Source {
                        source_id: GEMINI_SOURCE_ID.to_string(),
                        message: format!("HTTP {status}: {error_text}"),
                    });
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Gemini request failed");
                    last_error = format!("request error: {e}");
                    continue;
                }
            }
        }

        Err(CourtsideError::Source {
            source_id: GEMINI_SOURCE_ID.to_string(),
            message: format!("failed after {MAX_RETRIES} retries: {last_error}"),
        })
    }
}

#[async_trait]
impl SignalSource for GeminiSource {
    fn source_id(&self) -> &str {
        GEMINI_SOURCE_ID
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn solicit(&self, pack: &FactPack) -> Result<SourceReply, CourtsideError> {
        debug!(model = %self.model, game_id = %pack.game.game_id, "Soliciting Gemini vote");
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
            weight: 0.8,
            model: "gemini-2.0-flash".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            timeout_secs: 20,
            max_tokens: 1024,
        }
    }

    #[test]
    fn test_construction_and_endpoint() {
        let source = GeminiSource::new(&cfg(), SecretString::new("key".into())).unwrap();
        assert_eq!(source.source_id(), "gemini");
        assert!(source.endpoint().ends_with("gemini-2.0-flash:generateContent"));
    }

    #[test]
    fn test_request_uses_camel_case() {
        let req = GenerateRequest {
            system_instruction: ContentPart {
                parts: vec![TextPart { text: "s".into() }],
            },
            contents: vec![],
            generation_config: GenerationConfig {
                max_output_tokens: 512,
                response_mime_type: "application/json".to_string(),
            },
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("systemInstruction").is_some());
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 512);
    }

    #[test]
    fn test_response_text_extraction() {
        let body: GenerateResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "{\"favored\": \"home\"}"}]}}]}"#,
        )
        .unwrap();
        let text: String = body.candidates[0]
            .content
            .parts
            .iter()
            .map(|p| p.text.as_str())
            .collect();
        assert!(text.contains("favored"));
    }
}
