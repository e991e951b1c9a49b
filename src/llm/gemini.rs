//! Google Gemini oracle (`generateContent`).
//!
//! Gemini has no separate system role in the v1beta text API, so the system
//! prompt and the request JSON are sent as one text part. JSON output is
//! requested with `responseMimeType`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{parse_decision, LlmOracle, OracleDecision, OracleRequest, SYSTEM_PROMPT};
use crate::types::AgentError;

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 1000;

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    response_mime_type: String,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

impl GenerateResponse {
    fn text(&self) -> Option<&str> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .and_then(|c| c.parts.first())
            .map(|p| p.text.as_str())
            .filter(|s| !s.trim().is_empty())
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct GeminiOracle {
    http: Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    max_tokens: u32,
}

impl GeminiOracle {
    pub fn new(base_url: &str, api_key: SecretString, model: &str, max_tokens: u32) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to build Gemini HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            max_tokens,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url,
            urlencoding::encode(&self.model)
        )
    }

    fn build_request(&self, user_message: &str) -> GenerateRequest {
        GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: format!("{SYSTEM_PROMPT}\n\nTask:\n{user_message}") }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.0,
                response_mime_type: "application/json".to_string(),
                max_output_tokens: self.max_tokens,
            },
        }
    }

    fn error(&self, message: String) -> anyhow::Error {
        AgentError::Llm { model: self.model.clone(), message }.into()
    }

    async fn call_api(&self, request: &GenerateRequest) -> Result<String> {
        let url = self.url();
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }

            let resp = self
                .http
                .post(&url)
                .header("x-goog-api-key", self.api_key.expose_secret())
                .json(request)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let body: GenerateResponse =
                            response.json().await.context("Failed to parse Gemini response")?;
                        return body
                            .text()
                            .map(str::to_string)
                            .ok_or_else(|| self.error("Gemini response missing content".to_string()));
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let error_text = response.text().await.unwrap_or_default();
                        warn!(status = %status, attempt, model = %self.model, "Retryable Gemini error");
                        last_error = Some(format!("HTTP {status}: {error_text}"));
                        continue;
                    }

                    let error_text = response.text().await.unwrap_or_default();
                    return Err(self.error(format!("Gemini request failed: {status} {error_text}")));
                }
                Err(e) => {
                    last_error = Some(format!("Request error: {e}"));
                    continue;
                }
            }
        }

        Err(self.error(format!(
            "failed after {MAX_RETRIES} retries: {}",
            last_error.unwrap_or_default()
        )))
    }
}

#[async_trait]
impl LlmOracle for GeminiOracle {
    async fn decide_yes_no(&self, request: &OracleRequest) -> Result<OracleDecision> {
        debug!(event_id = %request.evidence.event_id, model = %self.model, "Gemini settlement decision");
        let body = self.build_request(&request.to_user_message()?);
        let text = self.call_api(&body).await?;
        parse_decision(&text)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
