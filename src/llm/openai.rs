//! OpenAI-compatible chat completions oracle.
//!
//! Works against OpenAI itself and any gateway exposing the same
//! `POST {base}/chat/completions` contract (OpenRouter, local servers).

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{parse_decision, LlmOracle, OracleDecision, OracleRequest, SYSTEM_PROMPT};
use crate::types::AgentError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 1000;

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
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
    #[serde(default)]
    message: Option<ChatMessage>,
}

impl ChatResponse {
    fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.as_ref())
            .map(|m| m.content.as_str())
            .filter(|s| !s.trim().is_empty())
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct OpenAiOracle {
    http: Client,
    url: String,
    api_key: SecretString,
    model: String,
    max_tokens: u32,
}

impl OpenAiOracle {
    pub fn new(base_url: &str, api_key: SecretString, model: &str, max_tokens: u32) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to build OpenAI HTTP client")?;

        Ok(Self {
            http,
            url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model: model.to_string(),
            max_tokens,
        })
    }

    fn build_request(&self, user_message: String) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: 0.0,
            messages: vec![
                ChatMessage { role: "system".to_string(), content: SYSTEM_PROMPT.to_string() },
                ChatMessage { role: "user".to_string(), content: user_message },
            ],
        }
    }

    fn error(&self, message: String) -> anyhow::Error {
        AgentError::Llm { model: self.model.clone(), message }.into()
    }

    async fn call_api(&self, request: &ChatRequest) -> Result<String> {
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }

            let resp = self
                .http
                .post(&self.url)
                .bearer_auth(self.api_key.expose_secret())
                .json(request)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let body: ChatResponse =
                            response.json().await.context("Failed to parse OpenAI response")?;
                        return body
                            .text()
                            .map(str::to_string)
                            .ok_or_else(|| self.error("response missing content".to_string()));
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let error_text = response.text().await.unwrap_or_default();
                        warn!(status = %status, attempt, model = %self.model, "Retryable OpenAI error");
                        last_error = Some(format!("HTTP {status}: {error_text}"));
                        continue;
                    }

                    let error_text = response.text().await.unwrap_or_default();
                    return Err(self.error(format!("API error {status}: {error_text}")));
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
impl LlmOracle for OpenAiOracle {
    async fn decide_yes_no(&self, request: &OracleRequest) -> Result<OracleDecision> {
        debug!(event_id = %request.evidence.event_id, model = %self.model, "OpenAI settlement decision");
        let chat = self.build_request(request.to_user_message()?);
        let text = self.call_api(&chat).await?;
        parse_decision(&text)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
