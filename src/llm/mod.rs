//! LLM oracle integration for settlement decisions.
//!
//! Defines the `LlmOracle` trait and provides implementations for any
//! OpenAI-compatible chat completions endpoint and for Google Gemini.
//! Both share the prompt and the response parser in this module.

pub mod gemini;
pub mod openai;

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::SecretString;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{AppConfig, LlmConfig, LlmProvider};
use crate::types::Evidence;

/// System prompt shared by every provider.
pub const SYSTEM_PROMPT: &str = "You are an oracle for a binary prediction market. \
Output ONLY valid JSON with keys: yesWinner (boolean), confidence (0-1 number), reasoning (string).";

/// Instruction embedded in every request.
pub const DECISION_INSTRUCTION: &str = "Decide strictly based on evidence. If evidence is missing \
or inconclusive, choose the most defensible outcome and set confidence <= 0.55.";

/// Confidence assumed when the model omits it.
const DEFAULT_CONFIDENCE: f64 = 0.6;

/// The JSON document sent to the model as the user message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleRequest {
    pub question: String,
    pub yes_definition: String,
    pub no_definition: String,
    pub evidence: Evidence,
    pub instruction: String,
}

impl OracleRequest {
    pub fn new(question: &str, yes_definition: String, no_definition: String, evidence: Evidence) -> Self {
        Self {
            question: question.to_string(),
            yes_definition,
            no_definition,
            evidence,
            instruction: DECISION_INSTRUCTION.to_string(),
        }
    }

    pub fn to_user_message(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialise oracle request")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OracleDecision {
    pub yes_winner: bool,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub reasoning: String,
}

/// Abstraction over LLM settlement oracles.
///
/// Any error is treated by the caller as "no decision"; the deterministic
/// baseline is used instead.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmOracle: Send + Sync {
    async fn decide_yes_no(&self, request: &OracleRequest) -> Result<OracleDecision>;

    /// Model identifier string.
    fn model_name(&self) -> &str;
}

/// Build the configured provider.
pub fn make_oracle(cfg: &LlmConfig, api_key: SecretString) -> Result<Arc<dyn LlmOracle>> {
    let oracle: Arc<dyn LlmOracle> = match cfg.provider {
        LlmProvider::OpenAi => Arc::new(openai::OpenAiOracle::new(
            cfg.base_url.as_deref().unwrap_or(openai::OPENAI_API_BASE),
            api_key,
            &cfg.model,
            cfg.max_tokens,
        )?),
        LlmProvider::Gemini => Arc::new(gemini::GeminiOracle::new(
            cfg.base_url.as_deref().unwrap_or(gemini::GEMINI_API_BASE),
            api_key,
            &cfg.model,
            cfg.max_tokens,
        )?),
    };
    Ok(oracle)
}

/// Settlement oracle for the optional `[llm]` table.
///
/// A configured provider whose key is missing from the environment does
/// not stop start-up: the oracle is disabled and settlement falls back to
/// the deterministic rules.
pub fn oracle_from_config(cfg: Option<&LlmConfig>) -> Result<Option<Arc<dyn LlmOracle>>> {
    let Some(cfg) = cfg else {
        info!("No [llm] configured; settlement decisions use deterministic rules only");
        return Ok(None);
    };

    match AppConfig::resolve_secret(&cfg.api_key_env) {
        Ok(key) => {
            info!(provider = ?cfg.provider, model = %cfg.model, "Using LLM oracle");
            make_oracle(cfg, key).map(Some)
        }
        Err(e) => {
            warn!(
                provider = ?cfg.provider,
                model = %cfg.model,
                key_env = %cfg.api_key_env,
                error = %e,
                "LLM ORACLE DISABLED: API key missing, settlement decisions use deterministic rules only"
            );
            Ok(None)
        }
    }
}

/// Parse a model reply into a decision.
///
/// The JSON object is taken from the first `{` to the last `}` so prose or
/// code fences around it are ignored. `yesWinner` must be a boolean.
pub fn parse_decision(text: &str) -> Result<OracleDecision> {
    let json_text = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => text,
    };

    let value: Value = serde_json::from_str(json_text.trim())
        .with_context(|| format!("Oracle reply is not JSON: {}", truncate(text, 200)))?;

    let yes_winner = value
        .get("yesWinner")
        .and_then(Value::as_bool)
        .ok_or_else(|| anyhow::anyhow!("Malformed oracle reply: yesWinner missing or not a boolean"))?;

    let confidence = value
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_CONFIDENCE)
        .clamp(0.0, 1.0);

    let reasoning = value
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or("No reasoning provided.")
        .to_string();

    Ok(OracleDecision { yes_winner, confidence, reasoning })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
