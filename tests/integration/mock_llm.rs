//! Scripted LLM oracle: always the same answer, or always the same error.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use shadowmarkets::llm::{LlmOracle, OracleDecision, OracleRequest};

pub struct ScriptedLlm {
    reply: Result<OracleDecision, String>,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn deciding(yes_winner: bool, reasoning: &str) -> Self {
        Self {
            reply: Ok(OracleDecision { yes_winner, confidence: 0.9, reasoning: reasoning.to_string() }),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(msg: &str) -> Self {
        Self { reply: Err(msg.to_string()), calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmOracle for ScriptedLlm {
    async fn decide_yes_no(&self, _request: &OracleRequest) -> Result<OracleDecision> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone().map_err(|e| anyhow!("{e}"))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
