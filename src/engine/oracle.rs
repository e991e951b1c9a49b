//! Settlement oracle.
//!
//! `settle_if_ready` is safe to call on every tick for every unsettled
//! record: it settles at most once because it checks the on-chain
//! `resolved` flag first and the program rejects a second settlement.

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

use super::decision::{decide, Verdict};
use crate::chain::ChainClient;
use crate::config::UnhandledKindPolicy;
use crate::llm::LlmOracle;
use crate::sources::EventSource;
use crate::types::{now_seconds, AgentError, PrivateEvent, SettlementResult};

pub const ALREADY_RESOLVED: &str = "Market already resolved on-chain.";

#[derive(Debug, Clone, PartialEq)]
pub enum SettleStatus {
    NotSettled {
        reason: String,
    },
    Settled {
        signature: String,
        yes_winner: bool,
        reasoning: String,
        used_llm: bool,
    },
}

impl SettleStatus {
    pub fn did_settle(&self) -> bool {
        matches!(self, SettleStatus::Settled { .. })
    }

    /// The record update for a settled status.
    pub fn to_result(&self) -> Option<SettlementResult> {
        match self {
            SettleStatus::Settled { signature, yes_winner, reasoning, .. } => Some(SettlementResult {
                yes_winner: *yes_winner,
                reasoning: reasoning.clone(),
                signature: signature.clone(),
            }),
            SettleStatus::NotSettled { .. } => None,
        }
    }
}

pub struct OracleAgent {
    chain: Arc<dyn ChainClient>,
    source: Arc<dyn EventSource>,
    llm: Option<Arc<dyn LlmOracle>>,
    policy: UnhandledKindPolicy,
}

impl OracleAgent {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        source: Arc<dyn EventSource>,
        llm: Option<Arc<dyn LlmOracle>>,
        policy: UnhandledKindPolicy,
    ) -> Self {
        Self { chain, source, llm, policy }
    }

    /// Settle `market` if it has ended and is not yet resolved.
    ///
    /// Errors: `AgentError::Chain` for fetch/settle failures,
    /// `AgentError::Evidence` when evidence cannot be collected. Nothing is
    /// settled on error.
    pub async fn settle_if_ready(&self, market: &str, event: &PrivateEvent) -> Result<SettleStatus> {
        let account = self
            .chain
            .fetch_market(market)
            .await
            .map_err(|e| AgentError::chain("fetch_market", e))?;

        if account.resolved {
            return Ok(SettleStatus::NotSettled { reason: ALREADY_RESOLVED.to_string() });
        }

        if now_seconds() < account.end_time {
            return Ok(SettleStatus::NotSettled {
                reason: format!("Market not ended yet (end_time={}).", account.end_time),
            });
        }

        let evidence = self.source.collect_evidence(event).await.map_err(|e| AgentError::Evidence {
            source_name: self.source.name().to_string(),
            message: format!("{e:#}"),
        })?;
        debug!(market, event_id = %evidence.event_id, "Evidence collected");

        let decision = match decide(event, &evidence, self.llm.as_deref(), self.policy).await {
            Verdict::Decided(d) => d,
            Verdict::Deferred { reason } => return Ok(SettleStatus::NotSettled { reason }),
        };

        let receipt = self
            .chain
            .settle_market(market, decision.yes_winner)
            .await
            .map_err(|e| AgentError::chain("settle_market", e))?;

        info!(
            market,
            yes_winner = decision.yes_winner,
            used_llm = decision.used_llm,
            signature = %receipt.signature,
            "Market settled"
        );

        Ok(SettleStatus::Settled {
            signature: receipt.signature,
            yes_winner: decision.yes_winner,
            reasoning: decision.reasoning,
            used_llm: decision.used_llm,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
