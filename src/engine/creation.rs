//! Market creation: one private event in, one on-chain market out.

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

use crate::chain::{ChainClient, CreateMarketParams, DEFAULT_YES_ODDS_BPS};
use crate::config::ChainConfig;
use crate::sources::EventSource;
use crate::types::{now_seconds, CreatedMarketRecord};

/// Fixed parameters for every market this agent creates.
#[derive(Debug, Clone)]
pub struct CreationSettings {
    pub collateral_mint: String,
    pub initial_liquidity_base_units: u64,
    pub oracle: Option<String>,
    pub yes_odds_bps: Option<u16>,
}

impl CreationSettings {
    pub fn from_config(cfg: &ChainConfig) -> Self {
        Self {
            collateral_mint: cfg.collateral_mint.clone(),
            initial_liquidity_base_units: cfg.initial_liquidity_base_units,
            oracle: cfg.oracle_address.clone(),
            yes_odds_bps: cfg.yes_odds_bps,
        }
    }
}

/// The event's own end time if still in the future, otherwise
/// `now + default_duration_secs`.
pub fn effective_end_time(event_end: i64, now: i64, default_duration_secs: i64) -> i64 {
    if event_end > now {
        event_end
    } else {
        now + default_duration_secs
    }
}

pub struct MarketCreationAgent {
    chain: Arc<dyn ChainClient>,
    source: Arc<dyn EventSource>,
    settings: CreationSettings,
}

impl MarketCreationAgent {
    pub fn new(chain: Arc<dyn ChainClient>, source: Arc<dyn EventSource>, settings: CreationSettings) -> Self {
        Self { chain, source, settings }
    }

    /// Pull the next event and create a market for it.
    ///
    /// The returned record is not persisted. Once `next_event` has returned,
    /// the event stays consumed even if the chain call fails.
    pub async fn create_next_market(&self, default_duration_secs: i64) -> Result<Option<CreatedMarketRecord>> {
        let Some(event) = self.source.next_event().await? else {
            debug!(source = self.source.name(), "No new private event");
            return Ok(None);
        };
        debug!(event = %event, "Creating market for private event");

        let end = effective_end_time(event.end_time_seconds(), now_seconds(), default_duration_secs);
        let params = CreateMarketParams {
            question: event.question().to_string(),
            initial_liquidity_base_units: self.settings.initial_liquidity_base_units,
            end_time_seconds: end,
            collateral_mint: self.settings.collateral_mint.clone(),
            oracle: self.settings.oracle.clone(),
            yes_odds_bps: self.settings.yes_odds_bps.unwrap_or(DEFAULT_YES_ODDS_BPS),
        };

        let created = self.chain.create_market(&params).await?;

        info!(
            market = %created.market,
            event_id = %event.id(),
            end_time = end,
            chain = self.chain.name(),
            "Market created from private event"
        );

        Ok(Some(CreatedMarketRecord {
            market: created.market,
            signature: created.signature,
            created_at_seconds: now_seconds(),
            end_time_seconds: end,
            question: params.question,
            event: event.with_end_time(end),
            settled: false,
            result: None,
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
