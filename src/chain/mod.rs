//! Ledger-backed market program integration.
//!
//! Defines the `ChainClient` trait and provides implementations for:
//! - Gateway: HTTP client for a chain gateway service that holds the
//!   wallet and the market program SDK (signing never happens here)
//! - Paper: in-memory simulation for dry runs and tests

pub mod gateway;
pub mod paper;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::Side;

/// Odds used when none are configured (50/50).
pub const DEFAULT_YES_ODDS_BPS: u16 = 5_000;

/// Parameters for creating a custom-oracle binary market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMarketParams {
    pub question: String,
    pub initial_liquidity_base_units: u64,
    pub end_time_seconds: i64,
    pub collateral_mint: String,
    /// Settler authority. `None` lets the gateway use its own signer.
    pub oracle: Option<String>,
    pub yes_odds_bps: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedMarket {
    pub market: String,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub signature: String,
}

/// The parts of the on-chain market account the agents read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketAccount {
    pub resolved: bool,
    pub end_time: i64,
    #[serde(default)]
    pub resolvable: bool,
    #[serde(default)]
    pub question: Option<String>,
}

/// Abstraction over the market program.
///
/// Errors are chain errors: insufficient balance, program rejection, RPC
/// faults. Callers abandon the current action and retry on a later poll;
/// implementations do not retry state-changing calls themselves.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn create_market(&self, params: &CreateMarketParams) -> Result<CreatedMarket>;

    /// Enable (or disable) trading and resolution for a market.
    async fn set_market_resolvable(&self, market: &str, enabled: bool) -> Result<TxReceipt>;

    async fn buy_tokens(&self, market: &str, side: Side, amount_base_units: u64) -> Result<TxReceipt>;

    async fn fetch_market(&self, market: &str) -> Result<MarketAccount>;

    async fn settle_market(&self, market: &str, yes_winner: bool) -> Result<TxReceipt>;

    /// Client name for logging.
    fn name(&self) -> &str;
}
