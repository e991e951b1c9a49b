//! Paper chain: an in-memory market program.
//!
//! Simulates the rules the agents depend on: collateral balance checks on
//! creation and trades, the activation window after creation, trading only
//! once resolvable, and settlement only after the end time and only once.
//! Used for `chain.mode = "paper"` dry runs and throughout the tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

use super::{ChainClient, CreateMarketParams, CreatedMarket, MarketAccount, TxReceipt};
use crate::types::{now_seconds, Side};

const CLIENT_NAME: &str = "paper";

#[derive(Debug, Clone)]
struct PaperMarket {
    question: String,
    created_at: i64,
    end_time: i64,
    resolvable: bool,
    resolved: bool,
    yes_winner: Option<bool>,
    yes_bought: u64,
    no_bought: u64,
}

#[derive(Debug, Default)]
struct PaperState {
    balance: u64,
    markets: HashMap<String, PaperMarket>,
}

pub struct PaperChainClient {
    state: Mutex<PaperState>,
    activation_window_secs: i64,
}

impl PaperChainClient {
    pub fn new(balance_base_units: u64, activation_window_secs: i64) -> Self {
        Self {
            state: Mutex::new(PaperState {
                balance: balance_base_units,
                markets: HashMap::new(),
            }),
            activation_window_secs,
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, PaperState>> {
        self.state.lock().map_err(|_| anyhow!("paper chain lock poisoned"))
    }

    fn signature() -> String {
        format!("paper-tx-{}", uuid::Uuid::new_v4().simple())
    }

    /// Remaining collateral balance in base units.
    pub fn balance(&self) -> Result<u64> {
        Ok(self.state()?.balance)
    }

    /// Shift a market's creation and end times into the past, as if `secs`
    /// seconds had elapsed.
    pub fn rewind(&self, market: &str, secs: i64) -> Result<()> {
        let mut state = self.state()?;
        let m = state
            .markets
            .get_mut(market)
            .ok_or_else(|| anyhow!("Market not found: {market}"))?;
        m.created_at -= secs;
        m.end_time -= secs;
        Ok(())
    }

    /// Winning side of a settled market.
    pub fn winner(&self, market: &str) -> Result<Option<bool>> {
        let state = self.state()?;
        Ok(state.markets.get(market).and_then(|m| m.yes_winner))
    }

    /// Total YES / NO collateral bought on a market.
    pub fn volume(&self, market: &str) -> Result<(u64, u64)> {
        let state = self.state()?;
        let m = state.markets.get(market).ok_or_else(|| anyhow!("Market not found: {market}"))?;
        Ok((m.yes_bought, m.no_bought))
    }
}

#[async_trait]
impl ChainClient for PaperChainClient {
    async fn create_market(&self, params: &CreateMarketParams) -> Result<CreatedMarket> {
        let mut state = self.state()?;
        let now = now_seconds();

        if params.initial_liquidity_base_units > state.balance {
            anyhow::bail!(
                "Insufficient collateral balance: need {}, have {}",
                params.initial_liquidity_base_units,
                state.balance
            );
        }
        if params.end_time_seconds < now {
            anyhow::bail!("Program rejected market: end time {} is in the past", params.end_time_seconds);
        }
        if params.yes_odds_bps == 0 || params.yes_odds_bps >= 10_000 {
            anyhow::bail!("Program rejected market: invalid odds {} bps", params.yes_odds_bps);
        }

        state.balance -= params.initial_liquidity_base_units;
        let market = format!("paper-{}", uuid::Uuid::new_v4().simple());
        state.markets.insert(
            market.clone(),
            PaperMarket {
                question: params.question.clone(),
                created_at: now,
                end_time: params.end_time_seconds,
                resolvable: false,
                resolved: false,
                yes_winner: None,
                yes_bought: 0,
                no_bought: 0,
            },
        );

        info!(market = %market, question = %params.question, "[PAPER] Market created");
        Ok(CreatedMarket { market, signature: Self::signature() })
    }

    async fn set_market_resolvable(&self, market: &str, enabled: bool) -> Result<TxReceipt> {
        let mut state = self.state()?;
        let window = self.activation_window_secs;
        let m = state
            .markets
            .get_mut(market)
            .ok_or_else(|| anyhow!("Market not found: {market}"))?;

        if enabled && !m.resolvable && now_seconds() > m.created_at + window {
            anyhow::bail!("Program rejected activation: window of {window}s after creation has elapsed");
        }
        m.resolvable = enabled;
        Ok(TxReceipt { signature: Self::signature() })
    }

    async fn buy_tokens(&self, market: &str, side: Side, amount_base_units: u64) -> Result<TxReceipt> {
        let mut state = self.state()?;
        if amount_base_units > state.balance {
            anyhow::bail!(
                "Insufficient collateral balance: need {amount_base_units}, have {}",
                state.balance
            );
        }
        let m = state
            .markets
            .get_mut(market)
            .ok_or_else(|| anyhow!("Market not found: {market}"))?;
        if !m.resolvable {
            anyhow::bail!("Program rejected trade: trading not enabled for {market}");
        }
        if m.resolved {
            anyhow::bail!("Program rejected trade: market {market} is resolved");
        }
        match side {
            Side::Yes => m.yes_bought += amount_base_units,
            Side::No => m.no_bought += amount_base_units,
        }
        state.balance -= amount_base_units;
        Ok(TxReceipt { signature: Self::signature() })
    }

    async fn fetch_market(&self, market: &str) -> Result<MarketAccount> {
        let state = self.state()?;
        let m = state.markets.get(market).ok_or_else(|| anyhow!("Market not found: {market}"))?;
        Ok(MarketAccount {
            resolved: m.resolved,
            end_time: m.end_time,
            resolvable: m.resolvable,
            question: Some(m.question.clone()),
        })
    }

    async fn settle_market(&self, market: &str, yes_winner: bool) -> Result<TxReceipt> {
        let mut state = self.state()?;
        let m = state
            .markets
            .get_mut(market)
            .ok_or_else(|| anyhow!("Market not found: {market}"))?;
        if m.resolved {
            anyhow::bail!("Program rejected settlement: market {market} already resolved");
        }
        if !m.resolvable {
            anyhow::bail!("Program rejected settlement: market {market} is not resolvable");
        }
        if now_seconds() < m.end_time {
            anyhow::bail!("Program rejected settlement: market {market} has not ended");
        }
        m.resolved = true;
        m.yes_winner = Some(yes_winner);
        info!(market, yes_winner, "[PAPER] Market settled");
        Ok(TxReceipt { signature: Self::signature() })
    }

    fn name(&self) -> &str {
        CLIENT_NAME
    }
}
