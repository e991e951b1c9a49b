//! Mock chain for integration testing.
//!
//! Wraps the paper chain so program rules (activation window, end time,
//! single settlement) still apply, and adds per-operation forced errors
//! plus a call log.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use shadowmarkets::chain::paper::PaperChainClient;
use shadowmarkets::chain::{ChainClient, CreateMarketParams, CreatedMarket, MarketAccount, TxReceipt};
use shadowmarkets::types::Side;

pub struct MockChain {
    paper: PaperChainClient,
    /// Operation name → error message returned instead of calling through.
    force_error: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<String>>,
}

impl MockChain {
    pub fn new(balance_base_units: u64, activation_window_secs: i64) -> Self {
        Self {
            paper: PaperChainClient::new(balance_base_units, activation_window_secs),
            force_error: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Make every call to `operation` fail until cleared.
    pub fn set_error(&self, operation: &str, msg: &str) {
        self.force_error.lock().unwrap().insert(operation.to_string(), msg.to_string());
    }

    pub fn clear_error(&self, operation: &str) {
        self.force_error.lock().unwrap().remove(operation);
    }

    /// Number of calls made to `operation`, failed ones included.
    pub fn count(&self, operation: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == operation).count()
    }

    pub fn rewind(&self, market: &str, secs: i64) {
        self.paper.rewind(market, secs).unwrap();
    }

    pub fn winner(&self, market: &str) -> Option<bool> {
        self.paper.winner(market).unwrap()
    }

    pub fn volume(&self, market: &str) -> (u64, u64) {
        self.paper.volume(market).unwrap()
    }

    fn check(&self, operation: &str) -> Result<()> {
        self.calls.lock().unwrap().push(operation.to_string());
        match self.force_error.lock().unwrap().get(operation) {
            Some(msg) => Err(anyhow!("{msg}")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn create_market(&self, params: &CreateMarketParams) -> Result<CreatedMarket> {
        self.check("create_market")?;
        self.paper.create_market(params).await
    }

    async fn set_market_resolvable(&self, market: &str, enabled: bool) -> Result<TxReceipt> {
        self.check("set_market_resolvable")?;
        self.paper.set_market_resolvable(market, enabled).await
    }

    async fn buy_tokens(&self, market: &str, side: Side, amount_base_units: u64) -> Result<TxReceipt> {
        self.check("buy_tokens")?;
        self.paper.buy_tokens(market, side, amount_base_units).await
    }

    async fn fetch_market(&self, market: &str) -> Result<MarketAccount> {
        self.check("fetch_market")?;
        self.paper.fetch_market(market).await
    }

    async fn settle_market(&self, market: &str, yes_winner: bool) -> Result<TxReceipt> {
        self.check("settle_market")?;
        self.paper.settle_market(market, yes_winner).await
    }

    fn name(&self) -> &str {
        "mock"
    }
}
