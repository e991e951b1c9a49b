//! Market activation and seed trade.
//!
//! Custom-oracle markets must be marked resolvable within a short window
//! after creation or the program will never let them trade or settle.
//! Activation and seeding are two transactions, so a market can end up in
//! one of two failure states:
//!
//! - not activated: retry activation while the window is open, void after
//! - activated but unseeded: only the seed trade needs to be retried

use std::sync::Arc;
use tracing::{info, warn};

use crate::chain::ChainClient;
use crate::types::Side;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActivationError {
    #[error("market {market} was not activated: {reason}")]
    NotActivated { market: String, reason: String },

    #[error("market {market} activated ({enable_signature}) but seed trade failed: {reason}")]
    Unseeded {
        market: String,
        enable_signature: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationReceipt {
    pub enable_signature: String,
    pub trade_signature: String,
}

/// Activation work left over from a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingActivation {
    pub market: String,
    pub created_at_seconds: i64,
    pub end_time_seconds: i64,
    /// Set once trading is enabled; only the seed trade remains.
    pub enable_signature: Option<String>,
}

impl PendingActivation {
    pub fn from_error(err: &ActivationError, created_at_seconds: i64, end_time_seconds: i64) -> Self {
        match err {
            ActivationError::NotActivated { market, .. } => Self {
                market: market.clone(),
                created_at_seconds,
                end_time_seconds,
                enable_signature: None,
            },
            ActivationError::Unseeded { market, enable_signature, .. } => Self {
                market: market.clone(),
                created_at_seconds,
                end_time_seconds,
                enable_signature: Some(enable_signature.clone()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    Completed { market: String, receipt: ActivationReceipt },
    StillPending(PendingActivation),
    /// Dropped; the market can no longer be activated or seeded.
    Abandoned { market: String, reason: String },
}

pub struct LiquidityAgent {
    chain: Arc<dyn ChainClient>,
}

impl LiquidityAgent {
    pub fn new(chain: Arc<dyn ChainClient>) -> Self {
        Self { chain }
    }

    /// Enable trading, then buy `seed_base_units` of YES.
    pub async fn enable_trading_and_seed(
        &self,
        market: &str,
        seed_base_units: u64,
    ) -> Result<ActivationReceipt, ActivationError> {
        let enable_signature = self.activate(market).await?;
        let trade_signature = self.seed(market, &enable_signature, seed_base_units).await?;
        Ok(ActivationReceipt { enable_signature, trade_signature })
    }

    async fn activate(&self, market: &str) -> Result<String, ActivationError> {
        match self.chain.set_market_resolvable(market, true).await {
            Ok(receipt) => {
                info!(market, signature = %receipt.signature, "Trading enabled");
                Ok(receipt.signature)
            }
            Err(e) => Err(ActivationError::NotActivated {
                market: market.to_string(),
                reason: format!("{e:#}"),
            }),
        }
    }

    /// Place the seed trade on an already activated market.
    pub async fn seed(
        &self,
        market: &str,
        enable_signature: &str,
        seed_base_units: u64,
    ) -> Result<String, ActivationError> {
        let side = Side::Yes;
        match self.chain.buy_tokens(market, side, seed_base_units).await {
            Ok(receipt) => {
                info!(market, side = %side, signature = %receipt.signature, amount = seed_base_units, "Seed trade placed");
                Ok(receipt.signature)
            }
            Err(e) => Err(ActivationError::Unseeded {
                market: market.to_string(),
                enable_signature: enable_signature.to_string(),
                reason: format!("{e:#}"),
            }),
        }
    }

    /// Retry the remaining step of a failed activation.
    ///
    /// Activation is abandoned once `activation_window_secs` have passed
    /// since creation; a seed trade is abandoned once the market has ended.
    pub async fn retry(
        &self,
        pending: PendingActivation,
        seed_base_units: u64,
        activation_window_secs: i64,
        now: i64,
    ) -> RetryOutcome {
        let result = match &pending.enable_signature {
            Some(enable_signature) => {
                if now >= pending.end_time_seconds {
                    return RetryOutcome::Abandoned {
                        market: pending.market,
                        reason: "market ended before the seed trade succeeded".to_string(),
                    };
                }
                self.seed(&pending.market, enable_signature, seed_base_units)
                    .await
                    .map(|trade_signature| ActivationReceipt {
                        enable_signature: enable_signature.clone(),
                        trade_signature,
                    })
            }
            None => {
                if now > pending.created_at_seconds + activation_window_secs {
                    warn!(market = %pending.market, "Activation window elapsed; market is void");
                    return RetryOutcome::Abandoned {
                        market: pending.market,
                        reason: format!("not activated within {activation_window_secs}s of creation"),
                    };
                }
                self.enable_trading_and_seed(&pending.market, seed_base_units).await
            }
        };

        match result {
            Ok(receipt) => RetryOutcome::Completed { market: pending.market, receipt },
            Err(e) => {
                warn!(error = %e, "Activation retry failed");
                RetryOutcome::StillPending(PendingActivation::from_error(
                    &e,
                    pending.created_at_seconds,
                    pending.end_time_seconds,
                ))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
