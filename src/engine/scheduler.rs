//! Fixed-interval poll loop driving the creation and oracle roles.
//!
//! Each tick runs one unit of work per role. Errors inside a tick are
//! logged and the loop carries on; only the shutdown signal stops it.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::creation::MarketCreationAgent;
use super::liquidity::{LiquidityAgent, PendingActivation, RetryOutcome};
use super::oracle::{OracleAgent, SettleStatus};
use crate::storage::{MarkOutcome, MarketsStore};
use crate::types::now_seconds;

// ---------------------------------------------------------------------------
// Creation role
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct CreationParams {
    pub default_duration_secs: i64,
    pub seed_base_units: u64,
    pub activation_window_secs: i64,
}

/// What one creation tick did.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CreationTick {
    pub created: Option<String>,
    pub activated: Vec<String>,
    pub pending: usize,
    pub voided: Vec<String>,
    pub error: Option<String>,
}

pub struct CreationWorker {
    creator: MarketCreationAgent,
    liquidity: LiquidityAgent,
    store: Arc<dyn MarketsStore>,
    params: CreationParams,
    pending: Vec<PendingActivation>,
}

impl CreationWorker {
    pub fn new(
        creator: MarketCreationAgent,
        liquidity: LiquidityAgent,
        store: Arc<dyn MarketsStore>,
        params: CreationParams,
    ) -> Self {
        Self {
            creator,
            liquidity,
            store,
            params,
            pending: Vec::new(),
        }
    }

    /// Markets still waiting on activation or a seed trade.
    pub fn pending(&self) -> &[PendingActivation] {
        &self.pending
    }

    pub async fn tick(&mut self) -> CreationTick {
        let mut report = CreationTick::default();

        self.retry_pending(&mut report).await;

        match self.creator.create_next_market(self.params.default_duration_secs).await {
            Ok(Some(record)) => {
                report.created = Some(record.market.clone());
                // Unrecorded markets are never funded.
                if let Err(e) = self.store.append_market(record.clone()) {
                    error!(market = %record.market, error = %e, "Failed to record created market; skipping activation");
                    report.error = Some(format!("failed to record market {}: {e:#}", record.market));
                    report.pending = self.pending.len();
                    return report;
                }
                debug!(record = %record, "Market recorded");

                match self
                    .liquidity
                    .enable_trading_and_seed(&record.market, self.params.seed_base_units)
                    .await
                {
                    Ok(receipt) => {
                        info!(
                            market = %record.market,
                            enable = %receipt.enable_signature,
                            trade = %receipt.trade_signature,
                            "Market activated and seeded"
                        );
                        report.activated.push(record.market);
                    }
                    Err(e) => {
                        warn!(error = %e, "Activation incomplete, will retry");
                        self.pending.push(PendingActivation::from_error(
                            &e,
                            record.created_at_seconds,
                            record.end_time_seconds,
                        ));
                    }
                }
            }
            Ok(None) => debug!("No new market this tick"),
            Err(e) => {
                error!(error = %e, "Market creation failed");
                report.error = Some(format!("{e:#}"));
            }
        }

        report.pending = self.pending.len();
        report
    }

    async fn retry_pending(&mut self, report: &mut CreationTick) {
        let now = now_seconds();
        for pending in std::mem::take(&mut self.pending) {
            let outcome = self
                .liquidity
                .retry(pending, self.params.seed_base_units, self.params.activation_window_secs, now)
                .await;
            match outcome {
                RetryOutcome::Completed { market, receipt } => {
                    info!(market = %market, trade = %receipt.trade_signature, "Pending market activated and seeded");
                    report.activated.push(market);
                }
                RetryOutcome::StillPending(p) => self.pending.push(p),
                RetryOutcome::Abandoned { market, reason } => {
                    warn!(market = %market, reason = %reason, "Market dropped from activation queue");
                    report.voided.push(market);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Oracle role
// ---------------------------------------------------------------------------

/// What one oracle tick did.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct OracleTick {
    pub checked: usize,
    pub settled: Vec<String>,
    pub waiting: usize,
    pub errors: usize,
}

pub struct OracleWorker {
    agent: OracleAgent,
    store: Arc<dyn MarketsStore>,
}

impl OracleWorker {
    pub fn new(agent: OracleAgent, store: Arc<dyn MarketsStore>) -> Self {
        Self { agent, store }
    }

    /// Try to settle every unsettled record once.
    pub async fn tick(&self) -> OracleTick {
        let mut report = OracleTick::default();

        let markets = match self.store.load_markets() {
            Ok(m) => m,
            Err(e) => {
                error!(error = %e, "Failed to load markets");
                report.errors += 1;
                return report;
            }
        };

        for record in markets.iter().filter(|r| !r.settled) {
            report.checked += 1;
            match self.agent.settle_if_ready(&record.market, &record.event).await {
                Ok(status @ SettleStatus::Settled { .. }) => {
                    let Some(result) = status.to_result() else { continue };
                    match self.store.mark_settled(&record.market, result) {
                        Ok(MarkOutcome::Updated) => report.settled.push(record.market.clone()),
                        Ok(other) => warn!(market = %record.market, outcome = ?other, "Settlement not recorded"),
                        Err(e) => {
                            error!(market = %record.market, error = %e, "Settled on-chain but failed to record");
                            report.errors += 1;
                        }
                    }
                }
                Ok(SettleStatus::NotSettled { reason }) => {
                    debug!(market = %record.market, reason = %reason, "Not settled");
                    report.waiting += 1;
                }
                Err(e) => {
                    warn!(market = %record.market, error = %e, "Settlement attempt failed");
                    report.errors += 1;
                }
            }
        }

        report
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct Scheduler {
    creation: Option<(CreationWorker, Duration)>,
    oracle: Option<(OracleWorker, Duration)>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self { creation: None, oracle: None }
    }

    pub fn with_creation(mut self, worker: CreationWorker, interval: Duration) -> Self {
        self.creation = Some((worker, interval));
        self
    }

    pub fn with_oracle(mut self, worker: OracleWorker, interval: Duration) -> Self {
        self.oracle = Some((worker, interval));
        self
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut creation_timer = timer(self.creation.as_ref().map(|(_, d)| *d));
        let mut oracle_timer = timer(self.oracle.as_ref().map(|(_, d)| *d));
        let run_creation = self.creation.is_some();
        let run_oracle = self.oracle.is_some();

        info!(creation = run_creation, oracle = run_oracle, "Scheduler started");

        loop {
            tokio::select! {
                _ = creation_timer.tick(), if run_creation => {
                    if let Some((worker, _)) = self.creation.as_mut() {
                        let report = worker.tick().await;
                        info!(
                            created = ?report.created,
                            activated = report.activated.len(),
                            pending = report.pending,
                            voided = report.voided.len(),
                            failed = report.error.is_some(),
                            "Creation tick complete"
                        );
                    }
                }
                _ = oracle_timer.tick(), if run_oracle => {
                    if let Some((worker, _)) = self.oracle.as_ref() {
                        let report = worker.tick().await;
                        info!(
                            checked = report.checked,
                            settled = report.settled.len(),
                            waiting = report.waiting,
                            errors = report.errors,
                            "Oracle tick complete"
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown signal received.");
                        break;
                    }
                }
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Interval for a role; disabled roles get a placeholder that is never polled.
fn timer(period: Option<Duration>) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period.unwrap_or(Duration::from_secs(3600)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
