//! Persistence layer for market lifecycle records.
//!
//! `markets.json` is the single source of truth for which markets exist
//! and whether they are settled:
//!
//! ```json
//! { "markets": [ { "market": "...", "signature": "...", ... } ] }
//! ```
//!
//! Every operation reads the whole file, mutates, and writes it back. There
//! is no locking: exactly one process may write a given file (the creation
//! loop appends, the oracle loop marks settled). Running two writers against
//! the same path can lose updates.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::types::{AgentError, CreatedMarketRecord, SettlementResult};

/// Default markets file path.
pub const DEFAULT_MARKETS_FILE: &str = "./data/markets.json";

/// Replace `path` with `contents` via a sibling temp file and a rename, so
/// readers never see a half-written document.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, contents).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {} with {}", path.display(), tmp.display()))
}

/// On-disk document.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MarketsFile {
    #[serde(default)]
    pub markets: Vec<CreatedMarketRecord>,
}

/// What `mark_settled` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    Updated,
    /// No record with that market address.
    NotFound,
    /// Record was already settled; the stored result is kept.
    AlreadySettled,
}

/// Ordered store of created markets.
pub trait MarketsStore: Send + Sync {
    /// All records in creation order.
    fn load_markets(&self) -> Result<Vec<CreatedMarketRecord>>;

    /// Append a new record. Rejects a market address already present.
    fn append_market(&self, record: CreatedMarketRecord) -> Result<()>;

    /// Settle a record in place. Unknown or already-settled markets are a
    /// no-op, not an error.
    fn mark_settled(&self, market: &str, result: SettlementResult) -> Result<MarkOutcome>;
}

/// Shared mutation logic for both store implementations.
fn apply_append(markets: &mut Vec<CreatedMarketRecord>, record: CreatedMarketRecord) -> Result<()> {
    if markets.iter().any(|m| m.market == record.market) {
        return Err(AgentError::Storage(format!("market {} is already recorded", record.market)).into());
    }
    markets.push(record);
    Ok(())
}

fn apply_settled(markets: &mut [CreatedMarketRecord], market: &str, result: SettlementResult) -> MarkOutcome {
    match markets.iter_mut().find(|m| m.market == market) {
        None => MarkOutcome::NotFound,
        Some(record) if record.settled => MarkOutcome::AlreadySettled,
        Some(record) => {
            record.settled = true;
            record.result = Some(result);
            MarkOutcome::Updated
        }
    }
}

// ---------------------------------------------------------------------------
// File-backed
// ---------------------------------------------------------------------------

pub struct FileMarketsStore {
    path: PathBuf,
}

impl FileMarketsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read(&self) -> Result<MarketsFile> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No markets file yet");
            return Ok(MarketsFile::default());
        }
        let json = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read markets from {}", self.path.display()))?;
        if json.trim().is_empty() {
            return Ok(MarketsFile::default());
        }
        serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse markets from {}", self.path.display()))
    }

    fn write(&self, doc: &MarketsFile) -> Result<()> {
        let json = serde_json::to_string_pretty(doc).context("Failed to serialise markets")?;
        write_atomic(&self.path, &json)
            .with_context(|| format!("Failed to write markets to {}", self.path.display()))
    }
}

impl MarketsStore for FileMarketsStore {
    fn load_markets(&self) -> Result<Vec<CreatedMarketRecord>> {
        Ok(self.read()?.markets)
    }

    fn append_market(&self, record: CreatedMarketRecord) -> Result<()> {
        let mut doc = self.read()?;
        let market = record.market.clone();
        apply_append(&mut doc.markets, record)?;
        self.write(&doc)?;
        info!(path = %self.path.display(), market = %market, total = doc.markets.len(), "Market recorded");
        Ok(())
    }

    fn mark_settled(&self, market: &str, result: SettlementResult) -> Result<MarkOutcome> {
        let mut doc = self.read()?;
        let outcome = apply_settled(&mut doc.markets, market, result);
        match outcome {
            MarkOutcome::Updated => {
                self.write(&doc)?;
                info!(market, "Market marked settled");
            }
            MarkOutcome::NotFound => warn!(market, "mark_settled: market not in store"),
            MarkOutcome::AlreadySettled => warn!(market, "mark_settled: already settled, keeping first result"),
        }
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryMarketsStore {
    markets: Mutex<Vec<CreatedMarketRecord>>,
}

impl MemoryMarketsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MarketsStore for MemoryMarketsStore {
    fn load_markets(&self) -> Result<Vec<CreatedMarketRecord>> {
        let markets = self.markets.lock().map_err(|_| anyhow::anyhow!("store lock poisoned"))?;
        Ok(markets.clone())
    }

    fn append_market(&self, record: CreatedMarketRecord) -> Result<()> {
        let mut markets = self.markets.lock().map_err(|_| anyhow::anyhow!("store lock poisoned"))?;
        apply_append(&mut markets, record)
    }

    fn mark_settled(&self, market: &str, result: SettlementResult) -> Result<MarkOutcome> {
        let mut markets = self.markets.lock().map_err(|_| anyhow::anyhow!("store lock poisoned"))?;
        Ok(apply_settled(&mut markets, market, result))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
