//! Consumed-event ledger.
//!
//! Persisted set of event keys a source has already emitted. An id goes in
//! before the event is handed downstream, so a crash between emission and
//! market creation loses the event instead of creating a duplicate market.
//!
//! Precondition: exactly one process writes a given ledger path. There is
//! no locking; two writers racing on the same file can lose updates.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::debug;

use crate::storage::write_atomic;

/// JSON key holding the consumed ids inside the backing document.
const CONSUMED_KEY: &str = "consumedIds";

/// Monotonic set of consumed event keys.
pub trait ConsumedLedger: Send + Sync {
    /// All keys consumed so far.
    fn consumed(&self) -> Result<HashSet<String>>;

    /// Whether `key` has been consumed.
    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.consumed()?.contains(key))
    }

    /// Record `key` as consumed and persist it. Returns `false` if it was
    /// already present (nothing written).
    fn consume(&self, key: &str) -> Result<bool>;
}

// ---------------------------------------------------------------------------
// File-backed
// ---------------------------------------------------------------------------

/// Ledger stored under the `consumedIds` key of a JSON document.
///
/// Other keys in the document are preserved on write, so the ledger can
/// share a file with the data it guards (the local source keeps its events,
/// signals and ledger in one file).
pub struct FileLedger {
    path: PathBuf,
}

impl FileLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_document(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read ledger {}", self.path.display()))?;
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse ledger {}", self.path.display()))?
        {
            Value::Object(map) => Ok(map),
            _ => anyhow::bail!("Ledger {} is not a JSON object", self.path.display()),
        }
    }

    /// Ids in insertion order. Numeric ids (issue numbers) are read as strings.
    fn ordered_ids(doc: &Map<String, Value>) -> Vec<String> {
        doc.get(CONSUMED_KEY)
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(|v| match v {
                        Value::String(s) => Some(s.clone()),
                        Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl ConsumedLedger for FileLedger {
    fn consumed(&self) -> Result<HashSet<String>> {
        let doc = self.read_document()?;
        Ok(Self::ordered_ids(&doc).into_iter().collect())
    }

    fn consume(&self, key: &str) -> Result<bool> {
        let mut doc = self.read_document()?;
        let mut ids = Self::ordered_ids(&doc);
        if ids.iter().any(|id| id == key) {
            return Ok(false);
        }
        ids.push(key.to_string());
        doc.insert(
            CONSUMED_KEY.to_string(),
            Value::Array(ids.into_iter().map(Value::String).collect()),
        );

        let json = serde_json::to_string_pretty(&Value::Object(doc))
            .context("Failed to serialise ledger")?;
        write_atomic(&self.path, &json)
            .with_context(|| format!("Failed to write ledger {}", self.path.display()))?;

        debug!(path = %self.path.display(), key, "Event consumed");
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Process-local ledger for tests and paper runs.
#[derive(Default)]
pub struct MemoryLedger {
    ids: Mutex<HashSet<String>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConsumedLedger for MemoryLedger {
    fn consumed(&self) -> Result<HashSet<String>> {
        let ids = self.ids.lock().map_err(|_| anyhow::anyhow!("ledger lock poisoned"))?;
        Ok(ids.clone())
    }

    fn consume(&self, key: &str) -> Result<bool> {
        let mut ids = self.ids.lock().map_err(|_| anyhow::anyhow!("ledger lock poisoned"))?;
        Ok(ids.insert(key.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
