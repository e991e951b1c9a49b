//! Local file event source.
//!
//! A single JSON document holds the events to market-ize, the private
//! boolean signals used as settlement evidence, and the consumed ledger:
//!
//! ```json
//! { "events": [...], "signals": { "deploy_green": true }, "consumedIds": [...] }
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::ledger::{ConsumedLedger, FileLedger};
use super::EventSource;
use crate::types::{Evidence, EvidencePayload, PrivateEvent};

const SOURCE_NAME: &str = "LocalSource";

/// The parts of the document this source reads. `consumedIds` belongs to
/// the ledger.
#[derive(Debug, Default, Deserialize)]
struct PrivateEventsFile {
    #[serde(default)]
    events: Vec<PrivateEvent>,
    #[serde(default)]
    signals: HashMap<String, bool>,
}

pub struct LocalSource {
    path: PathBuf,
    ledger: FileLedger,
}

impl LocalSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            ledger: FileLedger::new(path.clone()),
            path,
        }
    }

    fn load(&self) -> Result<Option<PrivateEventsFile>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let doc = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;
        Ok(Some(doc))
    }
}

#[async_trait]
impl EventSource for LocalSource {
    async fn next_event(&self) -> Result<Option<PrivateEvent>> {
        let Some(doc) = self.load()? else {
            warn!(path = %self.path.display(), "Private events file not found");
            return Ok(None);
        };

        let consumed = self.ledger.consumed()?;
        let Some(next) = doc.events.into_iter().find(|e| !consumed.contains(e.id())) else {
            debug!(path = %self.path.display(), "No unconsumed local events");
            return Ok(None);
        };

        self.ledger.consume(next.id())?;
        info!(event_id = %next.id(), kind = next.kind(), "Local event consumed");
        Ok(Some(next))
    }

    async fn collect_evidence(&self, event: &PrivateEvent) -> Result<Evidence> {
        let PrivateEvent::LocalBooleanSignal { signal_key, .. } = event else {
            return Ok(Evidence::unsupported(event, SOURCE_NAME));
        };

        let doc = self
            .load()?
            .ok_or_else(|| anyhow::anyhow!("Private events file missing: {}", self.path.display()))?;

        Ok(Evidence::new(
            event,
            EvidencePayload::LocalBooleanSignal {
                signal_key: signal_key.clone(),
                value: doc.signals.get(signal_key).copied(),
            },
        ))
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}
