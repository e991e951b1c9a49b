//! Discord prediction event source.
//!
//! An external bot process appends `!predict` messages from one channel to
//! a pending queue file (JSON array). This source takes the first
//! unconsumed message, records its id in the consumed ledger, then removes
//! it from the queue.
//!
//! The queue file is shared with the bot: a message the bot appends while
//! this source rewrites the file can be lost. Single operator deployments
//! accept this.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use super::ledger::ConsumedLedger;
use super::EventSource;
use crate::config::DiscordSourceConfig;
use crate::storage::write_atomic;
use crate::types::{now_seconds, Evidence, EvidencePayload, PrivateEvent};

const SOURCE_NAME: &str = "DiscordSource";

/// Queue entry as written by the bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMessage {
    pub message_id: String,
    pub content: String,
    pub author: String,
    /// Milliseconds since epoch, as reported by Discord.
    pub timestamp: i64,
}

pub struct DiscordSource {
    cfg: DiscordSourceConfig,
    /// Keyed by message id.
    ledger: Box<dyn ConsumedLedger>,
}

impl DiscordSource {
    pub fn new(cfg: DiscordSourceConfig, ledger: Box<dyn ConsumedLedger>) -> Self {
        Self { cfg, ledger }
    }

    fn read_pending(&self) -> Result<Option<Vec<PendingMessage>>> {
        let path = Path::new(&self.cfg.pending_path);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pending queue {}", path.display()))?;
        if raw.trim().is_empty() {
            return Ok(Some(Vec::new()));
        }
        let pending = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse pending queue {}", path.display()))?;
        Ok(Some(pending))
    }

    fn write_pending(&self, pending: &[PendingMessage]) -> Result<()> {
        let json = serde_json::to_string_pretty(pending).context("Failed to serialise pending queue")?;
        write_atomic(Path::new(&self.cfg.pending_path), &json)
            .with_context(|| format!("Failed to write pending queue {}", self.cfg.pending_path))
    }

    fn build_event(&self, message: &PendingMessage, end_time_seconds: i64) -> PrivateEvent {
        PrivateEvent::DiscordPrediction {
            id: format!(
                "discord:{}:{}:{}@{end_time_seconds}",
                self.cfg.guild_id, self.cfg.channel_id, message.message_id
            ),
            guild_id: self.cfg.guild_id.clone(),
            channel_id: self.cfg.channel_id.clone(),
            message_id: message.message_id.clone(),
            message_content: message.content.clone(),
            author: message.author.clone(),
            question: format!("Will the following statement be true: \"{}\"?", message.content),
            end_time_seconds,
        }
    }
}

#[async_trait]
impl EventSource for DiscordSource {
    async fn next_event(&self) -> Result<Option<PrivateEvent>> {
        let Some(pending) = self.read_pending()? else {
            debug!(path = %self.cfg.pending_path, "No pending queue yet");
            return Ok(None);
        };

        let consumed = self.ledger.consumed()?;
        let Some(message) = pending.iter().find(|m| !consumed.contains(&m.message_id)).cloned() else {
            return Ok(None);
        };

        self.ledger.consume(&message.message_id)?;

        let remaining: Vec<PendingMessage> = pending
            .into_iter()
            .filter(|m| m.message_id != message.message_id && !consumed.contains(&m.message_id))
            .collect();
        self.write_pending(&remaining)?;

        let end = now_seconds() + self.cfg.window_secs;
        info!(
            message_id = %message.message_id,
            author = %message.author,
            remaining = remaining.len(),
            "Discord prediction consumed"
        );
        Ok(Some(self.build_event(&message, end)))
    }

    async fn collect_evidence(&self, event: &PrivateEvent) -> Result<Evidence> {
        let PrivateEvent::DiscordPrediction { message_id, message_content, .. } = event else {
            return Ok(Evidence::unsupported(event, SOURCE_NAME));
        };

        // Chat predictions carry no machine-readable outcome; resolution is
        // left to the LLM oracle or the unhandled-kind policy.
        Ok(Evidence::new(
            event,
            EvidencePayload::DiscordPrediction {
                message_id: message_id.clone(),
                content: message_content.clone(),
                resolved: false,
            },
        ))
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}
