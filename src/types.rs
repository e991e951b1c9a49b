//! Shared types for the ShadowMarkets agent.
//!
//! These types form the data model used across all modules: the private
//! events that seed markets, the evidence collected at settlement time,
//! and the persisted market lifecycle records.

use anyhow::Result;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Current unix time in whole seconds.
pub fn now_seconds() -> i64 {
    Utc::now().timestamp()
}

// ---------------------------------------------------------------------------
// Private events
// ---------------------------------------------------------------------------

/// A source-specific fact that seeds a new market's question and deadline.
///
/// Serialized with a `kind` discriminator so records written to
/// `markets.json` carry the full event for later settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PrivateEvent {
    #[serde(rename_all = "camelCase")]
    GithubIssueWillClose {
        id: String,
        owner: String,
        repo: String,
        issue_number: u64,
        /// YES wins when the issue is closed at the deadline (or open, if false).
        yes_means_closed: bool,
        question: String,
        end_time_seconds: i64,
    },
    #[serde(rename_all = "camelCase")]
    LocalBooleanSignal {
        id: String,
        signal_key: String,
        expected_yes: bool,
        question: String,
        end_time_seconds: i64,
    },
    #[serde(rename_all = "camelCase")]
    DiscordPrediction {
        id: String,
        guild_id: String,
        channel_id: String,
        message_id: String,
        message_content: String,
        author: String,
        question: String,
        end_time_seconds: i64,
    },
}

impl PrivateEvent {
    pub fn id(&self) -> &str {
        match self {
            PrivateEvent::GithubIssueWillClose { id, .. }
            | PrivateEvent::LocalBooleanSignal { id, .. }
            | PrivateEvent::DiscordPrediction { id, .. } => id,
        }
    }

    pub fn question(&self) -> &str {
        match self {
            PrivateEvent::GithubIssueWillClose { question, .. }
            | PrivateEvent::LocalBooleanSignal { question, .. }
            | PrivateEvent::DiscordPrediction { question, .. } => question,
        }
    }

    pub fn end_time_seconds(&self) -> i64 {
        match self {
            PrivateEvent::GithubIssueWillClose { end_time_seconds, .. }
            | PrivateEvent::LocalBooleanSignal { end_time_seconds, .. }
            | PrivateEvent::DiscordPrediction { end_time_seconds, .. } => *end_time_seconds,
        }
    }

    /// Copy of this event with the end time replaced.
    pub fn with_end_time(&self, end: i64) -> Self {
        let mut event = self.clone();
        match &mut event {
            PrivateEvent::GithubIssueWillClose { end_time_seconds, .. }
            | PrivateEvent::LocalBooleanSignal { end_time_seconds, .. }
            | PrivateEvent::DiscordPrediction { end_time_seconds, .. } => *end_time_seconds = end,
        }
        event
    }

    /// Wire name of the variant, as written in the `kind` field.
    pub fn kind(&self) -> &'static str {
        match self {
            PrivateEvent::GithubIssueWillClose { .. } => "githubIssueWillClose",
            PrivateEvent::LocalBooleanSignal { .. } => "localBooleanSignal",
            PrivateEvent::DiscordPrediction { .. } => "discordPrediction",
        }
    }
}

#[cfg(test)]
impl PrivateEvent {
    /// Sample issue event for tests.
    pub fn sample_github(yes_means_closed: bool) -> Self {
        PrivateEvent::GithubIssueWillClose {
            id: "github:acme/widgets#7@1700000000".into(),
            owner: "acme".into(),
            repo: "widgets".into(),
            issue_number: 7,
            yes_means_closed,
            question: "Will issue #7 be CLOSED before the deadline?".into(),
            end_time_seconds: 1_700_000_000,
        }
    }

    /// Sample local signal event for tests.
    pub fn sample_signal(expected_yes: bool) -> Self {
        PrivateEvent::LocalBooleanSignal {
            id: "local:deploy_green".into(),
            signal_key: "deploy_green".into(),
            expected_yes,
            question: "Will the Friday deploy be green?".into(),
            end_time_seconds: 1_700_000_000,
        }
    }

    /// Sample chat prediction event for tests.
    pub fn sample_discord() -> Self {
        PrivateEvent::DiscordPrediction {
            id: "discord:g1:c1:m1@1700000000".into(),
            guild_id: "g1".into(),
            channel_id: "c1".into(),
            message_id: "m1".into(),
            message_content: "the build turns green".into(),
            author: "dana".into(),
            question: "Will the following statement be true: \"the build turns green\"?".into(),
            end_time_seconds: 1_700_000_000,
        }
    }
}

impl fmt::Display for PrivateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} (ends {})", self.kind(), self.question(), self.end_time_seconds())
    }
}

// ---------------------------------------------------------------------------
// Evidence
// ---------------------------------------------------------------------------

/// Resolvability data collected for an event at settlement time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub event_id: String,
    pub collected_at_seconds: i64,
    pub payload: EvidencePayload,
}

/// Per-kind evidence payload. Only the decision function for the matching
/// event kind looks inside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EvidencePayload {
    /// Field names follow the GitHub issues API.
    GithubIssueWillClose {
        state: String,
        closed_at: Option<String>,
        updated_at: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    LocalBooleanSignal {
        signal_key: String,
        value: Option<bool>,
    },
    #[serde(rename_all = "camelCase")]
    DiscordPrediction {
        message_id: String,
        content: String,
        resolved: bool,
    },
    /// The source cannot produce evidence for this event kind.
    #[serde(rename_all = "camelCase")]
    Unsupported {
        requested_kind: String,
        error: String,
    },
}

impl Evidence {
    pub fn new(event: &PrivateEvent, payload: EvidencePayload) -> Self {
        Self {
            event_id: event.id().to_string(),
            collected_at_seconds: now_seconds(),
            payload,
        }
    }

    /// Evidence flagged with an error marker for an event kind the source
    /// does not understand.
    pub fn unsupported(event: &PrivateEvent, source_name: &str) -> Self {
        Self::new(
            event,
            EvidencePayload::Unsupported {
                requested_kind: event.kind().to_string(),
                error: format!("{source_name} cannot collect evidence for this event kind"),
            },
        )
    }

    /// The error marker, if this evidence carries one.
    pub fn error(&self) -> Option<&str> {
        match &self.payload {
            EvidencePayload::Unsupported { error, .. } => Some(error),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Market records
// ---------------------------------------------------------------------------

/// Outcome written into a record when its market is settled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementResult {
    pub yes_winner: bool,
    pub reasoning: String,
    pub signature: String,
}

/// One market created by the agent, as persisted in `markets.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedMarketRecord {
    /// On-chain market address.
    pub market: String,
    /// Creation transaction signature.
    pub signature: String,
    pub created_at_seconds: i64,
    pub end_time_seconds: i64,
    pub question: String,
    pub event: PrivateEvent,
    #[serde(default)]
    pub settled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<SettlementResult>,
}

impl fmt::Display for CreatedMarketRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match &self.result {
            Some(r) if r.yes_winner => "settled YES",
            Some(_) => "settled NO",
            None if self.settled => "settled",
            None => "open",
        };
        write!(f, "{} \"{}\" ({status})", self.market, self.question)
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Outcome token side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Yes,
    No,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Yes => write!(f, "YES"),
            Side::No => write!(f, "NO"),
        }
    }
}

// ---------------------------------------------------------------------------
// Base units
// ---------------------------------------------------------------------------

/// Convert a whole-token collateral amount to integer base units.
///
/// Fractions below one base unit are truncated.
pub fn to_base_units(amount: Decimal, decimals: u32) -> Result<u64> {
    if amount.is_sign_negative() {
        anyhow::bail!("Collateral amount must not be negative: {amount}");
    }
    let scale = 10u64
        .checked_pow(decimals)
        .ok_or_else(|| anyhow::anyhow!("Unsupported collateral decimals: {decimals}"))?;
    let scaled = amount
        .checked_mul(Decimal::from(scale))
        .ok_or_else(|| anyhow::anyhow!("Collateral amount overflows: {amount}"))?;
    scaled
        .trunc()
        .to_u64()
        .ok_or_else(|| anyhow::anyhow!("Collateral amount out of range: {amount}"))
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain error taxonomy for the agent.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Chain error ({operation}): {message}")]
    Chain { operation: String, message: String },

    #[error("Evidence error ({source_name}): {message}")]
    Evidence { source_name: String, message: String },

    #[error("LLM error ({model}): {message}")]
    Llm { model: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl AgentError {
    pub fn chain(operation: &str, err: impl fmt::Display) -> Self {
        AgentError::Chain {
            operation: operation.to_string(),
            message: format!("{err:#}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
