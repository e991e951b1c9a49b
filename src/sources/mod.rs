//! Private event sources.
//!
//! Defines the `EventSource` trait and provides implementations for:
//! - GitHub issues: open issues in a (private) repository
//! - Discord: prediction messages queued by an external bot process
//! - Local file: hand-written events and boolean signals

pub mod discord;
pub mod github;
pub mod ledger;
pub mod local;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{AppConfig, SourceConfig, SourceKind};
use crate::types::{Evidence, PrivateEvent};

use self::discord::DiscordSource;
use self::github::GithubSource;
use self::ledger::FileLedger;
use self::local::LocalSource;

/// Abstraction over private event backends.
///
/// Every implementation upholds the same exactly-once contract: an event
/// handed out by `next_event` has already been written to the source's
/// consumed ledger and is never handed out again.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Next unseen event to turn into a market, or `None` if there is none.
    async fn next_event(&self) -> Result<Option<PrivateEvent>>;

    /// Collect resolvability evidence for a previously emitted event.
    ///
    /// Read-only. Event kinds this source does not understand yield
    /// evidence carrying an error marker rather than an `Err`.
    async fn collect_evidence(&self, event: &PrivateEvent) -> Result<Evidence>;

    /// Source name for logging.
    fn name(&self) -> &str;
}

/// Build the event source selected in configuration.
pub fn make_event_source(cfg: &SourceConfig) -> Result<Arc<dyn EventSource>> {
    let source: Arc<dyn EventSource> = match cfg.kind {
        SourceKind::Github => {
            let gh = cfg.github.as_ref().ok_or_else(|| {
                anyhow::anyhow!("source.kind = \"github\" requires a [source.github] table")
            })?;
            let token = AppConfig::resolve_secret(&gh.token_env)?;
            Arc::new(GithubSource::new(
                gh.clone(),
                token,
                Box::new(FileLedger::new(&gh.consumed_path)),
            )?)
        }
        SourceKind::Discord => {
            let dc = cfg.discord.as_ref().ok_or_else(|| {
                anyhow::anyhow!("source.kind = \"discord\" requires a [source.discord] table")
            })?;
            Arc::new(DiscordSource::new(
                dc.clone(),
                Box::new(FileLedger::new(&dc.consumed_path)),
            ))
        }
        SourceKind::Local => Arc::new(LocalSource::new(&cfg.local.path)),
    };
    Ok(source)
}
