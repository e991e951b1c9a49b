//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (gateway key, GitHub token, LLM key) are referenced by env-var
//! name in the config and resolved at startup via `std::env::var`.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;

use crate::types::{to_base_units, AgentError};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub chain: ChainConfig,
    pub source: SourceConfig,
    /// Absent table means no LLM oracle; settlement is purely rule-based.
    #[serde(default)]
    pub llm: Option<LlmConfig>,
    #[serde(default)]
    pub oracle: OracleConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    /// Which loops this process runs.
    pub roles: Vec<Role>,
    #[serde(default = "default_interval")]
    pub creation_interval_secs: u64,
    #[serde(default = "default_interval")]
    pub oracle_interval_secs: u64,
    #[serde(default = "default_markets_file")]
    pub markets_file: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Creator,
    Oracle,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChainMode {
    /// HTTP chain gateway that owns the wallet and market program SDK.
    Gateway,
    /// In-memory simulation, nothing leaves the process.
    Paper,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    pub mode: ChainMode,
    #[serde(default)]
    pub gateway_url: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    pub collateral_mint: String,
    #[serde(default = "default_collateral_decimals")]
    pub collateral_decimals: u32,
    /// Settler authority for created markets. Gateway signer when unset.
    #[serde(default)]
    pub oracle_address: Option<String>,
    #[serde(default = "default_initial_liquidity")]
    pub initial_liquidity_base_units: u64,
    /// Seed trade size in whole collateral tokens.
    #[serde(default = "default_seed_trade_amount")]
    pub seed_trade_amount: Decimal,
    #[serde(default)]
    pub yes_odds_bps: Option<u16>,
    #[serde(default = "default_market_duration")]
    pub market_duration_secs: i64,
    /// Deadline after creation for marking a market resolvable.
    #[serde(default = "default_activation_window")]
    pub activation_window_secs: i64,
    /// Starting collateral balance for paper mode.
    #[serde(default = "default_paper_balance")]
    pub paper_balance_base_units: u64,
}

impl ChainConfig {
    pub fn seed_trade_base_units(&self) -> Result<u64> {
        to_base_units(self.seed_trade_amount, self.collateral_decimals)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Local,
    Github,
    Discord,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub kind: SourceKind,
    #[serde(default)]
    pub local: LocalSourceConfig,
    #[serde(default)]
    pub github: Option<GithubSourceConfig>,
    #[serde(default)]
    pub discord: Option<DiscordSourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocalSourceConfig {
    pub path: String,
}

impl Default for LocalSourceConfig {
    fn default() -> Self {
        Self { path: "./data/private-events.json".to_string() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubSourceConfig {
    pub owner: String,
    pub repo: String,
    #[serde(default = "default_github_token_env")]
    pub token_env: String,
    #[serde(default = "default_github_api")]
    pub api_base: String,
    #[serde(default = "default_github_window")]
    pub window_secs: i64,
    #[serde(default = "default_github_per_page")]
    pub per_page: u32,
    #[serde(default = "default_github_consumed")]
    pub consumed_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscordSourceConfig {
    pub guild_id: String,
    pub channel_id: String,
    #[serde(default = "default_discord_pending")]
    pub pending_path: String,
    #[serde(default = "default_discord_consumed")]
    pub consumed_path: String,
    #[serde(default = "default_discord_window")]
    pub window_secs: i64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Any OpenAI-compatible chat completions endpoint.
    OpenAi,
    Gemini,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: String,
    /// API base; each provider has its own default.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
}

/// What to do when no deterministic rule covers an event.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnhandledKindPolicy {
    /// Settle NO and flag the reasoning.
    #[default]
    DefaultNo,
    /// Settle only on an LLM decision; otherwise leave the market open.
    Defer,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct OracleConfig {
    #[serde(default)]
    pub unhandled_kind_policy: UnhandledKindPolicy,
}

fn default_interval() -> u64 { 20 }
fn default_markets_file() -> String { crate::storage::DEFAULT_MARKETS_FILE.to_string() }
fn default_collateral_decimals() -> u32 { 6 }
fn default_initial_liquidity() -> u64 { 1_000_000 }
fn default_seed_trade_amount() -> Decimal { Decimal::ONE }
fn default_market_duration() -> i64 { 3600 }
fn default_activation_window() -> i64 { 15 * 60 }
fn default_paper_balance() -> u64 { 1_000_000_000 }
fn default_github_token_env() -> String { "GITHUB_TOKEN".to_string() }
fn default_github_api() -> String { "https://api.github.com".to_string() }
fn default_github_window() -> i64 { 30 * 60 }
fn default_github_per_page() -> u32 { 30 }
fn default_github_consumed() -> String { "./data/github-consumed.json".to_string() }
fn default_discord_pending() -> String { "./data/discord-pending.json".to_string() }
fn default_discord_consumed() -> String { "./data/discord-consumed.json".to_string() }
fn default_discord_window() -> i64 { 3600 }
fn default_llm_key_env() -> String { "LLM_API_KEY".to_string() }
fn default_llm_max_tokens() -> u32 { 512 }

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Resolve an environment variable name to a secret value.
    pub fn resolve_secret(env_name: &str) -> Result<SecretString, AgentError> {
        match std::env::var(env_name) {
            Ok(v) if !v.trim().is_empty() => Ok(SecretString::new(v)),
            _ => Err(AgentError::Config(format!("Environment variable not set: {env_name}"))),
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.agent.roles.contains(&role)
    }

    /// Reject missing or invalid startup configuration.
    ///
    /// Checks values only; secrets are resolved when clients are built.
    pub fn validate(&self) -> Result<(), AgentError> {
        fn fail(msg: &str) -> Result<(), AgentError> {
            Err(AgentError::Config(msg.to_string()))
        }

        if self.agent.roles.is_empty() {
            return fail("agent.roles must name at least one of \"creator\", \"oracle\"");
        }
        if self.agent.creation_interval_secs == 0 || self.agent.oracle_interval_secs == 0 {
            return fail("agent intervals must be positive");
        }
        if self.agent.markets_file.trim().is_empty() {
            return fail("agent.markets_file must not be empty");
        }

        let chain = &self.chain;
        if chain.mode == ChainMode::Gateway {
            match chain.gateway_url.as_deref() {
                Some(url) if url.starts_with("http://") || url.starts_with("https://") => {}
                Some(_) => return fail("chain.gateway_url must be an http(s) URL"),
                None => return fail("chain.mode = \"gateway\" requires chain.gateway_url"),
            }
        }
        if chain.collateral_mint.trim().is_empty() {
            return fail("chain.collateral_mint must not be empty");
        }
        if chain.collateral_decimals > 18 {
            return fail("chain.collateral_decimals must be at most 18");
        }
        if let Some(bps) = chain.yes_odds_bps {
            if bps == 0 || bps >= 10_000 {
                return fail("chain.yes_odds_bps must be between 1 and 9999");
            }
        }
        if chain.market_duration_secs <= 0 {
            return fail("chain.market_duration_secs must be positive");
        }
        if chain.activation_window_secs <= 0 {
            return fail("chain.activation_window_secs must be positive");
        }
        match chain.seed_trade_base_units() {
            Ok(units) if units > 0 => {}
            Ok(_) => return fail("chain.seed_trade_amount is below one base unit"),
            Err(e) => return Err(AgentError::Config(format!("chain.seed_trade_amount: {e}"))),
        }

        match self.source.kind {
            SourceKind::Github => {
                let Some(gh) = &self.source.github else {
                    return fail("source.kind = \"github\" requires a [source.github] table");
                };
                if gh.owner.is_empty() || gh.repo.is_empty() {
                    return fail("source.github.owner and source.github.repo are required");
                }
                if gh.window_secs <= 0 || gh.per_page == 0 {
                    return fail("source.github.window_secs and per_page must be positive");
                }
            }
            SourceKind::Discord => {
                let Some(dc) = &self.source.discord else {
                    return fail("source.kind = \"discord\" requires a [source.discord] table");
                };
                if dc.guild_id.is_empty() || dc.channel_id.is_empty() {
                    return fail("source.discord.guild_id and channel_id are required");
                }
                if dc.window_secs <= 0 {
                    return fail("source.discord.window_secs must be positive");
                }
            }
            SourceKind::Local => {
                if self.source.local.path.trim().is_empty() {
                    return fail("source.local.path must not be empty");
                }
            }
        }

        if let Some(llm) = &self.llm {
            if llm.model.trim().is_empty() {
                return fail("llm.model must not be empty");
            }
        }

        Ok(())
    }
}
