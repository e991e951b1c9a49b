//! ShadowMarkets: private-event prediction market agent.
//!
//! Entry point. Loads and validates configuration, initialises structured
//! logging, wires the chain client, event source, store and optional LLM
//! oracle, then runs the creation and/or oracle loops until Ctrl+C.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use shadowmarkets::chain::gateway::GatewayChainClient;
use shadowmarkets::chain::paper::PaperChainClient;
use shadowmarkets::chain::ChainClient;
use shadowmarkets::config::{AppConfig, ChainMode, Role};
use shadowmarkets::engine::creation::{CreationSettings, MarketCreationAgent};
use shadowmarkets::engine::liquidity::LiquidityAgent;
use shadowmarkets::engine::oracle::OracleAgent;
use shadowmarkets::engine::scheduler::{CreationParams, CreationWorker, OracleWorker, Scheduler};
use shadowmarkets::llm;
use shadowmarkets::sources::make_event_source;
use shadowmarkets::storage::{FileMarketsStore, MarketsStore};

const BANNER: &str = r#"
 ____  _               _               __  __            _        _
/ ___|| |__   __ _  __| | _____      _|  \/  | __ _ _ __| | _____| |_ ___
\___ \| '_ \ / _` |/ _` |/ _ \ \ /\ / / |\/| |/ _` | '__| |/ / _ \ __/ __|
 ___) | | | | (_| | (_| | (_) \ V  V /| |  | | (_| | |  |   <  __/ |_\__ \
|____/|_| |_|\__,_|\__,_|\___/ \_/\_/ |_|  |_|\__,_|_|  |_|\_\___|\__|___/

  Private-event prediction markets
  v0.1.0 | create · activate · settle
"#;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path =
        std::env::var("SHADOWMARKETS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let cfg = AppConfig::load(&config_path)?;
    cfg.validate()?;

    init_logging();

    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        roles = ?cfg.agent.roles,
        chain = ?cfg.chain.mode,
        source = ?cfg.source.kind,
        markets_file = %cfg.agent.markets_file,
        "ShadowMarkets starting up"
    );

    // -- Initialise components -------------------------------------------

    let chain: Arc<dyn ChainClient> = match cfg.chain.mode {
        ChainMode::Gateway => {
            let url = cfg.chain.gateway_url.as_deref().unwrap_or_default();
            let api_key = match cfg.chain.api_key_env.as_deref() {
                Some(env) => Some(AppConfig::resolve_secret(env)?),
                None => None,
            };
            info!(url, "Using chain gateway");
            Arc::new(GatewayChainClient::new(url, api_key)?)
        }
        ChainMode::Paper => {
            warn!(
                balance = cfg.chain.paper_balance_base_units,
                "PAPER MODE: markets are simulated in memory"
            );
            Arc::new(PaperChainClient::new(
                cfg.chain.paper_balance_base_units,
                cfg.chain.activation_window_secs,
            ))
        }
    };

    let source = make_event_source(&cfg.source)?;
    let store: Arc<dyn MarketsStore> = Arc::new(FileMarketsStore::new(&cfg.agent.markets_file));

    let oracle_llm = llm::oracle_from_config(cfg.llm.as_ref())?;

    let mut scheduler = Scheduler::new();

    if cfg.has_role(Role::Creator) {
        let creator = MarketCreationAgent::new(
            chain.clone(),
            source.clone(),
            CreationSettings::from_config(&cfg.chain),
        );
        let worker = CreationWorker::new(
            creator,
            LiquidityAgent::new(chain.clone()),
            store.clone(),
            CreationParams {
                default_duration_secs: cfg.chain.market_duration_secs,
                seed_base_units: cfg.chain.seed_trade_base_units()?,
                activation_window_secs: cfg.chain.activation_window_secs,
            },
        );
        scheduler = scheduler.with_creation(worker, Duration::from_secs(cfg.agent.creation_interval_secs));
    }

    if cfg.has_role(Role::Oracle) {
        let agent = OracleAgent::new(
            chain.clone(),
            source.clone(),
            oracle_llm,
            cfg.oracle.unhandled_kind_policy,
        );
        scheduler = scheduler.with_oracle(
            OracleWorker::new(agent, store.clone()),
            Duration::from_secs(cfg.agent.oracle_interval_secs),
        );
    }

    // -- Main loop -------------------------------------------------------

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    info!(
        creation_interval_secs = cfg.agent.creation_interval_secs,
        oracle_interval_secs = cfg.agent.oracle_interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    scheduler.run(shutdown_rx).await;

    info!("ShadowMarkets shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("shadowmarkets=info"));

    let json_logging = std::env::var("SHADOWMARKETS_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
