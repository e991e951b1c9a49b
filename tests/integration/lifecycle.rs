//! Full market lifecycles against the mock chain.

use secrecy::SecretString;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use shadowmarkets::chain::ChainClient;
use shadowmarkets::config::{GithubSourceConfig, UnhandledKindPolicy};
use shadowmarkets::engine::creation::{CreationSettings, MarketCreationAgent};
use shadowmarkets::engine::decision::LLM_FALLBACK_MARKER;
use shadowmarkets::engine::liquidity::LiquidityAgent;
use shadowmarkets::engine::oracle::{OracleAgent, SettleStatus, ALREADY_RESOLVED};
use shadowmarkets::engine::scheduler::{CreationParams, CreationWorker, OracleWorker, Scheduler};
use shadowmarkets::llm::LlmOracle;
use shadowmarkets::sources::github::GithubSource;
use shadowmarkets::sources::ledger::FileLedger;
use shadowmarkets::sources::local::LocalSource;
use shadowmarkets::sources::EventSource;
use shadowmarkets::storage::{FileMarketsStore, MarketsStore};

use crate::github_stub::GithubStub;
use crate::mock_chain::MockChain;
use crate::mock_llm::ScriptedLlm;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const WINDOW_SECS: i64 = 900;

fn temp_dir() -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("shadowmarkets_it_{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&p).unwrap();
    p
}

fn settings() -> CreationSettings {
    CreationSettings {
        collateral_mint: "Gh9ZwEmdLJ8DscKNTkTqPbNwLNNBjuSzaG9Vp2KGtKJr".into(),
        initial_liquidity_base_units: 1_000_000,
        oracle: None,
        yes_odds_bps: Some(5_000),
    }
}

fn params(default_duration_secs: i64) -> CreationParams {
    CreationParams {
        default_duration_secs,
        seed_base_units: 1_000_000,
        activation_window_secs: WINDOW_SECS,
    }
}

fn signal(id: &str, key: &str, expected_yes: bool) -> serde_json::Value {
    json!({
        "kind": "localBooleanSignal",
        "id": id,
        "signalKey": key,
        "expectedYes": expected_yes,
        "question": format!("Will {key} be {expected_yes}?"),
        "endTimeSeconds": 0
    })
}

fn write_events(dir: &Path, events: Vec<serde_json::Value>, signals: serde_json::Value) -> PathBuf {
    let path = dir.join("private-events.json");
    let doc = json!({ "events": events, "consumedIds": [], "signals": signals });
    std::fs::write(&path, serde_json::to_string_pretty(&doc).unwrap()).unwrap();
    path
}

fn creation_worker(
    chain: &Arc<MockChain>,
    source: &Arc<dyn EventSource>,
    store: &Arc<dyn MarketsStore>,
    default_duration_secs: i64,
) -> CreationWorker {
    let chain: Arc<dyn ChainClient> = chain.clone();
    CreationWorker::new(
        MarketCreationAgent::new(chain.clone(), source.clone(), settings()),
        LiquidityAgent::new(chain),
        store.clone(),
        params(default_duration_secs),
    )
}

fn oracle_agent(
    chain: &Arc<MockChain>,
    source: &Arc<dyn EventSource>,
    llm: Option<Arc<dyn LlmOracle>>,
) -> OracleAgent {
    let chain: Arc<dyn ChainClient> = chain.clone();
    OracleAgent::new(chain, source.clone(), llm, UnhandledKindPolicy::DefaultNo)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_github_issue_closed_settles_yes_without_llm() {
    let dir = temp_dir();
    let stub = GithubStub::start(vec![GithubStub::issue(11, "Crash on login")]).await;

    let cfg = GithubSourceConfig {
        owner: "acme".into(),
        repo: "widgets".into(),
        token_env: "UNUSED".into(),
        api_base: stub.base_url.clone(),
        window_secs: 60,
        per_page: 30,
        consumed_path: dir.join("github-consumed.json").to_string_lossy().to_string(),
    };
    let source: Arc<dyn EventSource> = Arc::new(
        GithubSource::new(
            cfg.clone(),
            SecretString::new("test-token".into()),
            Box::new(FileLedger::new(&cfg.consumed_path)),
        )
        .unwrap(),
    );
    let chain = Arc::new(MockChain::new(10_000_000, WINDOW_SECS));
    let store: Arc<dyn MarketsStore> = Arc::new(FileMarketsStore::new(dir.join("markets.json")));

    // Create + activate.
    let mut creation = creation_worker(&chain, &source, &store, 3_600);
    let tick = creation.tick().await;
    let market = tick.created.clone().expect("market created");
    assert_eq!(tick.activated, vec![market.clone()]);
    assert_eq!(chain.volume(&market), (1_000_000, 0));

    let record = store.load_markets().unwrap().remove(0);
    assert!(record.question.contains("Will issue #11 (\"Crash on login\") be CLOSED"));
    assert!(record.event.id().starts_with("github:acme/widgets#11@"));

    // The issue is consumed: no second market for it.
    assert!(creation.tick().await.created.is_none());

    // Close the issue, let the market end, settle.
    stub.close_issue(11);
    chain.rewind(&market, 120);

    let oracle = oracle_agent(&chain, &source, None);
    let status = oracle.settle_if_ready(&record.market, &record.event).await.unwrap();
    match &status {
        SettleStatus::Settled { yes_winner, used_llm, .. } => {
            assert!(*yes_winner);
            assert!(!*used_llm);
        }
        other => panic!("expected settlement, got {other:?}"),
    }
    assert_eq!(chain.winner(&market), Some(true));

    // A second attempt sees the on-chain flag and does nothing.
    let again = oracle.settle_if_ready(&record.market, &record.event).await.unwrap();
    assert_eq!(again, SettleStatus::NotSettled { reason: ALREADY_RESOLVED.into() });
    assert_eq!(chain.count("settle_market"), 1);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_local_signals_settle_through_workers() {
    let dir = temp_dir();
    let path = write_events(
        &dir,
        vec![signal("sig-1", "deploy_green", true), signal("sig-2", "tests_pass", true)],
        json!({ "deploy_green": true, "tests_pass": false }),
    );
    let source: Arc<dyn EventSource> = Arc::new(LocalSource::new(&path));
    let chain = Arc::new(MockChain::new(10_000_000, WINDOW_SECS));
    let store: Arc<dyn MarketsStore> = Arc::new(FileMarketsStore::new(dir.join("markets.json")));

    let mut creation = creation_worker(&chain, &source, &store, 60);
    let first = creation.tick().await.created.unwrap();
    let second = creation.tick().await.created.unwrap();
    chain.rewind(&first, 120);
    chain.rewind(&second, 120);

    let oracle = OracleWorker::new(oracle_agent(&chain, &source, None), store.clone());
    let tick = oracle.tick().await;
    assert_eq!(tick.settled, vec![first.clone(), second.clone()]);

    let markets = store.load_markets().unwrap();
    assert_eq!(markets[0].result.as_ref().map(|r| r.yes_winner), Some(true));
    assert_eq!(markets[1].result.as_ref().map(|r| r.yes_winner), Some(false));
    assert!(markets.iter().all(|m| m.settled));

    // The shared document still holds events and signals next to the ledger.
    let doc: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(doc["events"].as_array().unwrap().len(), 2);
    assert_eq!(doc["signals"]["deploy_green"], true);
    assert_eq!(doc["consumedIds"], json!(["sig-1", "sig-2"]));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_restarts_never_create_duplicate_markets() {
    let dir = temp_dir();
    let events: Vec<_> = (0..3).map(|i| signal(&format!("sig-{i}"), "k", true)).collect();
    let path = write_events(&dir, events, json!({}));
    let chain = Arc::new(MockChain::new(100_000_000, WINDOW_SECS));
    let markets_path = dir.join("markets.json");

    for _ in 0..3 {
        // Fresh source and store per "process", same files.
        let source: Arc<dyn EventSource> = Arc::new(LocalSource::new(&path));
        let store: Arc<dyn MarketsStore> = Arc::new(FileMarketsStore::new(&markets_path));
        let mut creation = creation_worker(&chain, &source, &store, 60);
        creation.tick().await;
        creation.tick().await;
    }

    let store = FileMarketsStore::new(&markets_path);
    let ids: Vec<String> = store.load_markets().unwrap().iter().map(|m| m.event.id().to_string()).collect();
    assert_eq!(ids, vec!["sig-0", "sig-1", "sig-2"]);
    assert_eq!(chain.count("create_market"), 3);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_llm_failure_falls_back_to_rule() {
    let dir = temp_dir();
    let path = write_events(&dir, vec![signal("sig-1", "deploy_green", true)], json!({ "deploy_green": true }));
    let source: Arc<dyn EventSource> = Arc::new(LocalSource::new(&path));
    let chain = Arc::new(MockChain::new(10_000_000, WINDOW_SECS));
    let store: Arc<dyn MarketsStore> = Arc::new(FileMarketsStore::new(dir.join("markets.json")));

    let market = creation_worker(&chain, &source, &store, 60).tick().await.created.unwrap();
    chain.rewind(&market, 120);

    let llm = Arc::new(ScriptedLlm::failing("HTTP 429: rate limited"));
    let oracle_llm: Arc<dyn LlmOracle> = llm.clone();
    let oracle = OracleWorker::new(oracle_agent(&chain, &source, Some(oracle_llm)), store.clone());
    assert_eq!(oracle.tick().await.settled.len(), 1);
    assert_eq!(llm.calls(), 1);

    let result = store.load_markets().unwrap()[0].result.clone().unwrap();
    assert!(result.yes_winner);
    assert!(result.reasoning.starts_with("Deterministic rule"));
    assert!(result.reasoning.contains(LLM_FALLBACK_MARKER));
    assert!(result.reasoning.contains("rate limited"));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_llm_decision_overrides_rule() {
    let dir = temp_dir();
    let path = write_events(&dir, vec![signal("sig-1", "deploy_green", true)], json!({ "deploy_green": true }));
    let source: Arc<dyn EventSource> = Arc::new(LocalSource::new(&path));
    let chain = Arc::new(MockChain::new(10_000_000, WINDOW_SECS));
    let store: Arc<dyn MarketsStore> = Arc::new(FileMarketsStore::new(dir.join("markets.json")));

    let market = creation_worker(&chain, &source, &store, 60).tick().await.created.unwrap();
    chain.rewind(&market, 120);

    let llm: Arc<dyn LlmOracle> = Arc::new(ScriptedLlm::deciding(false, "deploy was rolled back"));
    let record = store.load_markets().unwrap().remove(0);
    let status = oracle_agent(&chain, &source, Some(llm))
        .settle_if_ready(&record.market, &record.event)
        .await
        .unwrap();

    assert!(matches!(status, SettleStatus::Settled { yes_winner: false, used_llm: true, .. }));
    assert_eq!(chain.winner(&market), Some(false));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_failed_activation_is_retried_then_voided() {
    let dir = temp_dir();
    let path = write_events(
        &dir,
        vec![signal("sig-1", "a", true), signal("sig-2", "b", true)],
        json!({}),
    );
    let source: Arc<dyn EventSource> = Arc::new(LocalSource::new(&path));
    let chain = Arc::new(MockChain::new(10_000_000, WINDOW_SECS));
    let store: Arc<dyn MarketsStore> = Arc::new(FileMarketsStore::new(dir.join("markets.json")));
    let mut creation = creation_worker(&chain, &source, &store, 3_600);

    // First market: activation fails, then recovers on the next tick.
    chain.set_error("set_market_resolvable", "RPC node unavailable");
    let tick = creation.tick().await;
    let first = tick.created.clone().unwrap();
    assert!(tick.activated.is_empty());
    assert_eq!(tick.pending, 1);
    assert_eq!(chain.count("buy_tokens"), 0);

    chain.clear_error("set_market_resolvable");
    let tick = creation.tick().await;
    assert!(tick.activated.contains(&first));
    let second = tick.created.clone().unwrap();
    assert!(tick.activated.contains(&second));
    assert_eq!(tick.pending, 0);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_activation_window_elapsed_voids_market() {
    let dir = temp_dir();
    let path = write_events(&dir, vec![signal("sig-1", "a", true)], json!({}));
    let source: Arc<dyn EventSource> = Arc::new(LocalSource::new(&path));
    let chain = Arc::new(MockChain::new(10_000_000, WINDOW_SECS));
    let store: Arc<dyn MarketsStore> = Arc::new(FileMarketsStore::new(dir.join("markets.json")));
    let mut creation = creation_worker(&chain, &source, &store, 3_600);

    chain.set_error("set_market_resolvable", "blockhash not found");
    let market = creation.tick().await.created.unwrap();
    chain.clear_error("set_market_resolvable");

    // Pretend the worker was stalled past the window.
    let pending = creation.pending()[0].clone();
    let liquidity = LiquidityAgent::new(chain.clone());
    let outcome = liquidity
        .retry(pending.clone(), 1_000_000, WINDOW_SECS, pending.created_at_seconds + WINDOW_SECS + 1)
        .await;
    assert!(matches!(
        outcome,
        shadowmarkets::engine::liquidity::RetryOutcome::Abandoned { market: ref m, .. } if *m == market
    ));
    assert_eq!(chain.count("set_market_resolvable"), 1);

    // The program also refuses late activation.
    chain.rewind(&market, WINDOW_SECS + 1);
    assert!(chain.set_market_resolvable(&market, true).await.is_err());

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_chain_outage_does_not_unconsume_event() {
    let dir = temp_dir();
    let path = write_events(&dir, vec![signal("sig-1", "a", true)], json!({}));
    let source: Arc<dyn EventSource> = Arc::new(LocalSource::new(&path));
    let chain = Arc::new(MockChain::new(10_000_000, WINDOW_SECS));
    let store: Arc<dyn MarketsStore> = Arc::new(FileMarketsStore::new(dir.join("markets.json")));
    let mut creation = creation_worker(&chain, &source, &store, 3_600);

    chain.set_error("create_market", "Insufficient collateral balance");
    let tick = creation.tick().await;
    assert!(tick.created.is_none());
    assert!(tick.error.as_deref().unwrap().contains("Insufficient"));

    chain.clear_error("create_market");
    assert!(creation.tick().await.created.is_none());
    assert!(store.load_markets().unwrap().is_empty());

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_unrecordable_market_is_not_funded() {
    let dir = temp_dir();
    let path = write_events(&dir, vec![signal("sig-1", "a", true)], json!({}));
    let source: Arc<dyn EventSource> = Arc::new(LocalSource::new(&path));
    let chain = Arc::new(MockChain::new(10_000_000, WINDOW_SECS));
    let markets_path = dir.join("markets.json");
    std::fs::write(&markets_path, "{ \"markets\": [ {").unwrap();
    let store: Arc<dyn MarketsStore> = Arc::new(FileMarketsStore::new(&markets_path));
    let mut creation = creation_worker(&chain, &source, &store, 3_600);

    let tick = creation.tick().await;
    assert!(tick.created.is_some());
    assert!(tick.activated.is_empty());
    assert_eq!(tick.pending, 0);
    assert!(tick.error.is_some());
    assert_eq!(chain.count("set_market_resolvable"), 0);
    assert_eq!(chain.count("buy_tokens"), 0);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_oracle_errors_leave_record_unsettled() {
    let dir = temp_dir();
    let path = write_events(&dir, vec![signal("sig-1", "a", true)], json!({ "a": true }));
    let source: Arc<dyn EventSource> = Arc::new(LocalSource::new(&path));
    let chain = Arc::new(MockChain::new(10_000_000, WINDOW_SECS));
    let store: Arc<dyn MarketsStore> = Arc::new(FileMarketsStore::new(dir.join("markets.json")));

    let market = creation_worker(&chain, &source, &store, 60).tick().await.created.unwrap();
    chain.rewind(&market, 120);

    let oracle = OracleWorker::new(oracle_agent(&chain, &source, None), store.clone());
    chain.set_error("settle_market", "Transaction simulation failed");
    let tick = oracle.tick().await;
    assert_eq!((tick.checked, tick.errors), (1, 1));
    assert!(!store.load_markets().unwrap()[0].settled);

    chain.clear_error("settle_market");
    assert_eq!(oracle.tick().await.settled, vec![market]);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_scheduler_runs_full_lifecycle_until_shutdown() {
    let dir = temp_dir();
    let path = write_events(&dir, vec![signal("sig-1", "a", true)], json!({ "a": true }));
    let source: Arc<dyn EventSource> = Arc::new(LocalSource::new(&path));
    let chain = Arc::new(MockChain::new(10_000_000, WINDOW_SECS));
    let store: Arc<dyn MarketsStore> = Arc::new(FileMarketsStore::new(dir.join("markets.json")));

    let scheduler = Scheduler::new()
        .with_creation(creation_worker(&chain, &source, &store, 1), Duration::from_millis(50))
        .with_oracle(
            OracleWorker::new(oracle_agent(&chain, &source, None), store.clone()),
            Duration::from_millis(50),
        );

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(scheduler.run(rx));

    // One-second market: created, activated, ended, settled.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        // The scheduler task may be mid-write; an unreadable file just means "not yet".
        let settled = store
            .load_markets()
            .ok()
            .and_then(|markets| markets.first().map(|m| m.settled))
            .unwrap_or(false);
        if settled {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "market was not settled in time");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();

    let markets = store.load_markets().unwrap();
    assert_eq!(markets.len(), 1);
    assert_eq!(markets[0].result.as_ref().map(|r| r.yes_winner), Some(true));
    assert_eq!(chain.count("settle_market"), 1);

    std::fs::remove_dir_all(&dir).unwrap();
}
