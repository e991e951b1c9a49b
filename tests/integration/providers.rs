//! HTTP clients against a scripted local server: LLM providers and the
//! chain gateway.

use secrecy::SecretString;
use serde_json::json;

use shadowmarkets::chain::gateway::GatewayChainClient;
use shadowmarkets::chain::ChainClient;
use shadowmarkets::llm::gemini::GeminiOracle;
use shadowmarkets::llm::openai::OpenAiOracle;
use shadowmarkets::llm::{LlmOracle, OracleRequest};
use shadowmarkets::types::{Evidence, EvidencePayload, PrivateEvent};

use crate::http_stub::HttpStub;

fn request() -> OracleRequest {
    let event = PrivateEvent::GithubIssueWillClose {
        id: "github:acme/widgets#11@1700000000".into(),
        owner: "acme".into(),
        repo: "widgets".into(),
        issue_number: 11,
        yes_means_closed: true,
        question: "Will issue #11 (\"Crash on login\") be CLOSED before the deadline?".into(),
        end_time_seconds: 1_700_000_000,
    };
    let evidence = Evidence::new(
        &event,
        EvidencePayload::GithubIssueWillClose {
            state: "closed".into(),
            closed_at: Some("2024-05-02T00:00:00Z".into()),
            updated_at: None,
        },
    );
    OracleRequest::new(
        event.question(),
        "YES wins if issue #11 in acme/widgets is closed at the deadline.".into(),
        "NO wins if issue #11 in acme/widgets is still open at the deadline.".into(),
        evidence,
    )
}

fn chat_reply(content: &str) -> String {
    json!({ "choices": [ { "message": { "role": "assistant", "content": content } } ] }).to_string()
}

fn gemini_reply(text: &str) -> String {
    json!({ "candidates": [ { "content": { "parts": [ { "text": text } ] } } ] }).to_string()
}

fn key() -> SecretString {
    SecretString::new("test-key".into())
}

// ---------------------------------------------------------------------------
// OpenAI-compatible
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_openai_retries_rate_limit_then_parses_wrapped_json() {
    let stub = HttpStub::start(vec![
        (429, json!({ "error": "slow down" }).to_string()),
        (200, chat_reply("Here you go:\n```json\n{\"yesWinner\": true, \"confidence\": 0.9, \"reasoning\": \"closed\"}\n```")),
    ])
    .await;

    let oracle = OpenAiOracle::new(&stub.base_url, key(), "gpt-4o-mini", 256).unwrap();
    let decision = oracle.decide_yes_no(&request()).await.unwrap();

    assert!(decision.yes_winner);
    assert_eq!(decision.confidence, 0.9);
    assert_eq!(decision.reasoning, "closed");
    assert_eq!(stub.hits(), 2);

    let sent = &stub.requests()[1];
    assert_eq!(sent.method, "POST");
    assert_eq!(sent.path, "/chat/completions");
    assert_eq!(sent.headers.get("authorization").map(String::as_str), Some("Bearer test-key"));
    let body: serde_json::Value = serde_json::from_str(&sent.body).unwrap();
    assert_eq!(body["model"], "gpt-4o-mini");
    assert_eq!(body["temperature"], 0.0);
    assert!(body["messages"][1]["content"].as_str().unwrap().contains("yesDefinition"));
}

#[tokio::test]
async fn test_openai_non_boolean_winner_is_an_error() {
    let stub = HttpStub::start(vec![(200, chat_reply("{\"yesWinner\": \"yes\", \"confidence\": 0.8}"))]).await;

    let oracle = OpenAiOracle::new(&stub.base_url, key(), "gpt-4o-mini", 256).unwrap();
    let err = oracle.decide_yes_no(&request()).await.unwrap_err();

    assert!(format!("{err:#}").contains("yesWinner"));
    assert_eq!(stub.hits(), 1);
}

#[tokio::test]
async fn test_openai_client_error_is_not_retried() {
    let stub = HttpStub::start(vec![(400, json!({ "error": "bad model" }).to_string())]).await;

    let oracle = OpenAiOracle::new(&stub.base_url, key(), "nope", 256).unwrap();
    assert!(oracle.decide_yes_no(&request()).await.is_err());
    assert_eq!(stub.hits(), 1);
}

// ---------------------------------------------------------------------------
// Gemini
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_gemini_retries_server_error_then_decides() {
    let stub = HttpStub::start(vec![
        (503, json!({ "error": { "message": "overloaded" } }).to_string()),
        (200, gemini_reply("{\"yesWinner\": false, \"reasoning\": \"still open\"}")),
    ])
    .await;

    let oracle = GeminiOracle::new(&stub.base_url, key(), "gemini-1.5-flash", 256).unwrap();
    let decision = oracle.decide_yes_no(&request()).await.unwrap();

    assert!(!decision.yes_winner);
    assert_eq!(decision.confidence, 0.6);
    assert_eq!(decision.reasoning, "still open");
    assert_eq!(stub.hits(), 2);

    let sent = &stub.requests()[1];
    assert_eq!(sent.path, "/models/gemini-1.5-flash:generateContent");
    assert_eq!(sent.headers.get("x-goog-api-key").map(String::as_str), Some("test-key"));
    let body: serde_json::Value = serde_json::from_str(&sent.body).unwrap();
    assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
}

#[tokio::test]
async fn test_gemini_missing_winner_is_an_error() {
    let stub = HttpStub::start(vec![(200, gemini_reply("{\"confidence\": 0.9, \"reasoning\": \"unsure\"}"))]).await;

    let oracle = GeminiOracle::new(&stub.base_url, key(), "gemini-1.5-flash", 256).unwrap();
    let err = oracle.decide_yes_no(&request()).await.unwrap_err();

    assert!(format!("{err:#}").contains("yesWinner"));
    assert_eq!(stub.hits(), 1);
}

// ---------------------------------------------------------------------------
// Chain gateway
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_gateway_read_retries_bad_gateway() {
    let stub = HttpStub::start(vec![
        (502, "upstream unavailable".to_string()),
        (200, json!({ "resolved": false, "end_time": 1_700_000_000, "resolvable": true }).to_string()),
    ])
    .await;

    let chain = GatewayChainClient::new(&stub.base_url, Some(key())).unwrap();
    let account = chain.fetch_market("Mkt111").await.unwrap();

    assert!(!account.resolved);
    assert!(account.resolvable);
    assert_eq!(account.end_time, 1_700_000_000);
    assert_eq!(stub.hits(), 2);

    let sent = &stub.requests()[1];
    assert_eq!(sent.method, "GET");
    assert_eq!(sent.path, "/markets/Mkt111");
    assert_eq!(sent.headers.get("authorization").map(String::as_str), Some("Bearer test-key"));
}

#[tokio::test]
async fn test_gateway_writes_are_single_shot() {
    let stub = HttpStub::start(vec![(503, "node syncing".to_string())]).await;

    let chain = GatewayChainClient::new(&stub.base_url, None).unwrap();
    let err = chain.settle_market("Mkt111", true).await.unwrap_err();

    assert!(format!("{err:#}").contains("node syncing"));
    assert_eq!(stub.hits(), 1);
    let sent = &stub.requests()[0];
    assert_eq!(sent.path, "/markets/Mkt111/settle");
    assert!(!sent.headers.contains_key("authorization"));
    let body: serde_json::Value = serde_json::from_str(&sent.body).unwrap();
    assert_eq!(body, json!({ "yesWinner": true }));
}
