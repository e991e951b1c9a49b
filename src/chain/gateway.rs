//! Chain gateway HTTP client.
//!
//! The gateway is a small service next to the wallet that wraps the market
//! program SDK and exposes it as JSON over HTTP:
//!
//! | Operation              | Request                                 |
//! |------------------------|-----------------------------------------|
//! | create market          | `POST /markets`                         |
//! | enable / disable       | `POST /markets/{market}/resolvable`     |
//! | buy outcome tokens     | `POST /markets/{market}/buy`            |
//! | fetch account          | `GET  /markets/{market}`                |
//! | settle                 | `POST /markets/{market}/settle`         |
//!
//! Auth: optional `Authorization: Bearer {key}`.
//!
//! Only reads are retried. A retried write could create a second market or
//! place a second trade, so writes fail through to the next poll instead.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{ChainClient, CreateMarketParams, CreatedMarket, MarketAccount, TxReceipt};
use crate::types::Side;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const CLIENT_NAME: &str = "gateway";

/// Maximum retries for reads on rate limit / server errors.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (ms).
const BASE_BACKOFF_MS: u64 = 500;

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ResolvableRequest {
    enabled: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BuyRequest {
    side: Side,
    amount_base_units: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SettleRequest {
    yes_winner: bool,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct GatewayChainClient {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl GatewayChainClient {
    pub fn new(base_url: &str, api_key: Option<SecretString>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .user_agent("ShadowMarkets/0.1.0 (private-event-agent)")
            .build()
            .context("Failed to build HTTP client for chain gateway")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn market_url(&self, market: &str, action: Option<&str>) -> String {
        let base = format!("{}/markets/{}", self.base_url, urlencoding::encode(market));
        match action {
            Some(action) => format!("{base}/{action}"),
            None => base,
        }
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key.expose_secret()),
            None => req,
        }
    }

    async fn decode<T: DeserializeOwned>(resp: Response, operation: &str) -> Result<T> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Gateway {operation} failed {status}: {body}");
        }
        resp.json()
            .await
            .with_context(|| format!("Failed to parse gateway {operation} response"))
    }

    /// Single-shot POST for state-changing calls.
    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
        operation: &str,
    ) -> Result<T> {
        debug!(url = %url, operation, "Gateway write");
        let resp = self
            .authorize(self.http.post(url))
            .json(body)
            .send()
            .await
            .with_context(|| format!("Gateway {operation} request failed"))?;
        Self::decode(resp, operation).await
    }

    /// GET with retry + backoff.
    async fn get<T: DeserializeOwned>(&self, url: &str, operation: &str) -> Result<T> {
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                debug!(attempt, delay_ms = delay, operation, "Retrying gateway read");
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }

            match self.authorize(self.http.get(url)).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body = resp.text().await.unwrap_or_default();
                        warn!(status = %status, attempt, operation, "Retryable gateway error");
                        last_error = Some(format!("HTTP {status}: {body}"));
                        continue;
                    }
                    return Self::decode(resp, operation).await;
                }
                Err(e) => {
                    warn!(attempt, operation, error = %e, "Gateway request failed");
                    last_error = Some(format!("Request error: {e}"));
                }
            }
        }

        anyhow::bail!(
            "Gateway {operation} failed after {MAX_RETRIES} retries: {}",
            last_error.unwrap_or_default()
        )
    }
}

#[async_trait]
impl ChainClient for GatewayChainClient {
    async fn create_market(&self, params: &CreateMarketParams) -> Result<CreatedMarket> {
        let url = format!("{}/markets", self.base_url);
        let created: CreatedMarket = self.post(&url, params, "create_market").await?;
        info!(market = %created.market, signature = %created.signature, "Market created on-chain");
        Ok(created)
    }

    async fn set_market_resolvable(&self, market: &str, enabled: bool) -> Result<TxReceipt> {
        let url = self.market_url(market, Some("resolvable"));
        self.post(&url, &ResolvableRequest { enabled }, "set_market_resolvable").await
    }

    async fn buy_tokens(&self, market: &str, side: Side, amount_base_units: u64) -> Result<TxReceipt> {
        let url = self.market_url(market, Some("buy"));
        self.post(&url, &BuyRequest { side, amount_base_units }, "buy_tokens").await
    }

    async fn fetch_market(&self, market: &str) -> Result<MarketAccount> {
        let url = self.market_url(market, None);
        self.get(&url, "fetch_market").await
    }

    async fn settle_market(&self, market: &str, yes_winner: bool) -> Result<TxReceipt> {
        let url = self.market_url(market, Some("settle"));
        self.post(&url, &SettleRequest { yes_winner }, "settle_market").await
    }

    fn name(&self) -> &str {
        CLIENT_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
