//! GitHub issues event source.
//!
//! Turns open issues of a (typically private) repository into
//! "will this issue be closed before the deadline?" markets, and reads the
//! issue state back as settlement evidence.
//!
//! API docs: https://docs.github.com/en/rest/issues/issues
//! Auth: `Authorization: Bearer {token}`; the issue list is the private data.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize};
use std::collections::HashSet;
use tracing::{debug, info};

use super::ledger::ConsumedLedger;
use super::EventSource;
use crate::config::GithubSourceConfig;
use crate::types::{now_seconds, Evidence, EvidencePayload, PrivateEvent};

const SOURCE_NAME: &str = "GithubSource";
const API_VERSION: &str = "2022-11-28";

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

/// Issue fields we use. Pull requests are returned by the issues endpoint
/// too and carry a `pull_request` object.
#[derive(Debug, Clone, Deserialize)]
struct GithubIssue {
    number: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    closed_at: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

pub struct GithubSource {
    http: Client,
    cfg: GithubSourceConfig,
    token: SecretString,
    /// Keyed by issue number.
    ledger: Box<dyn ConsumedLedger>,
}

impl GithubSource {
    pub fn new(
        cfg: GithubSourceConfig,
        token: SecretString,
        ledger: Box<dyn ConsumedLedger>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("ShadowMarkets/0.1.0 (private-event-agent)")
            .build()
            .context("Failed to build HTTP client for GitHub")?;

        Ok(Self { http, cfg, token, ledger })
    }

    fn repo_url(&self, owner: &str, repo: &str) -> String {
        format!(
            "{}/repos/{}/{}",
            self.cfg.api_base.trim_end_matches('/'),
            urlencoding::encode(owner),
            urlencoding::encode(repo),
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!(url = %url, "Fetching GitHub");

        let resp = self
            .http
            .get(url)
            .bearer_auth(self.token.expose_secret())
            .header("X-GitHub-Api-Version", API_VERSION)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .context("GitHub API request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("GitHub API error {status}: {body}");
        }

        resp.json().await.context("Failed to parse GitHub response")
    }

    /// First open issue (not a pull request) whose number is not consumed.
    fn select_issue<'a>(issues: &'a [GithubIssue], consumed: &HashSet<String>) -> Option<&'a GithubIssue> {
        issues
            .iter()
            .filter(|i| i.pull_request.is_none())
            .find(|i| !consumed.contains(&i.number.to_string()))
    }

    fn build_event(owner: &str, repo: &str, issue: &GithubIssue, end_time_seconds: i64) -> PrivateEvent {
        PrivateEvent::GithubIssueWillClose {
            id: format!("github:{owner}/{repo}#{}@{end_time_seconds}", issue.number),
            owner: owner.to_string(),
            repo: repo.to_string(),
            issue_number: issue.number,
            yes_means_closed: true,
            question: format!(
                "Will issue #{} (\"{}\") be CLOSED before the deadline?",
                issue.number, issue.title
            ),
            end_time_seconds,
        }
    }
}

#[async_trait]
impl EventSource for GithubSource {
    async fn next_event(&self) -> Result<Option<PrivateEvent>> {
        let url = format!(
            "{}/issues?state=open&per_page={}",
            self.repo_url(&self.cfg.owner, &self.cfg.repo),
            self.cfg.per_page,
        );
        let issues: Vec<GithubIssue> = self.get_json(&url).await?;

        let consumed = self.ledger.consumed()?;
        let Some(issue) = Self::select_issue(&issues, &consumed) else {
            debug!(open = issues.len(), "No unconsumed open issues");
            return Ok(None);
        };

        // Ledger first: a crash from here on loses the issue, never duplicates it.
        self.ledger.consume(&issue.number.to_string())?;

        let end = now_seconds() + self.cfg.window_secs;
        let event = Self::build_event(&self.cfg.owner, &self.cfg.repo, issue, end);
        info!(
            issue = issue.number,
            repo = %format!("{}/{}", self.cfg.owner, self.cfg.repo),
            end_time = end,
            "GitHub issue consumed"
        );
        Ok(Some(event))
    }

    async fn collect_evidence(&self, event: &PrivateEvent) -> Result<Evidence> {
        let PrivateEvent::GithubIssueWillClose { owner, repo, issue_number, .. } = event else {
            return Ok(Evidence::unsupported(event, SOURCE_NAME));
        };

        let url = format!("{}/issues/{issue_number}", self.repo_url(owner, repo));
        let issue: GithubIssue = self.get_json(&url).await?;

        Ok(Evidence::new(
            event,
            EvidencePayload::GithubIssueWillClose {
                state: issue.state,
                closed_at: issue.closed_at,
                updated_at: issue.updated_at,
            },
        ))
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
