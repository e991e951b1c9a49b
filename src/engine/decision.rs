//! Settlement decision pipeline.
//!
//! Two stages:
//! 1. `baseline_decision`: a pure rule per event kind.
//! 2. `decide`: optionally asks the LLM oracle; its answer overrides the
//!    baseline, and any LLM failure falls back to the baseline with a
//!    marker in the reasoning.

use tracing::{debug, warn};

use crate::config::UnhandledKindPolicy;
use crate::llm::{LlmOracle, OracleRequest};
use crate::types::{Evidence, EvidencePayload, PrivateEvent};

/// Marker prefixed to the failure detail when the LLM could not decide.
pub const LLM_FALLBACK_MARKER: &str = "LLM failed, fallback used:";

/// Reason given when a market is left open under the `defer` policy.
pub const DEFERRED_REASON: &str = "no deterministic rule";

/// Outcome of the deterministic rule stage.
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineDecision {
    pub yes_winner: bool,
    pub reasoning: String,
    /// False when no rule covered the event and the NO default was applied.
    pub handled: bool,
}

/// Final decision handed to the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub yes_winner: bool,
    pub reasoning: String,
    pub used_llm: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Decided(Decision),
    /// Leave the market open and try again next tick.
    Deferred { reason: String },
}

fn unhandled(detail: String) -> BaselineDecision {
    BaselineDecision {
        yes_winner: false,
        reasoning: format!("Unhandled event kind: {detail}; defaulting to NO."),
        handled: false,
    }
}

/// Deterministic outcome for an event given its evidence.
pub fn baseline_decision(event: &PrivateEvent, evidence: &Evidence) -> BaselineDecision {
    if let Some(err) = evidence.error() {
        return unhandled(format!("evidence unavailable ({err})"));
    }

    match (event, &evidence.payload) {
        (
            PrivateEvent::GithubIssueWillClose { yes_means_closed, .. },
            EvidencePayload::GithubIssueWillClose { state, .. },
        ) => {
            let is_closed = state == "closed";
            let yes_winner = if *yes_means_closed { is_closed } else { !is_closed };
            BaselineDecision {
                yes_winner,
                reasoning: format!(
                    "Deterministic rule: issue state={state}; YES means {} at deadline.",
                    if *yes_means_closed { "closed" } else { "open" }
                ),
                handled: true,
            }
        }
        (
            PrivateEvent::LocalBooleanSignal { signal_key, expected_yes, .. },
            EvidencePayload::LocalBooleanSignal { value, .. },
        ) => {
            let observed = value.unwrap_or(false);
            BaselineDecision {
                yes_winner: observed == *expected_yes,
                reasoning: format!(
                    "Deterministic rule: signal {signal_key}={}; expectedYes={expected_yes}.",
                    value.map_or_else(|| "missing".to_string(), |v| v.to_string())
                ),
                handled: true,
            }
        }
        (PrivateEvent::DiscordPrediction { .. }, _) => unhandled(event.kind().to_string()),
        (_, payload) => unhandled(format!(
            "{} event with {} evidence",
            event.kind(),
            payload_kind(payload)
        )),
    }
}

fn payload_kind(payload: &EvidencePayload) -> &'static str {
    match payload {
        EvidencePayload::GithubIssueWillClose { .. } => "githubIssueWillClose",
        EvidencePayload::LocalBooleanSignal { .. } => "localBooleanSignal",
        EvidencePayload::DiscordPrediction { .. } => "discordPrediction",
        EvidencePayload::Unsupported { .. } => "unsupported",
    }
}

/// YES / NO definitions sent to the LLM for this event.
pub fn outcome_definitions(event: &PrivateEvent) -> (String, String) {
    match event {
        PrivateEvent::GithubIssueWillClose { owner, repo, issue_number, yes_means_closed, .. } => {
            let closed = format!("issue #{issue_number} in {owner}/{repo} is closed at the deadline");
            let open = format!("issue #{issue_number} in {owner}/{repo} is still open at the deadline");
            if *yes_means_closed {
                (format!("YES wins if {closed}."), format!("NO wins if {open}."))
            } else {
                (format!("YES wins if {open}."), format!("NO wins if {closed}."))
            }
        }
        PrivateEvent::LocalBooleanSignal { signal_key, expected_yes, .. } => (
            format!("YES wins if signal '{signal_key}' is {expected_yes} at the deadline."),
            format!("NO wins if signal '{signal_key}' is {} or missing at the deadline.", !expected_yes),
        ),
        PrivateEvent::DiscordPrediction { message_content, .. } => (
            format!("YES wins if the statement \"{message_content}\" is true at/after the market deadline."),
            "NO wins otherwise.".to_string(),
        ),
    }
}

/// Run the full pipeline.
///
/// LLM errors never escape: they become a fallback to the baseline, or a
/// deferral when the baseline has no rule and the policy is `Defer`.
pub async fn decide(
    event: &PrivateEvent,
    evidence: &Evidence,
    llm: Option<&dyn LlmOracle>,
    policy: UnhandledKindPolicy,
) -> Verdict {
    let baseline = baseline_decision(event, evidence);
    debug!(event_id = %event.id(), yes_winner = baseline.yes_winner, handled = baseline.handled, "Baseline decision");

    let llm_failure = match llm {
        None => None,
        Some(oracle) => {
            let (yes_definition, no_definition) = outcome_definitions(event);
            let request = OracleRequest::new(event.question(), yes_definition, no_definition, evidence.clone());
            match oracle.decide_yes_no(&request).await {
                Ok(d) => {
                    return Verdict::Decided(Decision {
                        yes_winner: d.yes_winner,
                        reasoning: format!("LLM decision (confidence={:.2}): {}", d.confidence, d.reasoning),
                        used_llm: true,
                    });
                }
                Err(e) => {
                    warn!(event_id = %event.id(), error = %e, "LLM oracle failed, using baseline");
                    Some(format!("{e:#}"))
                }
            }
        }
    };

    if !baseline.handled && policy == UnhandledKindPolicy::Defer {
        let reason = match llm_failure {
            Some(err) => format!("{DEFERRED_REASON} and LLM failed: {err}"),
            None => format!("{DEFERRED_REASON} and no LLM oracle configured"),
        };
        return Verdict::Deferred { reason };
    }

    let reasoning = match llm_failure {
        Some(err) => format!("{} | {LLM_FALLBACK_MARKER} {err}", baseline.reasoning),
        None => baseline.reasoning,
    };
    Verdict::Decided(Decision { yes_winner: baseline.yes_winner, reasoning, used_llm: false })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
