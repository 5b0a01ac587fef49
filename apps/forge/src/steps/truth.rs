//! Truth verification: does every claim say only what its cited evidence says?

use std::collections::{BTreeSet, HashSet};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::info;

use super::prompts::{TRUTH_PROMPT_TEMPLATE, TRUTH_SYSTEM};
use super::StepFailure;
use crate::blackboard::{AuditReport, Blackboard, ClaimMapping, TruthViolation};
use crate::evidence::EvidenceRecord;
use crate::llm_client::prompts::system_prompt;
use crate::llm_client::LlmClient;

const STEP: &str = "truth";

/// Numbers as written in prose: "40%", "1,200", "$1.2M", "3.5x".
static FIGURE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d[\d,]*(?:\.\d+)?").expect("figure pattern is valid"));

#[async_trait]
pub trait TruthVerifier: Send + Sync {
    async fn verify(&self, board: &Blackboard) -> Result<AuditReport, StepFailure>;
}

fn claims_of(board: &Blackboard) -> Result<&[ClaimMapping], StepFailure> {
    if board.claim_index.is_empty() {
        return Err(StepFailure::fatal(STEP, "no claims to verify"));
    }
    Ok(&board.claim_index)
}

// ────────────────────────────────────────────────────────────────────────────
// EvidenceTruthVerifier
// ────────────────────────────────────────────────────────────────────────────

/// Deterministic verifier: every figure quoted in a bullet must appear in the evidence the
/// bullet cites. Duplicate bullet ids and claims missing from the draft are reported as
/// inconsistencies.
pub struct EvidenceTruthVerifier;

#[async_trait]
impl TruthVerifier for EvidenceTruthVerifier {
    async fn verify(&self, board: &Blackboard) -> Result<AuditReport, StepFailure> {
        let claims = claims_of(board)?;
        let mut violations = Vec::new();

        for claim in claims {
            let cited: Vec<&EvidenceRecord> = claim
                .evidence_card_ids()
                .iter()
                .filter_map(|id| board.evidence().get(id))
                .collect();
            if let Some(violation) = unsupported_figures(claim, &cited) {
                violations.push(violation);
            }
        }

        let inconsistencies = inconsistencies(board, claims);
        info!(
            "Evidence truth check: {} violation(s), {} inconsistency(ies)",
            violations.len(),
            inconsistencies.len()
        );
        Ok(AuditReport::new(violations, inconsistencies, Vec::new()))
    }
}

fn figures(text: &str) -> BTreeSet<String> {
    FIGURE
        .find_iter(text)
        .map(|m| m.as_str().replace(',', ""))
        .collect()
}

pub fn unsupported_figures(claim: &ClaimMapping, cited: &[&EvidenceRecord]) -> Option<TruthViolation> {
    let available: HashSet<String> = cited
        .iter()
        .flat_map(|r| figures(&r.factual_text()))
        .collect();
    let missing: Vec<String> = figures(claim.bullet_text())
        .into_iter()
        .filter(|f| !available.contains(f))
        .collect();
    if missing.is_empty() {
        return None;
    }
    Some(TruthViolation {
        bullet_id: claim.bullet_id().to_string(),
        bullet_text: claim.bullet_text().to_string(),
        violation: format!(
            "figure(s) {} not found in cited evidence ({})",
            missing.join(", "),
            claim.evidence_card_ids().join(", ")
        ),
    })
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn inconsistencies(board: &Blackboard, claims: &[ClaimMapping]) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for claim in claims {
        if !seen.insert(claim.bullet_id()) {
            out.push(format!("bullet id {} is used more than once", claim.bullet_id()));
        }
    }

    if let Some(draft) = &board.resume_draft {
        let text = normalize(&draft.full_text());
        for claim in claims {
            if !text.contains(&normalize(claim.bullet_text())) {
                out.push(format!(
                    "claim {} does not appear in the resume draft",
                    claim.bullet_id()
                ));
            }
        }
    }
    out
}

// ────────────────────────────────────────────────────────────────────────────
// LlmTruthVerifier
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TruthReply {
    #[serde(default)]
    truth_violations: Vec<TruthViolation>,
    #[serde(default)]
    inconsistencies: Vec<String>,
}

pub struct LlmTruthVerifier {
    llm: LlmClient,
}

impl LlmTruthVerifier {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl TruthVerifier for LlmTruthVerifier {
    async fn verify(&self, board: &Blackboard) -> Result<AuditReport, StepFailure> {
        let claims = claims_of(board)?;
        let prompt = build_truth_prompt(board, claims)?;
        let reply: TruthReply = self
            .llm
            .call_json(&prompt, &system_prompt(TRUTH_SYSTEM))
            .await
            .map_err(|e| StepFailure::from_llm(STEP, e))?;

        info!(
            "LLM truth check: {} violation(s)",
            reply.truth_violations.len()
        );
        Ok(AuditReport::new(
            reply.truth_violations,
            reply.inconsistencies,
            Vec::new(),
        ))
    }
}

fn build_truth_prompt(board: &Blackboard, claims: &[ClaimMapping]) -> Result<String, StepFailure> {
    let cited_ids: BTreeSet<&str> = claims
        .iter()
        .flat_map(|c| c.evidence_card_ids().iter().map(String::as_str))
        .collect();
    let cited: Vec<&EvidenceRecord> = cited_ids
        .into_iter()
        .filter_map(|id| board.evidence().get(id))
        .collect();

    let claims_json = serde_json::to_string_pretty(claims)
        .map_err(|e| StepFailure::fatal(STEP, format!("failed to serialize claims: {e}")))?;
    let evidence_json = serde_json::to_string_pretty(&cited)
        .map_err(|e| StepFailure::fatal(STEP, format!("failed to serialize evidence: {e}")))?;

    Ok(TRUTH_PROMPT_TEMPLATE
        .replace("{claims_json}", &claims_json)
        .replace("{evidence_json}", &evidence_json))
}
