//! Writing step: drafts the resume from the selected evidence.
//!
//! On a revision round the directives recorded for that round are injected into the prompt
//! as hard constraints. Replies whose claims are ungrounded are re-requested a bounded
//! number of times, then the step fails.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use super::prompts::{
    DEFAULT_TEMPLATE, REVISION_BLOCK_TEMPLATE, WRITER_PROMPT_TEMPLATE, WRITER_SYSTEM,
};
use super::{GenerationStep, StepFailure};
use crate::blackboard::{
    Blackboard, ChangeKind, ChangeLogEntry, ClaimMapping, GapStrategy, ResumeDraft, ResumeSection,
};
use crate::llm_client::prompts::{system_prompt, with_retry_feedback, GROUNDING_INSTRUCTION};
use crate::llm_client::LlmClient;

const STEP: &str = "writer";
const MAX_WRITER_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Deserialize)]
pub struct WriterOutput {
    #[serde(default)]
    pub sections: Vec<ResumeSection>,
    #[serde(default)]
    pub claim_index: Vec<DraftClaim>,
    #[serde(default)]
    pub change_log: Vec<String>,
}

/// Claim as the model wrote it, before the non-empty evidence check.
#[derive(Debug, Clone, Deserialize)]
pub struct DraftClaim {
    pub bullet_id: String,
    pub bullet_text: String,
    #[serde(default)]
    pub evidence_card_ids: Vec<String>,
}

pub struct LlmResumeWriter {
    llm: LlmClient,
}

impl LlmResumeWriter {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl GenerationStep for LlmResumeWriter {
    fn name(&self) -> &'static str {
        STEP
    }

    async fn execute(&self, board: &Blackboard) -> Result<Blackboard, StepFailure> {
        if board.role_profile.is_none() || board.selected_evidence_ids.is_empty() {
            return Err(StepFailure::fatal(
                STEP,
                "writing needs a role profile and selected evidence",
            ));
        }

        let template = load_template(board.inputs().template_path.as_deref()).await?;
        let prompt = build_writer_prompt(board, &template)?;
        let system = system_prompt(WRITER_SYSTEM);

        let mut request = prompt.clone();
        for attempt in 1..=MAX_WRITER_ATTEMPTS {
            let output: WriterOutput = self
                .llm
                .call_json(&request, &system)
                .await
                .map_err(|e| StepFailure::from_llm(STEP, e))?;

            match validate_draft(board, output) {
                Ok((sections, claims, notes)) => {
                    return Ok(apply_writing(board, sections, claims, notes));
                }
                Err(defects) => {
                    warn!(
                        "Writing attempt {}/{}: {} defect(s), first: {}",
                        attempt,
                        MAX_WRITER_ATTEMPTS,
                        defects.len(),
                        defects.first().map(String::as_str).unwrap_or("-")
                    );
                    request = with_retry_feedback(&prompt, &defects);
                }
            }
        }

        Err(StepFailure::fatal(
            STEP,
            format!("draft claims stayed ungrounded after {MAX_WRITER_ATTEMPTS} attempts"),
        ))
    }
}

async fn load_template(path: Option<&Path>) -> Result<String, StepFailure> {
    match path {
        None => Ok(DEFAULT_TEMPLATE.to_string()),
        Some(path) => tokio::fs::read_to_string(path).await.map_err(|e| {
            StepFailure::fatal(STEP, format!("template {} unreadable: {e}", path.display()))
        }),
    }
}

/// Directives and ATS suggestions recorded for the current round, formatted for the prompt.
/// Empty on the first pass.
pub fn revision_block(board: &Blackboard) -> String {
    let directives: Vec<String> = board
        .current_round_entries(ChangeKind::RevisionDirective)
        .map(|e| format!("- {}", e.text))
        .collect();
    if directives.is_empty() {
        return String::new();
    }
    let suggestions: Vec<String> = board
        .current_round_entries(ChangeKind::AtsSuggestion)
        .map(|e| format!("- {}", e.text))
        .collect();
    let suggestions = if suggestions.is_empty() {
        "- none".to_string()
    } else {
        suggestions.join("\n")
    };

    REVISION_BLOCK_TEMPLATE
        .replace("{directives}", &directives.join("\n"))
        .replace("{suggestions}", &suggestions)
}

pub fn build_writer_prompt(board: &Blackboard, template: &str) -> Result<String, StepFailure> {
    let to_json = |value: serde_json::Result<String>| {
        value.map_err(|e| StepFailure::fatal(STEP, format!("failed to serialize prompt context: {e}")))
    };

    let role_profile_json = to_json(serde_json::to_string_pretty(&board.role_profile))?;
    let evidence_json = to_json(serde_json::to_string_pretty(&board.selected_evidence()))?;
    let gaps_json = to_json(serde_json::to_string_pretty(
        &board
            .gaps
            .iter()
            .map(|g| {
                serde_json::json!({
                    "requirement": g.requirement_text,
                    "strategy": g.strategy,
                    "adjacent_evidence_ids": if g.strategy == GapStrategy::UseAdjacentEvidence {
                        g.adjacent_evidence_ids.clone()
                    } else {
                        Vec::new()
                    },
                })
            })
            .collect::<Vec<_>>(),
    ))?;

    let inputs = board.inputs();
    Ok(format!(
        "{}\n\n{}",
        WRITER_PROMPT_TEMPLATE
            .replace("{target_title}", &inputs.target_title)
            .replace("{max_pages}", &inputs.max_pages.to_string())
            .replace("{template}", template.trim())
            .replace("{role_profile_json}", &role_profile_json)
            .replace("{evidence_json}", &evidence_json)
            .replace("{gaps_json}", &gaps_json)
            .replace("{revision_block}", &revision_block(board)),
        GROUNDING_INSTRUCTION
    ))
}

/// Accepts a draft only if it has sections and every claim cites selected evidence.
pub fn validate_draft(
    board: &Blackboard,
    output: WriterOutput,
) -> Result<(Vec<ResumeSection>, Vec<ClaimMapping>, Vec<String>), Vec<String>> {
    let mut defects = Vec::new();

    if output.sections.is_empty() {
        defects.push("draft has no sections".to_string());
    }
    if output.claim_index.is_empty() {
        defects.push("draft has no claim index".to_string());
    }

    let mut claims = Vec::with_capacity(output.claim_index.len());
    for draft in output.claim_index {
        for id in &draft.evidence_card_ids {
            if !board.selected_evidence_ids.contains(id) {
                defects.push(format!(
                    "claim {} cites unselected or unknown evidence \"{id}\"",
                    draft.bullet_id
                ));
            }
        }
        match ClaimMapping::new(draft.bullet_id, draft.bullet_text, draft.evidence_card_ids) {
            Ok(claim) => claims.push(claim),
            Err(e) => defects.push(e.to_string()),
        }
    }

    if defects.is_empty() {
        Ok((output.sections, claims, output.change_log))
    } else {
        Err(defects)
    }
}

pub fn apply_writing(
    board: &Blackboard,
    sections: Vec<ResumeSection>,
    claims: Vec<ClaimMapping>,
    notes: Vec<String>,
) -> Blackboard {
    let round = board.current_round();
    info!(
        "Writing round {}: {} section(s), {} claim(s)",
        round,
        sections.len(),
        claims.len()
    );

    let mut next = board.clone();
    next.resume_draft = Some(ResumeDraft { sections });
    next.claim_index = claims;
    next.change_log
        .extend(notes.into_iter().map(|n| ChangeLogEntry::writer(round, n)));
    next
}
