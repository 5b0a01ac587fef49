//! Analysis step: turns the raw job description into a role profile and requirements.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use super::prompts::{ANALYSIS_PROMPT_TEMPLATE, ANALYSIS_SYSTEM};
use super::{GenerationStep, StepFailure};
use crate::blackboard::{Blackboard, Requirement, RoleProfile, RunInputs};
use crate::llm_client::prompts::system_prompt;
use crate::llm_client::LlmClient;

const STEP: &str = "analyst";

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisOutput {
    pub role_profile: RoleProfile,
    pub requirements: Vec<Requirement>,
}

pub struct LlmAnalyst {
    llm: LlmClient,
}

impl LlmAnalyst {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl GenerationStep for LlmAnalyst {
    fn name(&self) -> &'static str {
        STEP
    }

    async fn execute(&self, board: &Blackboard) -> Result<Blackboard, StepFailure> {
        let prompt = build_analysis_prompt(board.inputs());
        let output: AnalysisOutput = self
            .llm
            .call_json(&prompt, &system_prompt(ANALYSIS_SYSTEM))
            .await
            .map_err(|e| StepFailure::from_llm(STEP, e))?;
        apply_analysis(board, output)
    }
}

pub fn build_analysis_prompt(inputs: &RunInputs) -> String {
    ANALYSIS_PROMPT_TEMPLATE
        .replace("{target_title}", &inputs.target_title)
        .replace("{jd_text}", &inputs.job_description)
}

/// Checks the analysis output and writes it to a copy of the board.
pub fn apply_analysis(board: &Blackboard, output: AnalysisOutput) -> Result<Blackboard, StepFailure> {
    if output.requirements.is_empty() {
        return Err(StepFailure::fatal(STEP, "job description yielded no requirements"));
    }

    let mut seen = HashSet::new();
    for requirement in &output.requirements {
        if requirement.id.trim().is_empty() || requirement.text.trim().is_empty() {
            return Err(StepFailure::fatal(
                STEP,
                "requirement with empty id or text",
            ));
        }
        if !seen.insert(requirement.id.as_str()) {
            return Err(StepFailure::fatal(
                STEP,
                format!("duplicate requirement id {}", requirement.id),
            ));
        }
    }

    info!(
        "Analysis: level={}, {} requirements, {} must-haves",
        output.role_profile.inferred_level,
        output.requirements.len(),
        output.role_profile.must_haves.len()
    );

    let mut next = board.clone();
    next.role_profile = Some(output.role_profile);
    next.requirements = output.requirements;
    Ok(next)
}
