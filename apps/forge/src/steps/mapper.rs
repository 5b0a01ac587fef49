//! Mapping step: links requirements to evidence and classifies what cannot be linked.
//!
//! `KeywordEvidenceMapper` is pure Rust and deterministic. `LlmEvidenceMapper` asks the model
//! and re-asks when the reply references evidence or requirements that do not exist.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::prompts::{MAPPING_PROMPT_TEMPLATE, MAPPING_SYSTEM};
use super::{GenerationStep, StepFailure};
use crate::blackboard::{Blackboard, Confidence, EvidenceMapping, Gap, GapKind, GapStrategy, Requirement};
use crate::evidence::{EvidenceRecord, EvidenceStore, SynonymTable};
use crate::llm_client::prompts::{system_prompt, with_retry_feedback, GROUNDING_INSTRUCTION};
use crate::llm_client::LlmClient;

const STEP: &str = "mapper";
const MAX_MAPPING_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingOutput {
    #[serde(default)]
    pub evidence_map: Vec<EvidenceMapping>,
    #[serde(default)]
    pub gaps: Vec<Gap>,
    #[serde(default)]
    pub selected_evidence_ids: Vec<String>,
}

fn require_analysis(board: &Blackboard) -> Result<(), StepFailure> {
    if board.requirements.is_empty() {
        return Err(StepFailure::fatal(STEP, "no requirements to map"));
    }
    Ok(())
}

/// Writes the mapping to a copy of the board.
pub fn apply_mapping(board: &Blackboard, output: MappingOutput) -> Blackboard {
    info!(
        "Mapping: {} mapped requirement(s), {} gap(s), {} selected card(s)",
        output.evidence_map.len(),
        output.gaps.len(),
        output.selected_evidence_ids.len()
    );
    let mut next = board.clone();
    next.evidence_map = output.evidence_map;
    next.gaps = output.gaps;
    next.selected_evidence_ids = output.selected_evidence_ids.into_iter().collect();
    next
}

// ────────────────────────────────────────────────────────────────────────────
// KeywordEvidenceMapper
// ────────────────────────────────────────────────────────────────────────────

/// Deterministic mapper.
///
/// For each requirement (its keywords, or its text when it has none):
/// 1. exact skill tag → high, text in project/role/skills/metrics → medium: mapped
/// 2. term only in raw text, leadership signals or scope → hidden-evidence gap
/// 3. a synonym of the term matches anywhere → terminology gap
/// 4. otherwise a true gap, with loosely related cards as low-confidence adjacent evidence
pub struct KeywordEvidenceMapper;

#[async_trait]
impl GenerationStep for KeywordEvidenceMapper {
    fn name(&self) -> &'static str {
        STEP
    }

    async fn execute(&self, board: &Blackboard) -> Result<Blackboard, StepFailure> {
        require_analysis(board)?;
        let output = map_requirements(&board.requirements, board.evidence(), board.synonyms());
        Ok(apply_mapping(board, output))
    }
}

pub fn map_requirements(
    requirements: &[Requirement],
    store: &EvidenceStore,
    synonyms: &SynonymTable,
) -> MappingOutput {
    let mut output = MappingOutput::default();

    for requirement in requirements {
        let terms = search_terms(requirement);

        let mut direct: Vec<(&EvidenceRecord, Confidence)> = store
            .records()
            .iter()
            .filter_map(|r| best_strength(r, &terms).map(|c| (r, c)))
            .collect();

        if !direct.is_empty() {
            // Stable: ties keep store order.
            direct.sort_by(|a, b| b.1.cmp(&a.1));
            let confidence = direct[0].1;
            let ids: Vec<String> = direct.iter().map(|(r, _)| r.id.clone()).collect();
            for id in &ids {
                if !output.selected_evidence_ids.contains(id) {
                    output.selected_evidence_ids.push(id.clone());
                }
            }
            output.evidence_map.push(EvidenceMapping {
                requirement_id: requirement.id.clone(),
                evidence_card_ids: ids,
                confidence,
                notes: Some(format!("matched on: {}", terms.join(", "))),
            });
            continue;
        }

        let hidden = ids_where(store, |r| {
            let background = r.background_text();
            terms.iter().any(|t| background.contains(t.as_str()))
        });
        if !hidden.is_empty() {
            output.gaps.push(gap(requirement, GapKind::HiddenEvidence, hidden, Confidence::Medium));
            continue;
        }

        let equivalents: Vec<String> = terms
            .iter()
            .flat_map(|t| synonyms.expand(t).into_iter().skip(1))
            .collect();
        let renamed = ids_where(store, |r| {
            let background = r.background_text();
            best_strength(r, &equivalents).is_some()
                || equivalents.iter().any(|t| background.contains(t.as_str()))
        });
        if !renamed.is_empty() {
            output.gaps.push(gap(requirement, GapKind::TerminologyGap, renamed, Confidence::Medium));
            continue;
        }

        let closest = ids_where(store, |r| terms.iter().any(|t| loosely_related(r, t)));
        output.gaps.push(gap(requirement, GapKind::TrueGap, closest, Confidence::Low));
    }

    output
}

fn search_terms(requirement: &Requirement) -> Vec<String> {
    let terms: Vec<String> = requirement
        .keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    if terms.is_empty() {
        vec![requirement.text.trim().to_lowercase()]
    } else {
        terms
    }
}

fn best_strength(record: &EvidenceRecord, terms: &[String]) -> Option<Confidence> {
    let prominent = record.prominent_text();
    terms
        .iter()
        .filter_map(|term| {
            if record.skills.iter().any(|s| s.to_lowercase() == *term) {
                Some(Confidence::High)
            } else if prominent.contains(term.as_str()) {
                Some(Confidence::Medium)
            } else {
                None
            }
        })
        .max()
}

/// A skill tag that contains the term or is contained by it.
fn loosely_related(record: &EvidenceRecord, term: &str) -> bool {
    record.skills.iter().any(|s| {
        let skill = s.to_lowercase();
        skill.len() > 2 && (skill.contains(term) || term.contains(&skill))
    })
}

fn ids_where(store: &EvidenceStore, pred: impl Fn(&EvidenceRecord) -> bool) -> Vec<String> {
    store
        .records()
        .iter()
        .filter(|r| pred(r))
        .map(|r| r.id.clone())
        .collect()
}

fn gap(requirement: &Requirement, kind: GapKind, adjacent: Vec<String>, confidence: Confidence) -> Gap {
    let adjacent_confidence = if adjacent.is_empty() { None } else { Some(confidence) };
    Gap {
        id: format!("gap-{}", requirement.id),
        requirement_id: requirement.id.clone(),
        requirement_text: requirement.text.clone(),
        kind,
        strategy: GapStrategy::Omit,
        adjacent_evidence_ids: adjacent,
        adjacent_confidence,
        user_confirmed: false,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LlmEvidenceMapper
// ────────────────────────────────────────────────────────────────────────────

pub struct LlmEvidenceMapper {
    llm: LlmClient,
}

impl LlmEvidenceMapper {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl GenerationStep for LlmEvidenceMapper {
    fn name(&self) -> &'static str {
        STEP
    }

    async fn execute(&self, board: &Blackboard) -> Result<Blackboard, StepFailure> {
        require_analysis(board)?;
        let prompt = build_mapping_prompt(board)?;
        let system = system_prompt(MAPPING_SYSTEM);

        let mut request = prompt.clone();
        for attempt in 1..=MAX_MAPPING_ATTEMPTS {
            let output: MappingOutput = self
                .llm
                .call_json(&request, &system)
                .await
                .map_err(|e| StepFailure::from_llm(STEP, e))?;

            let defects = mapping_defects(&output, &board.requirements, board.evidence());
            if defects.is_empty() {
                return Ok(apply_mapping(board, output));
            }

            warn!(
                "Mapping attempt {}/{}: {} defect(s), first: {}",
                attempt,
                MAX_MAPPING_ATTEMPTS,
                defects.len(),
                defects[0]
            );
            request = with_retry_feedback(&prompt, &defects);
        }

        Err(StepFailure::fatal(
            STEP,
            format!(
                "mapping referenced unknown ids or skipped requirements in {MAX_MAPPING_ATTEMPTS} attempts"
            ),
        ))
    }
}

fn build_mapping_prompt(board: &Blackboard) -> Result<String, StepFailure> {
    let to_json = |value: serde_json::Result<String>| {
        value.map_err(|e| StepFailure::fatal(STEP, format!("failed to serialize prompt context: {e}")))
    };
    let requirements_json = to_json(serde_json::to_string_pretty(&board.requirements))?;
    let evidence_json = to_json(serde_json::to_string_pretty(board.evidence().records()))?;
    let synonyms_json = to_json(serde_json::to_string_pretty(board.synonyms().groups()))?;

    Ok(format!(
        "{}\n\n{}",
        MAPPING_PROMPT_TEMPLATE
            .replace("{requirements_json}", &requirements_json)
            .replace("{evidence_json}", &evidence_json)
            .replace("{synonyms_json}", &synonyms_json),
        GROUNDING_INSTRUCTION
    ))
}

/// Problems that make a mapping reply unusable.
pub fn mapping_defects(
    output: &MappingOutput,
    requirements: &[Requirement],
    store: &EvidenceStore,
) -> Vec<String> {
    let mut defects = Vec::new();

    let referenced = output
        .evidence_map
        .iter()
        .flat_map(|m| m.evidence_card_ids.iter())
        .chain(output.gaps.iter().flat_map(|g| g.adjacent_evidence_ids.iter()))
        .chain(output.selected_evidence_ids.iter());
    for id in referenced {
        if !store.contains(id) {
            defects.push(format!("unknown evidence id \"{id}\""));
        }
    }

    for requirement in requirements {
        let mapped = output
            .evidence_map
            .iter()
            .any(|m| m.requirement_id == requirement.id && !m.evidence_card_ids.is_empty());
        let gapped = output.gaps.iter().any(|g| g.requirement_id == requirement.id);
        if !mapped && !gapped {
            defects.push(format!("requirement {} not covered", requirement.id));
        }
    }

    defects
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{analysed_board, requirements};

    #[tokio::test]
    async fn test_keyword_mapper_classifies_fixture_requirements() {
        let board = analysed_board();
        let next = KeywordEvidenceMapper.execute(&board).await.unwrap();

        let r1 = next.mapping_for("r1").unwrap();
        assert_eq!(r1.evidence_card_ids, vec!["ev-1".to_string()]);
        assert_eq!(r1.confidence, Confidence::High);

        let r2 = next.gap_for("r2").unwrap();
        assert_eq!(r2.kind, GapKind::TerminologyGap);
        assert_eq!(r2.adjacent_evidence_ids, vec!["ev-1".to_string()]);

        let r3 = next.gap_for("r3").unwrap();
        assert_eq!(r3.kind, GapKind::HiddenEvidence);
        assert_eq!(r3.adjacent_evidence_ids, vec!["ev-3".to_string()]);

        assert!(next.selected_evidence_ids.contains("ev-1"));
        assert!(mapping_defects(
            &MappingOutput {
                evidence_map: next.evidence_map.clone(),
                gaps: next.gaps.clone(),
                selected_evidence_ids: next.selected_evidence_ids.iter().cloned().collect(),
            },
            &next.requirements,
            next.evidence()
        )
        .is_empty());
    }

    #[test]
    fn test_true_gap_collects_loosely_related_cards() {
        let board = analysed_board();
        let requirement = Requirement {
            id: "r9".to_string(),
            text: "Payroll tax filing".to_string(),
            priority: Default::default(),
            keywords: vec!["payroll taxes".to_string()],
        };

        let output = map_requirements(&[requirement], board.evidence(), board.synonyms());

        assert!(output.evidence_map.is_empty());
        let gap = &output.gaps[0];
        assert_eq!(gap.kind, GapKind::TrueGap);
        assert_eq!(gap.adjacent_evidence_ids, vec!["ev-1".to_string()]);
        assert_eq!(gap.adjacent_confidence, Some(Confidence::Low));
    }

    #[test]
    fn test_true_gap_without_relatives_has_no_confidence() {
        let board = analysed_board();
        let requirement = Requirement {
            id: "r9".to_string(),
            text: "Mandarin fluency".to_string(),
            priority: Default::default(),
            keywords: vec![],
        };

        let output = map_requirements(&[requirement], board.evidence(), board.synonyms());

        assert!(output.gaps[0].adjacent_evidence_ids.is_empty());
        assert_eq!(output.gaps[0].adjacent_confidence, None);
    }

    #[test]
    fn test_mapping_defects_flags_unknown_ids_and_uncovered_requirements() {
        let board = analysed_board();
        let output = MappingOutput {
            evidence_map: vec![EvidenceMapping {
                requirement_id: "r1".to_string(),
                evidence_card_ids: vec!["x".to_string()],
                confidence: Confidence::High,
                notes: None,
            }],
            gaps: vec![],
            selected_evidence_ids: vec![],
        };

        let defects = mapping_defects(&output, &requirements(), board.evidence());

        assert!(defects.iter().any(|d| d.contains("\"x\"")));
        assert!(defects.iter().any(|d| d.contains("r2")));
        assert!(defects.iter().any(|d| d.contains("r3")));

        let prompt = build_mapping_prompt(&board).unwrap();
        let reask = with_retry_feedback(&prompt, &defects);
        assert!(reask.starts_with(&prompt));
        assert!(reask.contains("- unknown evidence id \"x\""));
        assert!(reask.contains("- requirement r2 not covered"));
    }

    #[test]
    fn test_mapping_prompt_includes_synonyms_and_cards() {
        let board = analysed_board();
        let prompt = build_mapping_prompt(&board).unwrap();
        assert!(prompt.contains("\"ev-3\""));
        assert!(prompt.contains("HRIS"));
        assert!(prompt.contains("CRITICAL"));
    }
}
