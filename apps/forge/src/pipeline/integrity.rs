use serde::Serialize;

use super::PipelineState;
use crate::blackboard::Blackboard;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub passed: bool,
    pub violations: Vec<String>,
}

/// Checks referential integrity of the board plus the fields required by the state being
/// exited. Pure: the same board always yields the same report, and every violation is
/// collected before returning.
pub fn validate(board: &Blackboard) -> IntegrityReport {
    let mut violations = Vec::new();

    check_mapping_references(board, &mut violations);
    check_claim_references(board, &mut violations);
    check_state_requirements(board, &mut violations);

    IntegrityReport {
        passed: violations.is_empty(),
        violations,
    }
}

fn check_mapping_references(board: &Blackboard, violations: &mut Vec<String>) {
    let store = board.evidence();

    for mapping in &board.evidence_map {
        for id in &mapping.evidence_card_ids {
            if !store.contains(id) {
                violations.push(format!(
                    "evidence mapping for requirement {} references unknown evidence id \"{id}\"",
                    mapping.requirement_id
                ));
            }
        }
        if mapping.evidence_card_ids.is_empty() && board.gap_for(&mapping.requirement_id).is_none()
        {
            violations.push(format!(
                "evidence mapping for requirement {} has no evidence and no gap",
                mapping.requirement_id
            ));
        }
    }

    for gap in &board.gaps {
        for id in &gap.adjacent_evidence_ids {
            if !store.contains(id) {
                violations.push(format!(
                    "gap {} references unknown adjacent evidence id \"{id}\"",
                    gap.id
                ));
            }
        }
    }

    for id in &board.selected_evidence_ids {
        if !store.contains(id) {
            violations.push(format!("selected evidence id \"{id}\" does not exist"));
        }
    }
}

fn check_claim_references(board: &Blackboard, violations: &mut Vec<String>) {
    let store = board.evidence();

    for claim in &board.claim_index {
        if claim.evidence_card_ids().is_empty() {
            violations.push(format!("claim {} has no evidence references", claim.bullet_id()));
        }
        for id in claim.evidence_card_ids() {
            if !store.contains(id) {
                violations.push(format!(
                    "claim {} references unknown evidence id \"{id}\"",
                    claim.bullet_id()
                ));
            }
        }
    }
}

fn check_state_requirements(board: &Blackboard, violations: &mut Vec<String>) {
    let state = board.current_state();

    if matches!(
        state,
        PipelineState::Mapping | PipelineState::Writing | PipelineState::Auditing
    ) {
        if board.role_profile.is_none() {
            violations.push(format!("role profile is required when leaving {state}"));
        }
        if board.requirements.is_empty() {
            violations.push(format!("requirements are required when leaving {state}"));
        }
    }

    if state == PipelineState::Mapping {
        for requirement in &board.requirements {
            let mapped = board
                .mapping_for(&requirement.id)
                .is_some_and(|m| !m.evidence_card_ids.is_empty());
            if !mapped && board.gap_for(&requirement.id).is_none() {
                violations.push(format!(
                    "requirement {} has neither an evidence mapping nor a gap",
                    requirement.id
                ));
            }
        }
        for mapping in &board.evidence_map {
            if !board.requirements.iter().any(|r| r.id == mapping.requirement_id) {
                violations.push(format!(
                    "evidence mapping references unknown requirement {}",
                    mapping.requirement_id
                ));
            }
        }
    }

    if matches!(state, PipelineState::Writing | PipelineState::Auditing) {
        let has_sections = board
            .resume_draft
            .as_ref()
            .is_some_and(|d| !d.sections.is_empty());
        if !has_sections {
            violations.push(format!("resume draft with sections is required when leaving {state}"));
        }
        if board.claim_index.is_empty() {
            violations.push(format!("claim index is required when leaving {state}"));
        }
    }

    if state == PipelineState::Auditing && board.audit_report.is_none() {
        violations.push("audit report is required when leaving auditing".to_string());
    }
}
