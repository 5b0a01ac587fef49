//! The Blackboard: the single state value threaded through a pipeline run.
//!
//! Step outputs are public fields that generation steps overwrite on their copy of the
//! board. Run identity, evidence, the pipeline state tag, the retry counters and the
//! failure record are private and only change through the `pub(crate)` methods the
//! orchestrator calls. The orchestrator compares the core of every board a step returns
//! against the board it handed in (`core_changes`) and fails the run on any difference.
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::errors::{FailureCategory, ForgeError};
use crate::evidence::{EvidenceRecord, EvidenceStore, SynonymTable};
use crate::pipeline::PipelineState;

pub mod models;

pub use models::*;

/// Upper bound on `max_pages` accepted from run inputs.
const MAX_PAGE_LIMIT: u32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunInputs {
    pub job_description: String,
    pub target_title: String,
    pub max_pages: u32,
    pub template_path: Option<PathBuf>,
}

impl RunInputs {
    pub fn validate(&self) -> Result<(), ForgeError> {
        if self.job_description.trim().is_empty() {
            return Err(ForgeError::InvalidInputs(
                "job description is empty".to_string(),
            ));
        }
        if self.target_title.trim().is_empty() {
            return Err(ForgeError::InvalidInputs("target title is empty".to_string()));
        }
        if self.max_pages == 0 || self.max_pages > MAX_PAGE_LIMIT {
            return Err(ForgeError::InvalidInputs(format!(
                "max pages must be between 1 and {MAX_PAGE_LIMIT}, got {}",
                self.max_pages
            )));
        }
        Ok(())
    }
}

/// Why a run ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    pub origin: PipelineState,
    pub category: FailureCategory,
    pub detail: String,
    pub violations: Vec<String>,
    pub retry_count: u32,
}

/// Read-only view handed to output assembly once a run is `Complete`.
#[derive(Debug, Serialize)]
pub struct RunArtifacts<'a> {
    pub selected_evidence: Vec<&'a EvidenceRecord>,
    pub claim_index: &'a [ClaimMapping],
    pub sections: &'a [ResumeSection],
    pub ats_report: Option<&'a AtsReport>,
    pub audit_report: &'a AuditReport,
    pub change_log: &'a [ChangeLogEntry],
    pub gaps: &'a [Gap],
}

#[derive(Debug, Clone)]
pub struct Blackboard {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    inputs: RunInputs,
    evidence: Arc<EvidenceStore>,
    synonyms: Arc<SynonymTable>,

    pub role_profile: Option<RoleProfile>,
    pub requirements: Vec<Requirement>,

    pub evidence_map: Vec<EvidenceMapping>,
    pub gaps: Vec<Gap>,
    pub selected_evidence_ids: BTreeSet<String>,

    pub resume_draft: Option<ResumeDraft>,
    pub claim_index: Vec<ClaimMapping>,
    pub change_log: Vec<ChangeLogEntry>,

    pub ats_report: Option<AtsReport>,
    pub audit_report: Option<AuditReport>,

    current_state: PipelineState,
    retry_count: u32,
    max_retries: u32,
    failure: Option<FailureRecord>,
}

impl Blackboard {
    /// Fresh board in `Init` with an empty evidence snapshot; Preprocessing installs the
    /// real store.
    pub fn new(inputs: RunInputs) -> Result<Self, ForgeError> {
        inputs.validate()?;
        Ok(Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            inputs,
            evidence: Arc::new(EvidenceStore::default()),
            synonyms: Arc::new(SynonymTable::default()),
            role_profile: None,
            requirements: Vec::new(),
            evidence_map: Vec::new(),
            gaps: Vec::new(),
            selected_evidence_ids: BTreeSet::new(),
            resume_draft: None,
            claim_index: Vec::new(),
            change_log: Vec::new(),
            ats_report: None,
            audit_report: None,
            current_state: PipelineState::Init,
            retry_count: 0,
            max_retries: 0,
            failure: None,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn inputs(&self) -> &RunInputs {
        &self.inputs
    }

    pub fn evidence(&self) -> &EvidenceStore {
        &self.evidence
    }

    pub fn synonyms(&self) -> &SynonymTable {
        &self.synonyms
    }

    pub fn current_state(&self) -> PipelineState {
        self.current_state
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn failure(&self) -> Option<&FailureRecord> {
        self.failure.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.current_state.is_terminal()
    }

    /// Revision round the next writing pass belongs to.
    pub fn current_round(&self) -> u32 {
        self.retry_count
    }

    /// Change-log entries of `kind` recorded for the current round.
    pub fn current_round_entries(&self, kind: ChangeKind) -> impl Iterator<Item = &ChangeLogEntry> {
        let round = self.current_round();
        self.change_log
            .iter()
            .filter(move |e| e.kind == kind && e.round == round)
    }

    /// Selected records in id order; unknown ids are skipped (the validator reports them).
    pub fn selected_evidence(&self) -> Vec<&EvidenceRecord> {
        self.selected_evidence_ids
            .iter()
            .filter_map(|id| self.evidence.get(id))
            .collect()
    }

    pub fn mapping_for(&self, requirement_id: &str) -> Option<&EvidenceMapping> {
        self.evidence_map
            .iter()
            .find(|m| m.requirement_id == requirement_id)
    }

    pub fn gap_for(&self, requirement_id: &str) -> Option<&Gap> {
        self.gaps.iter().find(|g| g.requirement_id == requirement_id)
    }

    /// Everything output assembly may read. Only available once the run is `Complete`.
    pub fn artifacts(&self) -> Option<RunArtifacts<'_>> {
        if self.current_state != PipelineState::Complete {
            return None;
        }
        let audit_report = self.audit_report.as_ref()?;
        Some(RunArtifacts {
            selected_evidence: self.selected_evidence(),
            claim_index: &self.claim_index,
            sections: self
                .resume_draft
                .as_ref()
                .map(|d| d.sections.as_slice())
                .unwrap_or_default(),
            ats_report: self.ats_report.as_ref(),
            audit_report,
            change_log: &self.change_log,
            gaps: &self.gaps,
        })
    }

    /// Core fields that differ between this board and one a step returned from it.
    /// Empty when the step only touched step outputs.
    pub(crate) fn core_changes(&self, returned: &Blackboard) -> Vec<String> {
        let mut changes = Vec::new();
        if returned.run_id != self.run_id {
            changes.push(format!("run id changed to {}", returned.run_id));
        }
        if returned.inputs != self.inputs {
            changes.push("run inputs changed".to_string());
        }
        if !Arc::ptr_eq(&returned.evidence, &self.evidence) {
            changes.push("evidence snapshot replaced".to_string());
        }
        if !Arc::ptr_eq(&returned.synonyms, &self.synonyms) {
            changes.push("synonym table replaced".to_string());
        }
        if returned.current_state != self.current_state {
            changes.push(format!(
                "state moved from {} to {}",
                self.current_state, returned.current_state
            ));
        }
        if returned.retry_count != self.retry_count {
            changes.push(format!(
                "retry count changed from {} to {}",
                self.retry_count, returned.retry_count
            ));
        }
        if returned.max_retries != self.max_retries {
            changes.push(format!(
                "max retries changed from {} to {}",
                self.max_retries, returned.max_retries
            ));
        }
        if returned.failure != self.failure {
            changes.push("failure record changed".to_string());
        }
        changes
    }

    fn ensure_mutable(&self) -> Result<(), ForgeError> {
        if self.is_terminal() {
            return Err(ForgeError::TerminalState(self.current_state));
        }
        Ok(())
    }

    pub(crate) fn install_evidence(
        &mut self,
        store: Arc<EvidenceStore>,
        synonyms: Arc<SynonymTable>,
    ) -> Result<(), ForgeError> {
        self.ensure_mutable()?;
        self.evidence = store;
        self.synonyms = synonyms;
        Ok(())
    }

    pub(crate) fn set_max_retries(&mut self, max_retries: u32) -> Result<(), ForgeError> {
        self.ensure_mutable()?;
        if max_retries < self.retry_count {
            return Err(ForgeError::Configuration(format!(
                "max_retries {max_retries} is below retries already spent ({})",
                self.retry_count
            )));
        }
        self.max_retries = max_retries;
        Ok(())
    }

    pub(crate) fn enter(&mut self, state: PipelineState) -> Result<(), ForgeError> {
        self.ensure_mutable()?;
        self.current_state = state;
        Ok(())
    }

    /// Spends one revision. Refuses once the ceiling is reached.
    pub(crate) fn record_revision(&mut self) -> Result<u32, ForgeError> {
        self.ensure_mutable()?;
        if self.retry_count >= self.max_retries {
            return Err(ForgeError::Internal(anyhow::anyhow!(
                "revision requested with retry budget exhausted ({}/{})",
                self.retry_count,
                self.max_retries
            )));
        }
        self.retry_count += 1;
        Ok(self.retry_count)
    }

    /// Records the failure and moves to `Failed`. No-op on an already terminal board.
    pub(crate) fn fail(&mut self, origin: PipelineState, error: &ForgeError) {
        if self.is_terminal() {
            return;
        }
        self.failure = Some(FailureRecord {
            origin,
            category: error.category(),
            detail: error.to_string(),
            violations: error.violations(),
            retry_count: self.retry_count,
        });
        self.current_state = PipelineState::Failed;
    }
}
