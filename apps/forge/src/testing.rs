//! Fixtures shared by unit tests: a small evidence set, boards at each pipeline stage and
//! scripted steps that stand in for the LLM-backed collaborators.
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::blackboard::{
    AuditReport, Blackboard, ChangeLogEntry, ClaimMapping, Confidence, EvidenceMapping, Gap,
    GapKind, GapStrategy, Priority, Requirement, ResumeDraft, ResumeSection, RoleProfile,
    RunInputs, TruthViolation,
};
use crate::errors::ForgeError;
use crate::evidence::{EvidenceRecord, EvidenceSource, EvidenceStore, MetricEntry, ScopeInfo, SynonymTable};
use crate::pipeline::{Orchestrator, PipelineSettings, PipelineState};
use crate::steps::{GenerationStep, StepFailure, StepSet};

pub fn record(id: &str, project: &str, skills: &[&str]) -> EvidenceRecord {
    EvidenceRecord {
        id: id.to_string(),
        project: project.to_string(),
        company: "Acme Corp".to_string(),
        timeframe: "2019-2021".to_string(),
        role: "HR Technology Director".to_string(),
        scope: ScopeInfo::default(),
        metrics: Vec::new(),
        skills: skills.iter().map(|s| s.to_string()).collect(),
        leadership_signals: Vec::new(),
        raw_text: format!("{project} work"),
    }
}

pub fn records() -> Vec<EvidenceRecord> {
    let mut payroll = record("ev-1", "Workday payroll migration", &["Workday", "HCM", "Payroll"]);
    payroll.metrics.push(MetricEntry {
        value: "40%".to_string(),
        description: "reduction in payroll processing time".to_string(),
        context: None,
    });
    payroll.scope.team_size = Some(8);
    payroll.leadership_signals.push("Led cross-functional team of 8".to_string());
    payroll.raw_text = "Led the migration of payroll onto Workday HCM across 3 countries, \
                        cutting payroll processing time by 40%."
        .to_string();

    let mut analytics = record("ev-2", "People analytics platform", &["AWS", "Python", "SQL"]);
    analytics.timeframe = "2021-03 to 2023-06".to_string();
    analytics.role = "Director, People Analytics".to_string();
    analytics.metrics.push(MetricEntry {
        value: "12".to_string(),
        description: "executive dashboards shipped".to_string(),
        context: Some("quarterly business reviews".to_string()),
    });
    analytics.raw_text = "Built the people analytics platform on AWS with Python and SQL, \
                          shipping 12 executive dashboards."
        .to_string();

    let mut recruiting = record("ev-3", "Recruiting operations overhaul", &["Greenhouse", "Recruiting"]);
    recruiting.company = "Globex".to_string();
    recruiting.timeframe = "2016-2019".to_string();
    recruiting.role = "Recruiting Operations Manager".to_string();
    recruiting.leadership_signals.push("Hired and managed a team of 5".to_string());
    recruiting.raw_text = "Rebuilt recruiting operations and renegotiated vendor contracts \
                           with three staffing agencies."
        .to_string();

    vec![payroll, analytics, recruiting]
}

pub fn run_inputs() -> RunInputs {
    RunInputs {
        job_description: "Director of HR Technology. Must have Workday implementation \
                          experience, HRIS administration and vendor management."
            .to_string(),
        target_title: "Director of HR Technology".to_string(),
        max_pages: 2,
        template_path: None,
    }
}

/// Fresh board in `Init`.
pub fn fixture_board() -> Blackboard {
    Blackboard::new(run_inputs()).unwrap()
}

/// Board as left by Preprocessing, with the fixture evidence installed.
pub fn preprocessed_board(max_retries: u32) -> Blackboard {
    let mut board = fixture_board();
    board.enter(PipelineState::Preprocessing).unwrap();
    board
        .install_evidence(
            Arc::new(EvidenceStore::from_records(records()).unwrap()),
            Arc::new(SynonymTable::default()),
        )
        .unwrap();
    board.set_max_retries(max_retries).unwrap();
    board
}

pub fn role_profile() -> RoleProfile {
    RoleProfile {
        inferred_level: "Director".to_string(),
        must_haves: vec!["Workday".to_string(), "HRIS".to_string()],
        nice_to_haves: vec!["SQL".to_string()],
        seniority_signals: vec!["cross-functional".to_string()],
        keyword_clusters: BTreeMap::from([(
            "systems".to_string(),
            vec!["Workday".to_string(), "HCM".to_string()],
        )]),
        ..Default::default()
    }
}

pub fn requirements() -> Vec<Requirement> {
    vec![
        Requirement {
            id: "r1".to_string(),
            text: "Workday implementation experience".to_string(),
            priority: Priority::High,
            keywords: vec!["Workday".to_string()],
        },
        Requirement {
            id: "r2".to_string(),
            text: "HRIS administration".to_string(),
            priority: Priority::Medium,
            keywords: vec!["HRIS".to_string()],
        },
        Requirement {
            id: "r3".to_string(),
            text: "Vendor management".to_string(),
            priority: Priority::Low,
            keywords: vec!["vendor".to_string()],
        },
    ]
}

pub fn apply_fixture_analysis(board: &Blackboard) -> Blackboard {
    let mut next = board.clone();
    next.role_profile = Some(role_profile());
    next.requirements = requirements();
    next
}

pub fn apply_fixture_mapping(board: &Blackboard) -> Blackboard {
    let mut next = board.clone();
    next.evidence_map = vec![EvidenceMapping {
        requirement_id: "r1".to_string(),
        evidence_card_ids: vec!["ev-1".to_string()],
        confidence: Confidence::High,
        notes: None,
    }];
    next.gaps = vec![
        Gap {
            id: "gap-r2".to_string(),
            requirement_id: "r2".to_string(),
            requirement_text: "HRIS administration".to_string(),
            kind: GapKind::TerminologyGap,
            strategy: GapStrategy::UseAdjacentEvidence,
            adjacent_evidence_ids: vec!["ev-1".to_string()],
            adjacent_confidence: Some(Confidence::Medium),
            user_confirmed: false,
        },
        Gap {
            id: "gap-r3".to_string(),
            requirement_id: "r3".to_string(),
            requirement_text: "Vendor management".to_string(),
            kind: GapKind::HiddenEvidence,
            strategy: GapStrategy::UseAdjacentEvidence,
            adjacent_evidence_ids: vec!["ev-3".to_string()],
            adjacent_confidence: Some(Confidence::Medium),
            user_confirmed: false,
        },
    ];
    next.selected_evidence_ids = ["ev-1", "ev-3"].iter().map(|s| s.to_string()).collect();
    next
}

pub fn apply_fixture_writing(board: &Blackboard) -> Blackboard {
    let mut next = board.clone();
    next.resume_draft = Some(ResumeDraft {
        sections: vec![
            ResumeSection {
                name: "Summary".to_string(),
                content: "HR technology leader with Workday HCM delivery experience.".to_string(),
            },
            ResumeSection {
                name: "Experience".to_string(),
                content: "- Cut payroll processing time 40% by leading the Workday HCM migration\n\
                          - Renegotiated vendor contracts with three staffing agencies"
                    .to_string(),
            },
        ],
    });
    next.claim_index = vec![
        ClaimMapping::new(
            "exp-1",
            "Cut payroll processing time 40% by leading the Workday HCM migration",
            vec!["ev-1".to_string()],
        )
        .unwrap(),
        ClaimMapping::new(
            "exp-2",
            "Renegotiated vendor contracts with three staffing agencies",
            vec!["ev-3".to_string()],
        )
        .unwrap(),
    ];
    let round = next.current_round();
    next.change_log
        .push(ChangeLogEntry::writer(round, "Led with Workday migration"));
    next
}

pub fn analysed_board() -> Blackboard {
    let mut board = apply_fixture_analysis(&preprocessed_board(3));
    board.enter(PipelineState::Analysis).unwrap();
    board
}

pub fn mapped_board() -> Blackboard {
    let mut board = apply_fixture_mapping(&analysed_board());
    board.enter(PipelineState::Mapping).unwrap();
    board
}

pub fn written_board() -> Blackboard {
    let mut board = apply_fixture_writing(&mapped_board());
    board.enter(PipelineState::Writing).unwrap();
    board
}

type Script = dyn Fn(&Blackboard) -> Result<Blackboard, StepFailure> + Send + Sync;

/// A generation step backed by a closure.
pub struct ScriptedStep {
    name: &'static str,
    script: Box<Script>,
}

impl ScriptedStep {
    pub fn new(
        name: &'static str,
        script: impl Fn(&Blackboard) -> Result<Blackboard, StepFailure> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            script: Box::new(script),
        }
    }
}

#[async_trait]
impl GenerationStep for ScriptedStep {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn execute(&self, board: &Blackboard) -> Result<Blackboard, StepFailure> {
        (self.script)(board)
    }
}

/// A step that outlives any sensible timeout.
pub struct SleepingStep(pub Duration);

#[async_trait]
impl GenerationStep for SleepingStep {
    fn name(&self) -> &'static str {
        "sleeper"
    }

    async fn execute(&self, board: &Blackboard) -> Result<Blackboard, StepFailure> {
        tokio::time::sleep(self.0).await;
        Ok(board.clone())
    }
}

/// Steps producing the fixture outputs, with an auditor that always passes.
pub fn scripted_steps() -> StepSet {
    StepSet {
        analysis: Arc::new(ScriptedStep::new("analyst", |b| Ok(apply_fixture_analysis(b)))),
        mapping: Arc::new(ScriptedStep::new("mapper", |b| Ok(apply_fixture_mapping(b)))),
        writing: Arc::new(ScriptedStep::new("writer", |b| Ok(apply_fixture_writing(b)))),
        auditing: Arc::new(ScriptedStep::new("auditor", |b| {
            let mut next = b.clone();
            next.audit_report = Some(AuditReport::passing());
            Ok(next)
        })),
    }
}

pub struct StaticEvidenceSource(Vec<EvidenceRecord>);

impl StaticEvidenceSource {
    pub fn new(records: Vec<EvidenceRecord>) -> Self {
        Self(records)
    }
}

#[async_trait]
impl EvidenceSource for StaticEvidenceSource {
    async fn load(&self) -> Result<Vec<EvidenceRecord>, ForgeError> {
        Ok(self.0.clone())
    }

    fn describe(&self) -> String {
        "in-memory fixture".to_string()
    }
}

fn orchestrator(max_retries: u32, steps: StepSet) -> Orchestrator {
    let settings = PipelineSettings {
        max_retries,
        ..PipelineSettings::default()
    };
    Orchestrator::new(settings, Arc::new(StaticEvidenceSource::new(records())), steps)
        .unwrap()
}

/// Board of a run that passed its first audit.
pub async fn completed_board() -> Blackboard {
    let run = orchestrator(3, scripted_steps()).run(fixture_board()).await;
    assert!(run.is_complete(), "fixture run did not complete: {:?}", run.outcome);
    run.board
}

/// Board of a run whose only audit found a fabricated figure, with no retries left.
pub async fn failed_board() -> Blackboard {
    let mut steps = scripted_steps();
    steps.auditing = Arc::new(ScriptedStep::new("auditor", |b| {
        let mut next = b.clone();
        next.audit_report = Some(AuditReport::new(
            vec![TruthViolation {
                bullet_id: "exp-1".to_string(),
                bullet_text: "Cut payroll processing time 45%".to_string(),
                violation: "evidence says 40%".to_string(),
            }],
            vec![],
            vec![],
        ));
        Ok(next)
    }));
    let run = orchestrator(0, steps).run(fixture_board()).await;
    assert_eq!(run.board.current_state(), PipelineState::Failed);
    run.board
}
