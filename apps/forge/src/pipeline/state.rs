use std::fmt;

use serde::{Deserialize, Serialize};

use crate::blackboard::Blackboard;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Init,
    Preprocessing,
    Analysis,
    Mapping,
    Writing,
    Auditing,
    Revision,
    Complete,
    Failed,
}

impl PipelineState {
    pub const ALL: [PipelineState; 9] = [
        PipelineState::Init,
        PipelineState::Preprocessing,
        PipelineState::Analysis,
        PipelineState::Mapping,
        PipelineState::Writing,
        PipelineState::Auditing,
        PipelineState::Revision,
        PipelineState::Complete,
        PipelineState::Failed,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Complete | PipelineState::Failed)
    }

    /// States whose output must pass the integrity validator before leaving.
    pub fn requires_integrity_check(self) -> bool {
        matches!(
            self,
            PipelineState::Mapping | PipelineState::Writing | PipelineState::Auditing
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineState::Init => "init",
            PipelineState::Preprocessing => "preprocessing",
            PipelineState::Analysis => "analysis",
            PipelineState::Mapping => "mapping",
            PipelineState::Writing => "writing",
            PipelineState::Auditing => "auditing",
            PipelineState::Revision => "revision",
            PipelineState::Complete => "complete",
            PipelineState::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Guard = fn(&Blackboard) -> bool;

pub struct Transition {
    pub from: PipelineState,
    pub to: PipelineState,
    pub guard: Guard,
    pub label: &'static str,
}

/// Evaluated top to bottom; the first transition out of a state whose guard holds wins.
pub const TRANSITIONS: &[Transition] = &[
    Transition {
        from: PipelineState::Init,
        to: PipelineState::Preprocessing,
        guard: always,
        label: "always",
    },
    Transition {
        from: PipelineState::Preprocessing,
        to: PipelineState::Analysis,
        guard: always,
        label: "always",
    },
    Transition {
        from: PipelineState::Analysis,
        to: PipelineState::Mapping,
        guard: always,
        label: "always",
    },
    Transition {
        from: PipelineState::Mapping,
        to: PipelineState::Writing,
        guard: always,
        label: "always",
    },
    Transition {
        from: PipelineState::Writing,
        to: PipelineState::Auditing,
        guard: always,
        label: "always",
    },
    Transition {
        from: PipelineState::Auditing,
        to: PipelineState::Complete,
        guard: audit_passed,
        label: "audit passed",
    },
    Transition {
        from: PipelineState::Auditing,
        to: PipelineState::Revision,
        guard: audit_failed_with_budget,
        label: "audit failed, retries left",
    },
    Transition {
        from: PipelineState::Auditing,
        to: PipelineState::Failed,
        guard: audit_failed_without_budget,
        label: "audit failed, retries spent",
    },
    Transition {
        from: PipelineState::Revision,
        to: PipelineState::Writing,
        guard: always,
        label: "always",
    },
];

fn always(_: &Blackboard) -> bool {
    true
}

fn audit_passed(board: &Blackboard) -> bool {
    board.audit_report.as_ref().is_some_and(|r| r.passed())
}

/// A missing report counts as a failed audit so Auditing always has a way out.
fn audit_failed(board: &Blackboard) -> bool {
    !audit_passed(board)
}

fn audit_failed_with_budget(board: &Blackboard) -> bool {
    audit_failed(board) && board.retry_count() < board.max_retries()
}

fn audit_failed_without_budget(board: &Blackboard) -> bool {
    audit_failed(board) && board.retry_count() >= board.max_retries()
}

pub fn outgoing(from: PipelineState) -> impl Iterator<Item = &'static Transition> {
    TRANSITIONS.iter().filter(move |t| t.from == from)
}

/// First transition out of `from` whose guard accepts `board`.
pub fn next_transition(from: PipelineState, board: &Blackboard) -> Option<&'static Transition> {
    outgoing(from).find(|t| (t.guard)(board))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blackboard::{AuditReport, TruthViolation};
    use crate::testing::preprocessed_board;

    fn failing_report() -> AuditReport {
        AuditReport::new(
            vec![TruthViolation {
                bullet_id: "b1".to_string(),
                bullet_text: String::new(),
                violation: "unsupported".to_string(),
            }],
            vec![],
            vec![],
        )
    }

    #[test]
    fn test_terminal_states_have_no_outgoing_transitions() {
        assert_eq!(outgoing(PipelineState::Complete).count(), 0);
        assert_eq!(outgoing(PipelineState::Failed).count(), 0);
    }

    #[test]
    fn test_every_non_terminal_state_has_a_way_out() {
        let mut passed = preprocessed_board(2);
        passed.audit_report = Some(AuditReport::passing());

        let mut failed_with_budget = preprocessed_board(2);
        failed_with_budget.audit_report = Some(failing_report());

        let mut failed_spent = preprocessed_board(2);
        failed_spent.audit_report = Some(failing_report());
        failed_spent.record_revision().unwrap();
        failed_spent.record_revision().unwrap();

        let no_report = preprocessed_board(0);

        for board in [&passed, &failed_with_budget, &failed_spent, &no_report] {
            for state in PipelineState::ALL.into_iter().filter(|s| !s.is_terminal()) {
                assert!(
                    next_transition(state, board).is_some(),
                    "no transition out of {state}"
                );
            }
        }
    }

    #[test]
    fn test_auditing_branches() {
        let mut board = preprocessed_board(2);
        board.audit_report = Some(AuditReport::passing());
        assert_eq!(
            next_transition(PipelineState::Auditing, &board).unwrap().to,
            PipelineState::Complete
        );

        board.audit_report = Some(failing_report());
        assert_eq!(
            next_transition(PipelineState::Auditing, &board).unwrap().to,
            PipelineState::Revision
        );

        board.record_revision().unwrap();
        board.record_revision().unwrap();
        assert_eq!(
            next_transition(PipelineState::Auditing, &board).unwrap().to,
            PipelineState::Failed
        );
    }

    #[test]
    fn test_happy_path_order() {
        let board = preprocessed_board(1);
        let mut state = PipelineState::Init;
        let mut seen = vec![state];
        while state != PipelineState::Auditing {
            state = next_transition(state, &board).unwrap().to;
            seen.push(state);
        }
        assert_eq!(
            seen,
            vec![
                PipelineState::Init,
                PipelineState::Preprocessing,
                PipelineState::Analysis,
                PipelineState::Mapping,
                PipelineState::Writing,
                PipelineState::Auditing,
            ]
        );
    }

    #[test]
    fn test_display_uses_snake_case() {
        assert_eq!(PipelineState::Preprocessing.to_string(), "preprocessing");
        assert_eq!(
            serde_json::to_string(&PipelineState::Revision).unwrap(),
            "\"revision\""
        );
    }
}
