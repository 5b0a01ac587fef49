//! Auditing step: ATS scoring and truth verification over the same draft.
//!
//! Both checks only read the board, so they run concurrently. A failure in either fails the
//! whole step.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::ats::AtsScorer;
use super::truth::TruthVerifier;
use super::{GenerationStep, StepFailure};
use crate::blackboard::{AtsReport, AuditReport, Blackboard};

const STEP: &str = "auditor";
/// Missing keywords named in the merged suggestion.
const MAX_KEYWORDS_IN_SUGGESTION: usize = 5;

pub struct Auditor {
    ats: Arc<dyn AtsScorer>,
    truth: Arc<dyn TruthVerifier>,
}

impl Auditor {
    pub fn new(ats: Arc<dyn AtsScorer>, truth: Arc<dyn TruthVerifier>) -> Self {
        Self { ats, truth }
    }
}

#[async_trait]
impl GenerationStep for Auditor {
    fn name(&self) -> &'static str {
        STEP
    }

    async fn execute(&self, board: &Blackboard) -> Result<Blackboard, StepFailure> {
        if board.resume_draft.is_none() || board.claim_index.is_empty() {
            return Err(StepFailure::fatal(STEP, "nothing to audit: draft or claims missing"));
        }

        let (ats_report, mut audit_report) =
            tokio::try_join!(self.ats.score(board), self.truth.verify(board))?;

        merge_ats_suggestions(&mut audit_report, &ats_report);

        info!(
            "Audit: passed={}, {} truth violation(s), keyword coverage {:.0}/100",
            audit_report.passed(),
            audit_report.truth_violations().len(),
            ats_report.keyword_coverage_score
        );

        let mut next = board.clone();
        next.ats_report = Some(ats_report);
        next.audit_report = Some(audit_report);
        Ok(next)
    }
}

/// Folds the top missing keywords and every format warning into the advisory suggestions.
pub fn merge_ats_suggestions(audit: &mut AuditReport, ats: &AtsReport) {
    if !ats.missing_keywords.is_empty() {
        let top: Vec<&str> = ats
            .missing_keywords
            .iter()
            .take(MAX_KEYWORDS_IN_SUGGESTION)
            .map(String::as_str)
            .collect();
        audit.add_ats_suggestion(format!(
            "Consider adding these keywords where evidence supports them: {}",
            top.join(", ")
        ));
    }
    for warning in &ats.format_warnings {
        audit.add_ats_suggestion(warning.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blackboard::TruthViolation;
    use crate::steps::{EvidenceTruthVerifier, FailureKind, KeywordAtsScorer};
    use crate::testing::{mapped_board, written_board};

    struct FailingScorer;

    #[async_trait]
    impl AtsScorer for FailingScorer {
        async fn score(&self, _board: &Blackboard) -> Result<AtsReport, StepFailure> {
            Err(StepFailure::transient("ats", "scoring backend unavailable"))
        }
    }

    fn ats(missing: &[&str], warnings: &[&str]) -> AtsReport {
        AtsReport {
            keyword_coverage_score: 50.0,
            supported_keywords: vec![],
            missing_keywords: missing.iter().map(|s| s.to_string()).collect(),
            format_warnings: warnings.iter().map(|s| s.to_string()).collect(),
            role_signal_score: 50.0,
        }
    }

    #[test]
    fn test_merge_caps_keywords_and_keeps_passed() {
        let mut report = AuditReport::passing();
        merge_ats_suggestions(
            &mut report,
            &ats(&["a", "b", "c", "d", "e", "f"], &["Table layout in Skills section"]),
        );

        assert!(report.passed());
        assert_eq!(report.ats_suggestions().len(), 2);
        assert!(report.ats_suggestions()[0].ends_with("a, b, c, d, e"));
        assert_eq!(report.ats_suggestions()[1], "Table layout in Skills section");
    }

    #[test]
    fn test_merge_does_not_duplicate() {
        let mut report = AuditReport::new(
            vec![TruthViolation {
                bullet_id: "b1".to_string(),
                bullet_text: String::new(),
                violation: "x".to_string(),
            }],
            vec![],
            vec!["Image in Summary section".to_string()],
        );
        merge_ats_suggestions(&mut report, &ats(&[], &["Image in Summary section"]));
        assert_eq!(report.ats_suggestions().len(), 1);
        assert!(!report.passed());
    }

    #[tokio::test]
    async fn test_auditor_sets_both_reports() {
        let auditor = Auditor::new(Arc::new(KeywordAtsScorer), Arc::new(EvidenceTruthVerifier));
        let board = written_board();

        let next = auditor.execute(&board).await.unwrap();

        assert!(next.ats_report.is_some());
        let audit = next.audit_report.unwrap();
        assert!(audit.passed());
        // SQL is a nice-to-have the fixture draft never mentions.
        assert!(audit.ats_suggestions()[0].contains("SQL"));
    }

    #[tokio::test]
    async fn test_failing_sub_check_fails_the_step() {
        let auditor = Auditor::new(Arc::new(FailingScorer), Arc::new(EvidenceTruthVerifier));
        let err = auditor.execute(&written_board()).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Transient);
        assert_eq!(err.step, "ats");
    }

    #[tokio::test]
    async fn test_auditor_requires_a_draft() {
        let auditor = Auditor::new(Arc::new(KeywordAtsScorer), Arc::new(EvidenceTruthVerifier));
        let err = auditor.execute(&mapped_board()).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Fatal);
    }
}
