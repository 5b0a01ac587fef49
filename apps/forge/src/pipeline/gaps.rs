use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::blackboard::{Confidence, Gap, GapKind, GapStrategy};

/// Deterministic strategy selection for unmapped requirements.
///
/// Terminology gaps and hidden evidence default to using the adjacent evidence. A true
/// gap asks the user when it has adjacent evidence at `ask_user_min_confidence` or better,
/// and is omitted otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapPolicy {
    pub terminology_gap: GapStrategy,
    pub hidden_evidence: GapStrategy,
    pub ask_user_min_confidence: Confidence,
}

impl Default for GapPolicy {
    fn default() -> Self {
        Self {
            terminology_gap: GapStrategy::UseAdjacentEvidence,
            hidden_evidence: GapStrategy::UseAdjacentEvidence,
            ask_user_min_confidence: Confidence::Low,
        }
    }
}

impl GapPolicy {
    pub fn resolve(
        &self,
        kind: GapKind,
        adjacent_evidence_ids: &[String],
        adjacent_confidence: Option<Confidence>,
    ) -> GapStrategy {
        match kind {
            GapKind::TerminologyGap => self.terminology_gap,
            GapKind::HiddenEvidence => self.hidden_evidence,
            GapKind::TrueGap => {
                // Adjacent ids without a stated confidence count as low.
                let confidence = adjacent_confidence.unwrap_or(Confidence::Low);
                if !adjacent_evidence_ids.is_empty() && confidence >= self.ask_user_min_confidence
                {
                    GapStrategy::AskUser
                } else {
                    GapStrategy::Omit
                }
            }
        }
    }

    /// Sets the strategy of every gap nobody has confirmed yet.
    pub fn apply(&self, gaps: &mut [Gap]) {
        for gap in gaps.iter_mut().filter(|g| !g.user_confirmed) {
            let strategy = self.resolve(gap.kind, &gap.adjacent_evidence_ids, gap.adjacent_confidence);
            debug!(
                "Gap {} ({:?}) resolved to {:?}",
                gap.id, gap.kind, strategy
            );
            gap.strategy = strategy;
        }
    }
}
