use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::blackboard::TruthViolation;
use crate::pipeline::PipelineState;
use crate::steps::StepFailure;

/// Pipeline-level error type.
///
/// Every variant maps onto a `FailureCategory`. Only `TruthAudit` is recoverable, and the
/// orchestrator surfaces it only once the revision budget is spent.
#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid evidence record set: {}", .violations.join("; "))]
    InvalidEvidence { violations: Vec<String> },

    #[error("Invalid run inputs: {0}")]
    InvalidInputs(String),

    #[error("Step failed in {state}: {source}")]
    StepExecution {
        state: PipelineState,
        #[source]
        source: StepFailure,
    },

    #[error("Integrity violation leaving {state}: {}", .violations.join("; "))]
    Integrity {
        state: PipelineState,
        violations: Vec<String>,
    },

    #[error("Claim '{bullet_id}' has no evidence references")]
    UngroundedClaim { bullet_id: String },

    #[error(
        "Truth audit failed after {retries} revision(s) with {} violation(s)",
        .violations.len()
    )]
    TruthAudit {
        retries: u32,
        violations: Vec<TruthViolation>,
    },

    #[error("No transition out of {0}")]
    NoTransition(PipelineState),

    #[error("Blackboard is terminal ({0}) and cannot be mutated")]
    TerminalState(PipelineState),

    #[error("Run cancelled after {0}")]
    Cancelled(PipelineState),

    #[error("Output error: {0}")]
    Output(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Coarse failure classes reported to the user when a run ends in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Configuration,
    StepExecution,
    Integrity,
    TruthAudit,
    Cancelled,
    Internal,
}

impl ForgeError {
    pub fn category(&self) -> FailureCategory {
        match self {
            ForgeError::Configuration(_)
            | ForgeError::InvalidEvidence { .. }
            | ForgeError::InvalidInputs(_) => FailureCategory::Configuration,
            ForgeError::StepExecution { .. } => FailureCategory::StepExecution,
            ForgeError::Integrity { .. } | ForgeError::UngroundedClaim { .. } => {
                FailureCategory::Integrity
            }
            ForgeError::TruthAudit { .. } => FailureCategory::TruthAudit,
            ForgeError::Cancelled(_) => FailureCategory::Cancelled,
            ForgeError::NoTransition(_)
            | ForgeError::TerminalState(_)
            | ForgeError::Output(_)
            | ForgeError::Internal(_) => FailureCategory::Internal,
        }
    }

    /// Only auditor-reported truth violations feed the revision loop.
    pub fn is_recoverable(&self) -> bool {
        self.category() == FailureCategory::TruthAudit
    }

    /// Human-readable violation list carried by the error, if any.
    pub fn violations(&self) -> Vec<String> {
        match self {
            ForgeError::InvalidEvidence { violations } | ForgeError::Integrity { violations, .. } => {
                violations.clone()
            }
            ForgeError::TruthAudit { violations, .. } => violations
                .iter()
                .map(|v| format!("{}: {}", v.bullet_id, v.violation))
                .collect(),
            _ => Vec::new(),
        }
    }
}
