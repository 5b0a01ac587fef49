/// Generation steps: the collaborators the orchestrator drives.
///
/// Each step reads the board it is given and returns an updated copy, or a typed failure.
/// Steps never touch the pipeline state tag or the retry counter.
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::blackboard::Blackboard;
use crate::llm_client::LlmError;

pub mod analyst;
pub mod ats;
pub mod auditor;
pub mod mapper;
pub mod prompts;
pub mod truth;
pub mod writer;

pub use analyst::LlmAnalyst;
pub use ats::KeywordAtsScorer;
pub use auditor::Auditor;
pub use mapper::{KeywordEvidenceMapper, LlmEvidenceMapper};
pub use truth::{EvidenceTruthVerifier, LlmTruthVerifier};
pub use writer::LlmResumeWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network-level trouble that outlived the step's own retries.
    Transient,
    /// The step cannot produce a well-formed result.
    Fatal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Transient => f.write_str("transient"),
            FailureKind::Fatal => f.write_str("fatal"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind} failure in {step}: {message}")]
pub struct StepFailure {
    pub step: String,
    pub kind: FailureKind,
    pub message: String,
}

impl StepFailure {
    pub fn transient(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            kind: FailureKind::Transient,
            message: message.into(),
        }
    }

    pub fn fatal(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            kind: FailureKind::Fatal,
            message: message.into(),
        }
    }

    /// Classifies an LLM error: transport, rate-limit and 5xx problems are transient,
    /// everything else (bad output, 4xx) is fatal.
    pub fn from_llm(step: &str, err: LlmError) -> Self {
        if err.is_transient() {
            Self::transient(step, err.to_string())
        } else {
            Self::fatal(step, err.to_string())
        }
    }
}

#[async_trait]
pub trait GenerationStep: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, board: &Blackboard) -> Result<Blackboard, StepFailure>;
}

/// The four steps a run needs, one per working state.
#[derive(Clone)]
pub struct StepSet {
    pub analysis: Arc<dyn GenerationStep>,
    pub mapping: Arc<dyn GenerationStep>,
    pub writing: Arc<dyn GenerationStep>,
    pub auditing: Arc<dyn GenerationStep>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_errors_are_classified() {
        let rate_limited = StepFailure::from_llm("writer", LlmError::RateLimited { retries: 3 });
        assert_eq!(rate_limited.kind, FailureKind::Transient);

        let server = StepFailure::from_llm(
            "writer",
            LlmError::Api {
                status: 503,
                message: "overloaded".to_string(),
            },
        );
        assert_eq!(server.kind, FailureKind::Transient);

        let bad_request = StepFailure::from_llm(
            "writer",
            LlmError::Api {
                status: 400,
                message: "bad".to_string(),
            },
        );
        assert_eq!(bad_request.kind, FailureKind::Fatal);

        let empty = StepFailure::from_llm("writer", LlmError::EmptyContent);
        assert_eq!(empty.kind, FailureKind::Fatal);
    }

    #[test]
    fn test_step_failure_display() {
        let failure = StepFailure::fatal("analyst", "no requirements found");
        assert_eq!(
            failure.to_string(),
            "fatal failure in analyst: no requirements found"
        );
    }
}
