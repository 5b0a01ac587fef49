use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::gaps::GapPolicy;
use super::state::{next_transition, PipelineState};
use super::{integrity, revision};
use crate::blackboard::{Blackboard, GapStrategy};
use crate::errors::ForgeError;
use crate::evidence::{EvidenceSource, EvidenceStore, SynonymTable};
use crate::llm_client::{TokenUsage, UsageMeter};
use crate::steps::{GenerationStep, StepFailure, StepSet};

/// Hard ceiling on the revision budget a run may be configured with.
pub const MAX_RETRIES_CEILING: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepTimeouts {
    pub analysis: Duration,
    pub mapping: Duration,
    pub writing: Duration,
    pub auditing: Duration,
}

impl StepTimeouts {
    pub fn uniform(limit: Duration) -> Self {
        Self {
            analysis: limit,
            mapping: limit,
            writing: limit,
            auditing: limit,
        }
    }

    pub fn for_state(&self, state: PipelineState) -> Option<Duration> {
        match state {
            PipelineState::Analysis => Some(self.analysis),
            PipelineState::Mapping => Some(self.mapping),
            PipelineState::Writing => Some(self.writing),
            PipelineState::Auditing => Some(self.auditing),
            _ => None,
        }
    }
}

impl Default for StepTimeouts {
    fn default() -> Self {
        Self::uniform(Duration::from_secs(120))
    }
}

/// The slice of configuration the orchestrator is built with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineSettings {
    pub max_retries: u32,
    pub timeouts: StepTimeouts,
    pub gap_policy: GapPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeouts: StepTimeouts::default(),
            gap_policy: GapPolicy::default(),
        }
    }
}

impl PipelineSettings {
    pub fn validate(&self) -> Result<(), ForgeError> {
        if self.max_retries > MAX_RETRIES_CEILING {
            return Err(ForgeError::Configuration(format!(
                "max_retries must be at most {MAX_RETRIES_CEILING}, got {}",
                self.max_retries
            )));
        }
        for state in [
            PipelineState::Analysis,
            PipelineState::Mapping,
            PipelineState::Writing,
            PipelineState::Auditing,
        ] {
            if self.timeouts.for_state(state) == Some(Duration::ZERO) {
                return Err(ForgeError::Configuration(format!(
                    "{state} timeout must be greater than zero"
                )));
            }
        }
        Ok(())
    }
}

/// Shared flag for abandoning a run between transitions.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One executed state: wall-clock time, model usage, and whether the run moved on from it.
#[derive(Debug, Clone, Serialize)]
pub struct StepTiming {
    pub state: PipelineState,
    pub elapsed: Duration,
    pub usage: TokenUsage,
    pub completed: bool,
}

#[derive(Debug)]
pub enum RunOutcome {
    Complete,
    Failed(ForgeError),
    Cancelled,
}

/// Trace of one run: the last board, every state visited in order, and per-state timings.
#[derive(Debug)]
pub struct PipelineRun {
    pub board: Blackboard,
    pub visited: Vec<PipelineState>,
    pub timings: Vec<StepTiming>,
    pub outcome: RunOutcome,
}

impl PipelineRun {
    pub fn is_complete(&self) -> bool {
        matches!(self.outcome, RunOutcome::Complete)
    }

    pub fn visits(&self, state: PipelineState) -> usize {
        self.visited.iter().filter(|&&s| s == state).count()
    }

    pub fn total_elapsed(&self) -> Duration {
        self.timings.iter().map(|t| t.elapsed).sum()
    }

    pub fn total_usage(&self) -> TokenUsage {
        self.timings.iter().map(|t| t.usage).sum()
    }

    /// Model usage of every visit to `state`, added up.
    pub fn usage_in(&self, state: PipelineState) -> TokenUsage {
        self.timings
            .iter()
            .filter(|t| t.state == state)
            .map(|t| t.usage)
            .sum()
    }

    /// The last state whose action finished and whose outgoing transition was taken. On a
    /// cancelled run the board's state tag is the next state, which never executed.
    pub fn last_completed(&self) -> Option<PipelineState> {
        self.timings
            .iter()
            .rev()
            .find(|t| t.completed)
            .map(|t| t.state)
    }

    pub fn into_result(self) -> Result<Blackboard, ForgeError> {
        match self.outcome {
            RunOutcome::Complete => Ok(self.board),
            RunOutcome::Failed(err) => Err(err),
            RunOutcome::Cancelled => Err(ForgeError::Cancelled(self.board.current_state())),
        }
    }
}

/// Drives a board through the transition table until it reaches a terminal state.
pub struct Orchestrator {
    settings: PipelineSettings,
    source: Arc<dyn EvidenceSource>,
    steps: StepSet,
    synonyms: Arc<SynonymTable>,
    cancel: CancelHandle,
    usage: UsageMeter,
}

impl Orchestrator {
    pub fn new(
        settings: PipelineSettings,
        source: Arc<dyn EvidenceSource>,
        steps: StepSet,
    ) -> Result<Self, ForgeError> {
        settings.validate()?;
        Ok(Self {
            settings,
            source,
            steps,
            synonyms: Arc::new(SynonymTable::default()),
            cancel: CancelHandle::default(),
            usage: UsageMeter::default(),
        })
    }

    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Meter the steps' model calls record into; read around each step for per-state usage.
    pub fn with_usage_meter(mut self, usage: UsageMeter) -> Self {
        self.usage = usage;
        self
    }

    pub async fn run(&self, board: Blackboard) -> PipelineRun {
        let mut board = board;
        let mut visited = Vec::new();
        let mut timings = Vec::new();

        info!("Starting pipeline run {}", board.run_id());

        loop {
            let state = board.current_state();
            if state.is_terminal() {
                let outcome = match state {
                    PipelineState::Complete => RunOutcome::Complete,
                    _ => RunOutcome::Failed(ForgeError::Internal(anyhow::anyhow!(
                        "run started from terminal state {state}"
                    ))),
                };
                return PipelineRun {
                    board,
                    visited,
                    timings,
                    outcome,
                };
            }

            if self.cancel.is_cancelled() {
                warn!("Run {} cancelled before {}", board.run_id(), state);
                return PipelineRun {
                    board,
                    visited,
                    timings,
                    outcome: RunOutcome::Cancelled,
                };
            }

            visited.push(state);
            info!("Entering {}", state);

            let usage_before = self.usage.snapshot();
            let started = Instant::now();
            let result = self.execute_state(state, &board).await;
            let elapsed = started.elapsed();
            let usage = self.usage.snapshot().since(&usage_before);
            debug!(
                "{} finished in {}ms, {} model call(s)",
                state,
                elapsed.as_millis(),
                usage.calls
            );
            timings.push(StepTiming {
                state,
                elapsed,
                usage,
                completed: false,
            });

            let next_board = match result {
                Ok(next) => next,
                Err(err) => return Self::fail(board, state, err, visited, timings),
            };
            board = next_board;

            if state.requires_integrity_check() {
                let report = integrity::validate(&board);
                if !report.passed {
                    let err = ForgeError::Integrity {
                        state,
                        violations: report.violations,
                    };
                    return Self::fail(board, state, err, visited, timings);
                }
            }

            let transition = match next_transition(state, &board) {
                Some(t) => t,
                None => {
                    return Self::fail(board, state, ForgeError::NoTransition(state), visited, timings)
                }
            };

            if transition.to == PipelineState::Failed {
                let violations = board
                    .audit_report
                    .as_ref()
                    .map(|r| r.truth_violations().to_vec())
                    .unwrap_or_default();
                let err = ForgeError::TruthAudit {
                    retries: board.retry_count(),
                    violations,
                };
                return Self::fail(board, state, err, visited, timings);
            }

            info!("{} -> {} ({})", state, transition.to, transition.label);
            if let Err(err) = board.enter(transition.to) {
                return Self::fail(board, state, err, visited, timings);
            }
            if let Some(timing) = timings.last_mut() {
                timing.completed = true;
            }

            if transition.to == PipelineState::Complete {
                visited.push(PipelineState::Complete);
                info!(
                    "Run {} complete after {} revision(s)",
                    board.run_id(),
                    board.retry_count()
                );
                return PipelineRun {
                    board,
                    visited,
                    timings,
                    outcome: RunOutcome::Complete,
                };
            }
        }
    }

    fn fail(
        mut board: Blackboard,
        origin: PipelineState,
        err: ForgeError,
        mut visited: Vec<PipelineState>,
        timings: Vec<StepTiming>,
    ) -> PipelineRun {
        error!(
            "Run {} failed in {} after {} revision(s): {}",
            board.run_id(),
            origin,
            board.retry_count(),
            err
        );
        for violation in err.violations() {
            error!("  {}", violation);
        }
        board.fail(origin, &err);
        visited.push(PipelineState::Failed);
        PipelineRun {
            board,
            visited,
            timings,
            outcome: RunOutcome::Failed(err),
        }
    }

    async fn execute_state(
        &self,
        state: PipelineState,
        board: &Blackboard,
    ) -> Result<Blackboard, ForgeError> {
        match state {
            PipelineState::Init => Ok(board.clone()),
            PipelineState::Preprocessing => self.preprocess(board).await,
            PipelineState::Analysis => {
                self.run_step(state, self.steps.analysis.as_ref(), board)
                    .await
            }
            PipelineState::Mapping => {
                let mut next = self
                    .run_step(state, self.steps.mapping.as_ref(), board)
                    .await?;
                self.resolve_gaps(&mut next);
                Ok(next)
            }
            PipelineState::Writing => {
                self.run_step(state, self.steps.writing.as_ref(), board)
                    .await
            }
            PipelineState::Auditing => {
                self.run_step(state, self.steps.auditing.as_ref(), board)
                    .await
            }
            PipelineState::Revision => revision::apply_revision(board),
            PipelineState::Complete | PipelineState::Failed => {
                Err(ForgeError::NoTransition(state))
            }
        }
    }

    async fn preprocess(&self, board: &Blackboard) -> Result<Blackboard, ForgeError> {
        let records = self.source.load().await?;
        let store = EvidenceStore::from_records(records)?;
        if store.is_empty() {
            return Err(ForgeError::Configuration(format!(
                "Evidence source {} contains no records",
                self.source.describe()
            )));
        }

        let mut next = board.clone();
        info!(
            "Evidence store ready: {} records, {} synonym groups",
            store.len(),
            self.synonyms.len()
        );
        next.install_evidence(Arc::new(store), self.synonyms.clone())?;
        next.set_max_retries(self.settings.max_retries)?;
        Ok(next)
    }

    async fn run_step(
        &self,
        state: PipelineState,
        step: &dyn GenerationStep,
        board: &Blackboard,
    ) -> Result<Blackboard, ForgeError> {
        let limit = self
            .settings
            .timeouts
            .for_state(state)
            .unwrap_or_else(|| StepTimeouts::default().analysis);

        match tokio::time::timeout(limit, step.execute(board)).await {
            Ok(Ok(next)) => {
                let changes = board.core_changes(&next);
                if changes.is_empty() {
                    Ok(next)
                } else {
                    Err(ForgeError::Integrity {
                        state,
                        violations: changes
                            .into_iter()
                            .map(|c| format!("step {} altered the run core: {c}", step.name()))
                            .collect(),
                    })
                }
            }
            Ok(Err(source)) => Err(ForgeError::StepExecution { state, source }),
            Err(_) => Err(ForgeError::StepExecution {
                state,
                source: StepFailure::transient(
                    step.name(),
                    format!("timed out after {}s", limit.as_secs_f32()),
                ),
            }),
        }
    }

    /// Applies the gap policy, then adds adjacent evidence of every gap resolved to
    /// use-adjacent-evidence to the selection.
    fn resolve_gaps(&self, board: &mut Blackboard) {
        self.settings.gap_policy.apply(&mut board.gaps);

        let adjacent: Vec<String> = board
            .gaps
            .iter()
            .filter(|g| g.strategy == GapStrategy::UseAdjacentEvidence)
            .flat_map(|g| g.adjacent_evidence_ids.iter().cloned())
            .collect();
        board.selected_evidence_ids.extend(adjacent);

        let ask_user = board
            .gaps
            .iter()
            .filter(|g| g.strategy == GapStrategy::AskUser)
            .count();
        if ask_user > 0 {
            warn!(
                "{} gap(s) need user confirmation; writing will treat them as omitted",
                ask_user
            );
        }
    }
}
