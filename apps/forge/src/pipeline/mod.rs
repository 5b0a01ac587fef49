pub mod gaps;
pub mod integrity;
pub mod orchestrator;
pub mod revision;
pub mod state;

pub use gaps::GapPolicy;
pub use orchestrator::{Orchestrator, PipelineRun, PipelineSettings, RunOutcome, StepTimeouts};
pub use state::PipelineState;
