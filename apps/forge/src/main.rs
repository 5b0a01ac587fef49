mod blackboard;
mod config;
mod errors;
mod evidence;
mod llm_client;
mod output;
mod pipeline;
mod steps;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::blackboard::Blackboard;
use crate::config::{Config, MapperBackend, TruthBackend};
use crate::evidence::JsonFileEvidenceSource;
use crate::llm_client::LlmClient;
use crate::pipeline::{Orchestrator, PipelineRun, RunOutcome};
use crate::steps::ats::AtsScorer;
use crate::steps::truth::TruthVerifier;
use crate::steps::{
    Auditor, EvidenceTruthVerifier, GenerationStep, KeywordAtsScorer, KeywordEvidenceMapper,
    LlmAnalyst, LlmEvidenceMapper, LlmResumeWriter, LlmTruthVerifier, StepSet,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Forge v{}", env!("CARGO_PKG_VERSION"));

    let inputs = config.load_run_inputs().await?;
    let board = Blackboard::new(inputs).context("Invalid run inputs")?;

    // The HTTP timeout never outlives the longest step timeout.
    let request_timeout = [
        config.timeouts.analysis,
        config.timeouts.mapping,
        config.timeouts.writing,
        config.timeouts.auditing,
    ]
    .into_iter()
    .max()
    .unwrap_or_default();
    let llm = LlmClient::new(config.anthropic_api_key.clone(), request_timeout)
        .context("Failed to build LLM client")?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let steps = build_steps(&config, &llm);
    let source = Arc::new(JsonFileEvidenceSource::new(config.evidence_path.clone()));
    let orchestrator = Orchestrator::new(config.pipeline_settings(), source, steps)?
        .with_usage_meter(llm.usage_meter());

    let cancel = orchestrator.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, cancelling after the current step");
            cancel.cancel();
        }
    });

    let run = orchestrator.run(board).await;
    log_timings(&run);

    match &run.outcome {
        RunOutcome::Complete => {
            let dir = output::write_run_outputs(&config.output_dir, &run.board).await?;
            info!("Resume ready in {}", dir.display());
            Ok(())
        }
        RunOutcome::Failed(err) => {
            let path = output::write_failure_report(&config.output_dir, &run.board).await?;
            error!(
                "Run failed in {} after {} revision(s); report at {}",
                run.board
                    .failure()
                    .map(|f| f.origin.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                run.board.retry_count(),
                path.display()
            );
            Err(anyhow::anyhow!("{err}"))
        }
        RunOutcome::Cancelled => {
            warn!(
                "Run {} cancelled after {} (next: {}); no outputs written",
                run.board.run_id(),
                run.last_completed()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                run.board.current_state()
            );
            Ok(())
        }
    }
}

fn build_steps(config: &Config, llm: &LlmClient) -> StepSet {
    let mapping: Arc<dyn GenerationStep> = match config.evidence_mapper {
        MapperBackend::Llm => Arc::new(LlmEvidenceMapper::new(llm.clone())),
        MapperBackend::Keyword => Arc::new(KeywordEvidenceMapper),
    };
    let truth: Arc<dyn TruthVerifier> = match config.truth_verifier {
        TruthBackend::Llm => Arc::new(LlmTruthVerifier::new(llm.clone())),
        TruthBackend::Evidence => Arc::new(EvidenceTruthVerifier),
    };
    let ats: Arc<dyn AtsScorer> = Arc::new(KeywordAtsScorer);

    info!(
        "Steps: mapper={:?}, truth verifier={:?}",
        config.evidence_mapper, config.truth_verifier
    );

    StepSet {
        analysis: Arc::new(LlmAnalyst::new(llm.clone())),
        mapping,
        writing: Arc::new(LlmResumeWriter::new(llm.clone())),
        auditing: Arc::new(Auditor::new(ats, truth)),
    }
}

fn log_timings(run: &PipelineRun) {
    for timing in &run.timings {
        info!(
            "  {:<14} {:>8}ms {:>8} tokens ${:.4}",
            timing.state.to_string(),
            timing.elapsed.as_millis(),
            timing.usage.total_tokens(),
            timing.usage.cost_usd()
        );
    }
    let usage = run.total_usage();
    info!(
        "Run {} visited {} state(s) in {}ms: {} model call(s), {} input + {} output tokens, ${:.4}",
        run.board.run_id(),
        run.visited.len(),
        run.total_elapsed().as_millis(),
        usage.calls,
        usage.input_tokens,
        usage.output_tokens,
        usage.cost_usd()
    );
}
