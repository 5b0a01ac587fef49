use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};

use crate::blackboard::{Confidence, GapStrategy, RunInputs};
use crate::pipeline::orchestrator::MAX_RETRIES_CEILING;
use crate::pipeline::{GapPolicy, PipelineSettings, StepTimeouts};

/// Which evidence mapper backs the Mapping state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapperBackend {
    Llm,
    Keyword,
}

impl FromStr for MapperBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "llm" => Ok(MapperBackend::Llm),
            "keyword" => Ok(MapperBackend::Keyword),
            other => bail!("unknown evidence mapper '{other}' (expected llm|keyword)"),
        }
    }
}

/// Which truth verifier the auditor runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruthBackend {
    Llm,
    Evidence,
}

impl FromStr for TruthBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "llm" => Ok(TruthBackend::Llm),
            "evidence" => Ok(TruthBackend::Evidence),
            other => bail!("unknown truth verifier '{other}' (expected llm|evidence)"),
        }
    }
}

/// Run configuration loaded from environment variables.
/// Fails before the run starts if a required variable is missing or a value is invalid.
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: String,
    pub evidence_path: PathBuf,
    pub jd_path: PathBuf,
    pub target_title: String,
    pub max_pages: u32,
    pub template_path: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub max_retries: u32,
    pub timeouts: StepTimeouts,
    pub evidence_mapper: MapperBackend,
    pub truth_verifier: TruthBackend,
    pub gap_policy: GapPolicy,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests need not touch the process env.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let require = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow!("Required environment variable '{key}' is not set"))
        };

        let step_timeout = parse_or(&lookup, "STEP_TIMEOUT_SECS", 120u64)?;
        let step_secs = |key: &str| -> Result<Duration> {
            let secs = parse_or(&lookup, key, step_timeout)?;
            if secs == 0 {
                bail!("{key} must be greater than zero");
            }
            Ok(Duration::from_secs(secs))
        };
        let timeouts = StepTimeouts {
            analysis: step_secs("ANALYSIS_TIMEOUT_SECS")?,
            mapping: step_secs("MAPPING_TIMEOUT_SECS")?,
            writing: step_secs("WRITING_TIMEOUT_SECS")?,
            auditing: step_secs("AUDITING_TIMEOUT_SECS")?,
        };

        let max_retries = parse_or(&lookup, "MAX_RETRIES", 3u32)?;
        if max_retries > MAX_RETRIES_CEILING {
            bail!("MAX_RETRIES must be at most {MAX_RETRIES_CEILING}, got {max_retries}");
        }

        let defaults = GapPolicy::default();
        let gap_policy = GapPolicy {
            terminology_gap: parse_or::<GapStrategy, _>(
                &lookup,
                "TERMINOLOGY_GAP_STRATEGY",
                defaults.terminology_gap,
            )?,
            hidden_evidence: parse_or::<GapStrategy, _>(
                &lookup,
                "HIDDEN_EVIDENCE_STRATEGY",
                defaults.hidden_evidence,
            )?,
            ask_user_min_confidence: parse_or::<Confidence, _>(
                &lookup,
                "GAP_ASK_USER_MIN_CONFIDENCE",
                defaults.ask_user_min_confidence,
            )?,
        };

        Ok(Config {
            anthropic_api_key: require("ANTHROPIC_API_KEY")?,
            evidence_path: PathBuf::from(require("EVIDENCE_PATH")?),
            jd_path: PathBuf::from(require("JD_PATH")?),
            target_title: require("TARGET_TITLE")?,
            max_pages: parse_or(&lookup, "MAX_PAGES", 2u32)?,
            template_path: lookup("TEMPLATE_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            output_dir: PathBuf::from(
                lookup("OUTPUT_DIR").unwrap_or_else(|| "./outputs".to_string()),
            ),
            max_retries,
            timeouts,
            evidence_mapper: parse_or(&lookup, "EVIDENCE_MAPPER", MapperBackend::Llm)?,
            truth_verifier: parse_or(&lookup, "TRUTH_VERIFIER", TruthBackend::Llm)?,
            gap_policy,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            max_retries: self.max_retries,
            timeouts: self.timeouts.clone(),
            gap_policy: self.gap_policy.clone(),
        }
    }

    /// Reads the job description file and assembles the run inputs.
    pub async fn load_run_inputs(&self) -> Result<RunInputs> {
        let job_description = tokio::fs::read_to_string(&self.jd_path)
            .await
            .with_context(|| format!("Failed to read job description {}", self.jd_path.display()))?;

        Ok(RunInputs {
            job_description,
            target_title: self.target_title.clone(),
            max_pages: self.max_pages,
            template_path: self.template_path.clone(),
        })
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("{key} has invalid value '{raw}': {e}")),
    }
}
