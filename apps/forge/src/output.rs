//! Output assembly: writes a finished run to disk.
//!
//! Only a `Complete` board yields artifacts. A failed board gets a single `failure.json`.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::blackboard::{Blackboard, FailureRecord, Gap, GapStrategy, Priority, Requirement};
use crate::errors::ForgeError;

#[derive(Debug, Serialize)]
struct FailureReport<'a> {
    run_id: Uuid,
    target_title: &'a str,
    #[serde(flatten)]
    failure: &'a FailureRecord,
}

#[derive(Debug, Serialize)]
struct UserQuestion<'a> {
    gap_id: &'a str,
    requirement: &'a str,
    question: String,
    impact: &'static str,
    adjacent_evidence_ids: &'a [String],
}

/// Lowercase ASCII alphanumerics, every other run of characters collapsed to one dash.
fn slug(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "run".to_string()
    } else {
        trimmed.to_string()
    }
}

fn run_dir_name(board: &Blackboard) -> String {
    format!(
        "{}-{}",
        slug(&board.inputs().target_title),
        board.started_at().format("%Y%m%d-%H%M%S")
    )
}

async fn write_json<T: Serialize + ?Sized>(dir: &Path, name: &str, value: &T) -> Result<(), ForgeError> {
    let body = serde_json::to_string_pretty(value)
        .map_err(|e| ForgeError::Output(format!("failed to serialize {name}: {e}")))?;
    write_text(dir, name, &body).await
}

async fn write_text(dir: &Path, name: &str, body: &str) -> Result<(), ForgeError> {
    let path = dir.join(name);
    tokio::fs::write(&path, body)
        .await
        .map_err(|e| ForgeError::Output(format!("failed to write {}: {e}", path.display())))
}

async fn create_run_dir(output_dir: &Path, board: &Blackboard) -> Result<PathBuf, ForgeError> {
    let dir = output_dir.join(run_dir_name(board));
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| ForgeError::Output(format!("failed to create {}: {e}", dir.display())))?;
    Ok(dir)
}

/// Why an answer matters, by how much the job description weighs the requirement.
fn impact(priority: Priority) -> &'static str {
    match priority {
        Priority::High => {
            "Must-have requirement: without confirmed experience it stays an open gap on the resume"
        }
        Priority::Medium => {
            "Important requirement: confirmed experience adds a grounded bullet for it"
        }
        Priority::Low => "Nice-to-have: an answer only strengthens keyword coverage",
    }
}

fn questions_for_user<'a>(gaps: &'a [Gap], requirements: &[Requirement]) -> Vec<UserQuestion<'a>> {
    gaps.iter()
        .filter(|g| g.strategy == GapStrategy::AskUser && !g.user_confirmed)
        .map(|g| {
            let priority = requirements
                .iter()
                .find(|r| r.id == g.requirement_id)
                .map(|r| r.priority)
                .unwrap_or_default();
            UserQuestion {
                gap_id: &g.id,
                requirement: &g.requirement_text,
                question: format!(
                    "Do you have experience with \"{}\" that is not in your evidence yet?",
                    g.requirement_text
                ),
                impact: impact(priority),
                adjacent_evidence_ids: &g.adjacent_evidence_ids,
            }
        })
        .collect()
}

/// Writes every artifact of a completed run and returns the run directory.
pub async fn write_run_outputs(output_dir: &Path, board: &Blackboard) -> Result<PathBuf, ForgeError> {
    let artifacts = board.artifacts().ok_or_else(|| {
        ForgeError::Output(format!(
            "run is in {} and has no artifacts to write",
            board.current_state()
        ))
    })?;

    let dir = create_run_dir(output_dir, board).await?;

    write_json(&dir, "evidence_used.json", &artifacts.selected_evidence).await?;
    write_json(&dir, "claim_index.json", artifacts.claim_index).await?;
    write_json(&dir, "audit_report.json", artifacts.audit_report).await?;
    write_json(&dir, "change_log.json", artifacts.change_log).await?;
    match artifacts.ats_report {
        Some(ats) => write_json(&dir, "ats_report.json", ats).await?,
        None => warn!("Run {} has no ATS report", board.run_id()),
    }

    let markdown = board
        .resume_draft
        .as_ref()
        .map(|d| d.to_markdown())
        .unwrap_or_default();
    write_text(&dir, "resume.md", &markdown).await?;

    let questions = questions_for_user(artifacts.gaps, &board.requirements);
    if !questions.is_empty() {
        write_json(&dir, "questions_for_user.json", &questions).await?;
    }

    info!("Wrote run outputs to {}", dir.display());
    Ok(dir)
}

/// Writes `failure.json` for a failed run and returns its path.
pub async fn write_failure_report(output_dir: &Path, board: &Blackboard) -> Result<PathBuf, ForgeError> {
    let failure = board.failure().ok_or_else(|| {
        ForgeError::Output(format!(
            "run is in {} and has no failure record",
            board.current_state()
        ))
    })?;

    let dir = create_run_dir(output_dir, board).await?;
    let report = FailureReport {
        run_id: board.run_id(),
        target_title: &board.inputs().target_title,
        failure,
    };
    write_json(&dir, "failure.json", &report).await?;

    let path = dir.join("failure.json");
    info!("Wrote failure report to {}", path.display());
    Ok(path)
}
