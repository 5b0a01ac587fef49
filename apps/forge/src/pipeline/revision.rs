use tracing::info;

use crate::blackboard::{AuditReport, Blackboard, ChangeLogEntry};
use crate::errors::ForgeError;

/// One directive per truth violation, in report order.
pub fn revision_directives(report: &AuditReport) -> Vec<String> {
    report
        .truth_violations()
        .iter()
        .map(|v| format!("fix required: bullet `{}` — {}", v.bullet_id, v.violation))
        .collect()
}

/// Turns the failed audit into change-log directives for the next writing round and spends
/// one retry. The stale audit and ATS reports are cleared so the next Auditing pass starts
/// from nothing.
pub fn apply_revision(board: &Blackboard) -> Result<Blackboard, ForgeError> {
    let report = board.audit_report.as_ref().ok_or_else(|| {
        ForgeError::Internal(anyhow::anyhow!("revision entered without an audit report"))
    })?;

    let directives = revision_directives(report);
    if directives.is_empty() {
        return Err(ForgeError::Internal(anyhow::anyhow!(
            "revision entered with a passing audit report"
        )));
    }

    let mut next = board.clone();
    let round = next.record_revision()?;

    next.change_log.extend(
        directives
            .iter()
            .map(|d| ChangeLogEntry::directive(round, d.clone())),
    );
    next.change_log.extend(
        report
            .ats_suggestions()
            .iter()
            .map(|s| ChangeLogEntry::ats_suggestion(round, s.clone())),
    );
    next.audit_report = None;
    next.ats_report = None;

    info!(
        "Revision round {}/{}: {} directive(s), {} ATS suggestion(s)",
        round,
        next.max_retries(),
        directives.len(),
        report.ats_suggestions().len()
    );

    Ok(next)
}
