use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::ForgeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[serde(alias = "High", alias = "HIGH")]
    High,
    #[default]
    #[serde(alias = "Medium", alias = "MEDIUM")]
    Medium,
    #[serde(alias = "Low", alias = "LOW")]
    Low,
}

/// Ordered `Low < Medium < High` so thresholds compare naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    #[serde(alias = "Low", alias = "LOW")]
    Low,
    #[serde(alias = "Medium", alias = "MEDIUM")]
    Medium,
    #[serde(alias = "High", alias = "HIGH")]
    High,
}

impl std::str::FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Confidence::Low),
            "medium" => Ok(Confidence::Medium),
            "high" => Ok(Confidence::High),
            other => Err(format!("unknown confidence '{other}' (expected low|medium|high)")),
        }
    }
}

/// Structured reading of the job description, produced by Analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleProfile {
    pub inferred_level: String,
    #[serde(default)]
    pub must_haves: Vec<String>,
    #[serde(default)]
    pub nice_to_haves: Vec<String>,
    #[serde(default)]
    pub seniority_signals: Vec<String>,
    #[serde(default)]
    pub keyword_clusters: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub recommended_storylines: Vec<String>,
    #[serde(default)]
    pub priority_sections: Vec<String>,
    #[serde(default)]
    pub downplay_sections: Vec<String>,
}

impl RoleProfile {
    /// Deduplicated keywords an ATS would look for, with a weight per source list.
    /// Must-haves weigh 1.0, keyword clusters 0.6, nice-to-haves 0.3.
    pub fn weighted_keywords(&self) -> Vec<(String, f32)> {
        let mut out: Vec<(String, f32)> = Vec::new();
        let mut push = |term: &str, weight: f32| {
            let term = term.trim();
            if term.is_empty() {
                return;
            }
            if !out.iter().any(|(k, _)| k.eq_ignore_ascii_case(term)) {
                out.push((term.to_string(), weight));
            }
        };
        for term in &self.must_haves {
            push(term, 1.0);
        }
        for term in self.keyword_clusters.values().flatten() {
            push(term, 0.6);
        }
        for term in &self.nice_to_haves {
            push(term, 0.3);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceMapping {
    pub requirement_id: String,
    #[serde(default)]
    pub evidence_card_ids: Vec<String>,
    pub confidence: Confidence,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GapKind {
    #[serde(alias = "true_gap")]
    TrueGap,
    #[serde(alias = "terminology_gap")]
    TerminologyGap,
    #[serde(alias = "hidden_evidence")]
    HiddenEvidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GapStrategy {
    #[default]
    Omit,
    #[serde(alias = "adjacent_experience", alias = "use_adjacent_evidence")]
    UseAdjacentEvidence,
    #[serde(alias = "ask_user")]
    AskUser,
}

impl std::str::FromStr for GapStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "omit" => Ok(GapStrategy::Omit),
            "use-adjacent-evidence" | "adjacent-experience" => Ok(GapStrategy::UseAdjacentEvidence),
            "ask-user" => Ok(GapStrategy::AskUser),
            other => Err(format!(
                "unknown gap strategy '{other}' (expected omit|use-adjacent-evidence|ask-user)"
            )),
        }
    }
}

/// A requirement without direct evidence, and how Writing should treat it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    pub id: String,
    pub requirement_id: String,
    pub requirement_text: String,
    pub kind: GapKind,
    #[serde(default)]
    pub strategy: GapStrategy,
    #[serde(default)]
    pub adjacent_evidence_ids: Vec<String>,
    #[serde(default)]
    pub adjacent_confidence: Option<Confidence>,
    /// Set when a person already chose the strategy; the policy leaves these alone.
    #[serde(default)]
    pub user_confirmed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeSection {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResumeDraft {
    #[serde(default)]
    pub sections: Vec<ResumeSection>,
}

impl ResumeDraft {
    pub fn to_markdown(&self) -> String {
        self.sections
            .iter()
            .map(|s| format!("## {}\n\n{}\n", s.name, s.content.trim_end()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn full_text(&self) -> String {
        self.sections
            .iter()
            .map(|s| s.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A generated bullet and the evidence that justifies it.
///
/// The evidence list is never empty: `new` rejects an empty list and deserialization goes
/// through the same check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawClaimMapping")]
pub struct ClaimMapping {
    bullet_id: String,
    bullet_text: String,
    evidence_card_ids: Vec<String>,
}

#[derive(Deserialize)]
struct RawClaimMapping {
    bullet_id: String,
    bullet_text: String,
    #[serde(default)]
    evidence_card_ids: Vec<String>,
}

impl TryFrom<RawClaimMapping> for ClaimMapping {
    type Error = ForgeError;

    fn try_from(raw: RawClaimMapping) -> Result<Self, Self::Error> {
        ClaimMapping::new(raw.bullet_id, raw.bullet_text, raw.evidence_card_ids)
    }
}

impl ClaimMapping {
    pub fn new(
        bullet_id: impl Into<String>,
        bullet_text: impl Into<String>,
        evidence_card_ids: Vec<String>,
    ) -> Result<Self, ForgeError> {
        let bullet_id = bullet_id.into();
        if evidence_card_ids.is_empty() {
            return Err(ForgeError::UngroundedClaim { bullet_id });
        }
        Ok(Self {
            bullet_id,
            bullet_text: bullet_text.into(),
            evidence_card_ids,
        })
    }

    pub fn bullet_id(&self) -> &str {
        &self.bullet_id
    }

    pub fn bullet_text(&self) -> &str {
        &self.bullet_text
    }

    pub fn evidence_card_ids(&self) -> &[String] {
        &self.evidence_card_ids
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TruthViolation {
    pub bullet_id: String,
    #[serde(default)]
    pub bullet_text: String,
    pub violation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtsReport {
    pub keyword_coverage_score: f32,
    #[serde(default)]
    pub supported_keywords: Vec<String>,
    #[serde(default)]
    pub missing_keywords: Vec<String>,
    #[serde(default)]
    pub format_warnings: Vec<String>,
    pub role_signal_score: f32,
}

/// Outcome of the truth audit. `passed` always equals "no truth violations"; a
/// deserialized value that claims otherwise is corrected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawAuditReport")]
pub struct AuditReport {
    truth_violations: Vec<TruthViolation>,
    inconsistencies: Vec<String>,
    ats_suggestions: Vec<String>,
    passed: bool,
}

#[derive(Deserialize)]
struct RawAuditReport {
    #[serde(default)]
    truth_violations: Vec<TruthViolation>,
    #[serde(default)]
    inconsistencies: Vec<String>,
    #[serde(default)]
    ats_suggestions: Vec<String>,
    #[serde(default)]
    passed: Option<bool>,
}

impl From<RawAuditReport> for AuditReport {
    fn from(raw: RawAuditReport) -> Self {
        let report = AuditReport::new(raw.truth_violations, raw.inconsistencies, raw.ats_suggestions);
        if let Some(claimed) = raw.passed {
            if claimed != report.passed {
                warn!(
                    "Audit report claimed passed={} with {} truth violation(s); using {}",
                    claimed,
                    report.truth_violations.len(),
                    report.passed
                );
            }
        }
        report
    }
}

impl AuditReport {
    pub fn new(
        truth_violations: Vec<TruthViolation>,
        inconsistencies: Vec<String>,
        ats_suggestions: Vec<String>,
    ) -> Self {
        let passed = truth_violations.is_empty();
        Self {
            truth_violations,
            inconsistencies,
            ats_suggestions,
            passed,
        }
    }

    pub fn passing() -> Self {
        Self::new(Vec::new(), Vec::new(), Vec::new())
    }

    pub fn passed(&self) -> bool {
        self.passed
    }

    pub fn truth_violations(&self) -> &[TruthViolation] {
        &self.truth_violations
    }

    pub fn inconsistencies(&self) -> &[String] {
        &self.inconsistencies
    }

    pub fn ats_suggestions(&self) -> &[String] {
        &self.ats_suggestions
    }

    /// Advisory only; never changes `passed`.
    pub fn add_ats_suggestion(&mut self, suggestion: impl Into<String>) {
        let suggestion = suggestion.into();
        if !self.ats_suggestions.contains(&suggestion) {
            self.ats_suggestions.push(suggestion);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Free-text note emitted by the writer.
    Writer,
    /// Hard constraint produced by the revision action.
    RevisionDirective,
    /// Advisory ATS feedback carried into the next writing round.
    AtsSuggestion,
}

/// One change-log line, tagged with its kind and the revision round it belongs to.
/// Round 0 is the first writing pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub kind: ChangeKind,
    pub round: u32,
    pub text: String,
}

impl ChangeLogEntry {
    pub fn writer(round: u32, text: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::Writer,
            round,
            text: text.into(),
        }
    }

    pub fn directive(round: u32, text: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::RevisionDirective,
            round,
            text: text.into(),
        }
    }

    pub fn ats_suggestion(round: u32, text: impl Into<String>) -> Self {
        Self {
            kind: ChangeKind::AtsSuggestion,
            round,
            text: text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_mapping_rejects_empty_evidence() {
        let err = ClaimMapping::new("exp-1", "Led payroll migration", vec![]).unwrap_err();
        assert!(matches!(err, ForgeError::UngroundedClaim { ref bullet_id } if bullet_id == "exp-1"));

        let ok = ClaimMapping::new("exp-1", "Led payroll migration", vec!["ev-1".to_string()]);
        assert_eq!(ok.unwrap().evidence_card_ids(), ["ev-1".to_string()]);
    }

    #[test]
    fn test_claim_mapping_deserialization_enforces_evidence() {
        let empty = r#"{"bullet_id":"b1","bullet_text":"t","evidence_card_ids":[]}"#;
        assert!(serde_json::from_str::<ClaimMapping>(empty).is_err());

        let missing = r#"{"bullet_id":"b1","bullet_text":"t"}"#;
        assert!(serde_json::from_str::<ClaimMapping>(missing).is_err());

        let valid = r#"{"bullet_id":"b1","bullet_text":"t","evidence_card_ids":["ev-1"]}"#;
        let claim: ClaimMapping = serde_json::from_str(valid).unwrap();
        assert_eq!(claim.bullet_id(), "b1");
    }

    #[test]
    fn test_audit_report_passed_follows_violations() {
        let report = AuditReport::new(
            vec![TruthViolation {
                bullet_id: "b1".to_string(),
                bullet_text: String::new(),
                violation: "number not in evidence".to_string(),
            }],
            vec![],
            vec![],
        );
        assert!(!report.passed());

        let mut clean = AuditReport::passing();
        clean.add_ats_suggestion("Add keyword: Kubernetes");
        assert!(clean.passed());
    }

    #[test]
    fn test_audit_report_deserialization_recomputes_passed() {
        let lying = r#"{"truth_violations":[{"bullet_id":"b1","violation":"made up"}],"passed":true}"#;
        let report: AuditReport = serde_json::from_str(lying).unwrap();
        assert!(!report.passed());

        let empty: AuditReport = serde_json::from_str(r#"{"passed":false}"#).unwrap();
        assert!(empty.passed());
    }

    #[test]
    fn test_gap_enums_accept_legacy_spellings() {
        let gap: Gap = serde_json::from_str(
            r#"{"id":"g1","requirement_id":"r1","requirement_text":"SAP","kind":"terminology_gap","strategy":"adjacent_experience"}"#,
        )
        .unwrap();
        assert_eq!(gap.kind, GapKind::TerminologyGap);
        assert_eq!(gap.strategy, GapStrategy::UseAdjacentEvidence);
        assert!(!gap.user_confirmed);
    }

    #[test]
    fn test_confidence_ordering() {
        assert!(Confidence::Low < Confidence::Medium);
        assert!(Confidence::Medium < Confidence::High);
        assert_eq!("MEDIUM".parse::<Confidence>().unwrap(), Confidence::Medium);
    }

    #[test]
    fn test_weighted_keywords_dedupes_across_lists() {
        let profile = RoleProfile {
            inferred_level: "Director".to_string(),
            must_haves: vec!["Workday".to_string()],
            nice_to_haves: vec!["workday".to_string(), "SQL".to_string()],
            ..Default::default()
        };
        let keywords = profile.weighted_keywords();
        assert_eq!(keywords.len(), 2);
        assert_eq!(keywords[0], ("Workday".to_string(), 1.0));
        assert_eq!(keywords[1], ("SQL".to_string(), 0.3));
    }
}
