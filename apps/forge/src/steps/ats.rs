//! ATS scoring: how well the draft would fare in an applicant tracking system.
//!
//! `KeywordAtsScorer` is pure Rust, fast and deterministic. Coverage is weighted by where a
//! keyword came from in the role profile (must-have 1.0, cluster 0.6, nice-to-have 0.3).

use async_trait::async_trait;

use super::StepFailure;
use crate::blackboard::{AtsReport, Blackboard, ResumeDraft, RoleProfile};
use crate::evidence::SynonymTable;

/// Section names every ATS parser recognises.
const STANDARD_SECTIONS: &[&str] = &[
    "summary",
    "professional summary",
    "profile",
    "experience",
    "professional experience",
    "work experience",
    "skills",
    "technical skills",
    "core competencies",
    "education",
    "certifications",
    "projects",
    "publications",
    "leadership",
    "awards",
    "volunteer experience",
];

#[async_trait]
pub trait AtsScorer: Send + Sync {
    async fn score(&self, board: &Blackboard) -> Result<AtsReport, StepFailure>;
}

pub struct KeywordAtsScorer;

#[async_trait]
impl AtsScorer for KeywordAtsScorer {
    async fn score(&self, board: &Blackboard) -> Result<AtsReport, StepFailure> {
        let draft = board
            .resume_draft
            .as_ref()
            .ok_or_else(|| StepFailure::fatal("ats", "no resume draft to score"))?;
        let profile = board
            .role_profile
            .as_ref()
            .ok_or_else(|| StepFailure::fatal("ats", "no role profile to score against"))?;
        Ok(compute_ats_report(draft, profile, board.synonyms()))
    }
}

pub fn compute_ats_report(
    draft: &ResumeDraft,
    profile: &RoleProfile,
    synonyms: &SynonymTable,
) -> AtsReport {
    let text = draft.full_text().to_lowercase();
    let keywords = profile.weighted_keywords();

    let mut supported = Vec::new();
    let mut missing = Vec::new();
    let mut total_weight = 0.0_f32;
    let mut covered_weight = 0.0_f32;

    for (keyword, weight) in &keywords {
        total_weight += weight;
        let present = synonyms
            .expand(keyword)
            .iter()
            .any(|spelling| text.contains(spelling.as_str()));
        if present {
            covered_weight += weight;
            supported.push(keyword.clone());
        } else {
            missing.push(keyword.clone());
        }
    }

    let keyword_coverage_score = if total_weight > 0.0 {
        ((covered_weight / total_weight) * 100.0).round()
    } else {
        0.0
    };

    let role_signal_score = if profile.seniority_signals.is_empty() {
        100.0
    } else {
        let hits = profile
            .seniority_signals
            .iter()
            .filter(|s| text.contains(&s.to_lowercase()))
            .count();
        ((hits as f32 / profile.seniority_signals.len() as f32) * 100.0).round()
    };

    AtsReport {
        keyword_coverage_score,
        supported_keywords: supported,
        missing_keywords: missing,
        format_warnings: format_warnings(draft),
        role_signal_score,
    }
}

fn format_warnings(draft: &ResumeDraft) -> Vec<String> {
    let mut warnings = Vec::new();

    for section in &draft.sections {
        let name = section.name.trim().to_lowercase();
        if !STANDARD_SECTIONS.contains(&name.as_str()) {
            warnings.push(format!("Non-standard section name: {}", section.name));
        }

        let content = section.content.to_lowercase();
        if section.content.lines().any(|l| l.trim_start().starts_with('|')) || content.contains("<table")
        {
            warnings.push(format!("Table layout in {} section", section.name));
        }
        if content.contains("![") || content.contains("<img") {
            warnings.push(format!("Image in {} section", section.name));
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blackboard::ResumeSection;
    use crate::testing::{role_profile, written_board};

    fn draft(sections: &[(&str, &str)]) -> ResumeDraft {
        ResumeDraft {
            sections: sections
                .iter()
                .map(|(name, content)| ResumeSection {
                    name: name.to_string(),
                    content: content.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_full_coverage_scores_100() {
        let report = compute_ats_report(
            &draft(&[("Experience", "Workday HRIS rollout with SQL and HCM, cross-functional")]),
            &role_profile(),
            &SynonymTable::default(),
        );
        assert_eq!(report.keyword_coverage_score, 100.0);
        assert!(report.missing_keywords.is_empty());
        assert_eq!(report.role_signal_score, 100.0);
        assert!(report.format_warnings.is_empty());
    }

    #[test]
    fn test_coverage_is_weighted_by_source() {
        // Workday (1.0) and HCM (0.6) present; HRIS is matched through its HCM synonym;
        // SQL (0.3) missing.
        let report = compute_ats_report(
            &draft(&[("Experience", "Led the Workday HCM migration")]),
            &role_profile(),
            &SynonymTable::default(),
        );
        assert_eq!(report.missing_keywords, vec!["SQL".to_string()]);
        // 2.6 of 2.9
        assert_eq!(report.keyword_coverage_score, 90.0);
        assert_eq!(report.role_signal_score, 0.0);
    }

    #[test]
    fn test_format_warnings_flag_tables_images_and_odd_sections() {
        let report = compute_ats_report(
            &draft(&[
                ("Experience", "| Year | Role |\n|---|---|"),
                ("My Journey", "![headshot](me.png)"),
            ]),
            &role_profile(),
            &SynonymTable::default(),
        );
        assert_eq!(report.format_warnings.len(), 3);
        assert!(report.format_warnings.iter().any(|w| w.contains("My Journey")));
    }

    #[tokio::test]
    async fn test_scorer_reads_board() {
        let board = written_board();
        let report = KeywordAtsScorer.score(&board).await.unwrap();
        assert!(report.supported_keywords.contains(&"Workday".to_string()));
    }
}
