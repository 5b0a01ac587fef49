/// Evidence records: the only permissible source of resume claims.
///
/// Records are produced once by the offline parsing step, validated on load, and never
/// mutated for the lifetime of a run.
use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::ForgeError;

pub mod source;
pub mod synonyms;

pub use source::{EvidenceSource, JsonFileEvidenceSource};
pub use synonyms::SynonymTable;

/// "2019-2023" (ASCII hyphen or en dash, optional whitespace).
static YEAR_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})\s*[-–]\s*(\d{4})$").expect("year range pattern is valid")
});

/// "2019-03 to 2021-11".
static MONTH_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})-(\d{2})\s+to\s+(\d{4})-(\d{2})$").expect("month range pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEntry {
    pub value: String,
    pub description: String,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeInfo {
    #[serde(default)]
    pub team_size: Option<u32>,
    #[serde(default)]
    pub direct_reports: Option<u32>,
    #[serde(default)]
    pub geography: Vec<String>,
    #[serde(default)]
    pub budget: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub id: String,
    pub project: String,
    pub company: String,
    pub timeframe: String,
    pub role: String,
    #[serde(default)]
    pub scope: ScopeInfo,
    #[serde(default)]
    pub metrics: Vec<MetricEntry>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub leadership_signals: Vec<String>,
    pub raw_text: String,
}

/// A parsed time range. Year-only bounds carry `month: None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeframe {
    pub start_year: u16,
    pub start_month: Option<u8>,
    pub end_year: u16,
    pub end_month: Option<u8>,
}

impl Timeframe {
    pub fn parse(text: &str) -> Result<Self, String> {
        let text = text.trim();

        if let Some(caps) = YEAR_RANGE.captures(text) {
            let tf = Timeframe {
                start_year: parse_number(&caps[1])?,
                start_month: None,
                end_year: parse_number(&caps[2])?,
                end_month: None,
            };
            return tf.check_order(text);
        }

        if let Some(caps) = MONTH_RANGE.captures(text) {
            let start_month: u8 = parse_number(&caps[2])?;
            let end_month: u8 = parse_number(&caps[4])?;
            for month in [start_month, end_month] {
                if !(1..=12).contains(&month) {
                    return Err(format!("timeframe '{text}' has month {month:02} outside 01-12"));
                }
            }
            let tf = Timeframe {
                start_year: parse_number(&caps[1])?,
                start_month: Some(start_month),
                end_year: parse_number(&caps[3])?,
                end_month: Some(end_month),
            };
            return tf.check_order(text);
        }

        Err(format!(
            "timeframe '{text}' must look like 'YYYY-YYYY' or 'YYYY-MM to YYYY-MM'"
        ))
    }

    fn check_order(self, text: &str) -> Result<Self, String> {
        let start = (self.start_year, self.start_month.unwrap_or(1));
        let end = (self.end_year, self.end_month.unwrap_or(12));
        if start > end {
            return Err(format!("timeframe '{text}' starts after it ends"));
        }
        Ok(self)
    }
}

fn parse_number<T: std::str::FromStr>(digits: &str) -> Result<T, String> {
    digits
        .parse::<T>()
        .map_err(|_| format!("'{digits}' is not a number"))
}

impl EvidenceRecord {
    /// Returns every invariant this record breaks. Empty means valid.
    pub fn violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        let label = if self.id.trim().is_empty() {
            "<missing id>"
        } else {
            self.id.as_str()
        };

        let required = [
            ("id", &self.id),
            ("project", &self.project),
            ("company", &self.company),
            ("role", &self.role),
            ("raw_text", &self.raw_text),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                violations.push(format!("record {label}: {field} is empty"));
            }
        }

        if let Err(reason) = Timeframe::parse(&self.timeframe) {
            violations.push(format!("record {label}: {reason}"));
        }

        violations
    }

    /// Lowercased text of the fields a reader sees first: project, role, skills and metric
    /// descriptions.
    pub fn prominent_text(&self) -> String {
        let mut parts: Vec<&str> = vec![&self.project, &self.role];
        parts.extend(self.skills.iter().map(String::as_str));
        parts.extend(self.metrics.iter().map(|m| m.description.as_str()));
        parts.join(" | ").to_lowercase()
    }

    /// Lowercased text of everything else: raw source text, leadership signals, metric
    /// context and scope.
    pub fn background_text(&self) -> String {
        let mut parts: Vec<&str> = vec![&self.raw_text];
        parts.extend(self.leadership_signals.iter().map(String::as_str));
        parts.extend(self.metrics.iter().filter_map(|m| m.context.as_deref()));
        parts.extend(self.scope.geography.iter().map(String::as_str));
        if let Some(budget) = &self.scope.budget {
            parts.push(budget);
        }
        parts.join(" | ").to_lowercase()
    }

    /// All text a quoted figure may legitimately come from.
    pub fn factual_text(&self) -> String {
        let mut text = self.raw_text.clone();
        for metric in &self.metrics {
            text.push(' ');
            text.push_str(&metric.value);
            text.push(' ');
            text.push_str(&metric.description);
            if let Some(context) = &metric.context {
                text.push(' ');
                text.push_str(context);
            }
        }
        if let Some(size) = self.scope.team_size {
            text.push_str(&format!(" {size}"));
        }
        if let Some(reports) = self.scope.direct_reports {
            text.push_str(&format!(" {reports}"));
        }
        if let Some(budget) = &self.scope.budget {
            text.push(' ');
            text.push_str(budget);
        }
        text.push(' ');
        text.push_str(&self.timeframe);
        text
    }
}

/// Immutable, validated collection of evidence records with lookup by id.
#[derive(Debug, Clone, Default)]
pub struct EvidenceStore {
    records: Vec<EvidenceRecord>,
    index: HashMap<String, usize>,
}

impl EvidenceStore {
    /// Validates every record and collects all violations before failing.
    pub fn from_records(records: Vec<EvidenceRecord>) -> Result<Self, ForgeError> {
        let mut violations = Vec::new();
        let mut index = HashMap::with_capacity(records.len());

        for (position, record) in records.iter().enumerate() {
            violations.extend(record.violations());
            if record.id.trim().is_empty() {
                continue;
            }
            if index.insert(record.id.clone(), position).is_some() {
                violations.push(format!("record {}: duplicate id", record.id));
            }
        }

        if !violations.is_empty() {
            return Err(ForgeError::InvalidEvidence { violations });
        }

        Ok(Self { records, index })
    }

    pub fn get(&self, id: &str) -> Option<&EvidenceRecord> {
        self.index.get(id).map(|&i| &self.records[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn records(&self) -> &[EvidenceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::record;

    #[test]
    fn test_timeframe_accepts_both_shapes() {
        let years = Timeframe::parse("2019-2023").unwrap();
        assert_eq!(years.start_year, 2019);
        assert_eq!(years.end_month, None);

        let months = Timeframe::parse("2020-03 to 2021-11").unwrap();
        assert_eq!(months.start_month, Some(3));
        assert_eq!(months.end_year, 2021);

        assert!(Timeframe::parse("2019 – 2020").is_ok());
    }

    #[test]
    fn test_timeframe_rejects_bad_shapes() {
        assert!(Timeframe::parse("2019").is_err());
        assert!(Timeframe::parse("March 2019 - June 2020").is_err());
        assert!(Timeframe::parse("2019-13 to 2020-01").is_err());
        assert!(Timeframe::parse("2022-2019").is_err());
        assert!(Timeframe::parse("2021-06 to 2021-02").is_err());
    }

    #[test]
    fn test_store_lookup_by_id() {
        let store = EvidenceStore::from_records(vec![
            record("ev-1", "Payroll migration", &["Workday"]),
            record("ev-2", "Data platform", &["AWS"]),
        ])
        .unwrap();

        assert_eq!(store.len(), 2);
        assert!(store.contains("ev-2"));
        assert!(!store.contains("x"));
        assert_eq!(store.get("ev-1").unwrap().project, "Payroll migration");
    }

    #[test]
    fn test_store_aggregates_every_violation() {
        let mut bad_time = record("ev-2", "Data platform", &[]);
        bad_time.timeframe = "sometime".to_string();
        let mut empty_company = record("ev-3", "Hiring", &[]);
        empty_company.company = String::new();

        let err = EvidenceStore::from_records(vec![
            record("ev-1", "Payroll", &[]),
            record("ev-1", "Payroll again", &[]),
            bad_time,
            empty_company,
        ])
        .unwrap_err();

        let violations = err.violations();
        assert_eq!(violations.len(), 3);
        assert!(violations.iter().any(|v| v.contains("duplicate id")));
        assert!(violations.iter().any(|v| v.contains("ev-2")));
        assert!(violations.iter().any(|v| v.contains("company is empty")));
    }

    #[test]
    fn test_background_text_excludes_prominent_fields() {
        let mut rec = record("ev-1", "Payroll migration", &["Workday"]);
        rec.raw_text = "Quietly rebuilt the vendor scorecard".to_string();

        assert!(rec.prominent_text().contains("workday"));
        assert!(!rec.prominent_text().contains("scorecard"));
        assert!(rec.background_text().contains("scorecard"));
    }
}
