use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

/// Canonical term followed by the vocabulary that means the same thing.
const DEFAULT_GROUPS: &[(&str, &[&str])] = &[
    ("HCM", &["HRIS", "Human Capital Management", "HR Information Systems", "HRMS"]),
    ("AWS", &["Amazon Web Services"]),
    ("GCP", &["Google Cloud", "Google Cloud Platform"]),
    ("Azure", &["Microsoft Azure"]),
    ("Kubernetes", &["K8s", "k8s"]),
    ("CI/CD", &["Continuous Integration", "Continuous Delivery", "Continuous Deployment"]),
    ("Machine Learning", &["ML"]),
    ("Artificial Intelligence", &["AI"]),
    ("P&L", &["Profit and Loss", "P/L"]),
    ("ERP", &["Enterprise Resource Planning"]),
    ("CRM", &["Customer Relationship Management"]),
    ("SaaS", &["Software as a Service"]),
    ("KPI", &["Key Performance Indicator", "Key Performance Indicators"]),
    ("OKR", &["Objectives and Key Results"]),
    ("Stakeholder Management", &["Executive Communication", "Stakeholder Engagement"]),
    ("People Management", &["Team Leadership", "Line Management", "Direct Reports"]),
];

/// Fixed map from canonical terms to equivalent vocabulary.
///
/// Lookups are case-insensitive; a canonical term is equivalent to itself.
#[derive(Debug, Clone, Serialize)]
pub struct SynonymTable {
    groups: BTreeMap<String, Vec<String>>,
    #[serde(skip)]
    lookup: HashMap<String, String>,
}

impl Default for SynonymTable {
    fn default() -> Self {
        Self::from_groups(DEFAULT_GROUPS.iter().map(|(canonical, equivalents)| {
            (
                canonical.to_string(),
                equivalents.iter().map(|s| s.to_string()).collect(),
            )
        }))
    }
}

impl SynonymTable {
    pub fn from_groups(groups: impl IntoIterator<Item = (String, Vec<String>)>) -> Self {
        let mut table = Self {
            groups: BTreeMap::new(),
            lookup: HashMap::new(),
        };
        for (canonical, equivalents) in groups {
            table.lookup.insert(canonical.to_lowercase(), canonical.clone());
            for term in &equivalents {
                table
                    .lookup
                    .entry(term.to_lowercase())
                    .or_insert_with(|| canonical.clone());
            }
            table.groups.insert(canonical, equivalents);
        }
        table
    }

    /// Canonical form of `term`, if the table knows it.
    pub fn canonical(&self, term: &str) -> Option<&str> {
        self.lookup
            .get(&term.trim().to_lowercase())
            .map(String::as_str)
    }

    pub fn are_equivalent(&self, a: &str, b: &str) -> bool {
        if a.trim().eq_ignore_ascii_case(b.trim()) {
            return true;
        }
        matches!((self.canonical(a), self.canonical(b)), (Some(x), Some(y)) if x == y)
    }

    /// Every lowercased spelling equivalent to `term`, including `term` itself.
    pub fn expand(&self, term: &str) -> Vec<String> {
        let own = term.trim().to_lowercase();
        let mut out = vec![own.clone()];
        if let Some(canonical) = self.canonical(term) {
            let group = std::iter::once(canonical).chain(
                self.groups
                    .get(canonical)
                    .into_iter()
                    .flatten()
                    .map(String::as_str),
            );
            for spelling in group {
                let lowered = spelling.to_lowercase();
                if !out.contains(&lowered) {
                    out.push(lowered);
                }
            }
        }
        out
    }

    pub fn groups(&self) -> &BTreeMap<String, Vec<String>> {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
