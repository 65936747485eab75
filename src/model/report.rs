use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::InvalidProject;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// CVSS v3 qualitative rating for a base score.
    pub fn from_cvss(score: f64) -> Self {
        match score {
            s if s >= 9.0 => Severity::Critical,
            s if s >= 7.0 => Severity::High,
            s if s >= 4.0 => Severity::Medium,
            s if s > 0.0 => Severity::Low,
            _ => Severity::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One advisory attached to a coordinate.
///
/// Field names follow the component-report wire format so the same type is
/// used for decoding responses and for cache entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vulnerability {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cvss_score: f64,
    #[serde(default)]
    pub cvss_vector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cve: Option<String>,
    #[serde(default)]
    pub reference: String,
    /// Set in memory by the ignore list, never persisted as `true`.
    #[serde(default)]
    pub excluded: bool,
}

impl Vulnerability {
    pub fn severity(&self) -> Severity {
        Severity::from_cvss(self.cvss_score)
    }

    /// Matches an ignore entry against the advisory id or its CVE.
    pub fn is_identified_by(&self, id: &str) -> bool {
        self.id.eq_ignore_ascii_case(id)
            || self
                .cve
                .as_deref()
                .is_some_and(|cve| cve.eq_ignore_ascii_case(id))
    }
}

/// Audit result for a single coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateReport {
    pub coordinates: String,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub vulnerabilities: Vec<Vulnerability>,
}

impl CoordinateReport {
    pub fn clean(coordinates: impl Into<String>) -> Self {
        Self {
            coordinates: coordinates.into(),
            reference: String::new(),
            vulnerabilities: Vec::new(),
        }
    }

    pub fn cache_key(&self) -> String {
        self.coordinates.to_lowercase()
    }

    pub fn active_vulnerabilities(&self) -> impl Iterator<Item = &Vulnerability> {
        self.vulnerabilities.iter().filter(|v| !v.excluded)
    }

    pub fn is_vulnerable(&self) -> bool {
        self.active_vulnerabilities().next().is_some()
    }

    pub fn max_severity(&self) -> Severity {
        self.active_vulnerabilities()
            .map(Vulnerability::severity)
            .max()
            .unwrap_or(Severity::None)
    }
}

/// A vulnerable coordinate with its non-vulnerable replacement, if one was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRecommendation {
    pub vulnerable: CoordinateReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<CoordinateReport>,
}

/// Everything an audit run produced, keyed by lowercase coordinate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub scan_time: DateTime<Utc>,
    pub total_input: usize,
    pub audited: BTreeMap<String, CoordinateReport>,
    pub invalid: Vec<InvalidProject>,
    pub vulnerable: BTreeMap<String, UpdateRecommendation>,
}

impl AuditReport {
    pub fn vulnerable_count(&self) -> usize {
        self.vulnerable.len()
    }

    pub fn excluded_count(&self) -> usize {
        self.audited
            .values()
            .flat_map(|r| r.vulnerabilities.iter())
            .filter(|v| v.excluded)
            .count()
    }

    pub fn max_severity(&self) -> Severity {
        self.vulnerable
            .values()
            .map(|r| r.vulnerable.max_severity())
            .max()
            .unwrap_or(Severity::None)
    }
}
