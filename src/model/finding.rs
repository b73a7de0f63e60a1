use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Ecosystem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Maps a CVSS base score (and, failing that, a CVSS vector) onto a
    /// severity bucket.
    pub fn from_cvss(score: Option<f64>, vector: Option<&str>) -> Self {
        if let Some(score) = score {
            let severity = match score {
                s if s >= 9.0 => Severity::Critical,
                s if s >= 7.0 => Severity::High,
                s if s >= 4.0 => Severity::Medium,
                s if s > 0.0 => Severity::Low,
                _ => Severity::Unknown,
            };
            if severity != Severity::Unknown {
                return severity;
            }
        }

        match vector {
            // Rough estimate from the impact metrics of a vector such as
            // "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H"
            Some(v) if v.contains("CVSS:") => {
                if v.contains("/C:H") || v.contains("/I:H") || v.contains("/A:H") {
                    Severity::High
                } else if v.contains("/C:L") || v.contains("/I:L") || v.contains("/A:L") {
                    Severity::Medium
                } else {
                    Severity::Low
                }
            }
            _ => Severity::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_str().to_uppercase())
    }
}

/// One component report returned by the vulnerability API.
///
/// Known fields are typed; everything else the API sends is kept in
/// `extra` so the record round-trips unchanged to the caller.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    #[serde(default)]
    pub coordinates: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default)]
    pub vulnerabilities: Vec<VulnerabilityDetail>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Finding {
    /// Highest severity among this component's vulnerabilities.
    pub fn max_severity(&self) -> Option<Severity> {
        self.vulnerabilities.iter().map(|v| v.severity()).max()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VulnerabilityDetail {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cvss_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cvss_vector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cve: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VulnerabilityDetail {
    pub fn severity(&self) -> Severity {
        Severity::from_cvss(self.cvss_score, self.cvss_vector.as_deref())
    }

    /// CVE id when known, otherwise the display name or raw id.
    pub fn label(&self) -> &str {
        self.cve
            .as_deref()
            .or(self.display_name.as_deref())
            .unwrap_or(&self.id)
    }
}

/// Error marker standing in for a failed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchError {
    pub error: String,
    #[serde(rename = "httpStatus", default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
}

/// Outcome of a single batch query: findings or an error, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryEnvelope {
    Findings(Vec<Finding>),
    Failed(BatchError),
}

impl QueryEnvelope {
    pub fn status(status: u16) -> Self {
        QueryEnvelope::Failed(BatchError {
            error: format!("Received response code {}", status),
            http_status: Some(status),
        })
    }

    pub fn transport(cause: impl std::fmt::Display) -> Self {
        QueryEnvelope::Failed(BatchError {
            error: format!("Error checking vulnerabilities: {}", cause),
            http_status: None,
        })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, QueryEnvelope::Failed(_))
    }

    /// Number of entries this envelope adds to a merged list.
    pub fn contribution(&self) -> usize {
        match self {
            QueryEnvelope::Findings(findings) => findings.len(),
            QueryEnvelope::Failed(_) => 1,
        }
    }
}

/// An element of the merged result list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReportEntry {
    Finding(Finding),
    Error(BatchError),
}

/// The answer to one scan request.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub root: String,
    pub ecosystem: Ecosystem,
    pub coordinate_count: usize,
    pub batch_count: usize,
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<ReportEntry>,
}

impl Report {
    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.entries.iter().filter_map(|entry| match entry {
            ReportEntry::Finding(finding) => Some(finding),
            ReportEntry::Error(_) => None,
        })
    }

    pub fn errors(&self) -> impl Iterator<Item = &BatchError> {
        self.entries.iter().filter_map(|entry| match entry {
            ReportEntry::Error(error) => Some(error),
            ReportEntry::Finding(_) => None,
        })
    }

    /// Components that have at least one known vulnerability.
    pub fn vulnerable(&self) -> impl Iterator<Item = &Finding> {
        self.findings().filter(|f| !f.vulnerabilities.is_empty())
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.findings().filter_map(Finding::max_severity).max()
    }
}
