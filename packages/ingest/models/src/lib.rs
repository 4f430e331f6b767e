#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Validation report, merge statistics and run summary types.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

/// Kind of problem found in an output record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IssueKind {
    /// A required field is absent or empty.
    MissingField,
    /// A coordinate is outside the valid global range.
    OutOfRange,
    /// A DMS string is malformed or names the wrong hemisphere.
    BadDmsFormat,
    /// A coordinate is valid but outside Taiwan.
    OutOfTaiwanBounds,
    /// The record repeats an earlier one.
    Duplicate,
}

impl IssueKind {
    /// Whether issues of this kind count as errors rather than warnings.
    #[must_use]
    pub const fn is_error(self) -> bool {
        matches!(
            self,
            Self::MissingField | Self::OutOfRange | Self::BadDmsFormat
        )
    }
}

/// One problem with one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// 1-based position of the record in the validated sequence.
    pub row: usize,
    /// What went wrong.
    pub kind: IssueKind,
    /// Field the issue concerns, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Human-readable detail.
    pub message: String,
}

/// Counts over the validated sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSummary {
    /// Records checked.
    pub total: usize,
    /// Records with no error.
    pub valid: usize,
    /// Records with at least one error.
    pub invalid: usize,
    /// Records flagged as duplicates.
    pub duplicate: usize,
}

/// Result of validating an output sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Per-record errors, in record order.
    pub errors: Vec<Issue>,
    /// Per-record warnings, in record order.
    pub warnings: Vec<Issue>,
    /// Summary counts.
    pub summary: ValidationSummary,
}

impl ValidationReport {
    /// Files `issue` under errors or warnings by its kind.
    pub fn push(&mut self, issue: Issue) {
        if issue.kind.is_error() {
            self.errors.push(issue);
        } else {
            self.warnings.push(issue);
        }
    }

    /// Whether any record has an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Number of issues of `kind`, errors and warnings together.
    #[must_use]
    pub fn count(&self, kind: IssueKind) -> usize {
        self.errors
            .iter()
            .chain(&self.warnings)
            .filter(|issue| issue.kind == kind)
            .count()
    }
}

/// Per-source contribution to the merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMergeStats {
    /// Source id.
    pub source_id: String,
    /// Records offered to the merge.
    pub offered: usize,
    /// Records kept.
    pub kept: usize,
    /// Records dropped as duplicates of an earlier record.
    pub duplicates: usize,
}

/// Merge totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    /// Records offered across all sources.
    pub input: usize,
    /// Records kept.
    pub kept: usize,
    /// Records dropped.
    pub duplicates: usize,
    /// Per-source counts in merge order.
    pub sources: Vec<SourceMergeStats>,
}

/// How a source run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SourceStatus {
    /// Completed; records may still have been skipped.
    Completed,
    /// Fetch or read failed; no records.
    Unavailable,
    /// Exceeded the per-source timeout; no records.
    TimedOut,
}

/// What one source contributed to a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOutcome {
    /// Source id.
    pub source_id: String,
    /// Source name.
    pub name: String,
    /// How the run ended.
    pub status: SourceStatus,
    /// Locations produced.
    pub records: usize,
    /// Records skipped with a warning.
    pub skipped: usize,
    /// Records converted under the TWD97 fallback.
    pub crs_fallbacks: usize,
    /// Cache outcome (`hit`, `miss`, ...) when the fetch got that far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<String>,
    /// Failure detail for unavailable or timed-out sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall time spent on the source.
    pub duration_ms: u64,
}

impl SourceOutcome {
    /// Whether the source produced a usable result.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self.status, SourceStatus::Completed)
    }
}

/// Everything a pipeline run produced, for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Per-source outcomes in configuration order.
    pub sources: Vec<SourceOutcome>,
    /// Merge totals.
    pub merge: MergeStats,
    /// Validation of the merged sequence.
    pub report: ValidationReport,
    /// Where the output artifact was written.
    pub output: PathBuf,
}

impl RunSummary {
    /// Sources that contributed nothing because they failed.
    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceOutcome> {
        self.sources.iter().filter(|s| !s.is_completed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(row: usize, kind: IssueKind) -> Issue {
        Issue {
            row,
            kind,
            field: None,
            message: String::new(),
        }
    }

    #[test]
    fn push_routes_by_kind() {
        let mut report = ValidationReport::default();
        report.push(issue(1, IssueKind::MissingField));
        report.push(issue(2, IssueKind::OutOfTaiwanBounds));
        report.push(issue(3, IssueKind::Duplicate));
        report.push(issue(4, IssueKind::BadDmsFormat));

        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.warnings.len(), 2);
        assert!(report.has_errors());
        assert_eq!(report.count(IssueKind::Duplicate), 1);
    }

    #[test]
    fn report_serializes_snake_case_kinds() {
        let mut report = ValidationReport::default();
        report.push(issue(7, IssueKind::OutOfTaiwanBounds));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["warnings"][0]["kind"], "out_of_taiwan_bounds");
        assert_eq!(json["warnings"][0]["row"], 7);
        assert!(json["warnings"][0].get("field").is_none());
    }
}
