//! Output schema validation.
//!
//! Validation never fails: every problem becomes an [`Issue`] in the
//! returned [`ValidationReport`]. Missing required fields, coordinates
//! outside the globe and malformed DMS strings are errors; coordinates
//! outside Taiwan and repeated coordinates are warnings.

use std::collections::HashSet;
use std::sync::LazyLock;

use parking_map_ingest_models::{Issue, IssueKind, ValidationReport};
use parking_map_parking_models::report::ReportSink;
use parking_map_parking_models::{Axis, LocationRow, ParkingLocation};
use regex::Regex;

use crate::merge::{CoordinateKey, coordinate_key};

/// Latitude range considered "inside Taiwan", outlying islands included.
pub const TAIWAN_LAT: (f64, f64) = (21.5, 25.5);

/// Longitude range considered "inside Taiwan", outlying islands included.
pub const TAIWAN_LON: (f64, f64) = (119.5, 122.5);

/// Largest accepted gap between a DMS string and its decimal column.
const DMS_TOLERANCE: f64 = 1e-4;

static DMS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[0-9]{1,3}°[0-9]{2}'[0-9]{2}\.[0-9]{2}"[NSEW]$"#)
        .unwrap_or_else(|_| unreachable!())
});

const SCOPE: &str = "validate";

/// Validates output rows. `precision` is the merge precision used to
/// recognise duplicates.
#[must_use]
pub fn validate(rows: &[LocationRow], precision: u32, sink: &dyn ReportSink) -> ValidationReport {
    let mut report = ValidationReport::default();
    let mut seen: HashSet<CoordinateKey> = HashSet::new();

    for (i, row) in rows.iter().enumerate() {
        let issues = check_row(i + 1, row, precision, &mut seen);

        if issues.iter().any(|issue| issue.kind.is_error()) {
            report.summary.invalid += 1;
        }
        if issues.iter().any(|issue| issue.kind == IssueKind::Duplicate) {
            report.summary.duplicate += 1;
        }
        for issue in issues {
            sink.debug(SCOPE, &format!("Row {}: {}", issue.row, issue.message));
            report.push(issue);
        }
    }

    report.summary.total = rows.len();
    report.summary.valid = report.summary.total - report.summary.invalid;

    let summary = report.summary;
    let message = format!(
        "{} rows: {} valid, {} invalid, {} duplicates, {} warnings",
        summary.total,
        summary.valid,
        summary.invalid,
        summary.duplicate,
        report.warnings.len()
    );
    if report.has_errors() {
        sink.error(
            SCOPE,
            &format!("{message}; {} errors found", report.errors.len()),
        );
        for issue in report.errors.iter().take(10) {
            sink.warn(SCOPE, &format!("Row {}: {}", issue.row, issue.message));
        }
    } else {
        sink.info(SCOPE, &message);
    }

    report
}

/// Validates freshly merged locations.
#[must_use]
pub fn validate_locations(
    locations: &[ParkingLocation],
    precision: u32,
    sink: &dyn ReportSink,
) -> ValidationReport {
    let rows: Vec<LocationRow> = locations.iter().map(LocationRow::from).collect();
    validate(&rows, precision, sink)
}

fn issue(row: usize, kind: IssueKind, field: &str, message: String) -> Issue {
    Issue {
        row,
        kind,
        field: Some(field.to_string()),
        message,
    }
}

fn check_row(
    row: usize,
    record: &LocationRow,
    precision: u32,
    seen: &mut HashSet<CoordinateKey>,
) -> Vec<Issue> {
    let mut issues = Vec::new();

    if record.city.as_deref().is_none_or(|c| c.trim().is_empty()) {
        issues.push(issue(
            row,
            IssueKind::MissingField,
            "city",
            "city is empty".to_string(),
        ));
    }

    let lat = check_degrees(row, "dd_lat", record.dd_lat, 90.0, &mut issues);
    let lon = check_degrees(row, "dd_long", record.dd_long, 180.0, &mut issues);

    check_dms(
        row,
        "dms_lat",
        record.dms_lat.as_deref(),
        Axis::Latitude,
        lat,
        &mut issues,
    );
    check_dms(
        row,
        "dms_long",
        record.dms_long.as_deref(),
        Axis::Longitude,
        lon,
        &mut issues,
    );

    if let (Some(lat), Some(lon)) = (lat, lon) {
        let in_taiwan = (TAIWAN_LAT.0..=TAIWAN_LAT.1).contains(&lat)
            && (TAIWAN_LON.0..=TAIWAN_LON.1).contains(&lon);
        if !in_taiwan {
            issues.push(Issue {
                row,
                kind: IssueKind::OutOfTaiwanBounds,
                field: None,
                message: format!("({lat}, {lon}) is outside Taiwan"),
            });
        }

        if !seen.insert(coordinate_key(lat, lon, precision)) {
            issues.push(Issue {
                row,
                kind: IssueKind::Duplicate,
                field: None,
                message: format!("({lat}, {lon}) repeats an earlier row"),
            });
        }
    }

    issues
}

/// Returns the value when it is present and within `±limit`.
fn check_degrees(
    row: usize,
    field: &str,
    value: Option<f64>,
    limit: f64,
    issues: &mut Vec<Issue>,
) -> Option<f64> {
    let Some(value) = value else {
        issues.push(issue(
            row,
            IssueKind::MissingField,
            field,
            format!("{field} is missing or not a number"),
        ));
        return None;
    };

    if !value.is_finite() || !(-limit..=limit).contains(&value) {
        issues.push(issue(
            row,
            IssueKind::OutOfRange,
            field,
            format!("{field} {value} is outside [-{limit}, {limit}]"),
        ));
        return None;
    }

    Some(value)
}

fn check_dms(
    row: usize,
    field: &str,
    value: Option<&str>,
    axis: Axis,
    decimal: Option<f64>,
    issues: &mut Vec<Issue>,
) {
    let Some(text) = value.map(str::trim).filter(|t| !t.is_empty()) else {
        issues.push(issue(
            row,
            IssueKind::MissingField,
            field,
            format!("{field} is empty"),
        ));
        return;
    };

    let parsed = if DMS_PATTERN.is_match(text) {
        parking_map_spatial::parse_dms(text, axis).ok()
    } else {
        None
    };

    let Some(parsed) = parsed else {
        issues.push(issue(
            row,
            IssueKind::BadDmsFormat,
            field,
            format!("{field} '{text}' is not a valid {axis} in DD°MM'SS.SS\"X form"),
        ));
        return;
    };

    if let Some(decimal) = decimal
        && (parsed - decimal).abs() > DMS_TOLERANCE
    {
        issues.push(issue(
            row,
            IssueKind::BadDmsFormat,
            field,
            format!("{field} '{text}' does not match decimal value {decimal}"),
        ));
    }
}
