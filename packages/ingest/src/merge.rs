//! Cross-source merge and deduplication.
//!
//! Two locations are duplicates when both coordinates agree after rounding
//! to the configured number of decimal places. Batches are merged in the
//! order given (configuration order) and the first-seen location wins, so
//! the output keeps source order and, within a source, fetch order.

use std::collections::HashSet;

use parking_map_ingest_models::{MergeStats, SourceMergeStats};
use parking_map_parking_models::ParkingLocation;
use parking_map_parking_models::report::ReportSink;

/// Rounded `(lat, lon)` identity used for duplicate detection.
pub type CoordinateKey = (i64, i64);

/// Rounds a coordinate pair to `precision` decimal places.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub fn coordinate_key(lat: f64, lon: f64, precision: u32) -> CoordinateKey {
    let scale = 10_f64.powi(precision.min(15) as i32);
    ((lat * scale).round() as i64, (lon * scale).round() as i64)
}

/// Merges per-source batches into one deduplicated sequence.
///
/// Each duplicate is logged at debug level; a per-source warning reports
/// how many were dropped.
#[must_use]
pub fn merge(
    batches: Vec<(String, Vec<ParkingLocation>)>,
    precision: u32,
    sink: &dyn ReportSink,
) -> (Vec<ParkingLocation>, MergeStats) {
    let mut seen: HashSet<CoordinateKey> = HashSet::new();
    let mut merged = Vec::new();
    let mut stats = MergeStats::default();

    for (source_id, locations) in batches {
        let mut source_stats = SourceMergeStats {
            source_id,
            offered: locations.len(),
            kept: 0,
            duplicates: 0,
        };

        for location in locations {
            let key = coordinate_key(location.dd_lat, location.dd_long, precision);
            if seen.insert(key) {
                source_stats.kept += 1;
                merged.push(location);
            } else {
                source_stats.duplicates += 1;
                log::debug!(
                    "[{}] Dropping duplicate at ({:.5}, {:.5}): {} {}",
                    source_stats.source_id,
                    location.dd_lat,
                    location.dd_long,
                    location.area,
                    location.road
                );
            }
        }

        if source_stats.duplicates > 0 {
            sink.warn(
                &source_stats.source_id,
                &format!(
                    "Dropped {} duplicate locations already present from earlier records",
                    source_stats.duplicates
                ),
            );
        }

        stats.input += source_stats.offered;
        stats.kept += source_stats.kept;
        stats.duplicates += source_stats.duplicates;
        stats.sources.push(source_stats);
    }

    sink.info(
        "merge",
        &format!(
            "{} locations merged into {} ({} duplicates dropped)",
            stats.input, stats.kept, stats.duplicates
        ),
    );

    (merged, stats)
}
