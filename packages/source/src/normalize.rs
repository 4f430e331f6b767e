//! Candidate normalization: CRS resolution, projection to WGS84 and DMS
//! rendering.

use parking_map_parking_models::report::ReportSink;
use parking_map_parking_models::{Axis, ParkingLocation};
use parking_map_spatial::{CrsDetection, DetectionMethod, detect_crs, to_dms, to_wgs84};

use crate::Candidate;

/// Counts from one normalization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    /// Candidates dropped because their coordinates could not be converted.
    pub skipped: usize,
    /// Candidates converted under the TWD97 fallback assumption.
    pub crs_fallbacks: usize,
}

/// Converts candidates to [`ParkingLocation`]s in input order.
///
/// A candidate's own CRS hint wins; otherwise the CRS is detected from its
/// coordinate range. Fallbacks are summarized in a single warning rather
/// than one per record.
#[must_use]
pub fn normalize(
    source_id: &str,
    candidates: &[Candidate],
    sink: &dyn ReportSink,
) -> (Vec<ParkingLocation>, NormalizeStats) {
    let mut stats = NormalizeStats::default();
    let mut locations = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let detection = candidate.crs_hint.map_or_else(
            || detect_crs(None, (candidate.x, candidate.y)),
            |crs| CrsDetection {
                crs,
                method: DetectionMethod::Configured,
            },
        );
        if detection.is_fallback() {
            stats.crs_fallbacks += 1;
        }

        match to_wgs84(candidate.x, candidate.y, detection.crs) {
            Ok((lon, lat)) => locations.push(ParkingLocation {
                city: candidate.city.clone(),
                area: candidate.area.clone(),
                road: candidate.road.clone(),
                dd_lat: lat,
                dd_long: lon,
                dms_lat: to_dms(lat, Axis::Latitude),
                dms_long: to_dms(lon, Axis::Longitude),
            }),
            Err(e) => {
                stats.skipped += 1;
                sink.warn(
                    source_id,
                    &format!("Skipping record {}: {e}", candidate.index),
                );
            }
        }
    }

    if stats.crs_fallbacks > 0 {
        sink.warn(
            source_id,
            &format!(
                "{} of {} records matched no known coordinate range; assumed TWD97",
                stats.crs_fallbacks,
                candidates.len()
            ),
        );
    }

    (locations, stats)
}

#[cfg(test)]
mod tests {
    use parking_map_parking_models::report::{MemorySink, Severity};
    use parking_map_spatial::Crs;

    use super::*;

    fn candidate(index: usize, x: f64, y: f64, crs_hint: Option<Crs>) -> Candidate {
        Candidate {
            index,
            x,
            y,
            crs_hint,
            city: "臺北市".to_string(),
            area: "信義區".to_string(),
            road: "市府路".to_string(),
        }
    }

    #[test]
    fn twd97_candidate_is_projected() {
        let sink = MemorySink::new();
        let (locations, stats) = normalize(
            "src",
            &[candidate(0, 302_000.0, 2_600_000.0, Some(Crs::Twd97))],
            &sink,
        );
        assert_eq!(stats, NormalizeStats::default());
        let location = &locations[0];
        assert!((location.dd_long - 121.509_155).abs() < 1e-5);
        assert!((location.dd_lat - 23.502_316).abs() < 1e-5);
        assert!(location.dms_lat.ends_with('N'));
        assert!(location.dms_long.ends_with('E'));
        assert_eq!(location.city, "臺北市");
    }

    #[test]
    fn wgs84_candidate_passes_through() {
        let sink = MemorySink::new();
        let (locations, _) = normalize("src", &[candidate(0, 121.565, 25.033, None)], &sink);
        assert!((locations[0].dd_lat - 25.033).abs() < f64::EPSILON);
        assert!((locations[0].dd_long - 121.565).abs() < f64::EPSILON);
        assert_eq!(locations[0].dms_lat, "25°01'58.80\"N");
        assert_eq!(locations[0].dms_long, "121°33'54.00\"E");
    }

    #[test]
    fn fallbacks_produce_one_warning() {
        let sink = MemorySink::new();
        let candidates = [
            candidate(0, 5_000_000.0, 5_000_000.0, None),
            candidate(1, 6_000_000.0, 6_000_000.0, None),
            candidate(2, 121.5, 25.0, None),
        ];
        let (_, stats) = normalize("src", &candidates, &sink);
        assert_eq!(stats.crs_fallbacks, 2);
        let warnings = sink.with_severity(Severity::Warning);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.starts_with("2 of 3"));
    }

    #[test]
    fn non_finite_coordinates_are_skipped() {
        let sink = MemorySink::new();
        let candidates = [
            candidate(0, f64::NAN, 25.0, Some(Crs::Wgs84)),
            candidate(1, 121.5, 25.0, Some(Crs::Wgs84)),
        ];
        let (locations, stats) = normalize("src", &candidates, &sink);
        assert_eq!(locations.len(), 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(sink.with_severity(Severity::Warning).len(), 1);
    }
}
