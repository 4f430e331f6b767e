#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Coordinate handling for the parking pipeline.
//!
//! Converts raw source coordinates into WGS84: detects whether a point is
//! TWD97 (EPSG:3826) or WGS84 (EPSG:4326), projects TWD97 TM2 easting and
//! northing back to longitude/latitude, renders degrees as DMS strings, and
//! reduces polygon geometries to a single representative point.
//!
//! Coordinates are always ordered `(x, y)`: easting/longitude first,
//! northing/latitude second.

pub mod crs;
pub mod dms;
pub mod reduce;
pub mod twd97;

pub use crs::{
    Crs, CrsDetection, DetectionMethod, classify_by_range, detect_crs, parse_declared_crs,
    resolve_crs,
};
pub use dms::{parse_dms, to_dms};
pub use reduce::reduce;

/// Errors produced by coordinate conversion and geometry reduction.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// The geometry kind cannot be reduced to a point.
    #[error("Unsupported geometry: {0}")]
    UnsupportedGeometry(String),

    /// A polygon with zero area or no coordinates has no centroid.
    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// A DMS string could not be parsed.
    #[error("Invalid DMS string '{0}'")]
    InvalidDms(String),

    /// Coordinates are not finite numbers.
    #[error("Non-finite coordinate ({x}, {y})")]
    NonFinite {
        /// X / easting / longitude.
        x: f64,
        /// Y / northing / latitude.
        y: f64,
    },
}

/// Converts `(x, y)` in `source` into WGS84 `(lon, lat)`.
///
/// WGS84 input is passed through unchanged.
///
/// # Errors
///
/// Returns [`SpatialError::NonFinite`] if either coordinate is NaN or
/// infinite, before or after projection.
pub fn to_wgs84(x: f64, y: f64, source: Crs) -> Result<(f64, f64), SpatialError> {
    if !x.is_finite() || !y.is_finite() {
        return Err(SpatialError::NonFinite { x, y });
    }

    let (lon, lat) = match source {
        Crs::Wgs84 => (x, y),
        Crs::Twd97 => twd97::to_wgs84(x, y),
    };

    if !lon.is_finite() || !lat.is_finite() {
        return Err(SpatialError::NonFinite { x, y });
    }

    Ok((lon, lat))
}

/// Converts WGS84 `(lon, lat)` into TWD97 `(easting, northing)`.
#[must_use]
pub fn to_twd97(lon: f64, lat: f64) -> (f64, f64) {
    twd97::from_wgs84(lon, lat)
}

#[cfg(test)]
mod tests {
    use geo::{Distance, Haversine, Point};

    use super::*;

    #[test]
    fn wgs84_is_identity() {
        assert_eq!(
            to_wgs84(121.5654, 25.033, Crs::Wgs84).unwrap(),
            (121.5654, 25.033)
        );
    }

    #[test]
    fn rejects_nan() {
        assert!(matches!(
            to_wgs84(f64::NAN, 2_600_000.0, Crs::Twd97),
            Err(SpatialError::NonFinite { .. })
        ));
    }

    #[test]
    fn round_trip_stays_within_ten_meters() {
        let samples = [
            (121.5654, 25.033),
            (120.3, 22.6),
            (121.0, 23.5),
            (119.6, 21.9),
            (122.0, 25.3),
            (120.68, 24.15),
        ];

        for (lon, lat) in samples {
            let (e, n) = to_twd97(lon, lat);
            let (lon2, lat2) = to_wgs84(e, n, Crs::Twd97).unwrap();
            let (e2, n2) = to_twd97(lon2, lat2);
            let (lon3, lat3) = to_wgs84(e2, n2, Crs::Twd97).unwrap();

            let meters = Haversine.distance(Point::new(lon, lat), Point::new(lon3, lat3));
            assert!(meters < 10.0, "({lon}, {lat}) drifted {meters} m");
        }
    }
}
