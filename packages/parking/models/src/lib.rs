#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The canonical accessible parking location record.
//!
//! Every source handler ultimately produces [`ParkingLocation`] values: one
//! WGS84 point per parking space group, with decimal-degree and DMS
//! renderings of the same coordinate. [`LocationRow`] is the loosely-typed
//! mirror of an output file row, used when validating an artifact that may
//! have missing or malformed cells.

pub mod report;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Column order of the output artifact.
pub const OUTPUT_COLUMNS: [&str; 7] = [
    "city", "area", "road", "dd_lat", "dd_long", "dms_lat", "dms_long",
];

/// Which coordinate axis a value belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Axis {
    /// North/south axis; hemisphere letters `N` and `S`.
    Latitude,
    /// East/west axis; hemisphere letters `E` and `W`.
    Longitude,
}

impl Axis {
    /// Hemisphere letter for a value on this axis.
    #[must_use]
    pub fn hemisphere(self, value: f64) -> char {
        match (self, value >= 0.0) {
            (Self::Latitude, true) => 'N',
            (Self::Latitude, false) => 'S',
            (Self::Longitude, true) => 'E',
            (Self::Longitude, false) => 'W',
        }
    }

    /// Returns `true` if `letter` is a valid hemisphere suffix for this axis.
    #[must_use]
    pub const fn accepts_hemisphere(self, letter: char) -> bool {
        match self {
            Self::Latitude => matches!(letter, 'N' | 'S'),
            Self::Longitude => matches!(letter, 'E' | 'W'),
        }
    }
}

/// A single accessible parking location, normalized to WGS84.
///
/// Field order matches [`OUTPUT_COLUMNS`], so serializing a slice of these
/// with `csv` produces the output artifact directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkingLocation {
    /// City name (e.g. `"臺北市"`).
    pub city: String,
    /// District within the city. May be empty.
    pub area: String,
    /// Road or street description. May be empty.
    pub road: String,
    /// Latitude in WGS84 decimal degrees.
    pub dd_lat: f64,
    /// Longitude in WGS84 decimal degrees.
    pub dd_long: f64,
    /// Latitude as `DD°MM'SS.SS"N`.
    pub dms_lat: String,
    /// Longitude as `DDD°MM'SS.SS"E`.
    pub dms_long: String,
}

/// A row of an output artifact as read back from disk.
///
/// Unlike [`ParkingLocation`], every cell is optional so that a
/// hand-edited or truncated file can still be loaded and reported on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationRow {
    /// City name.
    #[serde(default)]
    pub city: Option<String>,
    /// District.
    #[serde(default)]
    pub area: Option<String>,
    /// Road.
    #[serde(default)]
    pub road: Option<String>,
    /// Latitude; `None` when the cell is empty or not a number.
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub dd_lat: Option<f64>,
    /// Longitude; `None` when the cell is empty or not a number.
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub dd_long: Option<f64>,
    /// DMS latitude.
    #[serde(default)]
    pub dms_lat: Option<String>,
    /// DMS longitude.
    #[serde(default)]
    pub dms_long: Option<String>,
}

impl From<&ParkingLocation> for LocationRow {
    fn from(location: &ParkingLocation) -> Self {
        Self {
            city: Some(location.city.clone()),
            area: Some(location.area.clone()),
            road: Some(location.road.clone()),
            dd_lat: Some(location.dd_lat),
            dd_long: Some(location.dd_long),
            dms_lat: Some(location.dms_lat.clone()),
            dms_long: Some(location.dms_long.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hemisphere_letters_follow_sign() {
        assert_eq!(Axis::Latitude.hemisphere(25.0), 'N');
        assert_eq!(Axis::Latitude.hemisphere(0.0), 'N');
        assert_eq!(Axis::Latitude.hemisphere(-0.1), 'S');
        assert_eq!(Axis::Longitude.hemisphere(121.5), 'E');
        assert_eq!(Axis::Longitude.hemisphere(-70.0), 'W');
    }

    #[test]
    fn longitude_rejects_latitude_letters() {
        assert!(Axis::Longitude.accepts_hemisphere('E'));
        assert!(!Axis::Longitude.accepts_hemisphere('N'));
        assert!(!Axis::Latitude.accepts_hemisphere('W'));
    }

    #[test]
    fn location_serializes_in_output_column_order() {
        let location = ParkingLocation {
            city: "臺北市".to_string(),
            area: "中正區".to_string(),
            road: String::new(),
            dd_lat: 25.033,
            dd_long: 121.5654,
            dms_lat: "25°01'58.80\"N".to_string(),
            dms_long: "121°33'55.44\"E".to_string(),
        };

        let mut writer = csv::Writer::from_writer(vec![]);
        writer.serialize(&location).unwrap();
        let bytes = writer.into_inner().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let header = text.lines().next().unwrap();

        assert_eq!(header, OUTPUT_COLUMNS.join(","));
    }

    #[test]
    fn row_reads_blank_and_garbage_numbers_as_none() {
        let data = "city,area,road,dd_lat,dd_long,dms_lat,dms_long\n\
                    臺北市,,,,abc,x,y\n";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let row: LocationRow = reader.deserialize().next().unwrap().unwrap();

        assert_eq!(row.city.as_deref(), Some("臺北市"));
        assert_eq!(row.dd_lat, None);
        assert_eq!(row.dd_long, None);
    }
}
