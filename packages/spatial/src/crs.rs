//! Coordinate reference system detection.
//!
//! A source's CRS comes from (in order) its configuration, metadata shipped
//! with the payload such as a shapefile `.prj`, or the numeric range of a
//! sample point. When none of those settle it, TWD97 is assumed and the
//! result is flagged as a [`DetectionMethod::Fallback`] so callers can warn.

use parking_map_source_models::CoordinateSystem;
use strum_macros::{AsRefStr, Display};

/// A concrete coordinate reference system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
pub enum Crs {
    /// WGS84 geographic degrees (EPSG:4326).
    #[strum(serialize = "WGS84")]
    Wgs84,
    /// TWD97 TM2 zone 121 metres (EPSG:3826).
    #[strum(serialize = "TWD97")]
    Twd97,
}

impl Crs {
    /// The fixed CRS a configuration value names, if any.
    #[must_use]
    pub const fn from_configured(system: CoordinateSystem) -> Option<Self> {
        match system {
            CoordinateSystem::Wgs84 => Some(Self::Wgs84),
            CoordinateSystem::Twd97 => Some(Self::Twd97),
            CoordinateSystem::Auto => None,
        }
    }
}

/// How a [`CrsDetection`] was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DetectionMethod {
    /// Fixed by the source configuration.
    Configured,
    /// Read from payload metadata.
    Declared,
    /// Inferred from the coordinate range.
    Detected,
    /// Nothing matched; TWD97 assumed.
    Fallback,
}

/// Result of CRS detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrsDetection {
    /// The CRS to convert from.
    pub crs: Crs,
    /// How it was chosen.
    pub method: DetectionMethod,
}

impl CrsDetection {
    /// Whether TWD97 was assumed rather than established.
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        matches!(self.method, DetectionMethod::Fallback)
    }
}

/// TWD97 easting range accepted by range detection.
const TWD97_X: (f64, f64) = (100_000.0, 400_000.0);
/// TWD97 northing range accepted by range detection.
const TWD97_Y: (f64, f64) = (2_400_000.0, 2_900_000.0);

/// Maps a declared CRS label or `.prj` WKT to a known system.
///
/// Accepts EPSG codes (`EPSG:3826`, `4326`), common names (`TWD97`,
/// `WGS84`) and WKT. A projected WKT is TWD97 only when it names the
/// TWD97 datum or EPSG:3826; a geographic WKT is WGS84 only when it names
/// `WGS_1984`/EPSG:4326. Anything else is `None`.
#[must_use]
pub fn parse_declared_crs(declared: &str) -> Option<Crs> {
    let text = declared.trim().to_uppercase();
    if text.is_empty() {
        return None;
    }

    if text.contains("PROJCS[") {
        // TM2 zone 119 (Penghu/Kinmen) shares the datum but not the meridian.
        if text.contains("3825") || text.contains("ZONE 119") || text.contains("TM2_119") {
            return None;
        }
        let twd = text.contains("TWD97") || text.contains("TWD_1997") || text.contains("3826");
        return twd.then_some(Crs::Twd97);
    }

    if text.contains("GEOGCS[") {
        let wgs = text.contains("WGS_1984") || text.contains("WGS 84") || text.contains("4326");
        return wgs.then_some(Crs::Wgs84);
    }

    let code = text.strip_prefix("EPSG:").unwrap_or(&text);
    match code {
        "4326" | "WGS84" | "WGS 84" | "WGS_1984" => Some(Crs::Wgs84),
        "3826" | "TWD97" | "TWD97_TM2" | "TWD_1997_TM_TAIWAN" => Some(Crs::Twd97),
        _ => None,
    }
}

/// Classifies a sample point by range, if it falls in exactly one range.
#[must_use]
pub fn classify_by_range(x: f64, y: f64) -> Option<Crs> {
    let in_range = |v: f64, (lo, hi): (f64, f64)| (lo..=hi).contains(&v);

    if in_range(x, TWD97_X) && in_range(y, TWD97_Y) {
        Some(Crs::Twd97)
    } else if in_range(x, (-180.0, 180.0)) && in_range(y, (-90.0, 90.0)) {
        Some(Crs::Wgs84)
    } else {
        None
    }
}

/// Detects the CRS of a source from an optional declared label and a
/// sample point `(x, y)`.
#[must_use]
pub fn detect_crs(declared: Option<&str>, sample: (f64, f64)) -> CrsDetection {
    if let Some(crs) = declared.and_then(parse_declared_crs) {
        return CrsDetection {
            crs,
            method: DetectionMethod::Declared,
        };
    }

    if let Some(crs) = classify_by_range(sample.0, sample.1) {
        return CrsDetection {
            crs,
            method: DetectionMethod::Detected,
        };
    }

    log::debug!(
        "No CRS matched sample ({}, {}); assuming TWD97",
        sample.0,
        sample.1
    );
    CrsDetection {
        crs: Crs::Twd97,
        method: DetectionMethod::Fallback,
    }
}

/// Resolves the CRS for a source: a fixed configured system wins, then
/// [`detect_crs`].
#[must_use]
pub fn resolve_crs(
    configured: CoordinateSystem,
    declared: Option<&str>,
    sample: (f64, f64),
) -> CrsDetection {
    Crs::from_configured(configured).map_or_else(
        || detect_crs(declared, sample),
        |crs| CrsDetection {
            crs,
            method: DetectionMethod::Configured,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWD97_PRJ: &str = r#"PROJCS["TWD97 / TM2 zone 121",GEOGCS["TWD97",DATUM["Taiwan_Datum_1997",SPHEROID["GRS 1980",6378137,298.257222101]],PRIMEM["Greenwich",0],UNIT["degree",0.0174532925199433]],PROJECTION["Transverse_Mercator"],PARAMETER["central_meridian",121],PARAMETER["scale_factor",0.9999],PARAMETER["false_easting",250000],UNIT["metre",1],AUTHORITY["EPSG","3826"]]"#;

    const ESRI_TWD97_PRJ: &str = r#"PROJCS["TWD_1997_TM_Taiwan",GEOGCS["GCS_TWD_1997",DATUM["D_TWD_1997",SPHEROID["GRS_1980",6378137.0,298.257222101]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Transverse_Mercator"],PARAMETER["False_Easting",250000.0],PARAMETER["Central_Meridian",121.0],PARAMETER["Scale_Factor",0.9999],UNIT["Meter",1.0]]"#;

    const WGS84_PRJ: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;

    #[test]
    fn wgs84_range() {
        let d = detect_crs(None, (121.5, 25.0));
        assert_eq!(d.crs, Crs::Wgs84);
        assert_eq!(d.method, DetectionMethod::Detected);
    }

    #[test]
    fn twd97_range() {
        let d = detect_crs(None, (302_000.0, 2_600_000.0));
        assert_eq!(d.crs, Crs::Twd97);
        assert_eq!(d.method, DetectionMethod::Detected);
    }

    #[test]
    fn out_of_range_falls_back_to_twd97() {
        let d = detect_crs(None, (5_000_000.0, 5_000_000.0));
        assert_eq!(d.crs, Crs::Twd97);
        assert!(d.is_fallback());
    }

    #[test]
    fn unusable_declaration_falls_through_to_range() {
        let d = detect_crs(Some("EPSG:3857"), (121.5, 25.0));
        assert_eq!(d.crs, Crs::Wgs84);
        assert_eq!(d.method, DetectionMethod::Detected);
    }

    #[test]
    fn declared_epsg_wins_over_range() {
        let d = detect_crs(Some("EPSG:3826"), (121.5, 25.0));
        assert_eq!(d.crs, Crs::Twd97);
        assert_eq!(d.method, DetectionMethod::Declared);
    }

    #[test]
    fn parses_prj_wkt() {
        assert_eq!(parse_declared_crs(TWD97_PRJ), Some(Crs::Twd97));
        assert_eq!(parse_declared_crs(ESRI_TWD97_PRJ), Some(Crs::Twd97));
        assert_eq!(parse_declared_crs(WGS84_PRJ), Some(Crs::Wgs84));
    }

    #[test]
    fn projected_wgs84_is_not_geographic() {
        let utm = r#"PROJCS["WGS_1984_UTM_Zone_51N",GEOGCS["GCS_WGS_1984"]]"#;
        assert_eq!(parse_declared_crs(utm), None);
    }

    #[test]
    fn configured_system_wins() {
        let d = resolve_crs(CoordinateSystem::Twd97, Some(WGS84_PRJ), (121.5, 25.0));
        assert_eq!(d.crs, Crs::Twd97);
        assert_eq!(d.method, DetectionMethod::Configured);

        let d = resolve_crs(CoordinateSystem::Auto, None, (121.5, 25.0));
        assert_eq!(d.method, DetectionMethod::Detected);
    }
}
