#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Parking data sources.
//!
//! A [`SourceHandler`] turns one configured open-data feed into
//! [`ParkingLocation`]s in four steps:
//!
//! 1. **fetch** the raw payload, always through the [`CacheStore`];
//! 2. **filter** records by the source's rule (e.g. `pktype == "03"`);
//! 3. **transform** records into [`Candidate`] tuples via `fields_mapping`,
//!    reducing polygons to points on the way;
//! 4. **normalize** candidates to WGS84 decimal degrees and DMS strings.
//!
//! A source that cannot be fetched or read fails as a whole with
//! [`SourceError::Unavailable`]; a single bad record is skipped with a
//! warning.

pub mod archive;
pub mod fields;
pub mod filter;
pub mod handler;
pub mod normalize;
pub mod paginated;
pub mod registry;
pub mod snapshot;

use std::path::PathBuf;
use std::sync::Arc;

use parking_map_cache::{CacheOutcome, CacheStore};
use parking_map_parking_models::ParkingLocation;
use parking_map_parking_models::report::ReportSink;
use parking_map_spatial::Crs;

pub use handler::SourceHandler;

/// Errors that can occur during data source operations.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The source could not be fetched or read; it contributes no records.
    #[error("Source '{source_id}' unavailable: {reason}")]
    Unavailable {
        /// The source that failed.
        source_id: String,
        /// What went wrong.
        reason: String,
    },

    /// Fetching pages failed.
    #[error("Scrape error: {0}")]
    Scrape(#[from] parking_map_scraper::ScrapeError),

    /// The downloaded archive is not a readable shapefile archive.
    #[error("Archive error: {0}")]
    Archive(String),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error (file read/write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] parking_map_source_models::ConfigError),
}

impl SourceError {
    /// Wraps any error as [`SourceError::Unavailable`] for `source_id`.
    #[must_use]
    pub fn unavailable(source_id: &str, error: &impl std::fmt::Display) -> Self {
        Self::Unavailable {
            source_id: source_id.to_owned(),
            reason: error.to_string(),
        }
    }
}

/// One record of a fetched payload, before filtering.
#[derive(Debug, Clone)]
pub struct RawRecord {
    /// Position in the payload, for diagnostics.
    pub index: usize,
    /// Attribute table row (shapefile) or API object.
    pub attributes: serde_json::Map<String, serde_json::Value>,
    /// Shape geometry, when the payload carries one.
    pub geometry: Option<geo::Geometry<f64>>,
}

/// A fetched and parsed payload.
#[derive(Debug, Clone)]
pub struct RawPayload {
    /// Every record in payload order.
    pub records: Vec<RawRecord>,
    /// CRS label or WKT shipped with the payload (shapefile `.prj`).
    pub declared_crs: Option<String>,
    /// Where the payload bytes came from.
    pub cache: CacheOutcome,
}

/// A transformed record, still in its source coordinate system.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Position in the raw payload.
    pub index: usize,
    /// Easting or longitude.
    pub x: f64,
    /// Northing or latitude.
    pub y: f64,
    /// The CRS if configured or declared; `None` means detect from range.
    pub crs_hint: Option<Crs>,
    /// City.
    pub city: String,
    /// District.
    pub area: String,
    /// Road.
    pub road: String,
}

/// Record counts through the stages of one source run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    /// Records in the payload.
    pub raw: usize,
    /// Records passing the filter.
    pub filtered: usize,
    /// Candidates produced by transform.
    pub transformed: usize,
    /// Locations produced by normalization.
    pub normalized: usize,
    /// Records skipped with a warning (bad geometry, missing coordinates).
    pub skipped: usize,
    /// Candidates whose CRS fell back to TWD97.
    pub crs_fallbacks: usize,
}

/// Output of a successful source run.
#[derive(Debug, Clone)]
pub struct SourceRun {
    /// Source id.
    pub source_id: String,
    /// Normalized locations in payload order.
    pub locations: Vec<ParkingLocation>,
    /// Stage counts.
    pub stats: SourceStats,
    /// Cache outcome of the fetch.
    pub cache: CacheOutcome,
}

/// Shared services a handler needs while running.
#[derive(Clone)]
pub struct SourceContext {
    /// Raw payload cache.
    pub cache: Arc<CacheStore>,
    /// Where warnings and progress go.
    pub sink: Arc<dyn ReportSink>,
    /// Bypass cache freshness.
    pub force_refresh: bool,
    /// Directory for per-stage debug snapshots.
    pub snapshot_dir: Option<PathBuf>,
}

impl SourceContext {
    /// Creates a context with no forced refresh and no snapshots.
    #[must_use]
    pub const fn new(cache: Arc<CacheStore>, sink: Arc<dyn ReportSink>) -> Self {
        Self {
            cache,
            sink,
            force_refresh: false,
            snapshot_dir: None,
        }
    }

    /// Sets forced refresh.
    #[must_use]
    pub const fn with_force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    /// Enables debug snapshots under `dir`.
    #[must_use]
    pub fn with_snapshot_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.snapshot_dir = dir;
        self
    }
}
