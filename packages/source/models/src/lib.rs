#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Source configuration types for the parking data pipeline.
//!
//! A [`PipelineConfig`] is deserialized once per run from the configuration
//! artifact. Loosely-typed pieces of the document (handler names, the
//! `fixed:<value>` mapping convention, the filter triple) are resolved here
//! into closed, typed values so that nothing downstream re-parses strings
//! per record. [`PipelineConfig::validate`] enforces every load-time
//! invariant and fails with [`ConfigError`] before any source is fetched.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Errors detected while loading or validating the configuration.
///
/// All of these are fatal: the run aborts before any handler starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Io {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration document is malformed.
    #[error("Failed to parse config {path}: {message}")]
    Parse {
        /// Path that was being parsed.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// Two sources share the same id.
    #[error("Duplicate source id '{0}'")]
    DuplicateSourceId(String),

    /// A source names a handler that does not exist.
    #[error("Source '{source_id}' uses unknown handler '{handler}'")]
    UnknownHandler {
        /// Offending source.
        source_id: String,
        /// Handler name as written in the config.
        handler: String,
    },

    /// A handler was paired with a payload format it cannot read.
    #[error("Source '{source_id}': handler '{handler}' cannot read format '{format}'")]
    FormatMismatch {
        /// Offending source.
        source_id: String,
        /// Resolved handler.
        handler: HandlerKind,
        /// Declared format.
        format: SourceFormat,
    },

    /// The handler needs a mapping for a canonical field that is absent.
    #[error("Source '{source_id}' is missing a fields_mapping entry for '{field}'")]
    MissingFieldMapping {
        /// Offending source.
        source_id: String,
        /// Canonical field with no mapping.
        field: CanonicalField,
    },

    /// An enabled source has no URL.
    #[error("Source '{0}' has no url")]
    MissingUrl(String),

    /// Only one half of the filter rule was given.
    #[error("Source '{0}' sets filter_field without filter_pattern (or vice versa)")]
    IncompleteFilter(String),

    /// The merge precision is outside the supported range.
    #[error("coordinate_precision must be between 0 and {max}, got {got}")]
    InvalidPrecision {
        /// Largest accepted value.
        max: u32,
        /// Value found in the config.
        got: u32,
    },
}

/// Largest accepted `merge.coordinate_precision`.
pub const MAX_COORDINATE_PRECISION: u32 = 9;

// ── Top-level config ─────────────────────────────────────────────────────

/// The whole configuration artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Where the output artifact and report go.
    #[serde(default)]
    pub output: OutputConfig,
    /// Raw payload cache location.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Network retry, timeout and concurrency settings.
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Deduplication settings.
    #[serde(default)]
    pub merge: MergeConfig,
    /// Sources in processing order. Earlier sources win duplicate merges.
    pub sources: Vec<SourceConfig>,
}

impl PipelineConfig {
    /// Checks every load-time invariant.
    ///
    /// Disabled sources are still checked for id uniqueness and handler
    /// names, but not for URL or mapping completeness, so a half-written
    /// entry can be parked with `enabled = false`.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.merge.coordinate_precision > MAX_COORDINATE_PRECISION {
            return Err(ConfigError::InvalidPrecision {
                max: MAX_COORDINATE_PRECISION,
                got: self.merge.coordinate_precision,
            });
        }

        let mut seen = BTreeSet::new();
        for source in &self.sources {
            if !seen.insert(source.id.as_str()) {
                return Err(ConfigError::DuplicateSourceId(source.id.clone()));
            }
            source.validate()?;
        }
        Ok(())
    }

    /// Enabled sources in configuration order.
    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }
}

/// Output artifact locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// The tabular output file.
    #[serde(default = "default_output_file")]
    pub file: PathBuf,
    /// The JSON validation report.
    #[serde(default = "default_report_file")]
    pub report: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            file: default_output_file(),
            report: default_report_file(),
        }
    }
}

fn default_output_file() -> PathBuf {
    PathBuf::from("data/parking_locations.csv")
}

fn default_report_file() -> PathBuf {
    PathBuf::from("data/validation_report.json")
}

/// Raw payload cache location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Root directory; one subdirectory per source id.
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    /// Days an entry is served without refetching.
    #[serde(default = "default_cache_ttl_days")]
    pub ttl_days: u16,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            ttl_days: default_cache_ttl_days(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data/cache")
}

const fn default_cache_ttl_days() -> u16 {
    7
}

/// Network behavior shared by every source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Retries after the first attempt for transient HTTP failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff delay; doubles on each retry.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Timeout of a single HTTP request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Hard limit for one source's fetch/filter/transform.
    #[serde(default = "default_source_timeout_secs")]
    pub source_timeout_secs: u64,
    /// How many sources may run at the same time.
    #[serde(default = "default_max_concurrent_sources")]
    pub max_concurrent_sources: usize,
}

impl FetchConfig {
    /// First backoff delay.
    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Per-source timeout.
    #[must_use]
    pub const fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            source_timeout_secs: default_source_timeout_secs(),
            max_concurrent_sources: default_max_concurrent_sources(),
        }
    }
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_base_delay_ms() -> u64 {
    2_000
}

const fn default_request_timeout_secs() -> u64 {
    60
}

const fn default_source_timeout_secs() -> u64 {
    600
}

const fn default_max_concurrent_sources() -> usize {
    4
}

/// Deduplication settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Decimal places both coordinates are rounded to before comparison.
    #[serde(default = "default_coordinate_precision")]
    pub coordinate_precision: u32,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            coordinate_precision: default_coordinate_precision(),
        }
    }
}

const fn default_coordinate_precision() -> u32 {
    5
}

// ── Sources ──────────────────────────────────────────────────────────────

/// One configured data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Unique key; also names the cache subdirectory.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Disabled sources are skipped without fetching.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Handler name as written in the config. Resolved by
    /// [`SourceConfig::handler_kind`].
    pub handler: String,
    /// Handler settings.
    pub config: SourceSettings,
}

const fn default_enabled() -> bool {
    true
}

impl SourceConfig {
    /// Resolves the handler name into a [`HandlerKind`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownHandler`] for names outside the closed
    /// set.
    pub fn handler_kind(&self) -> Result<HandlerKind, ConfigError> {
        HandlerKind::from_str(self.handler.trim()).map_err(|_| ConfigError::UnknownHandler {
            source_id: self.id.clone(),
            handler: self.handler.clone(),
        })
    }

    /// The filter rule, if the source declares one.
    #[must_use]
    pub fn filter(&self) -> Option<FilterRule> {
        match (&self.config.filter_field, &self.config.filter_pattern) {
            (Some(field), Some(pattern)) => Some(FilterRule {
                field: field.clone(),
                pattern: pattern.clone(),
                mode: self.config.filter_match,
            }),
            _ => None,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let kind = self.handler_kind()?;

        if !kind.accepts(self.config.format) {
            return Err(ConfigError::FormatMismatch {
                source_id: self.id.clone(),
                handler: kind,
                format: self.config.format,
            });
        }

        if self.config.filter_field.is_some() != self.config.filter_pattern.is_some() {
            return Err(ConfigError::IncompleteFilter(self.id.clone()));
        }

        if !self.enabled {
            return Ok(());
        }

        if self.config.url.trim().is_empty() {
            return Err(ConfigError::MissingUrl(self.id.clone()));
        }

        for field in kind.required_fields() {
            if self.config.fields_mapping.get(*field).is_none() {
                return Err(ConfigError::MissingFieldMapping {
                    source_id: self.id.clone(),
                    field: *field,
                });
            }
        }

        Ok(())
    }
}

/// Per-source settings (the `config` block).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSettings {
    /// Download or API endpoint.
    #[serde(default)]
    pub url: String,
    /// Payload format.
    pub format: SourceFormat,
    /// Coordinate system of the raw coordinates.
    #[serde(default)]
    pub coordinate_system: CoordinateSystem,
    /// Attribute the filter looks at.
    #[serde(default)]
    pub filter_field: Option<String>,
    /// Value the filter compares against.
    #[serde(default, alias = "filter_value")]
    pub filter_pattern: Option<String>,
    /// How the filter compares.
    #[serde(default)]
    pub filter_match: FilterMatch,
    /// Records requested per page (paginated sources).
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Safety limit on the number of pages requested.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    /// Query parameter carrying the page number.
    #[serde(default = "default_page_param")]
    pub page_param: String,
    /// Query parameter carrying the page size.
    #[serde(default = "default_size_param")]
    pub size_param: String,
    /// Dot path to the record array inside a wrapped JSON page. When unset,
    /// `data`, `records` and `results` are tried.
    #[serde(default)]
    pub records_path: Option<String>,
    /// Delay between page requests.
    #[serde(default)]
    pub delay_ms: Option<u64>,
    /// Extra HTTP headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Canonical field → source field or constant.
    #[serde(default)]
    pub fields_mapping: FieldsMapping,
}

const fn default_page_size() -> u32 {
    1_000
}

const fn default_max_pages() -> u32 {
    100
}

fn default_page_param() -> String {
    "page".to_string()
}

fn default_size_param() -> String {
    "size".to_string()
}

// ── Closed enums ─────────────────────────────────────────────────────────

/// The known source handler implementations.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HandlerKind {
    /// Zipped shapefile with polygon (or point) geometries.
    #[strum(to_string = "shapefile_archive", serialize = "taipei_handler")]
    ShapefileArchive,
    /// Paginated JSON or CSV API with point coordinates in attributes.
    #[strum(to_string = "paginated_api", serialize = "new_taipei_handler")]
    PaginatedApi,
}

impl HandlerKind {
    /// Canonical fields this handler cannot work without.
    #[must_use]
    pub const fn required_fields(self) -> &'static [CanonicalField] {
        match self {
            Self::ShapefileArchive => &[CanonicalField::City],
            Self::PaginatedApi => &[CanonicalField::City, CanonicalField::X, CanonicalField::Y],
        }
    }

    /// Whether this handler can read `format`.
    #[must_use]
    pub const fn accepts(self, format: SourceFormat) -> bool {
        matches!(
            (self, format),
            (Self::ShapefileArchive, SourceFormat::ShapefileArchive)
                | (
                    Self::PaginatedApi,
                    SourceFormat::PaginatedJson | SourceFormat::PaginatedCsv
                )
        )
    }
}

/// Payload format of a source.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SourceFormat {
    /// Zip archive containing `.shp`/`.dbf`/`.prj`.
    #[serde(
        alias = "shapefile-archive",
        alias = "zip_shapefile",
        alias = "shapefile"
    )]
    #[strum(to_string = "shapefile_archive", serialize = "shapefile-archive")]
    ShapefileArchive,
    /// JSON pages.
    #[serde(alias = "paginated-json", alias = "json_paginated")]
    #[strum(to_string = "paginated_json", serialize = "paginated-json")]
    PaginatedJson,
    /// CSV pages.
    #[serde(alias = "paginated-csv", alias = "csv_paginated")]
    #[strum(to_string = "paginated_csv", serialize = "paginated-csv")]
    PaginatedCsv,
}

/// Declared coordinate reference system of a source.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr,
)]
pub enum CoordinateSystem {
    /// TWD97 / TM2 zone 121 (EPSG:3826).
    #[serde(rename = "TWD97", alias = "twd97", alias = "EPSG:3826")]
    #[strum(serialize = "TWD97")]
    Twd97,
    /// WGS84 geographic (EPSG:4326).
    #[serde(rename = "WGS84", alias = "wgs84", alias = "EPSG:4326")]
    #[strum(serialize = "WGS84")]
    Wgs84,
    /// Read from payload metadata or infer from coordinate ranges.
    #[default]
    #[serde(rename = "auto", alias = "AUTO")]
    #[strum(serialize = "auto")]
    Auto,
}

/// Comparison used by a [`FilterRule`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FilterMatch {
    /// The trimmed value must equal the pattern.
    Equals,
    /// The value must contain the pattern.
    #[default]
    Contains,
}

/// Record inclusion rule of a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRule {
    /// Attribute to inspect.
    pub field: String,
    /// Value to compare against.
    pub pattern: String,
    /// Comparison mode.
    pub mode: FilterMatch,
}

impl FilterRule {
    /// Whether an attribute value passes this rule.
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        match self.mode {
            FilterMatch::Equals => value.trim() == self.pattern,
            FilterMatch::Contains => value.contains(&self.pattern),
        }
    }
}

// ── Field mapping ────────────────────────────────────────────────────────

/// Prefix marking a constant in `fields_mapping`.
pub const FIXED_PREFIX: &str = "fixed:";

/// Canonical fields a mapping can supply.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CanonicalField {
    /// City name.
    City,
    /// District.
    Area,
    /// Road.
    Road,
    /// Easting / longitude.
    X,
    /// Northing / latitude.
    Y,
}

/// Where a canonical field's value comes from.
///
/// Deserialized from a plain string: `"fixed:臺北市"` becomes
/// [`FieldSource::Constant`], anything else names a source attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldSource {
    /// Read the named attribute from each record.
    Field(String),
    /// Use this literal for every record.
    Constant(String),
}

impl From<String> for FieldSource {
    fn from(value: String) -> Self {
        value.strip_prefix(FIXED_PREFIX).map_or_else(
            || Self::Field(value.trim().to_string()),
            |constant| Self::Constant(constant.to_string()),
        )
    }
}

impl From<FieldSource> for String {
    fn from(value: FieldSource) -> Self {
        match value {
            FieldSource::Field(name) => name,
            FieldSource::Constant(constant) => format!("{FIXED_PREFIX}{constant}"),
        }
    }
}

/// Typed `fields_mapping` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldsMapping {
    /// City.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<FieldSource>,
    /// District.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<FieldSource>,
    /// Road.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub road: Option<FieldSource>,
    /// Easting / longitude attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<FieldSource>,
    /// Northing / latitude attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<FieldSource>,
}

impl FieldsMapping {
    /// Mapping for a canonical field.
    #[must_use]
    pub const fn get(&self, field: CanonicalField) -> Option<&FieldSource> {
        match field {
            CanonicalField::City => self.city.as_ref(),
            CanonicalField::Area => self.area.as_ref(),
            CanonicalField::Road => self.road.as_ref(),
            CanonicalField::X => self.x.as_ref(),
            CanonicalField::Y => self.y.as_ref(),
        }
    }
}
