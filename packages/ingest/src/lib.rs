#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Pipeline orchestrator for the accessible parking dataset.
//!
//! Runs every selected source concurrently, merges their locations into one
//! deduplicated sequence, writes the output CSV, reads it back for
//! validation and persists the validation report.

pub mod merge;
pub mod output;
pub mod validate;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{TimeDelta, Utc};
use futures::stream::{self, StreamExt as _};
use parking_map_cache::CacheStore;
use parking_map_ingest_models::{
    RunSummary, SourceOutcome, SourceStatus, ValidationReport,
};
use parking_map_parking_models::ParkingLocation;
use parking_map_parking_models::report::ReportSink;
use parking_map_source::{SourceContext, SourceHandler, registry};
use parking_map_source_models::{ConfigError, PipelineConfig, SourceConfig};

/// Errors that abort a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The configuration is invalid; nothing was fetched.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Reading or writing an artifact failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// CSV encoding or decoding failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No source produced a single record; the previous output is kept.
    #[error("No records collected from any source")]
    NoData,
}

const SCOPE: &str = "pipeline";

/// One configured pipeline run.
pub struct Pipeline {
    config: PipelineConfig,
    handlers: Vec<SourceHandler>,
    cache: Arc<CacheStore>,
    sink: Arc<dyn ReportSink>,
    force_refresh: bool,
    snapshot_dir: Option<PathBuf>,
}

impl Pipeline {
    /// Builds a pipeline over `sources`, which should come from
    /// [`registry::select_sources`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if the configuration is invalid or
    /// any source names an unknown handler. No source runs in that case.
    pub fn new(
        config: PipelineConfig,
        sources: Vec<SourceConfig>,
        sink: Arc<dyn ReportSink>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let handlers = registry::build_handlers(&config, sources)?;
        let cache = Arc::new(
            CacheStore::new(config.cache.dir.clone(), sink.clone())
                .with_ttl(TimeDelta::days(i64::from(config.cache.ttl_days))),
        );
        Ok(Self {
            config,
            handlers,
            cache,
            sink,
            force_refresh: false,
            snapshot_dir: None,
        })
    }

    /// Bypasses cache freshness for every source.
    #[must_use]
    pub const fn with_force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    /// Writes per-stage debug snapshots under `dir`.
    #[must_use]
    pub fn with_snapshot_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.snapshot_dir = dir;
        self
    }

    /// Runs every source and returns its outcome and locations, in
    /// configuration order. Failed and timed-out sources contribute no
    /// locations.
    pub async fn collect(&self) -> Vec<(SourceOutcome, Vec<ParkingLocation>)> {
        let ctx = SourceContext::new(self.cache.clone(), self.sink.clone())
            .with_force_refresh(self.force_refresh)
            .with_snapshot_dir(self.snapshot_dir.clone());
        let timeout = self.config.fetch.source_timeout();
        let concurrency = self.config.fetch.max_concurrent_sources.max(1);

        stream::iter(
            self.handlers
                .iter()
                .map(|handler| run_source(handler, &ctx, timeout)),
        )
        .buffered(concurrency)
        .collect()
        .await
    }

    /// Runs the whole pipeline: collect, merge, write, validate, report.
    ///
    /// Per-record problems do not fail the run; they are in the returned
    /// summary's report. Use [`ValidationReport::has_errors`] to decide
    /// whether to act on the output.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NoData`] if no source produced a record,
    /// leaving any previous output untouched, or an I/O error if the
    /// artifacts cannot be written.
    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        let started_at = Utc::now();
        self.sink.info(
            SCOPE,
            &format!(
                "Running {} source(s): {}",
                self.handlers.len(),
                self.handlers
                    .iter()
                    .map(SourceHandler::id)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        );

        let mut sources = Vec::with_capacity(self.handlers.len());
        let mut batches = Vec::with_capacity(self.handlers.len());
        for (outcome, locations) in self.collect().await {
            batches.push((outcome.source_id.clone(), locations));
            sources.push(outcome);
        }

        let failed = sources.iter().filter(|s| !s.is_completed()).count();
        if failed > 0 {
            self.sink.warn(
                SCOPE,
                &format!("{failed} of {} sources were unavailable", sources.len()),
            );
        }

        if batches.iter().all(|(_, locations)| locations.is_empty()) {
            self.sink.error(
                SCOPE,
                &format!(
                    "No records collected; leaving {} untouched",
                    self.config.output.file.display()
                ),
            );
            return Err(PipelineError::NoData);
        }

        let precision = self.config.merge.coordinate_precision;
        let (merged, merge) = merge::merge(batches, precision, self.sink.as_ref());

        let output_path = &self.config.output.file;
        output::write_locations(output_path, &merged)?;

        let rows = output::read_rows(output_path)?;
        if rows.len() != merged.len() {
            self.sink.error(
                SCOPE,
                &format!(
                    "{} has {} rows after writing {} locations",
                    output_path.display(),
                    rows.len(),
                    merged.len()
                ),
            );
        }
        let report = validate::validate(&rows, precision, self.sink.as_ref());
        output::write_report(&self.config.output.report, &report)?;

        Ok(RunSummary {
            started_at,
            finished_at: Utc::now(),
            sources,
            merge,
            report,
            output: output_path.clone(),
        })
    }
}

async fn run_source(
    handler: &SourceHandler,
    ctx: &SourceContext,
    timeout: Duration,
) -> (SourceOutcome, Vec<ParkingLocation>) {
    let start = Instant::now();
    let result = tokio::time::timeout(timeout, handler.run(ctx)).await;
    let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    let mut outcome = SourceOutcome {
        source_id: handler.id().to_string(),
        name: handler.name().to_string(),
        status: SourceStatus::Completed,
        records: 0,
        skipped: 0,
        crs_fallbacks: 0,
        cache: None,
        error: None,
        duration_ms,
    };

    match result {
        Ok(Ok(run)) => {
            outcome.records = run.locations.len();
            outcome.skipped = run.stats.skipped;
            outcome.crs_fallbacks = run.stats.crs_fallbacks;
            outcome.cache = Some(run.cache.as_str().to_string());
            (outcome, run.locations)
        }
        Ok(Err(e)) => {
            ctx.sink.error(handler.id(), &e.to_string());
            outcome.status = SourceStatus::Unavailable;
            outcome.error = Some(e.to_string());
            (outcome, Vec::new())
        }
        Err(_) => {
            let message = format!("Timed out after {}s", timeout.as_secs());
            ctx.sink.error(handler.id(), &message);
            outcome.status = SourceStatus::TimedOut;
            outcome.error = Some(message);
            (outcome, Vec::new())
        }
    }
}

/// Validates an existing output artifact.
///
/// # Errors
///
/// Returns [`PipelineError`] if the file cannot be read as CSV.
pub fn validate_file(
    path: &Path,
    precision: u32,
    sink: &dyn ReportSink,
) -> Result<ValidationReport, PipelineError> {
    let rows = output::read_rows(path)?;
    log::info!("Validating {} rows from {}", rows.len(), path.display());
    Ok(validate::validate(&rows, precision, sink))
}
