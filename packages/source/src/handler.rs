//! The source handler: fetch, filter, transform and normalize one source.

use parking_map_cache::{CacheOutcome, Fetched};
use parking_map_parking_models::report::ReportSink;
use parking_map_scraper::csv_paginated::CsvPaginatedScraper;
use parking_map_scraper::json_paginated::JsonPaginatedScraper;
use parking_map_scraper::{RetryPolicy, build_client, retry};
use parking_map_source_models::{
    ConfigError, FetchConfig, HandlerKind, SourceConfig, SourceFormat,
};
use parking_map_spatial::{Crs, SpatialError, parse_declared_crs, reduce};

use crate::fields::{resolve_number, resolve_text};
use crate::normalize::normalize;
use crate::snapshot::{SnapshotWriter, Stage};
use crate::{
    Candidate, RawPayload, RawRecord, SourceContext, SourceError, SourceRun, SourceStats,
    archive, filter, paginated,
};

/// A configured source, ready to run.
#[derive(Debug, Clone)]
pub struct SourceHandler {
    config: SourceConfig,
    kind: HandlerKind,
    fetch: FetchConfig,
}

impl SourceHandler {
    /// Creates a handler for `config`, using `fetch` for network settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownHandler`] if the handler name is not
    /// one of the known kinds.
    pub fn new(config: SourceConfig, fetch: FetchConfig) -> Result<Self, ConfigError> {
        let kind = config.handler_kind()?;
        Ok(Self {
            config,
            kind,
            fetch,
        })
    }

    /// Source id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// Human-readable source name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Resolved handler kind.
    #[must_use]
    pub const fn kind(&self) -> HandlerKind {
        self.kind
    }

    /// The source configuration.
    #[must_use]
    pub const fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Runs the whole source: fetch → filter → transform → normalize.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Unavailable`] if the payload cannot be fetched
    /// or read. Per-record problems are reported to the sink and skipped.
    pub async fn run(&self, ctx: &SourceContext) -> Result<SourceRun, SourceError> {
        let id = self.id();
        let sink = ctx.sink.as_ref();
        let snapshots = ctx
            .snapshot_dir
            .as_deref()
            .map(|dir| SnapshotWriter::new(dir, id));

        sink.info(id, &format!("Starting {} ({})", self.name(), self.kind));

        let payload = self
            .fetch(ctx)
            .await
            .map_err(|e| SourceError::unavailable(id, &e))?;

        let mut stats = SourceStats {
            raw: payload.records.len(),
            ..SourceStats::default()
        };
        if let Some(snapshots) = &snapshots {
            snapshots.records(Stage::Raw, &payload.records);
        }

        let filtered = self.filter(payload.records, sink);
        stats.filtered = filtered.len();
        if let Some(snapshots) = &snapshots {
            snapshots.records(Stage::Filtered, &filtered);
        }

        let (candidates, transform_skipped) =
            self.transform(&filtered, payload.declared_crs.as_deref(), sink);
        stats.transformed = candidates.len();
        if let Some(snapshots) = &snapshots {
            snapshots.candidates(&candidates);
        }

        let (locations, normalized) = normalize(id, &candidates, sink);
        stats.normalized = locations.len();
        stats.skipped = transform_skipped + normalized.skipped;
        stats.crs_fallbacks = normalized.crs_fallbacks;

        sink.info(
            id,
            &format!(
                "{} raw, {} after filter, {} locations ({} skipped)",
                stats.raw, stats.filtered, stats.normalized, stats.skipped
            ),
        );

        Ok(SourceRun {
            source_id: id.to_string(),
            locations,
            stats,
            cache: payload.cache,
        })
    }

    /// Fetches and parses the payload through the cache.
    ///
    /// A cached payload that no longer parses is invalidated and fetched
    /// again once. A freshly fetched payload that does not parse is dropped
    /// from the cache so it is not served next time.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the download or the parse fails.
    pub async fn fetch(&self, ctx: &SourceContext) -> Result<RawPayload, SourceError> {
        let id = self.id();
        let sink = ctx.sink.as_ref();

        let cached = ctx
            .cache
            .get_or_fetch(id, ctx.force_refresh, || self.download(sink))
            .await?;

        match self.parse(&cached.bytes, sink) {
            Ok((records, declared_crs)) => Ok(RawPayload {
                records,
                declared_crs,
                cache: cached.outcome,
            }),
            Err(e) if cached.outcome == CacheOutcome::Hit => {
                sink.warn(id, &format!("Cached payload is unreadable ({e}), refetching"));
                self.discard_cached(ctx).await;

                let refetched = ctx
                    .cache
                    .get_or_fetch(id, true, || self.download(sink))
                    .await?;
                match self.parse(&refetched.bytes, sink) {
                    Ok((records, declared_crs)) => Ok(RawPayload {
                        records,
                        declared_crs,
                        cache: CacheOutcome::Corrupted,
                    }),
                    Err(e) => {
                        self.discard_cached(ctx).await;
                        Err(e)
                    }
                }
            }
            Err(e) => {
                self.discard_cached(ctx).await;
                Err(e)
            }
        }
    }

    async fn discard_cached(&self, ctx: &SourceContext) {
        if let Err(e) = ctx.cache.invalidate(self.id()).await {
            ctx.sink
                .warn(self.id(), &format!("Failed to invalidate cache entry: {e}"));
        }
    }

    /// Downloads the raw payload bytes.
    async fn download(&self, sink: &dyn ReportSink) -> Result<Fetched, SourceError> {
        let id = self.id();
        let settings = &self.config.config;
        let delay = settings.delay_ms.map(std::time::Duration::from_millis);

        match settings.format {
            SourceFormat::ShapefileArchive => {
                let client = build_client(&settings.headers, self.fetch.request_timeout())?;
                let policy = RetryPolicy::new(self.fetch.max_retries, self.fetch.base_delay());
                log::info!("[{id}] Downloading {}", settings.url);
                let bytes = retry::send_bytes(&policy, || client.get(&settings.url)).await?;
                sink.info(id, &format!("Downloaded {} bytes", bytes.len()));
                Ok(bytes.into())
            }
            SourceFormat::PaginatedJson => {
                let scraper =
                    JsonPaginatedScraper::new(paginated::scrape_config(settings, &self.fetch))?
                        .with_records_path(settings.records_path.as_deref());
                paginated::collect_pages(id, &scraper, settings.max_pages, delay, sink).await
            }
            SourceFormat::PaginatedCsv => {
                let scraper =
                    CsvPaginatedScraper::new(paginated::scrape_config(settings, &self.fetch))?;
                paginated::collect_pages(id, &scraper, settings.max_pages, delay, sink).await
            }
        }
    }

    /// Parses payload bytes into records and an optional declared CRS.
    fn parse(
        &self,
        bytes: &[u8],
        sink: &dyn ReportSink,
    ) -> Result<(Vec<RawRecord>, Option<String>), SourceError> {
        match self.kind {
            HandlerKind::ShapefileArchive => {
                let layer = archive::read_archive(self.id(), bytes, sink)?;
                log::debug!(
                    "[{}] Layer {} has {} records",
                    self.id(),
                    layer.name,
                    layer.records.len()
                );
                Ok((layer.records, layer.prj))
            }
            HandlerKind::PaginatedApi => Ok((
                paginated::decode_records(self.id(), bytes, sink)?,
                None,
            )),
        }
    }

    /// Applies the source's filter rule.
    #[must_use]
    pub fn filter(&self, records: Vec<RawRecord>, sink: &dyn ReportSink) -> Vec<RawRecord> {
        filter::apply_filter(self.id(), records, self.config.filter().as_ref(), sink)
    }

    /// Maps records to candidates. Returns the candidates and the number of
    /// records skipped.
    ///
    /// Coordinates come from the record's geometry (polygons are reduced to
    /// their centroid) or, without one, from the mapped `x`/`y` attributes.
    #[must_use]
    pub fn transform(
        &self,
        records: &[RawRecord],
        declared_crs: Option<&str>,
        sink: &dyn ReportSink,
    ) -> (Vec<Candidate>, usize) {
        let id = self.id();
        let crs_hint = self.crs_hint(declared_crs, sink);
        let mapping = &self.config.config.fields_mapping;

        let mut candidates = Vec::with_capacity(records.len());
        let mut skipped = 0;

        for record in records {
            let point = match &record.geometry {
                Some(geometry) => reduce(geometry).map_err(|e| e.to_string()),
                None if mapping.x.is_some() && mapping.y.is_some() => {
                    match (
                        resolve_number(mapping.x.as_ref(), &record.attributes),
                        resolve_number(mapping.y.as_ref(), &record.attributes),
                    ) {
                        (Some(x), Some(y)) => Ok((x, y)),
                        _ => Err("missing or non-numeric coordinates".to_string()),
                    }
                }
                None => Err(SpatialError::UnsupportedGeometry("null shape".to_string()).to_string()),
            };

            match point {
                Ok((x, y)) => candidates.push(Candidate {
                    index: record.index,
                    x,
                    y,
                    crs_hint,
                    city: resolve_text(mapping.city.as_ref(), &record.attributes),
                    area: resolve_text(mapping.area.as_ref(), &record.attributes),
                    road: resolve_text(mapping.road.as_ref(), &record.attributes),
                }),
                Err(reason) => {
                    skipped += 1;
                    sink.warn(id, &format!("Skipping record {}: {reason}", record.index));
                }
            }
        }

        (candidates, skipped)
    }

    /// The CRS every record of this payload shares, if known: the
    /// configured system, else a recognised declaration.
    fn crs_hint(&self, declared: Option<&str>, sink: &dyn ReportSink) -> Option<Crs> {
        if let Some(crs) = Crs::from_configured(self.config.config.coordinate_system) {
            return Some(crs);
        }

        let declared = declared?;
        let parsed = parse_declared_crs(declared);
        match parsed {
            Some(crs) => log::debug!("[{}] Declared CRS is {crs}", self.id()),
            None => sink.info(
                self.id(),
                "Declared CRS not recognised, detecting from coordinate ranges",
            ),
        }
        parsed
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_map_cache::CacheStore;
    use parking_map_parking_models::report::{MemorySink, Severity};
    use serde_json::json;

    use super::*;
    use crate::archive::fixture::{dbf, shp, square, zip};

    fn source(toml_text: &str) -> SourceConfig {
        toml::from_str(toml_text).unwrap()
    }

    fn taipei() -> SourceConfig {
        source(
            r#"
            id = "taipei_city"
            name = "Taipei City"
            handler = "taipei_handler"

            [config]
            url = "http://127.0.0.1:1/taipei.zip"
            format = "shapefile_archive"
            filter_field = "pktype"
            filter_pattern = "03"
            filter_match = "equals"

            [config.fields_mapping]
            city = "fixed:臺北市"
            area = "AREA"
            road = "ROAD"
            "#,
        )
    }

    fn new_taipei() -> SourceConfig {
        source(
            r#"
            id = "new_taipei_city"
            name = "New Taipei City"
            handler = "paginated_api"

            [config]
            url = "http://127.0.0.1:1/api"
            format = "paginated_json"
            coordinate_system = "TWD97"
            filter_field = "charged"
            filter_pattern = "身汽"

            [config.fields_mapping]
            city = "fixed:新北市"
            area = "area"
            road = "road"
            x = "tw97x"
            y = "tw97y"
            "#,
        )
    }

    fn no_retry() -> FetchConfig {
        FetchConfig {
            max_retries: 0,
            base_delay_ms: 0,
            request_timeout_secs: 2,
            ..FetchConfig::default()
        }
    }

    fn context(dir: &std::path::Path, sink: &Arc<MemorySink>) -> SourceContext {
        let sink: Arc<dyn ReportSink> = sink.clone();
        SourceContext::new(Arc::new(CacheStore::new(dir, sink.clone())), sink)
    }

    fn taipei_archive() -> Vec<u8> {
        let columns = [("PKTYPE", 4), ("AREA", 12), ("ROAD", 20)];
        let rows = vec![
            vec!["03", "Xinyi", "Shifu Rd"],
            vec!["01", "Daan", "Xinsheng S Rd"],
            vec!["03", "Zhongshan", "Linsen N Rd"],
        ];
        let shapes = [
            square(302_000.0, 2_600_000.0, 10.0),
            square(303_000.0, 2_601_000.0, 10.0),
            square(304_000.0, 2_602_000.0, 10.0),
        ];
        let prj = br#"PROJCS["TWD97 / TM2 zone 121",AUTHORITY["EPSG","3826"]]"#;
        zip(&[
            ("parking.shp", shp(&shapes).as_slice()),
            ("parking.dbf", dbf(&columns, &rows).as_slice()),
            ("parking.prj", prj.as_slice()),
        ])
    }

    #[tokio::test]
    async fn shapefile_source_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(MemorySink::new());
        let ctx = context(dir.path(), &sink);
        ctx.cache
            .store("taipei_city", &taipei_archive())
            .await
            .unwrap();

        let handler = SourceHandler::new(taipei(), no_retry()).unwrap();
        assert_eq!(handler.kind(), HandlerKind::ShapefileArchive);

        let run = handler.run(&ctx).await.unwrap();
        assert_eq!(run.cache, CacheOutcome::Hit);
        assert_eq!(run.stats.raw, 3);
        assert_eq!(run.stats.filtered, 2);
        assert_eq!(run.locations.len(), 2);

        let first = &run.locations[0];
        assert_eq!(first.city, "臺北市");
        assert_eq!(first.area, "Xinyi");
        assert_eq!(first.road, "Shifu Rd");

        let (lon, lat) =
            parking_map_spatial::to_wgs84(302_005.0, 2_600_005.0, Crs::Twd97).unwrap();
        assert!((first.dd_long - lon).abs() < 1e-9);
        assert!((first.dd_lat - lat).abs() < 1e-9);
        assert_eq!(run.stats.crs_fallbacks, 0);
    }

    #[tokio::test]
    async fn paginated_source_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(MemorySink::new());
        let ctx = context(dir.path(), &sink);
        let payload = json!([
            {"charged": "身汽,身機", "area": "板橋區", "road": " 縣民大道 ", "tw97x": "296000", "tw97y": "2770000"},
            {"charged": "汽車", "area": "板橋區", "road": "文化路", "tw97x": "296100", "tw97y": "2770100"},
            {"charged": "身汽", "area": "中和區", "road": "中山路", "tw97x": "", "tw97y": "2765000"},
            {"charged": "身汽", "area": "永和區", "road": "永和路", "tw97x": 300_000.5, "tw97y": 2_768_000.5},
        ]);
        ctx.cache
            .store("new_taipei_city", &serde_json::to_vec(&payload).unwrap())
            .await
            .unwrap();

        let handler = SourceHandler::new(new_taipei(), no_retry()).unwrap();
        let run = handler.run(&ctx).await.unwrap();

        assert_eq!(run.stats.raw, 4);
        assert_eq!(run.stats.filtered, 3);
        assert_eq!(run.stats.skipped, 1);
        assert_eq!(run.locations.len(), 2);
        assert_eq!(run.locations[0].road, "縣民大道");
        assert_eq!(run.locations[1].area, "永和區");
        assert!(run.locations.iter().all(|l| l.city == "新北市"));

        let warnings = sink.with_severity(Severity::Warning);
        assert!(warnings.iter().any(|w| w.message.contains("Skipping record 2")));
    }

    #[tokio::test]
    async fn unreadable_cache_is_refetched_then_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(MemorySink::new());
        let ctx = context(dir.path(), &sink);
        ctx.cache
            .store("taipei_city", b"not a zip archive")
            .await
            .unwrap();

        let handler = SourceHandler::new(taipei(), no_retry()).unwrap();
        let result = handler.run(&ctx).await;

        assert!(matches!(
            result,
            Err(SourceError::Unavailable { ref source_id, .. }) if source_id == "taipei_city"
        ));
        assert!(ctx.cache.lookup("taipei_city").await.unwrap().is_none());
        assert!(
            sink.with_severity(Severity::Warning)
                .iter()
                .any(|w| w.message.contains("refetching"))
        );
    }

    #[tokio::test]
    async fn snapshots_are_written_per_stage() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot_dir = dir.path().join("snapshots");
        let sink = Arc::new(MemorySink::new());
        let ctx = context(&dir.path().join("cache"), &sink)
            .with_snapshot_dir(Some(snapshot_dir.clone()));
        ctx.cache
            .store("taipei_city", &taipei_archive())
            .await
            .unwrap();

        SourceHandler::new(taipei(), no_retry())
            .unwrap()
            .run(&ctx)
            .await
            .unwrap();

        let mut names: Vec<String> = std::fs::read_dir(&snapshot_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names.len(), 3);
        assert!(names[0].starts_with("taipei_city_filtered_"));
        assert!(names[1].starts_with("taipei_city_raw_"));
        assert!(names[2].starts_with("taipei_city_transformed_"));
    }

    #[test]
    fn transform_uses_declared_crs_unless_configured() {
        let sink = MemorySink::new();
        let Some(attributes) = json!({"AREA": "Xinyi", "ROAD": "Songgao Rd"})
            .as_object()
            .cloned()
        else {
            unreachable!()
        };
        let records = vec![
            RawRecord {
                index: 0,
                attributes: attributes.clone(),
                geometry: Some(geo::Point::new(302_000.0, 2_600_000.0).into()),
            },
            RawRecord {
                index: 1,
                attributes,
                geometry: None,
            },
        ];

        let handler = SourceHandler::new(taipei(), no_retry()).unwrap();
        let (candidates, skipped) = handler.transform(&records, Some("EPSG:3826"), &sink);
        assert_eq!(candidates.len(), 1);
        assert_eq!(skipped, 1);
        assert_eq!(candidates[0].crs_hint, Some(Crs::Twd97));
        assert_eq!(candidates[0].city, "臺北市");

        let (candidates, _) = handler.transform(&records, Some("unknown"), &sink);
        assert_eq!(candidates[0].crs_hint, None);

        let mut configured = taipei();
        configured.config.coordinate_system = parking_map_source_models::CoordinateSystem::Wgs84;
        let handler = SourceHandler::new(configured, no_retry()).unwrap();
        let (candidates, _) = handler.transform(&records, Some("EPSG:3826"), &sink);
        assert_eq!(candidates[0].crs_hint, Some(Crs::Wgs84));
    }

    #[test]
    fn unknown_handler_is_a_config_error() {
        let mut config = taipei();
        config.handler = "kaohsiung_handler".to_string();
        assert!(matches!(
            SourceHandler::new(config, FetchConfig::default()),
            Err(ConfigError::UnknownHandler { .. })
        ));
    }
}
