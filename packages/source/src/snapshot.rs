//! Per-stage CSV dumps for debugging a source.
//!
//! Snapshots are best effort: a failed write is logged and the run goes on.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use parking_map_spatial::reduce::geometry_kind;

use crate::fields::value_to_string;
use crate::{Candidate, RawRecord};

/// Pipeline stage a snapshot captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Records as fetched.
    Raw,
    /// Records after the filter.
    Filtered,
    /// Candidates after field mapping and geometry reduction.
    Transformed,
}

impl Stage {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Filtered => "filtered",
            Self::Transformed => "transformed",
        }
    }
}

/// Writes `{source_id}_{stage}_{timestamp}.csv` files into one directory.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    dir: PathBuf,
    source_id: String,
    timestamp: String,
}

impl SnapshotWriter {
    /// Creates a writer stamped with the current local time.
    #[must_use]
    pub fn new(dir: &Path, source_id: &str) -> Self {
        Self {
            dir: dir.to_path_buf(),
            source_id: source_id.to_string(),
            timestamp: chrono::Local::now().format("%Y%m%d_%H%M%S").to_string(),
        }
    }

    /// Path of the snapshot for `stage`.
    #[must_use]
    pub fn path(&self, stage: Stage) -> PathBuf {
        self.dir.join(format!(
            "{}_{}_{}.csv",
            self.source_id,
            stage.as_str(),
            self.timestamp
        ))
    }

    /// Dumps raw or filtered records. Columns are the sorted union of
    /// attribute names, plus `geometry` when any record has one.
    pub fn records(&self, stage: Stage, records: &[RawRecord]) {
        let result = self.write(stage, |writer| {
            let columns: BTreeSet<&str> = records
                .iter()
                .flat_map(|r| r.attributes.keys().map(String::as_str))
                .collect();
            let has_geometry = records.iter().any(|r| r.geometry.is_some());

            let mut header: Vec<&str> = columns.iter().copied().collect();
            if has_geometry {
                header.push("geometry");
            }
            writer.write_record(&header)?;

            for record in records {
                let mut row: Vec<String> = columns
                    .iter()
                    .map(|column| {
                        record
                            .attributes
                            .get(*column)
                            .map(value_to_string)
                            .unwrap_or_default()
                    })
                    .collect();
                if has_geometry {
                    row.push(
                        record
                            .geometry
                            .as_ref()
                            .map(geometry_kind)
                            .unwrap_or_default()
                            .to_string(),
                    );
                }
                writer.write_record(&row)?;
            }
            Ok(())
        });
        self.finish(stage, records.len(), result);
    }

    /// Dumps transformed candidates.
    pub fn candidates(&self, candidates: &[Candidate]) {
        let result = self.write(Stage::Transformed, |writer| {
            writer.write_record(["index", "x", "y", "crs", "city", "area", "road"])?;
            for c in candidates {
                writer.write_record([
                    c.index.to_string(),
                    c.x.to_string(),
                    c.y.to_string(),
                    c.crs_hint.map(|crs| crs.to_string()).unwrap_or_default(),
                    c.city.clone(),
                    c.area.clone(),
                    c.road.clone(),
                ])?;
            }
            Ok(())
        });
        self.finish(Stage::Transformed, candidates.len(), result);
    }

    fn write(
        &self,
        stage: Stage,
        body: impl FnOnce(&mut csv::Writer<std::fs::File>) -> Result<(), csv::Error>,
    ) -> Result<(), csv::Error> {
        std::fs::create_dir_all(&self.dir)?;
        let mut writer = csv::Writer::from_path(self.path(stage))?;
        body(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    fn finish(&self, stage: Stage, rows: usize, result: Result<(), csv::Error>) {
        match result {
            Ok(()) => log::debug!(
                "[{}] Wrote {rows} rows to {}",
                self.source_id,
                self.path(stage).display()
            ),
            Err(e) => log::warn!(
                "[{}] Failed to write {} snapshot: {e}",
                self.source_id,
                stage.as_str()
            ),
        }
    }
}
