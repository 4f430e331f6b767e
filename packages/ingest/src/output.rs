//! Output artifact and report files.
//!
//! Both files are written to a temporary sibling and renamed into place,
//! so a reader never sees a half-written artifact and a failed run leaves
//! the previous one untouched.

use std::path::{Path, PathBuf};

use parking_map_ingest_models::ValidationReport;
use parking_map_parking_models::{LocationRow, OUTPUT_COLUMNS, ParkingLocation};

use crate::PipelineError;

/// Byte-order mark prepended to the CSV for spreadsheet applications.
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PipelineError + '_ {
    move |source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Writes `bytes` to `path` via a temporary file in the same directory.
///
/// # Errors
///
/// Returns [`PipelineError::Io`] if the directory cannot be created or the
/// file cannot be written or renamed.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PipelineError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(io_error(dir))?;

    let file_name = path
        .file_name()
        .map_or_else(|| "output".into(), |n| n.to_string_lossy());
    let tmp: PathBuf = dir.join(format!(".{file_name}.tmp"));

    std::fs::write(&tmp, bytes).map_err(io_error(&tmp))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_error(path)(e));
    }
    Ok(())
}

/// Renders locations as the output CSV: BOM, header row, one row per
/// location.
///
/// # Errors
///
/// Returns [`PipelineError::Csv`] if a row cannot be serialized.
pub fn render_csv(locations: &[ParkingLocation]) -> Result<Vec<u8>, PipelineError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(UTF8_BOM.to_vec());

    writer.write_record(OUTPUT_COLUMNS)?;
    for location in locations {
        writer.serialize(location)?;
    }

    writer
        .into_inner()
        .map_err(|e| PipelineError::Io {
            path: PathBuf::from("<csv buffer>"),
            source: e.into_error(),
        })
}

/// Writes the output artifact.
///
/// # Errors
///
/// Returns [`PipelineError`] if rendering or writing fails.
pub fn write_locations(path: &Path, locations: &[ParkingLocation]) -> Result<(), PipelineError> {
    let bytes = render_csv(locations)?;
    write_atomic(path, &bytes)?;
    log::info!("Wrote {} locations to {}", locations.len(), path.display());
    Ok(())
}

/// Reads an output artifact back as loosely-typed rows. A leading BOM is
/// skipped; short rows leave the missing cells empty.
///
/// # Errors
///
/// Returns [`PipelineError::Io`] if the file cannot be read, or
/// [`PipelineError::Csv`] if it is not CSV.
pub fn read_rows(path: &Path) -> Result<Vec<LocationRow>, PipelineError> {
    let bytes = std::fs::read(path).map_err(io_error(path))?;
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes);

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body);

    reader
        .deserialize()
        .collect::<Result<Vec<LocationRow>, _>>()
        .map_err(PipelineError::from)
}

/// Writes the validation report as pretty JSON.
///
/// # Errors
///
/// Returns [`PipelineError`] if serialization or writing fails.
pub fn write_report(path: &Path, report: &ValidationReport) -> Result<(), PipelineError> {
    let mut bytes = serde_json::to_vec_pretty(report)?;
    bytes.push(b'\n');
    write_atomic(path, &bytes)
}

#[cfg(test)]
mod tests {
    use parking_map_ingest_models::{Issue, IssueKind};

    use super::*;

    fn taipei() -> ParkingLocation {
        ParkingLocation {
            city: "臺北市".to_string(),
            area: "中正區".to_string(),
            road: "重慶南路一段, 近總統府".to_string(),
            dd_lat: 25.033,
            dd_long: 121.5654,
            dms_lat: "25°01'58.80\"N".to_string(),
            dms_long: "121°33'55.44\"E".to_string(),
        }
    }

    #[test]
    fn csv_starts_with_bom_and_header() {
        let bytes = render_csv(&[taipei()]).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));

        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(OUTPUT_COLUMNS.join(",").as_str()));
        assert_eq!(lines.count(), 1);
    }

    #[test]
    fn empty_output_still_has_a_header() {
        let bytes = render_csv(&[]).unwrap();
        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        assert_eq!(text.trim_end(), OUTPUT_COLUMNS.join(","));
    }

    #[test]
    fn written_file_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("parking_locations.csv");

        write_locations(&path, &[taipei()]).unwrap();
        let rows = read_rows(&path).unwrap();

        assert_eq!(rows, vec![LocationRow::from(&taipei())]);
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn hand_edited_rows_load_with_gaps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edited.csv");
        std::fs::write(
            &path,
            "city,area,road,dd_lat,dd_long,dms_lat,dms_long\n臺北市,,,n/a,121.5\n",
        )
        .unwrap();

        let rows = read_rows(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].dd_lat, None);
        assert_eq!(rows[0].dd_long, Some(121.5));
        assert_eq!(rows[0].dms_lat, None);
    }

    #[test]
    fn report_is_pretty_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("validation_report.json");
        let mut report = ValidationReport::default();
        report.push(Issue {
            row: 3,
            kind: IssueKind::Duplicate,
            field: None,
            message: "repeat".to_string(),
        });

        write_report(&path, &report).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n  \"warnings\""));
        let parsed: ValidationReport = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_rows(&dir.path().join("absent.csv")),
            Err(PipelineError::Io { .. })
        ));
    }
}
