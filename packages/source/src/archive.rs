//! Zipped shapefile reading.
//!
//! The archive's first `.shp` entry is read together with the `.dbf` that
//! shares its stem; a `.prj` with the same stem, when present, supplies the
//! declared CRS. Attribute rows become JSON maps and shapes become
//! [`geo::Geometry`] values.

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};

use geo::{Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
use serde_json::{Map, Value};
use shapefile::dbase::FieldValue;
use shapefile::{PolygonRing, Shape};

use parking_map_parking_models::report::ReportSink;

use crate::{RawRecord, SourceError};

/// Records read from one shapefile layer.
#[derive(Debug, Clone)]
pub struct ShapefileLayer {
    /// Archive entry name of the `.shp` file.
    pub name: String,
    /// One record per shape, in file order.
    pub records: Vec<RawRecord>,
    /// Contents of the matching `.prj`, if the archive has one.
    pub prj: Option<String>,
}

/// Reads the first shapefile layer from zip archive bytes.
///
/// A shape or attribute row that cannot be decoded is skipped with a
/// warning; the rest of the layer is kept.
///
/// # Errors
///
/// Returns [`SourceError::Archive`] if the bytes are not a zip archive, the
/// archive has no `.shp` entry or no matching `.dbf`, or either file has an
/// unreadable header.
pub fn read_archive(
    source_id: &str,
    bytes: &[u8],
    sink: &dyn ReportSink,
) -> Result<ShapefileLayer, SourceError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| SourceError::Archive(format!("not a zip archive: {e}")))?;

    let names: Vec<String> = archive.file_names().map(str::to_owned).collect();

    let shp_name = names
        .iter()
        .filter(|name| !is_resource_fork(name))
        .find(|name| name.to_ascii_lowercase().ends_with(".shp"))
        .ok_or_else(|| SourceError::Archive("archive contains no .shp file".to_string()))?
        .clone();
    let stem = &shp_name[..shp_name.len() - ".shp".len()];

    let sibling = |extension: &str| {
        let wanted = format!("{stem}.{extension}").to_ascii_lowercase();
        names
            .iter()
            .find(|name| name.to_ascii_lowercase() == wanted)
            .cloned()
    };

    let dbf_name = sibling("dbf")
        .ok_or_else(|| SourceError::Archive(format!("no .dbf found for {shp_name}")))?;
    let prj_name = sibling("prj");

    log::debug!("Reading shapefile layer {shp_name} (attributes from {dbf_name})");

    let shp = read_entry(&mut archive, &shp_name)?;
    let dbf = read_entry(&mut archive, &dbf_name)?;
    let prj = match prj_name {
        Some(name) => {
            let raw = read_entry(&mut archive, &name)?;
            Some(String::from_utf8_lossy(&raw).trim().to_string())
        }
        None => None,
    };

    let records = read_layer(source_id, shp, dbf, sink)?;

    Ok(ShapefileLayer {
        name: shp_name,
        records,
        prj,
    })
}

/// macOS archivers add `__MACOSX/` copies and `._` resource forks.
fn is_resource_fork(name: &str) -> bool {
    name.starts_with("__MACOSX/")
        || name
            .rsplit('/')
            .next()
            .is_some_and(|file| file.starts_with("._"))
}

fn read_entry<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> Result<Vec<u8>, SourceError> {
    let mut entry = archive
        .by_name(name)
        .map_err(|e| SourceError::Archive(format!("cannot open {name}: {e}")))?;
    let mut buffer = Vec::new();
    entry.read_to_end(&mut buffer)?;
    Ok(buffer)
}

/// Decodes `.shp` and `.dbf` bytes into records.
fn read_layer(
    source_id: &str,
    shp: Vec<u8>,
    dbf: Vec<u8>,
    sink: &dyn ReportSink,
) -> Result<Vec<RawRecord>, SourceError> {
    let shape_reader = shapefile::ShapeReader::new(Cursor::new(shp))
        .map_err(|e| SourceError::Archive(format!("invalid .shp: {e}")))?;
    let dbase_reader = shapefile::dbase::Reader::new(Cursor::new(dbf))
        .map_err(|e| SourceError::Archive(format!("invalid .dbf: {e}")))?;
    let mut reader = shapefile::Reader::new(shape_reader, dbase_reader);

    let mut records = Vec::new();
    for (index, result) in reader.iter_shapes_and_records().enumerate() {
        let (shape, row) = match result {
            Ok(pair) => pair,
            Err(e) => {
                sink.warn(source_id, &format!("Skipping shapefile record {index}: {e}"));
                continue;
            }
        };

        let attributes = HashMap::<String, FieldValue>::from(row)
            .into_iter()
            .map(|(name, value)| (name.trim().to_string(), field_to_json(value)))
            .collect::<Map<String, Value>>();

        records.push(RawRecord {
            index,
            attributes,
            geometry: shape_to_geometry(shape),
        });
    }

    Ok(records)
}

fn field_to_json(value: FieldValue) -> Value {
    match value {
        FieldValue::Character(Some(text)) | FieldValue::Memo(text) => {
            Value::String(text.trim().to_string())
        }
        FieldValue::Numeric(Some(n)) | FieldValue::Double(n) | FieldValue::Currency(n) => {
            number(n)
        }
        FieldValue::Float(Some(n)) => number(f64::from(n)),
        FieldValue::Integer(n) => Value::from(n),
        FieldValue::Logical(Some(b)) => Value::Bool(b),
        _ => Value::Null,
    }
}

fn number(n: f64) -> Value {
    serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
}

/// Converts a shape into a geometry. Null and multipatch shapes have none.
fn shape_to_geometry(shape: Shape) -> Option<Geometry<f64>> {
    match shape {
        Shape::Point(p) => Some(Point::new(p.x, p.y).into()),
        Shape::PointM(p) => Some(Point::new(p.x, p.y).into()),
        Shape::PointZ(p) => Some(Point::new(p.x, p.y).into()),
        Shape::Polygon(polygon) => Some(rings_to_polygons(polygon.rings(), |p| (p.x, p.y))),
        Shape::PolygonM(polygon) => Some(rings_to_polygons(polygon.rings(), |p| (p.x, p.y))),
        Shape::PolygonZ(polygon) => Some(rings_to_polygons(polygon.rings(), |p| (p.x, p.y))),
        Shape::Polyline(line) => Some(
            MultiLineString::new(
                line.parts()
                    .iter()
                    .map(|part| part.iter().map(|p| Coord { x: p.x, y: p.y }).collect())
                    .collect(),
            )
            .into(),
        ),
        Shape::Multipoint(points) => Some(
            MultiPoint::new(points.points().iter().map(|p| Point::new(p.x, p.y)).collect())
                .into(),
        ),
        other => {
            log::debug!("Shape type {:?} has no usable geometry", other.shapetype());
            None
        }
    }
}

/// Groups shapefile rings into polygons: each outer ring starts a polygon
/// and the inner rings that follow are its holes.
fn rings_to_polygons<P>(rings: &[PolygonRing<P>], xy: impl Fn(&P) -> (f64, f64)) -> Geometry<f64> {
    let to_line = |points: &[P]| -> LineString<f64> {
        points
            .iter()
            .map(|p| {
                let (x, y) = xy(p);
                Coord { x, y }
            })
            .collect()
    };

    let mut polygons: Vec<Polygon<f64>> = Vec::new();
    for ring in rings {
        match ring {
            PolygonRing::Outer(points) => {
                polygons.push(Polygon::new(to_line(points), Vec::new()));
            }
            PolygonRing::Inner(points) => match polygons.last_mut() {
                Some(polygon) => polygon.interiors_push(to_line(points)),
                None => polygons.push(Polygon::new(to_line(points), Vec::new())),
            },
        }
    }

    if polygons.len() == 1
        && let Some(polygon) = polygons.pop()
    {
        return polygon.into();
    }
    MultiPolygon::new(polygons).into()
}
