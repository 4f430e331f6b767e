//! Polygon → representative point reduction.

use geo::{Centroid, Geometry};

use crate::SpatialError;

/// Short name of a geometry variant, for error messages.
#[must_use]
pub const fn geometry_kind(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

/// Reduces a geometry to a single `(x, y)` point.
///
/// Points pass through. Polygons and multipolygons reduce to their
/// area-weighted centroid; for a multipolygon every part is weighted by its
/// area together, not averaged per part.
///
/// # Errors
///
/// Returns [`SpatialError::UnsupportedGeometry`] for any other geometry kind
/// and [`SpatialError::DegenerateGeometry`] for an empty polygon.
pub fn reduce(geometry: &Geometry<f64>) -> Result<(f64, f64), SpatialError> {
    let point = match geometry {
        Geometry::Point(point) => Some(*point),
        Geometry::Polygon(polygon) => polygon.centroid(),
        Geometry::MultiPolygon(multi) => multi.centroid(),
        other => {
            return Err(SpatialError::UnsupportedGeometry(
                geometry_kind(other).to_string(),
            ));
        }
    };

    point
        .map(|p| (p.x(), p.y()))
        .ok_or_else(|| SpatialError::DegenerateGeometry(geometry_kind(geometry).to_string()))
}

#[cfg(test)]
mod tests {
    use geo::{LineString, MultiPolygon, Point, Polygon, line_string, polygon};

    use super::*;

    fn square(x0: f64, y0: f64, side: f64) -> Polygon<f64> {
        polygon![
            (x: x0, y: y0),
            (x: x0 + side, y: y0),
            (x: x0 + side, y: y0 + side),
            (x: x0, y: y0 + side),
            (x: x0, y: y0),
        ]
    }

    #[test]
    fn unit_square_centroid() {
        let (x, y) = reduce(&Geometry::Polygon(square(0.0, 0.0, 1.0))).unwrap();
        assert!((x - 0.5).abs() < 1e-12);
        assert!((y - 0.5).abs() < 1e-12);
    }

    #[test]
    fn point_passes_through() {
        let (x, y) = reduce(&Geometry::Point(Point::new(302_000.0, 2_600_000.0))).unwrap();
        assert_eq!((x, y), (302_000.0, 2_600_000.0));
    }

    #[test]
    fn multipolygon_is_area_weighted() {
        // Unit square at the origin plus a 3x3 square at (10, 0). The mean of
        // part centroids would be x = 5.75; area weighting gives
        // (0.5 * 1 + 11.5 * 9) / 10 = 10.4.
        let multi = MultiPolygon::new(vec![square(0.0, 0.0, 1.0), square(10.0, 0.0, 3.0)]);
        let (x, y) = reduce(&Geometry::MultiPolygon(multi)).unwrap();

        assert!((x - 10.4).abs() < 1e-9, "x {x}");
        assert!((y - 1.4).abs() < 1e-9, "y {y}");
    }

    #[test]
    fn line_is_unsupported() {
        let line: LineString<f64> = line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)];
        let err = reduce(&Geometry::LineString(line)).unwrap_err();
        assert!(matches!(err, SpatialError::UnsupportedGeometry(kind) if kind == "LineString"));
    }

    #[test]
    fn empty_polygon_is_degenerate() {
        let empty = Polygon::new(LineString::new(vec![]), vec![]);
        assert!(matches!(
            reduce(&Geometry::Polygon(empty)),
            Err(SpatialError::DegenerateGeometry(_))
        ));
    }
}
