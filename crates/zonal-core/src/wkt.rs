//! Well-known-text polygon reader on top of the `wkt` crate.
//!
//! Accepts `POLYGON ((x y, x y, ...), (hole ...), ...)`, optionally tagged
//! `Z`, `M` or `ZM`; only `x` and `y` are kept. `POLYGON EMPTY` and every
//! other geometry type are rejected.

use std::str::FromStr;

use wkt::types::LineString;
use wkt::Wkt;

use crate::error::{Result, ZonalError};
use crate::polygon::{Point, Polygon};

/// Parse a single WKT polygon and give it `id`.
pub fn parse_wkt_polygon(text: &str, id: usize) -> Result<Polygon> {
    parse_line(text, id, 1)
}

/// Parse one polygon per non-blank line; ids follow line order (0, 1, ...).
/// Lines starting with `#` are skipped.
pub fn parse_wkt_lines(text: &str) -> Result<Vec<Polygon>> {
    let mut polygons = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        polygons.push(parse_line(line, polygons.len(), i + 1)?);
    }
    Ok(polygons)
}

fn parse_line(text: &str, id: usize, line: usize) -> Result<Polygon> {
    let err = |message: String| ZonalError::Wkt { line, message };

    let geometry = Wkt::<f64>::from_str(text.trim()).map_err(|e| err(format!("{e} in `{}`", truncate(text.trim()))))?;
    let polygon = match geometry {
        Wkt::Polygon(polygon) => polygon,
        other => return Err(err(format!("expected POLYGON, found {}", kind(&other)))),
    };

    let mut rings = polygon.0.into_iter().map(ring_points);
    let exterior = rings.next().ok_or_else(|| err("empty polygon".into()))?;
    Ok(Polygon::with_holes(id, exterior, rings.collect()))
}

fn ring_points(ring: LineString<f64>) -> Vec<Point> {
    ring.0.into_iter().map(|c| Point::new(c.x, c.y)).collect()
}

fn kind(geometry: &Wkt<f64>) -> &'static str {
    match geometry {
        Wkt::Point(_) => "POINT",
        Wkt::LineString(_) => "LINESTRING",
        Wkt::Polygon(_) => "POLYGON",
        Wkt::MultiPoint(_) => "MULTIPOINT",
        Wkt::MultiLineString(_) => "MULTILINESTRING",
        Wkt::MultiPolygon(_) => "MULTIPOLYGON",
        Wkt::GeometryCollection(_) => "GEOMETRYCOLLECTION",
        #[allow(unreachable_patterns)]
        _ => "unknown geometry",
    }
}

fn truncate(s: &str) -> &str {
    match s.char_indices().nth(48) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
