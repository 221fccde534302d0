//! Polygon geometry in the raster's geographic coordinate space.
//! All coordinate math uses f64.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ZonalError};

/// A vertex in geographic coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min_x <= other.max_x && other.min_x <= self.max_x && self.min_y <= other.max_y && other.min_y <= self.max_y
    }
}

/// A simple polygon with optional holes. Rings may be explicitly closed
/// (first == last) or implicitly closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub id: usize,
    pub exterior: Vec<Point>,
    #[serde(default)]
    pub holes: Vec<Vec<Point>>,
}

impl Polygon {
    pub fn new(id: usize, exterior: Vec<Point>) -> Self {
        Self { id, exterior, holes: Vec::new() }
    }

    pub fn with_holes(id: usize, exterior: Vec<Point>, holes: Vec<Vec<Point>>) -> Self {
        Self { id, exterior, holes }
    }

    /// Axis-aligned rectangle `[min_x, max_x] × [min_y, max_y]`.
    pub fn rectangle(id: usize, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self::new(
            id,
            vec![
                Point::new(min_x, min_y),
                Point::new(max_x, min_y),
                Point::new(max_x, max_y),
                Point::new(min_x, max_y),
                Point::new(min_x, min_y),
            ],
        )
    }

    /// Regular `segments`-gon approximating a circle.
    pub fn circle(id: usize, center: Point, radius: f64, segments: usize) -> Self {
        let step = std::f64::consts::TAU / segments as f64;
        let ring = (0..segments)
            .map(|i| {
                let t = i as f64 * step;
                Point::new(center.x + radius * t.cos(), center.y + radius * t.sin())
            })
            .collect();
        Self::new(id, ring)
    }

    /// Exterior followed by every hole.
    pub fn rings(&self) -> impl Iterator<Item = &[Point]> {
        std::iter::once(self.exterior.as_slice()).chain(self.holes.iter().map(|h| h.as_slice()))
    }

    pub fn bounds(&self) -> Bounds {
        self.exterior.iter().fold(
            Bounds {
                min_x: f64::INFINITY,
                min_y: f64::INFINITY,
                max_x: f64::NEG_INFINITY,
                max_y: f64::NEG_INFINITY,
            },
            |b, p| Bounds {
                min_x: b.min_x.min(p.x),
                min_y: b.min_y.min(p.y),
                max_x: b.max_x.max(p.x),
                max_y: b.max_y.max(p.y),
            },
        )
    }

    /// Reject degenerate rings: every ring needs 3 distinct finite vertices.
    /// Self-intersection is not checked.
    pub fn validate(&self) -> Result<()> {
        for (i, ring) in self.rings().enumerate() {
            let what = if i == 0 { "exterior ring".to_string() } else { format!("hole {}", i - 1) };
            if ring.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
                return Err(self.invalid(format!("{what} has non-finite coordinates")));
            }
            let distinct = distinct_vertices(ring);
            if distinct < 3 {
                return Err(self.invalid(format!("{what} has {distinct} distinct vertices, need at least 3")));
            }
        }
        Ok(())
    }

    fn invalid(&self, reason: String) -> ZonalError {
        ZonalError::InvalidPolygon { id: self.id, reason }
    }
}

fn distinct_vertices(ring: &[Point]) -> usize {
    let mut seen: Vec<Point> = Vec::with_capacity(ring.len());
    for p in ring {
        if !seen.contains(p) {
            seen.push(*p);
        }
    }
    seen.len()
}
