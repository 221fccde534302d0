//! Polygon → raster cell selection.
//!
//! Rings are mapped into pixel space with the inverse geotransform, so rotated
//! and south-up grids need no special casing. Only the polygon's bounding
//! window (clipped to the grid) is scanned.
//!
//! `Center`: a cell is covered when its centre `(col + 0.5, row + 0.5)` is
//! inside the polygon under the even-odd rule (holes excluded). Centres exactly
//! on a left/lower edge count as inside, on a right/upper edge as outside.
//!
//! `AllTouched`: the centre cells plus every cell crossed by any ring edge.

use crate::config::CellInclusion;
use crate::polygon::Polygon;
use crate::raster::{Affine, RasterGrid};

type PixelRing = Vec<(f64, f64)>;

/// Half-open pixel window `[col0, col1) × [row0, row1)` clipped to the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    col0: usize,
    col1: usize,
    row0: usize,
    row1: usize,
}

impl Window {
    fn cols(&self) -> usize {
        self.col1 - self.col0
    }

    fn is_empty(&self) -> bool {
        self.col0 >= self.col1 || self.row0 >= self.row1
    }
}

/// Flat (`row * width + col`) indices of the cells covered by `polygon`, in
/// row-major order. `to_pixel` is the inverse of the raster transform.
pub fn covered_cells(raster: &RasterGrid, to_pixel: &Affine, polygon: &Polygon, inclusion: CellInclusion) -> Vec<usize> {
    let rings: Vec<PixelRing> = polygon
        .rings()
        .map(|ring| ring.iter().map(|p| to_pixel.apply(p.x, p.y)).collect())
        .collect();

    let Some(window) = pixel_window(&rings[0], raster.width, raster.height) else {
        return Vec::new();
    };

    let mut mask = vec![false; window.cols() * (window.row1 - window.row0)];
    fill_centers(&rings, window, &mut mask);
    if inclusion == CellInclusion::AllTouched {
        for ring in &rings {
            for (p0, p1) in edges(ring) {
                mark_segment(p0, p1, window, &mut mask);
            }
        }
    }

    let cols = window.cols();
    mask.iter()
        .enumerate()
        .filter(|(_, &hit)| hit)
        .map(|(i, _)| (window.row0 + i / cols) * raster.width + window.col0 + i % cols)
        .collect()
}

fn pixel_window(exterior: &[(f64, f64)], width: usize, height: usize) -> Option<Window> {
    let (mut x0, mut y0, mut x1, mut y1) = (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
    for &(x, y) in exterior {
        x0 = x0.min(x);
        y0 = y0.min(y);
        x1 = x1.max(x);
        y1 = y1.max(y);
    }
    let clamp = |v: f64, hi: usize| v.max(0.0).min(hi as f64) as usize;
    let window = Window {
        col0: clamp(x0.floor(), width),
        col1: clamp(x1.ceil(), width),
        row0: clamp(y0.floor(), height),
        row1: clamp(y1.ceil(), height),
    };
    (!window.is_empty()).then_some(window)
}

/// Ring edges, closing the ring implicitly.
fn edges(ring: &[(f64, f64)]) -> impl Iterator<Item = ((f64, f64), (f64, f64))> + '_ {
    (0..ring.len()).map(move |i| (ring[i], ring[(i + 1) % ring.len()]))
}

/// Scanline fill of cell centres, one scanline per window row.
fn fill_centers(rings: &[PixelRing], window: Window, mask: &mut [bool]) {
    let cols = window.cols();
    let mut crossings: Vec<f64> = Vec::new();
    for row in window.row0..window.row1 {
        let yc = row as f64 + 0.5;
        crossings.clear();
        for ring in rings {
            for ((xa, ya), (xb, yb)) in edges(ring) {
                if (ya <= yc) != (yb <= yc) {
                    crossings.push(xa + (yc - ya) * (xb - xa) / (yb - ya));
                }
            }
        }
        crossings.sort_by(|a, b| a.total_cmp(b));

        let offset = (row - window.row0) * cols;
        for span in crossings.chunks_exact(2) {
            // Columns whose centre c + 0.5 lies in [span[0], span[1]).
            let first = (span[0] - 0.5).ceil().max(window.col0 as f64);
            let last = (span[1] - 0.5).ceil().min(window.col1 as f64);
            if first >= last {
                continue;
            }
            for col in first as usize..last as usize {
                mask[offset + col - window.col0] = true;
            }
        }
    }
}

/// Mark every window cell the segment `p0 → p1` passes through (grid traversal
/// after clipping the segment to the window).
fn mark_segment(p0: (f64, f64), p1: (f64, f64), window: Window, mask: &mut [bool]) {
    let bounds = (
        window.col0 as f64,
        window.row0 as f64,
        window.col1 as f64,
        window.row1 as f64,
    );
    let Some(((x0, y0), (x1, y1))) = clip_segment(p0, p1, bounds) else {
        return;
    };

    let cols = window.cols() as i64;
    let rows = (window.row1 - window.row0) as i64;
    let mut mark = |cx: f64, cy: f64| {
        let c = cx as i64 - window.col0 as i64;
        let r = cy as i64 - window.row0 as i64;
        if (0..cols).contains(&c) && (0..rows).contains(&r) {
            mask[(r * cols + c) as usize] = true;
        }
    };

    let (dx, dy) = (x1 - x0, y1 - y0);
    let (mut cx, mut cy) = (x0.floor(), y0.floor());
    let (end_x, end_y) = (x1.floor(), y1.floor());
    let step_x = dx.signum();
    let step_y = dy.signum();
    let t_delta_x = if dx != 0.0 { 1.0 / dx.abs() } else { f64::INFINITY };
    let t_delta_y = if dy != 0.0 { 1.0 / dy.abs() } else { f64::INFINITY };
    let mut t_max_x = if dx > 0.0 {
        (cx + 1.0 - x0) / dx
    } else if dx < 0.0 {
        (cx - x0) / dx
    } else {
        f64::INFINITY
    };
    let mut t_max_y = if dy > 0.0 {
        (cy + 1.0 - y0) / dy
    } else if dy < 0.0 {
        (cy - y0) / dy
    } else {
        f64::INFINITY
    };

    let steps = ((end_x - cx).abs() + (end_y - cy).abs()) as usize;
    mark(cx, cy);
    for _ in 0..steps {
        if t_max_x < t_max_y {
            cx += step_x;
            t_max_x += t_delta_x;
        } else {
            cy += step_y;
            t_max_y += t_delta_y;
        }
        mark(cx, cy);
    }
}

/// Liang–Barsky clip of a segment against `(xmin, ymin, xmax, ymax)`.
fn clip_segment(
    (x0, y0): (f64, f64),
    (x1, y1): (f64, f64),
    (xmin, ymin, xmax, ymax): (f64, f64, f64, f64),
) -> Option<((f64, f64), (f64, f64))> {
    let (dx, dy) = (x1 - x0, y1 - y0);
    let mut t0 = 0.0f64;
    let mut t1 = 1.0f64;
    for (p, q) in [(-dx, x0 - xmin), (dx, xmax - x0), (-dy, y0 - ymin), (dy, ymax - y0)] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
        } else {
            let t = q / p;
            if p < 0.0 {
                t0 = t0.max(t);
            } else {
                t1 = t1.min(t);
            }
        }
    }
    (t0 <= t1).then(|| ((x0 + t0 * dx, y0 + t0 * dy), (x0 + t1 * dx, y0 + t1 * dy)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polygon::Point;

    fn grid(width: usize, height: usize) -> RasterGrid {
        let aff = Affine::from_gdal(0.0, 1.0, 0.0, height as f64, 0.0, -1.0);
        RasterGrid::new(width, height, vec![1.0; width * height], aff, None).unwrap()
    }

    fn cells(raster: &RasterGrid, poly: &Polygon, inclusion: CellInclusion) -> Vec<usize> {
        let inv = raster.transform.inverse().unwrap();
        covered_cells(raster, &inv, poly, inclusion)
    }

    #[test]
    fn single_cell_square() {
        let r = grid(4, 4);
        let poly = Polygon::rectangle(0, 0.0, 3.0, 1.0, 4.0);
        assert_eq!(cells(&r, &poly, CellInclusion::Center), vec![0]);
    }

    #[test]
    fn full_extent_covers_every_cell() {
        let r = grid(4, 4);
        let poly = Polygon::rectangle(0, 0.0, 0.0, 4.0, 4.0);
        assert_eq!(cells(&r, &poly, CellInclusion::Center), (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn outside_polygon_covers_nothing() {
        let r = grid(4, 4);
        let poly = Polygon::rectangle(0, 10.0, 10.0, 12.0, 12.0);
        assert!(cells(&r, &poly, CellInclusion::Center).is_empty());
        assert!(cells(&r, &poly, CellInclusion::AllTouched).is_empty());
    }

    #[test]
    fn hole_removes_interior_cells() {
        let r = grid(4, 4);
        let outer = Polygon::rectangle(0, 0.0, 0.0, 4.0, 4.0).exterior;
        let hole = Polygon::rectangle(0, 1.0, 1.0, 3.0, 3.0).exterior;
        let poly = Polygon::with_holes(0, outer, vec![hole]);
        // Inner 2×2 block is rows 1..3, cols 1..3.
        let got = cells(&r, &poly, CellInclusion::Center);
        assert_eq!(got.len(), 12);
        for idx in [5, 6, 9, 10] {
            assert!(!got.contains(&idx));
        }
    }

    #[test]
    fn small_polygon_misses_centre_but_touches_cell() {
        let r = grid(4, 4);
        // Tiny triangle inside cell (col 2, row 1) away from its centre (2.5, 2.5).
        let poly = Polygon::new(0, vec![Point::new(2.05, 2.05), Point::new(2.2, 2.05), Point::new(2.05, 2.2)]);
        assert!(cells(&r, &poly, CellInclusion::Center).is_empty());
        assert_eq!(cells(&r, &poly, CellInclusion::AllTouched), vec![6]);
    }

    #[test]
    fn all_touched_is_superset_of_center() {
        let r = grid(20, 20);
        let poly = Polygon::circle(0, Point::new(9.3, 10.7), 4.2, 64);
        let center = cells(&r, &poly, CellInclusion::Center);
        let touched = cells(&r, &poly, CellInclusion::AllTouched);
        assert!(!center.is_empty());
        assert!(touched.len() > center.len());
        assert!(center.iter().all(|c| touched.contains(c)));
        // Row-major, no duplicates.
        assert!(touched.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn partially_outside_polygon_is_clipped() {
        let r = grid(4, 4);
        let poly = Polygon::rectangle(0, -10.0, -10.0, 1.0, 1.0);
        // Only cell (col 0, row 3) has its centre inside.
        assert_eq!(cells(&r, &poly, CellInclusion::Center), vec![12]);
    }

    #[test]
    fn clip_segment_rejects_outside() {
        assert!(clip_segment((-5.0, -5.0), (-1.0, -1.0), (0.0, 0.0, 4.0, 4.0)).is_none());
        let ((x0, y0), (x1, y1)) = clip_segment((-2.0, 2.0), (6.0, 2.0), (0.0, 0.0, 4.0, 4.0)).unwrap();
        assert_eq!((x0, y0, x1, y1), (0.0, 2.0, 4.0, 2.0));
    }
}
