use serde::{Deserialize, Serialize};

use crate::error::{Result, ZonalError};

/// Determinants smaller than this are treated as a degenerate (zero-size) pixel.
const DET_EPSILON: f64 = 1e-12;

/// Six-coefficient affine mapping from pixel corner coordinates to geographic
/// coordinates:
///
///   x = a·col + b·row + c
///   y = d·col + e·row + f
///
/// The centre of cell `(col, row)` is at pixel coordinates `(col + 0.5, row + 0.5)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Affine {
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// Build from a GDAL geotransform `[c, a, b, f, d, e]`.
    pub fn from_gdal(c: f64, a: f64, b: f64, f: f64, d: f64, e: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// Coefficients in GDAL geotransform order.
    pub fn to_gdal(&self) -> [f64; 6] {
        [self.c, self.a, self.b, self.f, self.d, self.e]
    }

    /// North-up transform covering `[min_x, max_x] × [min_y, max_y]` with
    /// `width × height` cells; row 0 is the northern edge.
    pub fn from_extent(min_x: f64, min_y: f64, max_x: f64, max_y: f64, width: usize, height: usize) -> Self {
        let res_x = (max_x - min_x) / width as f64;
        let res_y = (max_y - min_y) / height as f64;
        Self::from_gdal(min_x, res_x, 0.0, max_y, 0.0, -res_y)
    }

    #[inline]
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.a * col + self.b * row + self.c,
            self.d * col + self.e * row + self.f,
        )
    }

    pub fn determinant(&self) -> f64 {
        self.a * self.e - self.b * self.d
    }

    pub fn is_invertible(&self) -> bool {
        let det = self.determinant();
        det.is_finite() && det.abs() > DET_EPSILON
    }

    /// The geographic → pixel mapping, or `None` for a degenerate transform.
    pub fn inverse(&self) -> Option<Affine> {
        if !self.is_invertible() {
            return None;
        }
        let det = self.determinant();
        let ia = self.e / det;
        let ib = -self.b / det;
        let id = -self.d / det;
        let ie = self.a / det;
        Some(Affine {
            a: ia,
            b: ib,
            c: -(ia * self.c + ib * self.f),
            d: id,
            e: ie,
            f: -(id * self.c + ie * self.f),
        })
    }
}

/// A single-band raster grid, row-major, with an affine georeference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RasterGrid {
    pub width: usize,
    pub height: usize,
    /// Row-major cell values, `height × width`.
    pub values: Vec<f64>,
    pub transform: Affine,
    /// Sentinel excluded from every statistic. NaN cells are always excluded.
    #[serde(default)]
    pub nodata: Option<f64>,
}

impl RasterGrid {
    /// Create a validated raster from a row-major buffer.
    pub fn new(width: usize, height: usize, values: Vec<f64>, transform: Affine, nodata: Option<f64>) -> Result<Self> {
        let grid = Self { width, height, values, transform, nodata };
        grid.validate()?;
        Ok(grid)
    }

    /// Create a validated raster from a list of equally long rows.
    pub fn from_rows(rows: &[Vec<f64>], transform: Affine, nodata: Option<f64>) -> Result<Self> {
        let height = rows.len();
        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        if let Some(bad) = rows.iter().position(|r| r.len() != width) {
            return Err(ZonalError::InvalidRaster(format!(
                "row {bad} has {} values, expected {width}",
                rows[bad].len()
            )));
        }
        let values = rows.iter().flatten().copied().collect();
        Self::new(width, height, values, transform, nodata)
    }

    /// Check the grid invariants: non-zero size, matching buffer, invertible transform.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ZonalError::InvalidRaster(format!(
                "zero-area raster ({}×{})",
                self.width, self.height
            )));
        }
        if self.values.len() != self.width * self.height {
            return Err(ZonalError::InvalidRaster(format!(
                "{} values for a {}×{} grid",
                self.values.len(),
                self.width,
                self.height
            )));
        }
        if !self.transform.is_invertible() {
            return Err(ZonalError::InvalidRaster(format!(
                "non-invertible transform (determinant {})",
                self.transform.determinant()
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.width + col]
    }

    /// True when `v` takes part in statistics (not NaN, not the no-data value).
    #[inline]
    pub fn is_valid_value(&self, v: f64) -> bool {
        is_valid(v, self.nodata)
    }

    /// Geographic coordinates of the centre of cell `(col, row)`.
    pub fn cell_center(&self, col: usize, row: usize) -> (f64, f64) {
        self.transform.apply(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Geographic extent `(min_x, min_y, max_x, max_y)` spanned by the four grid corners.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let (w, h) = (self.width as f64, self.height as f64);
        let corners = [
            self.transform.apply(0.0, 0.0),
            self.transform.apply(w, 0.0),
            self.transform.apply(0.0, h),
            self.transform.apply(w, h),
        ];
        corners.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(x0, y0, x1, y1), &(x, y)| (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        )
    }
}

/// Validity test shared by the raster and the aggregator's no-data override.
#[inline]
pub(crate) fn is_valid(v: f64, nodata: Option<f64>) -> bool {
    !v.is_nan() && nodata.map_or(true, |nd| v != nd)
}
