//! Zonal aggregation: statistics of raster cells under each polygon.
//!
//! For every polygon, in input order:
//!   1. validate the rings (fail fast on degenerate polygons),
//!   2. select covered cells in pixel space (see [`crate::rasterize`]),
//!   3. drop NaN and no-data cells,
//!   4. evaluate the planned statistics over the remaining values.
//!
//! A polygon with no valid cell (including one entirely off the raster) gets
//! `count = 0` and null statistics.
use tracing::debug;

use crate::config::{CellInclusion, StatsConfig};
use crate::error::{Result, ZonalError};
use crate::polygon::{Bounds, Polygon};
use crate::raster::{is_valid, Affine, RasterGrid};
use crate::rasterize::covered_cells;
use crate::record::StatisticsRecord;
use crate::stats::{StatPlan, StatRegistry};

/// Immutable evaluation context handed to every worker: the raster, its
/// inverse transform, the resolved statistics and the inclusion rule.
#[derive(Debug, Clone)]
pub struct ZonalStats<'a> {
    raster: &'a RasterGrid,
    to_pixel: Affine,
    extent: Bounds,
    plan: StatPlan,
    inclusion: CellInclusion,
    nodata: Option<f64>,
}

impl<'a> ZonalStats<'a> {
    /// Validate the raster and resolve the requested statistics.
    pub fn new(raster: &'a RasterGrid, config: &StatsConfig, registry: &StatRegistry) -> Result<Self> {
        raster.validate()?;
        let to_pixel = raster
            .transform
            .inverse()
            .ok_or_else(|| ZonalError::InvalidRaster("non-invertible transform".into()))?;
        let (min_x, min_y, max_x, max_y) = raster.bounds();
        Ok(Self {
            raster,
            to_pixel,
            extent: Bounds { min_x, min_y, max_x, max_y },
            plan: registry.plan(&config.stats)?,
            inclusion: config.inclusion,
            nodata: config.nodata_override.or(raster.nodata),
        })
    }

    pub fn raster(&self) -> &RasterGrid {
        self.raster
    }

    pub fn plan(&self) -> &StatPlan {
        &self.plan
    }

    /// One record per polygon, in input order.
    pub fn compute(&self, polygons: &[Polygon]) -> Result<Vec<StatisticsRecord>> {
        polygons.iter().map(|p| self.compute_one(p)).collect()
    }

    pub fn compute_one(&self, polygon: &Polygon) -> Result<StatisticsRecord> {
        polygon.validate()?;
        let values = self.zone_values(polygon);
        Ok(StatisticsRecord {
            id: polygon.id,
            count: values.len(),
            values: self.plan.evaluate(&values),
        })
    }

    /// Valid cell values under `polygon`, row-major.
    pub fn zone_values(&self, polygon: &Polygon) -> Vec<f64> {
        if !polygon.bounds().intersects(&self.extent) {
            return Vec::new();
        }
        covered_cells(self.raster, &self.to_pixel, polygon, self.inclusion)
            .into_iter()
            .map(|idx| self.raster.values[idx])
            .filter(|&v| is_valid(v, self.nodata))
            .collect()
    }
}

/// Compute statistics for every polygon on the calling thread.
pub fn compute_stats(
    raster: &RasterGrid,
    polygons: &[Polygon],
    config: &StatsConfig,
    registry: &StatRegistry,
) -> Result<Vec<StatisticsRecord>> {
    let zonal = ZonalStats::new(raster, config, registry)?;
    debug!(polygons = polygons.len(), stats = ?zonal.plan, "computing zonal statistics");
    zonal.compute(polygons)
}
